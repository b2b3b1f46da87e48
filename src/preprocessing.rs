//! Mean removal, principal subspace reduction and sphering
//!
//! Sphering (whitening) refers to a linear transform `S` such that the transformed data `S X`
//! has identity covariance. The symmetric choice `S = C^{-1/2}` is used, `C` being the channel
//! covariance, which keeps the sphered channels as close as possible to the original ones.
//!
//! The projection stages take their input by value and return a new matrix, so that no stage
//! keeps two copies of the data alive.

use std::fmt;
use std::str::FromStr;

use ndarray::{s, Array1, Array2, ArrayBase, Axis, Data, Ix2};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{IcaError, Result};
use crate::linalg::{check_rank, eigh_ascending, inv_sqrtm};
use crate::Float;

/// How the data is sphered before training
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Sphering {
    /// Sphere the data and report the sphering matrix
    On,
    /// Leave the data as is, start training from the sphering matrix and report identity
    Off,
    /// Leave the data as is and report identity, token `none`
    Skip,
}

impl Default for Sphering {
    fn default() -> Self {
        Sphering::On
    }
}

impl FromStr for Sphering {
    type Err = IcaError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "on" => Ok(Sphering::On),
            "off" => Ok(Sphering::Off),
            "none" => Ok(Sphering::Skip),
            other => Err(IcaError::Config(format!(
                "sphering must be on, off or none, got `{}`",
                other
            ))),
        }
    }
}

impl fmt::Display for Sphering {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sphering::On => write!(f, "on"),
            Sphering::Off => write!(f, "off"),
            Sphering::Skip => write!(f, "none"),
        }
    }
}

/// Subtract the mean of every channel (row) and return the means
pub fn remove_mean<F: Float>(data: &mut Array2<F>) -> Array1<F> {
    let mean = data
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(data.nrows()));
    *data -= &mean.view().insert_axis(Axis(1));
    mean
}

/// Sample covariance of the channels (rows), normalized by `frames - 1`
pub fn covariance<F: Float>(data: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array2<F> {
    let n = data.ncols();
    let mean = data
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(data.nrows()));
    let mean = mean.insert_axis(Axis(1));

    // X Xᵀ - n m mᵀ avoids a centered copy of the data
    let scatter = data.dot(&data.t()) - mean.dot(&mean.t()) * F::cast(n);
    scatter / F::cast(n.saturating_sub(1).max(1))
}

/// Data projected onto its leading principal components
#[derive(Debug, Clone)]
pub struct Reduced<F> {
    /// `(ncomponents, frames)` projected data
    pub data: Array2<F>,
    /// `(channels, channels)` eigenvectors of the covariance, ascending by eigenvalue
    pub eigenvectors: Array2<F>,
    pub eigenvalues: Array1<F>,
}

impl<F: Float> Reduced<F> {
    /// `(ncomponents, channels)` projection onto the retained subspace
    pub fn projection(&self) -> Array2<F> {
        let nchannels = self.eigenvectors.ncols();
        let ncomps = self.data.nrows();
        self.eigenvectors
            .slice(s![.., nchannels - ncomps..])
            .t()
            .to_owned()
    }
}

/// Project mean-removed data onto the `ncomponents` eigenvectors of largest eigenvalue
///
/// # Errors
///
/// [`IcaError::Dimension`] if `ncomponents` is zero or exceeds the number of channels,
/// [`IcaError::Singular`] if the retained part of the covariance is rank deficient
pub fn reduce_dimensions<F: Float>(data: Array2<F>, ncomponents: usize) -> Result<Reduced<F>> {
    let nchannels = data.nrows();
    if ncomponents < 1 || ncomponents > nchannels {
        return Err(IcaError::Dimension(format!(
            "cannot retain {} principal components of {} channels",
            ncomponents, nchannels
        )));
    }

    let (eigenvalues, eigenvectors) = eigh_ascending(&covariance(&data))?;
    check_rank(
        eigenvalues.slice(s![nchannels - ncomponents..]),
        "channel covariance",
        data.ncols(),
    )?;
    let subspace = eigenvectors.slice(s![.., nchannels - ncomponents..]);
    let reduced = subspace.t().dot(&data);

    Ok(Reduced {
        data: reduced,
        eigenvectors,
        eigenvalues,
    })
}

/// Outcome of the sphering stage
#[derive(Debug, Clone)]
pub struct Whitened<F> {
    /// Data handed to the trainer
    pub data: Array2<F>,
    /// Sphering matrix reported to the caller
    pub sphere: Array2<F>,
    /// Starting weights derived from the sphering matrix, see [`Sphering::Off`]
    pub initial_weights: Option<Array2<F>>,
}

/// Sphere the data according to `mode`
///
/// With [`Sphering::Off`] the would-be sphering matrix becomes the starting weights, unless
/// `has_initial_weights` says the caller brings its own.
///
/// # Errors
///
/// If the covariance of the data is singular
pub fn whiten<F: Float>(
    data: Array2<F>,
    mode: Sphering,
    has_initial_weights: bool,
) -> Result<Whitened<F>> {
    let n = data.nrows();
    match mode {
        Sphering::On => {
            log::info!("computing the sphering matrix");
            let sphere = inv_sqrtm(&covariance(&data), "channel covariance")?;
            log::info!("sphering the data");
            let sphered = sphere.dot(&data);
            Ok(Whitened {
                data: sphered,
                sphere,
                initial_weights: None,
            })
        }
        Sphering::Off => {
            let initial_weights = if has_initial_weights {
                None
            } else {
                log::info!("using the sphering matrix as the starting weight matrix");
                Some(inv_sqrtm(&covariance(&data), "channel covariance")?)
            };
            log::info!("returning the identity matrix as sphere");
            Ok(Whitened {
                data,
                sphere: Array2::eye(n),
                initial_weights,
            })
        }
        Sphering::Skip => {
            log::info!("returning the identity matrix as sphere");
            Ok(Whitened {
                data,
                sphere: Array2::eye(n),
                initial_weights: None,
            })
        }
    }
}
