//! Kurtosis based classification of components into sub- and super-Gaussian sources

use ndarray::{Array1, ArrayBase, Axis, Data, Ix2};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::Float;

/// Offset added to the excess kurtosis before taking its sign
const SIGNS_BIAS: f64 = 0.02;
/// Consecutive unchanged classifications after which the estimation interval grows
const SIGNCOUNT_THRESHOLD: usize = 25;
const SIGNCOUNT_STEP: usize = 2;

/// Source density model assumed for a component
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SourceDensity {
    /// Negative excess kurtosis, flatter than a Gaussian
    SubGaussian,
    /// Positive excess kurtosis, peakier than a Gaussian
    SuperGaussian,
}

impl SourceDensity {
    /// `-1` for sub-Gaussian and `1` for super-Gaussian components
    pub fn sign(self) -> i8 {
        match self {
            Self::SubGaussian => -1,
            Self::SuperGaussian => 1,
        }
    }

    pub(crate) fn weight<F: Float>(self) -> F {
        F::cast(self.sign())
    }
}

/// Excess kurtosis `m4 / m2² - 3` of every row, from moments about zero
pub fn excess_kurtosis<F: Float>(activations: &ArrayBase<impl Data<Elem = F>, Ix2>) -> Array1<F> {
    let m2 = activations
        .mapv(|v| v * v)
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(activations.nrows()));
    let m4 = activations
        .mapv(|v| v.powi(4))
        .mean_axis(Axis(1))
        .unwrap_or_else(|| Array1::zeros(activations.nrows()));

    m4 / m2.mapv(|v| v * v) - F::cast(3.)
}

/// Periodic re-estimation of the component signs during extended Infomax training
#[derive(Debug, Clone)]
pub(crate) struct KurtosisEstimator<F> {
    interval: usize,
    momentum: F,
    previous: Option<Array1<F>>,
    stable_count: usize,
}

impl<F: Float> KurtosisEstimator<F> {
    pub fn new(interval: usize, momentum: F) -> Self {
        KurtosisEstimator {
            interval,
            momentum,
            previous: None,
            stable_count: 0,
        }
    }

    /// Current number of blocks between two estimates
    pub fn interval(&self) -> usize {
        self.interval
    }

    pub fn is_due(&self, blockno: usize) -> bool {
        blockno % self.interval == 0
    }

    /// Reclassify every component from a sample of its activations
    ///
    /// Once the classification has not changed for a while the interval doubles.
    pub fn reclassify(
        &mut self,
        activations: &ArrayBase<impl Data<Elem = F>, Ix2>,
        signs: &mut [SourceDensity],
    ) {
        let mut kurt = excess_kurtosis(activations);
        if self.momentum > F::zero() {
            if let Some(previous) = &self.previous {
                kurt = previous * self.momentum + &kurt * (F::one() - self.momentum);
            }
        }

        let bias = F::cast(SIGNS_BIAS);
        let mut unchanged = true;
        for (sign, &k) in signs.iter_mut().zip(kurt.iter()) {
            let density = if k + bias > F::zero() {
                SourceDensity::SuperGaussian
            } else {
                SourceDensity::SubGaussian
            };
            unchanged &= *sign == density;
            *sign = density;
        }
        self.previous = Some(kurt);

        if unchanged {
            self.stable_count += 1;
        } else {
            self.stable_count = 0;
        }

        if self.stable_count >= SIGNCOUNT_THRESHOLD {
            self.interval *= SIGNCOUNT_STEP;
            self.stable_count = 0;
            log::debug!("signs stable, kurtosis interval now {}", self.interval);
        }
    }
}
