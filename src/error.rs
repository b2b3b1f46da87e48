//! Error types of the Infomax toolkit
//!

use std::path::PathBuf;

use linfa_linalg::LinalgError;
use ndarray::ShapeError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, IcaError>;

/// An error when setting the hyperparameters of an Infomax decomposition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum InfomaxParamsError {
    #[error("number of components must be at least 1")]
    NComponents,
    #[error("learning rate {0} is out of bounds [{1}, {2}]")]
    LearningRate(f64, f64, f64),
    #[error("block size must be at least 2, got {0}")]
    BlockSize(usize),
    #[error("stop threshold must not be negative, got {0}")]
    Stop(f64),
    #[error("anneal step must be in (0, 1], got {0}")]
    AnnealStep(f64),
    #[error("anneal angle must be in [0, 180] degrees, got {0}")]
    AnnealDeg(f64),
    #[error("momentum must be in [0, 1], got {0}")]
    Momentum(f64),
    #[error("kurtosis momentum must be in [0, 1), got {0}")]
    KurtosisMomentum(f64),
    #[error("pdf sample size must be positive")]
    PdfSize,
    #[error("kurtosis re-estimation interval must be positive")]
    ExtBlocks,
    #[error("partitioned execution needs at least one partition and a positive merge interval")]
    Partitions,
}

/// Coarse classification of an [`IcaError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Out-of-range or missing parameter, detected before any numerical work
    Config,
    /// File access failures and element count mismatches
    Io,
    /// Component count or block size incompatible with the data shape
    Dimension,
    /// Divergence during training or a singular matrix during sphering, PCA or sorting
    Numerical,
}

/// An error when running an Infomax decomposition
#[derive(Error, Debug)]
pub enum IcaError {
    /// When any of the hyperparameters are set the wrong value
    #[error("Invalid hyperparameter: {0}")]
    InvalidParams(#[from] InfomaxParamsError),
    /// Malformed or incomplete run script
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{}: expected {expected} elements, found {found}", path.display())]
    ElementCount {
        path: PathBuf,
        expected: usize,
        found: usize,
    },
    #[error("dimension mismatch: {0}")]
    Dimension(String),
    /// Weights became non-finite or exceeded the magnitude bound
    #[error("weights diverged at training step {step}")]
    Diverged { step: usize },
    /// A matrix that has to be inverted has a (numerically) zero eigenvalue
    #[error("{0} is singular or ill-conditioned")]
    Singular(&'static str),
    #[error("Linalg Error: {0}")]
    Linalg(#[from] LinalgError),
    #[error("invalid ndarray shape {0}")]
    NdShape(#[from] ShapeError),
}

impl IcaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidParams(_) | Self::Config(_) => ErrorKind::Config,
            Self::Io { .. } | Self::ElementCount { .. } => ErrorKind::Io,
            Self::Dimension(_) | Self::NdShape(_) => ErrorKind::Dimension,
            Self::Diverged { .. } | Self::Singular(_) | Self::Linalg(_) => ErrorKind::Numerical,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
