//! `infomax` decomposes multichannel recordings into maximally independent components.
//!
//! ## The Big Picture
//!
//! Independent Component Analysis (ICA) separates multivariate signals into additive
//! subcomponents that are as statistically independent as possible. This crate implements the
//! Infomax principle of Bell and Sejnowski with the natural-gradient rule of Amari, and its
//! extended variant of Lee, Girolami and Sejnowski which also separates sub-Gaussian sources.
//! It is mostly used on EEG/MEG recordings where components correspond to brain sources and
//! artifacts such as eye blinks or line noise.
//!
//! Data are laid out as `(channels, frames)`, one row per channel and one column per sample.
//!
//! ## Current state
//!
//! A decomposition runs through three stages:
//!
//! * a preprocessor removing the channel means, optionally projecting onto the leading principal
//!   components and sphering the data, see [`preprocessing`]
//! * a block-stochastic trainer with learning rate annealing and optional kurtosis based
//!   sign re-estimation, see [`trainer`]
//! * a postprocessor composing the full unmixing matrix, orienting and sorting the components
//!   by projected variance, see [`postprocessing`]
//!
//! The trainer either runs on a single thread or on partitions of the data merged at fixed
//! barriers, see [`Execution`].
//!
//! ## Example
//!
//! ```ignore
//! use infomax::prelude::*;
//!
//! let model = Infomax::params()
//!     .extended(Extended::Reestimate { interval: 1 })
//!     .random_state(42)
//!     .fit(&recording)?;
//!
//! let activations = model.activations();
//! let sources = model.transform(&new_recording);
//! ```
//!
//! The `binica` binary runs a decomposition described by a run script on raw `f32` files, see
//! [`config`].

use std::iter::Sum;

use ndarray::NdFloat;
use num_traits::{FromPrimitive, NumCast};

pub mod config;
pub mod error;
pub mod hyperparams;
pub mod infomax;
pub mod io;
pub mod kurtosis;
mod linalg;
mod param_guard;
pub mod postprocessing;
pub mod prelude;
pub mod preprocessing;
pub mod run;
pub mod strategy;
pub mod trainer;
pub mod traits;

pub use error::{ErrorKind, IcaError, InfomaxParamsError, Result};
pub use hyperparams::{InfomaxParams, InfomaxValidParams};
pub use infomax::Infomax;
pub use io::Layout;
pub use kurtosis::SourceDensity;
pub use param_guard::ParamGuard;
pub use preprocessing::Sphering;
pub use strategy::{Execution, ExecutionStrategy, Partitioned, SingleProcess};
pub use trainer::{Extended, TrainingStatus};

/// Floating point numbers
///
/// This trait bound multiplexes to the most common assumption of floating point number and
/// implements them for 32bit and 64bit floating points. Recordings are usually read as `f32`
/// but trained in `f64`.
pub trait Float: NdFloat + FromPrimitive + Default + Sum + 'static {
    fn cast<T: NumCast>(x: T) -> Self {
        NumCast::from(x).unwrap()
    }
}

impl Float for f32 {}

impl Float for f64 {}
