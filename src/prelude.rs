//! Infomax prelude.
//!
//! This module contains the most used types, type aliases, traits and
//! functions that you can import easily as a group.
//!

#[doc(no_inline)]
pub use crate::error::{IcaError, Result};

#[doc(no_inline)]
pub use crate::traits::*;

#[doc(no_inline)]
pub use crate::{
    Execution, Extended, Float, Infomax, InfomaxParams, InfomaxValidParams, ParamGuard,
    SourceDensity, Sphering, TrainingStatus,
};
