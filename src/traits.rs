//! Provide traits for the decomposition workflow
//!

use std::error::Error;

/// Fittable algorithms
///
/// A fittable algorithm takes a record matrix and creates a fitted model. The hyperparameters
/// are stored in the implementing type, the learned state in `Self::Object`.
pub trait Fit<R, E: Error> {
    type Object;

    fn fit(&self, records: &R) -> Result<Self::Object, E>;
}

/// Transformation algorithms
///
/// A transformer takes a record matrix and maps it into a new representation, e.g. projects
/// raw channel data onto learned components.
pub trait Transformer<R, T> {
    fn transform(&self, x: R) -> T;
}
