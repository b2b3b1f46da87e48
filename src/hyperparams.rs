use ndarray::Array2;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{IcaError, InfomaxParamsError, Result};
use crate::infomax::Infomax;
use crate::preprocessing::Sphering;
use crate::strategy::Execution;
use crate::trainer::{default_block_size, default_lrate, Extended, TrainingParams};
use crate::{Float, ParamGuard};

/// Smallest accepted initial learning rate
pub const MIN_LRATE: f64 = 1e-6;
/// Largest accepted initial learning rate
pub const MAX_LRATE: f64 = 0.1;
/// Default weight change below which training stops
pub const DEFAULT_STOP: f64 = 1e-6;
pub const DEFAULT_MAXSTEPS: usize = 512;
pub const DEFAULT_ANNEALDEG: f64 = 60.0;
pub const DEFAULT_ANNEALSTEP: f64 = 0.90;
pub const DEFAULT_EXTANNEAL: f64 = 0.98;
/// Largest number of frames drawn for a kurtosis estimate
pub const MAX_PDFSIZE: usize = 6000;
/// Below this many frames kurtosis estimates are considered inexact
pub const MIN_PDFSIZE: usize = 2000;
pub const DEFAULT_KURTOSIS_MOMENTUM: f64 = 0.5;

/// Infomax Independent Component Analysis (ICA)
///
/// The checked set of hyperparameters. Data-dependent defaults (learning rate, block size and
/// anneal step) stay unset until the shape of the data is known, see
/// [`InfomaxValidParams::training_params`].
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct InfomaxValidParams<F: Float> {
    ncomponents: Option<usize>,
    sphering: Sphering,
    extended: Extended,
    lrate: Option<F>,
    block_size: Option<usize>,
    stop: F,
    max_steps: usize,
    anneal_step: Option<F>,
    anneal_deg: F,
    momentum: F,
    bias: bool,
    posact: bool,
    pdf_size: usize,
    kurtosis_momentum: F,
    random_state: Option<u64>,
    execution: Execution,
    initial_weights: Option<Array2<F>>,
}

impl<F: Float> InfomaxValidParams<F> {
    /// Number of principal components retained before training, `None` skips PCA
    pub fn ncomponents(&self) -> &Option<usize> {
        &self.ncomponents
    }

    pub fn sphering(&self) -> Sphering {
        self.sphering
    }

    pub fn extended(&self) -> &Extended {
        &self.extended
    }

    pub fn lrate(&self) -> &Option<F> {
        &self.lrate
    }

    pub fn block_size(&self) -> &Option<usize> {
        &self.block_size
    }

    pub fn stop(&self) -> F {
        self.stop
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn anneal_step(&self) -> &Option<F> {
        &self.anneal_step
    }

    pub fn anneal_deg(&self) -> F {
        self.anneal_deg
    }

    pub fn momentum(&self) -> F {
        self.momentum
    }

    pub fn bias(&self) -> bool {
        self.bias
    }

    pub fn posact(&self) -> bool {
        self.posact
    }

    pub fn pdf_size(&self) -> usize {
        self.pdf_size
    }

    pub fn kurtosis_momentum(&self) -> F {
        self.kurtosis_momentum
    }

    pub fn random_state(&self) -> &Option<u64> {
        &self.random_state
    }

    pub fn execution(&self) -> &Execution {
        &self.execution
    }

    pub fn initial_weights(&self) -> Option<&Array2<F>> {
        self.initial_weights.as_ref()
    }

    /// Resolve the data-dependent defaults into the frozen parameter set of the trainer
    ///
    /// # Errors
    ///
    /// If the block size exceeds the number of frames, or more sub-Gaussian components are
    /// fixed than there are components
    pub fn training_params(
        &self,
        nchannels: usize,
        ncomponents: usize,
        frames: usize,
    ) -> Result<TrainingParams<F>> {
        let block_size = self
            .block_size
            .unwrap_or_else(|| default_block_size(frames));
        if block_size < 2 {
            return Err(IcaError::Dimension(format!(
                "block size {} too small for {} frames",
                block_size, frames
            )));
        }
        if block_size > frames {
            return Err(IcaError::Dimension(format!(
                "block size {} exceeds data length {}",
                block_size, frames
            )));
        }

        if let Extended::FixedSubGaussian(nsub) = self.extended {
            if nsub > ncomponents {
                return Err(IcaError::Dimension(format!(
                    "{} sub-Gaussian components exceed the {} components",
                    nsub, ncomponents
                )));
            }
        }

        let pdf_size = self.pdf_size.min(frames);
        if matches!(self.extended, Extended::Reestimate { .. }) && pdf_size < MIN_PDFSIZE {
            log::warn!(
                "kurtosis estimated from {} frames, PDF values are inexact",
                pdf_size
            );
        }

        let anneal_step = self.anneal_step.unwrap_or_else(|| {
            if self.extended.is_enabled() {
                F::cast(DEFAULT_EXTANNEAL)
            } else {
                F::cast(DEFAULT_ANNEALSTEP)
            }
        });

        Ok(TrainingParams {
            lrate: self.lrate.unwrap_or_else(|| default_lrate(nchannels)),
            block_size,
            momentum: self.momentum,
            anneal_step,
            anneal_deg: self.anneal_deg,
            stop: self.stop,
            max_steps: self.max_steps,
            extended: self.extended,
            bias: self.bias,
            pdf_size,
            kurtosis_momentum: self.kurtosis_momentum,
            seed: self.random_state,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct InfomaxParams<F: Float>(InfomaxValidParams<F>);

impl<F: Float> Default for InfomaxParams<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> Infomax<F> {
    pub fn params() -> InfomaxParams<F> {
        InfomaxParams::new()
    }
}

impl<F: Float> InfomaxParams<F> {
    /// Create a new Infomax decomposition with default values for its parameters
    ///
    /// Defaults are:
    /// * no PCA reduction, sphering on, logistic (standard) Infomax
    /// * learning rate `0.015 / ln(channels)` and block size
    ///   `ceil(min(5 ln(frames), 0.3 frames))`, resolved once the data is known
    /// * `stop = 1e-6`, `max_steps = 512`
    /// * annealing by `0.90` (`0.98` for extended Infomax) whenever the update direction turns
    ///   by at least 60 degrees
    /// * no momentum, bias adaptation and posact on
    pub fn new() -> Self {
        Self(InfomaxValidParams {
            ncomponents: None,
            sphering: Sphering::On,
            extended: Extended::Off,
            lrate: None,
            block_size: None,
            stop: F::cast(DEFAULT_STOP),
            max_steps: DEFAULT_MAXSTEPS,
            anneal_step: None,
            anneal_deg: F::cast(DEFAULT_ANNEALDEG),
            momentum: F::zero(),
            bias: true,
            posact: true,
            pdf_size: MAX_PDFSIZE,
            kurtosis_momentum: F::cast(DEFAULT_KURTOSIS_MOMENTUM),
            random_state: None,
            execution: Execution::Single,
            initial_weights: None,
        })
    }

    /// Reduce the data to this many principal components before training
    pub fn ncomponents(mut self, ncomponents: usize) -> Self {
        self.0.ncomponents = Some(ncomponents);
        self
    }

    /// How the data is sphered before training, refer [`Sphering`]
    pub fn sphering(mut self, sphering: Sphering) -> Self {
        self.0.sphering = sphering;
        self
    }

    /// Switch to extended Infomax, refer [`Extended`]
    pub fn extended(mut self, extended: Extended) -> Self {
        self.0.extended = extended;
        self
    }

    /// Set the initial learning rate
    pub fn lrate(mut self, lrate: F) -> Self {
        self.0.lrate = Some(lrate);
        self
    }

    /// Set the number of frames per training block
    pub fn block_size(mut self, block_size: usize) -> Self {
        self.0.block_size = Some(block_size);
        self
    }

    /// Stop training once the squared weight change of a step is below this value
    pub fn stop(mut self, stop: F) -> Self {
        self.0.stop = stop;
        self
    }

    /// Set maximum number of training steps
    pub fn max_steps(mut self, max_steps: usize) -> Self {
        self.0.max_steps = max_steps;
        self
    }

    /// Factor applied to the learning rate on annealing
    pub fn anneal_step(mut self, anneal_step: F) -> Self {
        self.0.anneal_step = Some(anneal_step);
        self
    }

    /// Angle between successive weight changes, in degrees, from which on to anneal
    pub fn anneal_deg(mut self, anneal_deg: F) -> Self {
        self.0.anneal_deg = anneal_deg;
        self
    }

    pub fn momentum(mut self, momentum: F) -> Self {
        self.0.momentum = momentum;
        self
    }

    /// Enable or disable online bias adaptation
    pub fn bias(mut self, bias: bool) -> Self {
        self.0.bias = bias;
        self
    }

    /// Orient each component so that its activation is positively skewed
    pub fn posact(mut self, posact: bool) -> Self {
        self.0.posact = posact;
        self
    }

    /// Maximum number of frames drawn for each kurtosis estimate
    pub fn pdf_size(mut self, pdf_size: usize) -> Self {
        self.0.pdf_size = pdf_size;
        self
    }

    /// Smoothing of successive kurtosis estimates, `0` disables smoothing
    pub fn kurtosis_momentum(mut self, kurtosis_momentum: F) -> Self {
        self.0.kurtosis_momentum = kurtosis_momentum;
        self
    }

    /// Set seed for random number generator for reproducible results.
    pub fn random_state(mut self, random_state: u64) -> Self {
        self.0.random_state = Some(random_state);
        self
    }

    /// Select how training is executed, refer [`Execution`]
    pub fn execution(mut self, execution: Execution) -> Self {
        self.0.execution = execution;
        self
    }

    /// Start training from these `(ncomponents, ncomponents)` weights, e.g. of a previous run
    pub fn initial_weights(mut self, weights: Array2<F>) -> Self {
        self.0.initial_weights = Some(weights);
        self
    }
}

impl<F: Float> ParamGuard for InfomaxParams<F> {
    type Checked = InfomaxValidParams<F>;
    type Error = InfomaxParamsError;

    fn check_ref(&self) -> std::result::Result<&Self::Checked, Self::Error> {
        let p = &self.0;
        let in_range = |x: F, lo: f64, hi: f64| x >= F::cast(lo) && x <= F::cast(hi);

        if p.ncomponents == Some(0) {
            return Err(InfomaxParamsError::NComponents);
        }
        if let Some(lrate) = p.lrate {
            if !in_range(lrate, MIN_LRATE, MAX_LRATE) {
                return Err(InfomaxParamsError::LearningRate(
                    lrate.to_f64().unwrap_or(f64::NAN),
                    MIN_LRATE,
                    MAX_LRATE,
                ));
            }
        }
        if let Some(block_size) = p.block_size {
            if block_size < 2 {
                return Err(InfomaxParamsError::BlockSize(block_size));
            }
        }
        if !(p.stop >= F::zero()) {
            return Err(InfomaxParamsError::Stop(p.stop.to_f64().unwrap_or(f64::NAN)));
        }
        if let Some(anneal_step) = p.anneal_step {
            if !(anneal_step > F::zero() && anneal_step <= F::one()) {
                return Err(InfomaxParamsError::AnnealStep(
                    anneal_step.to_f64().unwrap_or(f64::NAN),
                ));
            }
        }
        if !in_range(p.anneal_deg, 0., 180.) {
            return Err(InfomaxParamsError::AnnealDeg(
                p.anneal_deg.to_f64().unwrap_or(f64::NAN),
            ));
        }
        if !in_range(p.momentum, 0., 1.) {
            return Err(InfomaxParamsError::Momentum(
                p.momentum.to_f64().unwrap_or(f64::NAN),
            ));
        }
        if !(p.kurtosis_momentum >= F::zero() && p.kurtosis_momentum < F::one()) {
            return Err(InfomaxParamsError::KurtosisMomentum(
                p.kurtosis_momentum.to_f64().unwrap_or(f64::NAN),
            ));
        }
        if p.pdf_size == 0 {
            return Err(InfomaxParamsError::PdfSize);
        }
        if let Extended::Reestimate { interval: 0 } = p.extended {
            return Err(InfomaxParamsError::ExtBlocks);
        }
        if let Execution::Partitioned {
            partitions,
            merge_interval,
        } = p.execution
        {
            if partitions == 0 || merge_interval == 0 {
                return Err(InfomaxParamsError::Partitions);
            }
        }

        Ok(&self.0)
    }

    fn check(self) -> std::result::Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn autotraits() {
        fn has_autotraits<T: Send + Sync + Sized + Unpin>() {}
        has_autotraits::<InfomaxParams<f64>>();
        has_autotraits::<InfomaxValidParams<f64>>();
    }

    #[test]
    fn defaults_are_valid() {
        let params = Infomax::<f64>::params().check().unwrap();
        assert_eq!(params.sphering(), Sphering::On);
        assert_eq!(params.max_steps(), DEFAULT_MAXSTEPS);
        assert!(params.bias());
        assert!(params.posact());
    }

    #[test]
    fn lrate_out_of_bounds() {
        let res = Infomax::params().lrate(0.5).check();
        assert!(matches!(res, Err(InfomaxParamsError::LearningRate(..))));
        let res = Infomax::params().lrate(1e-9).check();
        assert!(matches!(res, Err(InfomaxParamsError::LearningRate(..))));
    }

    #[test]
    fn zero_components() {
        let res = Infomax::<f64>::params().ncomponents(0).check();
        assert!(matches!(res, Err(InfomaxParamsError::NComponents)));
    }

    #[test]
    fn anneal_bounds() {
        let res = Infomax::params().anneal_step(0.).check();
        assert!(matches!(res, Err(InfomaxParamsError::AnnealStep(_))));
        let res = Infomax::params().anneal_step(1.).check();
        assert!(res.is_ok());
        let res = Infomax::params().anneal_deg(181.).check();
        assert!(matches!(res, Err(InfomaxParamsError::AnnealDeg(_))));
    }

    #[test]
    fn momentum_bounds() {
        let res = Infomax::params().momentum(1.5).check();
        assert!(matches!(res, Err(InfomaxParamsError::Momentum(_))));
    }

    #[test]
    fn tiny_block() {
        let res = Infomax::<f32>::params().block_size(1).check();
        assert!(matches!(res, Err(InfomaxParamsError::BlockSize(1))));
    }

    #[test]
    fn partitions_must_be_positive() {
        let res = Infomax::<f64>::params()
            .execution(Execution::Partitioned {
                partitions: 0,
                merge_interval: 4,
            })
            .check();
        assert!(matches!(res, Err(InfomaxParamsError::Partitions)));
    }

    #[test]
    fn resolved_defaults() {
        let params = Infomax::<f64>::params().check().unwrap();
        let training = params.training_params(4, 4, 2000).unwrap();

        assert_eq!(training.block_size, 39);
        assert!((training.lrate - 0.015 / 4f64.ln()).abs() < 1e-12);
        assert_eq!(training.anneal_step, DEFAULT_ANNEALSTEP);

        let params = Infomax::<f64>::params()
            .extended(Extended::Reestimate { interval: 1 })
            .check()
            .unwrap();
        let training = params.training_params(4, 4, 2000).unwrap();
        assert_eq!(training.anneal_step, DEFAULT_EXTANNEAL);
        assert_eq!(training.pdf_size, 2000);
    }

    #[test]
    fn block_larger_than_data() {
        let params = Infomax::<f64>::params().block_size(50).check().unwrap();
        let err = params.training_params(4, 4, 20).unwrap_err();
        assert!(matches!(err, IcaError::Dimension(_)));
    }

    #[test]
    fn too_many_sub_gaussians() {
        let params = Infomax::<f64>::params()
            .extended(Extended::FixedSubGaussian(5))
            .check()
            .unwrap();
        let err = params.training_params(4, 4, 200).unwrap_err();
        assert!(matches!(err, IcaError::Dimension(_)));
    }
}
