//! Block-stochastic natural-gradient training of the unmixing weights
//!
//! One training *step* is a full pass over a random permutation of the frames, cut into blocks
//! of `block_size` frames. Every block updates the weights with the natural-gradient Infomax
//! rule
//!
//! ```text
//! ΔW = η (I + φ(u) uᵀ / b) W,    u = W x (+ bias)
//! ```
//!
//! averaged over the `b` frames of the block.
//!
//! where `φ(u) = 1 - 2 logistic(u)` for standard Infomax and `φ(u) = -K tanh(u) - u` with
//! `K = diag(±1)` for extended Infomax. After a step the learning rate is annealed whenever
//! the direction of the weight change turns by at least `anneal_deg` degrees.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{IcaError, Result};
use crate::kurtosis::{KurtosisEstimator, SourceDensity};
use crate::Float;

/// Weights beyond this magnitude are considered diverged
pub const MAX_WEIGHT: f64 = 1e8;
/// A step changing the weights by more than this gets its learning rate damped
const DEFAULT_BLOWUP: f64 = 1e9;
const DEFAULT_BLOWUP_FAC: f64 = 0.8;

/// Heuristic initial learning rate for a number of channels
pub fn default_lrate<F: Float>(nchannels: usize) -> F {
    F::cast(0.015 / (nchannels.max(2) as f64).ln())
}

/// Heuristic block size for a number of frames
pub fn default_block_size(frames: usize) -> usize {
    let frames = frames as f64;
    ((5. * frames.ln()).min(0.3 * frames).ceil() as usize).max(2)
}

/// Standard or extended Infomax
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Extended {
    /// Standard (logistic) Infomax, all components assumed super-Gaussian
    Off,
    /// Extended Infomax, signs re-estimated from the kurtosis every `interval` blocks
    Reestimate { interval: usize },
    /// Extended Infomax with the first `n` components fixed to sub-Gaussian
    FixedSubGaussian(usize),
}

impl Extended {
    /// Interpret an `extended N` setting: `N > 0` re-estimates every `N` blocks, `N < 0` fixes
    /// `-N` sub-Gaussian components and `0` disables extended Infomax
    pub fn from_blocks(extblocks: i64) -> Self {
        match extblocks {
            0 => Extended::Off,
            n if n > 0 => Extended::Reestimate {
                interval: n as usize,
            },
            n => Extended::FixedSubGaussian(n.unsigned_abs() as usize),
        }
    }

    pub fn is_enabled(&self) -> bool {
        !matches!(self, Extended::Off)
    }

    // Re-estimation starts from a single sub-Gaussian component
    fn initial_signs(&self, ncomponents: usize) -> Option<Vec<SourceDensity>> {
        let nsub = match *self {
            Extended::Off => return None,
            Extended::Reestimate { .. } => 1,
            Extended::FixedSubGaussian(n) => n,
        };
        Some(
            (0..ncomponents)
                .map(|i| {
                    if i < nsub {
                        SourceDensity::SubGaussian
                    } else {
                        SourceDensity::SuperGaussian
                    }
                })
                .collect(),
        )
    }
}

/// Frozen parameter set consumed by the [`Trainer`]
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingParams<F> {
    pub lrate: F,
    pub block_size: usize,
    pub momentum: F,
    pub anneal_step: F,
    pub anneal_deg: F,
    /// Squared weight change below which training has converged
    pub stop: F,
    pub max_steps: usize,
    pub extended: Extended,
    pub bias: bool,
    /// Maximum number of frames drawn for a kurtosis estimate
    pub pdf_size: usize,
    pub kurtosis_momentum: F,
    pub seed: Option<u64>,
}

/// State of a training run, `Diverged` is reported as [`IcaError::Diverged`]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TrainingStatus {
    Training,
    Converged,
    StepLimitReached,
}

/// Result of a training run
#[derive(Debug, Clone, PartialEq)]
pub struct TrainedWeights<F> {
    pub weights: Array2<F>,
    pub bias: Option<Array1<F>>,
    pub signs: Option<Vec<SourceDensity>>,
    pub status: TrainingStatus,
    pub steps: usize,
    /// Learning rate after annealing
    pub lrate: F,
    /// Squared weight change of the last step
    pub change: F,
}

struct TrainingState<F> {
    weights: Array2<F>,
    bias: Option<Array1<F>>,
    signs: Option<Vec<SourceDensity>>,
    lrate: F,
    step: usize,
    blockno: usize,
    // weights at the start of the current step
    step_start: Array2<F>,
    change: F,
    prev_delta: Option<(Array1<F>, F)>,
    momentum_weights: Array2<F>,
    momentum_change: Array2<F>,
    kurtosis: Option<KurtosisEstimator<F>>,
    status: TrainingStatus,
}

/// Infomax optimizer over a whitened (and possibly reduced) `(ncomponents, frames)` matrix
pub struct Trainer<'p, 'a, F: Float> {
    params: &'p TrainingParams<F>,
    data: ArrayView2<'a, F>,
    state: TrainingState<F>,
    rng: Xoshiro256Plus,
}

impl<'p, 'a, F: Float> Trainer<'p, 'a, F> {
    /// Prepare training from the given starting weights
    ///
    /// All-zero starting weights are replaced by the identity.
    ///
    /// # Errors
    ///
    /// If the weights are not `(ncomponents, ncomponents)`, the block size does not fit the
    /// data or more sub-Gaussian components are fixed than there are components
    pub fn new(
        params: &'p TrainingParams<F>,
        data: ArrayView2<'a, F>,
        weights: Array2<F>,
    ) -> Result<Self> {
        let (ncomps, frames) = data.dim();
        if weights.dim() != (ncomps, ncomps) {
            return Err(IcaError::Dimension(format!(
                "starting weights are {:?}, expected ({}, {})",
                weights.dim(),
                ncomps,
                ncomps
            )));
        }
        if params.block_size < 2 || params.block_size > frames {
            return Err(IcaError::Dimension(format!(
                "block size {} does not fit {} frames",
                params.block_size, frames
            )));
        }
        if let Extended::FixedSubGaussian(nsub) = params.extended {
            if nsub > ncomps {
                return Err(IcaError::Dimension(format!(
                    "{} sub-Gaussian components exceed the {} components",
                    nsub, ncomps
                )));
            }
        }

        let weights = if weights.iter().all(|w| *w == F::zero()) {
            Array2::eye(ncomps)
        } else {
            weights
        };

        let kurtosis = match params.extended {
            Extended::Reestimate { interval } => Some(KurtosisEstimator::new(
                interval.max(1),
                params.kurtosis_momentum,
            )),
            _ => None,
        };

        let rng = match params.seed {
            Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
            None => Xoshiro256Plus::from_entropy(),
        };

        let status = if params.max_steps == 0 {
            TrainingStatus::StepLimitReached
        } else {
            TrainingStatus::Training
        };

        Ok(Trainer {
            params,
            data,
            state: TrainingState {
                step_start: weights.clone(),
                momentum_weights: weights.clone(),
                momentum_change: Array2::zeros((ncomps, ncomps)),
                bias: if params.bias {
                    Some(Array1::zeros(ncomps))
                } else {
                    None
                },
                signs: params.extended.initial_signs(ncomps),
                lrate: params.lrate,
                step: 0,
                blockno: 1,
                change: F::zero(),
                prev_delta: None,
                kurtosis,
                status,
                weights,
            },
            rng,
        })
    }

    pub fn weights(&self) -> &Array2<F> {
        &self.state.weights
    }

    pub fn bias(&self) -> Option<&Array1<F>> {
        self.state.bias.as_ref()
    }

    pub fn signs(&self) -> Option<&[SourceDensity]> {
        self.state.signs.as_deref()
    }

    pub fn lrate(&self) -> F {
        self.state.lrate
    }

    pub fn steps(&self) -> usize {
        self.state.step
    }

    pub fn status(&self) -> TrainingStatus {
        self.state.status
    }

    /// Run one training step over all blocks of a fresh frame permutation
    ///
    /// # Errors
    ///
    /// [`IcaError::Diverged`] if any weight becomes non-finite or exceeds [`MAX_WEIGHT`]
    pub fn step(&mut self) -> Result<TrainingStatus> {
        if self.state.status != TrainingStatus::Training {
            return Ok(self.state.status);
        }

        let step = self.state.step + 1;
        let mut perm: Vec<usize> = (0..self.data.ncols()).collect();
        perm.shuffle(&mut self.rng);

        for block in perm.chunks_exact(self.params.block_size) {
            let x = self.data.select(Axis(1), block);
            self.train_block(&x);
            self.check_weights(step)?;

            if self.state.kurtosis.is_some() {
                self.reestimate_signs();
            }
            self.state.blockno += 1;
        }

        self.finish_step(step)
    }

    /// Run steps until training has terminated
    pub fn run(mut self) -> Result<TrainedWeights<F>> {
        while self.step()? == TrainingStatus::Training {}

        log::info!(
            "training finished after {} steps ({:?}), lrate {:e}, wchange {:e}",
            self.state.step,
            self.state.status,
            self.state.lrate.to_f64().unwrap_or(f64::NAN),
            self.state.change.to_f64().unwrap_or(f64::NAN),
        );
        Ok(self.into_trained())
    }

    /// Run at most `n` steps, stopping early on termination
    pub fn run_steps(&mut self, n: usize) -> Result<TrainingStatus> {
        for _ in 0..n {
            if self.step()? != TrainingStatus::Training {
                break;
            }
        }
        Ok(self.state.status)
    }

    /// Replace the shared part of the state, e.g. at a merge barrier of partitioned training
    pub fn synchronize(
        &mut self,
        weights: &Array2<F>,
        bias: Option<&Array1<F>>,
        signs: Option<&[SourceDensity]>,
        lrate: F,
    ) {
        self.state.weights.assign(weights);
        self.state.step_start.assign(weights);
        self.state.momentum_weights.assign(weights);
        if let (Some(own), Some(bias)) = (self.state.bias.as_mut(), bias) {
            own.assign(bias);
        }
        if let (Some(own), Some(signs)) = (self.state.signs.as_mut(), signs) {
            own.copy_from_slice(signs);
        }
        self.state.lrate = lrate;
        // the direction history of this worker does not apply to the merged weights
        self.state.prev_delta = None;
        self.state.momentum_change.fill(F::zero());
        self.state.status = TrainingStatus::Training;
    }

    pub fn into_trained(self) -> TrainedWeights<F> {
        TrainedWeights {
            weights: self.state.weights,
            bias: self.state.bias,
            signs: self.state.signs,
            status: self.state.status,
            steps: self.state.step,
            lrate: self.state.lrate,
            change: self.state.change,
        }
    }

    fn train_block(&mut self, x: &Array2<F>) {
        let state = &mut self.state;
        let nframes = F::cast(x.ncols());

        let mut u = state.weights.dot(x);
        if let Some(bias) = &state.bias {
            u += &bias.view().insert_axis(Axis(1));
        }

        let (mut grad, bias_grad) = match &state.signs {
            None => {
                // 1 - 2 logistic(u) = -tanh(u / 2)
                let y = u.mapv(|v| -(v / F::cast(2.)).tanh());
                let grad = y.dot(&u.t());
                (grad, y.sum_axis(Axis(1)))
            }
            Some(signs) => {
                let y = u.mapv(|v| v.tanh());
                let k = signs.iter().map(|s| s.weight::<F>()).collect::<Array1<F>>();
                let grad = -(&y.dot(&u.t()) * &k.insert_axis(Axis(1))) - u.dot(&u.t());
                (grad, y.sum_axis(Axis(1)) * F::cast(-2.))
            }
        };
        // block average, so the step size does not grow with the block size
        grad.mapv_inplace(|g| g / nframes);
        grad.diag_mut().mapv_inplace(|d| d + F::one());

        let update = grad.dot(&state.weights) * state.lrate;
        state.weights += &update;

        if let Some(bias) = state.bias.as_mut() {
            bias.scaled_add(state.lrate / nframes, &bias_grad);
        }

        if self.params.momentum > F::zero() {
            state
                .weights
                .scaled_add(self.params.momentum, &state.momentum_change);
            state.momentum_change = &state.weights - &state.momentum_weights;
            state.momentum_weights.assign(&state.weights);
        }
    }

    fn check_weights(&self, step: usize) -> Result<()> {
        let bound = F::cast(MAX_WEIGHT);
        let blown_up = |w: &F| !w.is_finite() || w.abs() > bound;

        if self.state.weights.iter().any(blown_up)
            || self.state.bias.iter().flatten().any(|b| !b.is_finite())
        {
            log::warn!("weights blew up at step {}", step);
            return Err(IcaError::Diverged { step });
        }
        Ok(())
    }

    fn reestimate_signs(&mut self) {
        let frames = self.data.ncols();
        let blockno = self.state.blockno;
        let rng = &mut self.rng;
        let state = &mut self.state;
        let (estimator, signs) = match (state.kurtosis.as_mut(), state.signs.as_mut()) {
            (Some(estimator), Some(signs)) => (estimator, signs),
            _ => return,
        };
        if !estimator.is_due(blockno) {
            return;
        }

        let activations = if self.params.pdf_size < frames {
            let sample = (0..self.params.pdf_size)
                .map(|_| rng.gen_range(0..frames))
                .collect::<Vec<_>>();
            state.weights.dot(&self.data.select(Axis(1), &sample))
        } else {
            state.weights.dot(&self.data)
        };
        estimator.reclassify(&activations, signs);
    }

    fn finish_step(&mut self, step: usize) -> Result<TrainingStatus> {
        let params = self.params;
        let state = &mut self.state;

        let diff = &state.weights - &state.step_start;
        let delta = diff.iter().cloned().collect::<Array1<F>>();
        let change = delta.dot(&delta);
        if !change.is_finite() {
            log::warn!("weight change is not finite at step {}", step);
            return Err(IcaError::Diverged { step });
        }

        let mut angle = None;
        if step > 2 {
            if let Some((prev, prev_change)) = &state.prev_delta {
                if *prev_change > F::zero() && change > F::zero() {
                    let cos = delta.dot(prev) / (change * *prev_change).sqrt();
                    angle = Some(cos.max(-F::one()).min(F::one()).acos().to_degrees());
                }
            }
        }
        state.lrate = adapt_lrate(params, state.lrate, change, angle);
        if change > F::cast(DEFAULT_BLOWUP) {
            log::warn!(
                "weight change {:e} at step {}, lowering learning rate to {:e}",
                change.to_f64().unwrap_or(f64::NAN),
                step,
                state.lrate.to_f64().unwrap_or(f64::NAN)
            );
        }

        log::debug!(
            "step {} - lrate {:.6e}, wchange {:.6e}, angledelta {:.1} deg",
            step,
            state.lrate.to_f64().unwrap_or(f64::NAN),
            change.to_f64().unwrap_or(f64::NAN),
            angle.and_then(|a| a.to_f64()).unwrap_or(0.)
        );

        state.prev_delta = Some((delta, change));
        state.step_start.assign(&state.weights);
        state.change = change;
        state.step = step;

        state.status = if step > 2 && change < params.stop {
            TrainingStatus::Converged
        } else if step >= params.max_steps {
            TrainingStatus::StepLimitReached
        } else {
            TrainingStatus::Training
        };
        Ok(state.status)
    }
}

/// Learning rate for the next step
///
/// Anneals by `anneal_step` once the direction of the weight change turns by at least
/// `anneal_deg` degrees, and damps by a further `0.8` after a weight change above `1e9`.
fn adapt_lrate<F: Float>(
    params: &TrainingParams<F>,
    lrate: F,
    change: F,
    angle: Option<F>,
) -> F {
    let mut lrate = lrate;
    if let Some(angle) = angle {
        if angle >= params.anneal_deg {
            lrate *= params.anneal_step;
        }
    }
    if change > F::cast(DEFAULT_BLOWUP) {
        lrate *= F::cast(DEFAULT_BLOWUP_FAC);
    }
    lrate
}
