//! Execution strategies driving the [`Trainer`]
//!
//! The preprocessing and postprocessing stages stay the same regardless of how the weights
//! are trained. A strategy only receives the whitened data and the starting weights and
//! returns the trained weights.

use ndarray::{s, Array, Array2, ArrayView2, Dimension};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{IcaError, InfomaxParamsError, Result};
use crate::kurtosis::SourceDensity;
use crate::trainer::{TrainedWeights, Trainer, TrainingParams, TrainingStatus};
use crate::Float;

/// Pluggable way of running the Infomax optimization
pub trait ExecutionStrategy<F: Float> {
    /// Train weights on the `(ncomponents, frames)` data starting from `weights`
    fn train(
        &self,
        params: &TrainingParams<F>,
        x: ArrayView2<F>,
        weights: Array2<F>,
    ) -> Result<TrainedWeights<F>>;
}

/// A single trainer over all frames
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct SingleProcess;

impl<F: Float> ExecutionStrategy<F> for SingleProcess {
    fn train(
        &self,
        params: &TrainingParams<F>,
        x: ArrayView2<F>,
        weights: Array2<F>,
    ) -> Result<TrainedWeights<F>> {
        Trainer::new(params, x, weights)?.run()
    }
}

/// Data-parallel training on contiguous frame windows
///
/// Every worker trains on its own window for up to `merge_interval` steps. At the barrier the
/// weights and biases are averaged, the signs are merged by majority vote and the smallest
/// learning rate is kept. The merged state is handed back to every worker for the next round.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Partitioned {
    pub partitions: usize,
    pub merge_interval: usize,
}

impl Partitioned {
    fn windows<'a, F: Float>(&self, x: ArrayView2<'a, F>) -> Vec<ArrayView2<'a, F>> {
        let frames = x.ncols();
        let width = frames / self.partitions;
        (0..self.partitions)
            .map(|i| {
                let end = if i + 1 == self.partitions {
                    frames
                } else {
                    (i + 1) * width
                };
                x.slice_move(s![.., i * width..end])
            })
            .collect()
    }
}

impl<F: Float> ExecutionStrategy<F> for Partitioned {
    fn train(
        &self,
        params: &TrainingParams<F>,
        x: ArrayView2<F>,
        weights: Array2<F>,
    ) -> Result<TrainedWeights<F>> {
        if self.partitions == 0 || self.merge_interval == 0 {
            return Err(InfomaxParamsError::Partitions.into());
        }
        let width = x.ncols() / self.partitions;
        if width < params.block_size {
            return Err(IcaError::Dimension(format!(
                "{} frames split into {} partitions leave less than a block of {} frames each",
                x.ncols(),
                self.partitions,
                params.block_size
            )));
        }

        // every worker gets its own stream, derived from the master seed
        let mut master = match params.seed {
            Some(seed) => Xoshiro256Plus::seed_from_u64(seed),
            None => Xoshiro256Plus::from_entropy(),
        };
        let worker_params = (0..self.partitions)
            .map(|_| TrainingParams {
                seed: Some(master.gen()),
                ..params.clone()
            })
            .collect::<Vec<_>>();

        let mut trainers = self
            .windows(x)
            .into_iter()
            .zip(worker_params.iter())
            .map(|(window, p)| Trainer::new(p, window, weights.clone()))
            .collect::<Result<Vec<_>>>()?;

        log::info!(
            "training on {} partitions of {} frames, merging every {} steps",
            self.partitions,
            width,
            self.merge_interval
        );

        let mut merged = trainers[0].weights().clone();
        let mut bias = trainers[0].bias().cloned();
        let mut signs = trainers[0].signs().map(|s| s.to_vec());
        let mut lrate = params.lrate;
        let mut change = F::zero();
        let mut steps = 0;
        let mut status = if params.max_steps == 0 {
            TrainingStatus::StepLimitReached
        } else {
            TrainingStatus::Training
        };

        while status == TrainingStatus::Training {
            let round = self.merge_interval.min(params.max_steps - steps);
            trainers
                .par_iter_mut()
                .map(|trainer| trainer.run_steps(round))
                .collect::<Result<Vec<_>>>()?;
            steps += round;

            let previous = merged;
            merged = average(trainers.iter().map(|t| t.weights()));
            bias = bias.map(|_| average(trainers.iter().filter_map(|t| t.bias())));
            signs = signs.map(|_| majority(trainers.iter().filter_map(|t| t.signs())));
            lrate = trainers
                .iter()
                .map(|t| t.lrate())
                .fold(lrate, |min, l| if l < min { l } else { min });

            let diff = &merged - &previous;
            change = diff.iter().map(|d| *d * *d).sum();
            if !change.is_finite() {
                return Err(IcaError::Diverged { step: steps });
            }

            for trainer in trainers.iter_mut() {
                trainer.synchronize(&merged, bias.as_ref(), signs.as_deref(), lrate);
            }

            log::debug!(
                "merge after step {} - lrate {:.6e}, wchange {:.6e}",
                steps,
                lrate.to_f64().unwrap_or(f64::NAN),
                change.to_f64().unwrap_or(f64::NAN)
            );

            status = if steps > 2 && change < params.stop {
                TrainingStatus::Converged
            } else if steps >= params.max_steps {
                TrainingStatus::StepLimitReached
            } else {
                TrainingStatus::Training
            };
        }

        log::info!(
            "partitioned training finished after {} steps ({:?}), lrate {:e}, wchange {:e}",
            steps,
            status,
            lrate.to_f64().unwrap_or(f64::NAN),
            change.to_f64().unwrap_or(f64::NAN)
        );

        Ok(TrainedWeights {
            weights: merged,
            bias,
            signs,
            status,
            steps,
            lrate,
            change,
        })
    }
}

// Element-wise mean, the iterator is never empty
fn average<'a, F, D, I>(arrays: I) -> Array<F, D>
where
    F: Float,
    D: Dimension + 'a,
    I: Iterator<Item = &'a Array<F, D>>,
{
    let mut count = 0usize;
    let mut sum: Option<Array<F, D>> = None;
    for a in arrays {
        count += 1;
        sum = Some(match sum.take() {
            Some(sum) => sum + a,
            None => a.clone(),
        });
    }
    let sum = sum.unwrap_or_else(|| Array::zeros(D::default()));
    sum / F::cast(count.max(1))
}

// Majority vote per component, ties go to super-Gaussian
fn majority<'a, I>(votes: I) -> Vec<SourceDensity>
where
    I: Iterator<Item = &'a [SourceDensity]>,
{
    let mut tally: Vec<i64> = Vec::new();
    for signs in votes {
        tally.resize(signs.len(), 0);
        for (t, s) in tally.iter_mut().zip(signs) {
            *t += i64::from(s.sign());
        }
    }
    tally
        .into_iter()
        .map(|t| {
            if t < 0 {
                SourceDensity::SubGaussian
            } else {
                SourceDensity::SuperGaussian
            }
        })
        .collect()
}

/// How the trainer is run
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Execution {
    /// One trainer over all frames, see [`SingleProcess`]
    Single,
    /// Workers on contiguous windows merged every `merge_interval` steps, see [`Partitioned`]
    Partitioned {
        partitions: usize,
        merge_interval: usize,
    },
}

impl Default for Execution {
    fn default() -> Self {
        Execution::Single
    }
}

impl<F: Float> ExecutionStrategy<F> for Execution {
    fn train(
        &self,
        params: &TrainingParams<F>,
        x: ArrayView2<F>,
        weights: Array2<F>,
    ) -> Result<TrainedWeights<F>> {
        match *self {
            Execution::Single => SingleProcess.train(params, x, weights),
            Execution::Partitioned {
                partitions,
                merge_interval,
            } => Partitioned {
                partitions,
                merge_interval,
            }
            .train(params, x, weights),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::Extended;
    use infomax_datasets::generate;

    fn params(extended: Extended) -> TrainingParams<f64> {
        TrainingParams {
            lrate: 0.01,
            block_size: 20,
            momentum: 0.,
            anneal_step: 0.9,
            anneal_deg: 60.,
            stop: 1e-6,
            max_steps: 512,
            extended,
            bias: true,
            pdf_size: 6000,
            kurtosis_momentum: 0.5,
            seed: Some(7),
        }
    }

    fn mixture(frames: usize) -> (Array2<f64>, Array2<f64>) {
        let mut rng = Xoshiro256Plus::seed_from_u64(11);
        let sources = generate::laplace_sources(2, frames, &mut rng);
        let mixing = ndarray::array![[0.8, 0.6], [-0.6, 0.8]];
        (mixing.dot(&sources), mixing)
    }

    #[test]
    fn autotraits() {
        fn has_autotraits<T: Send + Sync + Sized + Unpin>() {}
        has_autotraits::<SingleProcess>();
        has_autotraits::<Partitioned>();
        has_autotraits::<Execution>();
    }

    #[test]
    fn single_process_matches_trainer() {
        let (x, _) = mixture(1000);
        let params = params(Extended::Off);
        let a = SingleProcess
            .train(&params, x.view(), Array2::eye(2))
            .unwrap();
        let b = Trainer::new(&params, x.view(), Array2::eye(2))
            .unwrap()
            .run()
            .unwrap();
        assert_eq!(a, b);

        let c = Execution::Single
            .train(&params, x.view(), Array2::eye(2))
            .unwrap();
        assert_eq!(a, c);
    }

    #[test]
    fn partitioned_is_deterministic_and_separates() {
        let (x, mixing) = mixture(2000);
        let params = params(Extended::Off);
        let strategy = Partitioned {
            partitions: 2,
            merge_interval: 4,
        };

        let a = strategy.train(&params, x.view(), Array2::eye(2)).unwrap();
        let b = strategy.train(&params, x.view(), Array2::eye(2)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a.status, TrainingStatus::Training);
        assert_eq!(a.steps % 4, 0);

        // W A is close to a scaled permutation
        let p = a.weights.dot(&mixing);
        for row in p.rows() {
            let (hi, lo) = if row[0].abs() > row[1].abs() {
                (row[0].abs(), row[1].abs())
            } else {
                (row[1].abs(), row[0].abs())
            };
            assert!(hi > 5. * lo, "{:?}", p);
        }
    }

    #[test]
    fn partitioned_merges_signs() {
        let (x, _) = mixture(2000);
        let params = TrainingParams {
            max_steps: 8,
            ..params(Extended::FixedSubGaussian(1))
        };
        let trained = Partitioned {
            partitions: 3,
            merge_interval: 3,
        }
        .train(&params, x.view(), Array2::eye(2))
        .unwrap();

        assert_eq!(trained.steps, 8);
        assert_eq!(trained.status, TrainingStatus::StepLimitReached);
        assert_eq!(
            trained.signs,
            Some(vec![SourceDensity::SubGaussian, SourceDensity::SuperGaussian])
        );
    }

    #[test]
    fn windows_must_hold_a_block() {
        let (x, _) = mixture(100);
        let params = params(Extended::Off);
        let res = Partitioned {
            partitions: 10,
            merge_interval: 2,
        }
        .train(&params, x.view(), Array2::eye(2));
        assert!(matches!(res, Err(IcaError::Dimension(_))));

        let res = Partitioned {
            partitions: 0,
            merge_interval: 2,
        }
        .train(&params, x.view(), Array2::eye(2));
        assert!(matches!(res, Err(IcaError::InvalidParams(_))));
    }

    #[test]
    fn vote_and_average() {
        use SourceDensity::*;
        let a = [SubGaussian, SuperGaussian, SubGaussian];
        let b = [SubGaussian, SubGaussian, SuperGaussian];
        assert_eq!(
            majority(vec![&a[..], &b[..]].into_iter()),
            vec![SubGaussian, SuperGaussian, SuperGaussian]
        );

        let x = ndarray::array![1., 2.];
        let y = ndarray::array![3., 6.];
        assert_eq!(average(vec![&x, &y].into_iter()), ndarray::array![2., 4.]);
    }
}
