//! Infomax Independent Component Analysis (ICA)
//!
//! ICA separates multivariate signals into their additive, independent subcomponents. The
//! Infomax algorithm maximizes the information transferred through a non-linearity applied to
//! the unmixed signals, which for super-Gaussian sources amounts to a maximum likelihood
//! estimate of the unmixing matrix. Extended Infomax switches between a super- and a
//! sub-Gaussian source model per component, based on the sign of its kurtosis.
//!
//! Input data is centered and sphered (whitened) before training, optionally after a
//! reduction to its leading principal components.

use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::error::{IcaError, Result};
use crate::hyperparams::InfomaxValidParams;
use crate::kurtosis::SourceDensity;
use crate::postprocessing::{compose, orient, projected_variance, variance_sort, Components};
use crate::preprocessing::{reduce_dimensions, remove_mean, whiten};
use crate::strategy::ExecutionStrategy;
use crate::traits::{Fit, Transformer};
use crate::trainer::TrainingStatus;
use crate::Float;

impl<F: Float> InfomaxValidParams<F> {
    /// Decompose a `(channels, frames)` recording
    ///
    /// The data is consumed, every stage replaces it by its projection.
    ///
    /// # Errors
    ///
    /// * [`IcaError::Dimension`] for less than two channels or three frames, more components
    ///   than channels, a block size not fitting the data or starting weights of the wrong shape
    /// * [`IcaError::Singular`] if the covariance of the data is singular
    /// * [`IcaError::Diverged`] if training blows up
    pub fn decompose(&self, data: Array2<F>) -> Result<Infomax<F>> {
        let (nchannels, frames) = data.dim();
        if nchannels < 2 {
            return Err(IcaError::Dimension(format!(
                "at least 2 channels are needed, got {}",
                nchannels
            )));
        }
        if frames < 3 {
            return Err(IcaError::Dimension(format!(
                "at least 3 frames are needed, got {}",
                frames
            )));
        }

        let ncomponents = self.ncomponents().unwrap_or(nchannels);
        if ncomponents > nchannels {
            return Err(IcaError::Dimension(format!(
                "{} components requested from {} channels",
                ncomponents, nchannels
            )));
        }
        if let Some(w) = self.initial_weights() {
            if w.dim() != (ncomponents, ncomponents) {
                return Err(IcaError::Dimension(format!(
                    "starting weights are {:?}, expected ({}, {})",
                    w.dim(),
                    ncomponents,
                    ncomponents
                )));
            }
        }
        let training = self.training_params(nchannels, ncomponents, frames)?;

        log::info!(
            "decomposing {} channels x {} frames into {} components",
            nchannels,
            frames,
            ncomponents
        );
        log::info!("removing mean of each channel");
        let mut data = data;
        let mean = remove_mean(&mut data);

        let (data, subspace) = match self.ncomponents() {
            Some(n) => {
                log::info!("reducing the data to {} principal components", n);
                let reduced = reduce_dimensions(data, *n)?;
                let subspace = reduced.projection();
                (reduced.data, Some(subspace))
            }
            None => (data, None),
        };

        let whitened = whiten(data, self.sphering(), self.initial_weights().is_some())?;
        let start = self
            .initial_weights()
            .cloned()
            .or(whitened.initial_weights)
            .unwrap_or_else(|| Array2::eye(ncomponents));

        log::info!(
            "training with lrate {:e}, block size {}, {}",
            training.lrate.to_f64().unwrap_or(f64::NAN),
            training.block_size,
            if training.extended.is_enabled() {
                "extended Infomax"
            } else {
                "logistic Infomax"
            }
        );
        let trained = self
            .execution()
            .train(&training, whitened.data.view(), start)?;

        let mut weights = trained.weights;
        let mut bias = trained.bias;
        let activations = orient(&whitened.data, &mut weights, bias.as_mut(), self.posact());
        drop(whitened.data);

        let (weights, sphere) = compose(weights, whitened.sphere, subspace.as_ref());
        let variance = projected_variance(&weights, &sphere, &activations)?;

        let mut components = Components {
            weights,
            activations,
            bias,
            signs: trained.signs,
            subspace,
        };
        let variance = variance_sort(&mut components, &variance);

        Ok(Infomax {
            mean,
            weights: components.weights,
            sphere,
            bias: components.bias,
            signs: components.signs,
            activations: components.activations,
            variance,
            subspace: components.subspace,
            status: trained.status,
            steps: trained.steps,
            lrate: trained.lrate,
        })
    }
}

impl<F: Float, D: Data<Elem = F>> Fit<ArrayBase<D, Ix2>, IcaError> for InfomaxValidParams<F> {
    type Object = Infomax<F>;

    /// Fit the model on a `(channels, frames)` recording
    fn fit(&self, records: &ArrayBase<D, Ix2>) -> Result<Infomax<F>> {
        self.decompose(records.to_owned())
    }
}

/// Fitted Infomax model
///
/// Components are sorted by decreasing projected variance. The unmixing matrix applied to
/// mean-removed data is `weights · sphere`.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct Infomax<F> {
    mean: Array1<F>,
    weights: Array2<F>,
    sphere: Array2<F>,
    bias: Option<Array1<F>>,
    signs: Option<Vec<SourceDensity>>,
    activations: Array2<F>,
    variance: Array1<F>,
    subspace: Option<Array2<F>>,
    status: TrainingStatus,
    steps: usize,
    lrate: F,
}

impl<F: Float> Infomax<F> {
    /// Channel means removed before training
    pub fn mean(&self) -> &Array1<F> {
        &self.mean
    }

    /// `(ncomponents, channels)` weights, composed with the principal subspace if the data was
    /// reduced
    pub fn weights(&self) -> &Array2<F> {
        &self.weights
    }

    /// `(channels, channels)` sphering matrix, the identity if the data was reduced or not
    /// sphered
    pub fn sphere(&self) -> &Array2<F> {
        &self.sphere
    }

    pub fn bias(&self) -> Option<&Array1<F>> {
        self.bias.as_ref()
    }

    /// Source model of every component, only for extended Infomax
    pub fn signs(&self) -> Option<&[SourceDensity]> {
        self.signs.as_deref()
    }

    /// `(ncomponents, frames)` activations of the training data
    pub fn activations(&self) -> &Array2<F> {
        &self.activations
    }

    /// Projected variance of every component, non-increasing
    pub fn variance(&self) -> &Array1<F> {
        &self.variance
    }

    /// `(ncomponents, channels)` retained principal subspace
    pub fn subspace(&self) -> Option<&Array2<F>> {
        self.subspace.as_ref()
    }

    pub fn status(&self) -> TrainingStatus {
        self.status
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    /// Learning rate at the end of training
    pub fn lrate(&self) -> F {
        self.lrate
    }

    pub fn ncomponents(&self) -> usize {
        self.weights.nrows()
    }

    /// `(ncomponents, channels)` unmixing matrix `weights · sphere`
    pub fn unmixing(&self) -> Array2<F> {
        self.weights.dot(&self.sphere)
    }
}

impl<F: Float, D: Data<Elem = F>> Transformer<&ArrayBase<D, Ix2>, Array2<F>> for Infomax<F> {
    /// Project a `(channels, frames)` recording onto the independent components
    fn transform(&self, x: &ArrayBase<D, Ix2>) -> Array2<F> {
        let centered = x - &self.mean.view().insert_axis(Axis(1));
        self.unmixing().dot(&centered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocessing::Sphering;
    use crate::strategy::Execution;
    use crate::trainer::Extended;
    use crate::ParamGuard;
    use approx::assert_abs_diff_eq;
    use infomax_datasets::generate;
    use ndarray::{concatenate, ArrayView1};
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn correlation(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let a = &a - a.mean().unwrap();
        let b = &b - b.mean().unwrap();
        a.dot(&b) / (a.dot(&a) * b.dot(&b)).sqrt()
    }

    // best absolute correlation of every source with any component
    fn best_matches(model: &Infomax<f64>, sources: &Array2<f64>) -> Vec<f64> {
        sources
            .rows()
            .into_iter()
            .map(|source| {
                model
                    .activations()
                    .rows()
                    .into_iter()
                    .map(|c| correlation(c, source).abs())
                    .fold(0., f64::max)
            })
            .collect()
    }

    #[test]
    fn autotraits() {
        fn has_autotraits<T: Send + Sync + Sized + Unpin>() {}
        has_autotraits::<Infomax<f64>>();
    }

    #[test]
    fn separates_laplacian_from_gaussian_sources() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let (x, sources) = generate::laplace_gaussian_mixture(2, 2, 2000, &mut rng);

        let model = Infomax::params().random_state(42).fit(&x).unwrap();

        assert_eq!(model.status(), TrainingStatus::Converged);
        assert_eq!(model.weights().dim(), (4, 4));
        assert_eq!(model.activations().dim(), (4, 2000));
        for corr in best_matches(&model, &sources.slice(ndarray::s![..2, ..]).to_owned()) {
            assert!(corr >= 0.95, "correlation {}", corr);
        }
        assert!(model
            .variance()
            .windows(2)
            .into_iter()
            .all(|w| w[0] >= w[1]));
    }

    #[test]
    fn fixed_seed_is_deterministic() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let (x, _) = generate::laplace_gaussian_mixture(3, 0, 1000, &mut rng);
        let params = Infomax::params().random_state(7).max_steps(50);

        let a = params.fit(&x).unwrap();
        let b = params.fit(&x).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn transform_reproduces_activations() {
        let mut rng = Xoshiro256Plus::seed_from_u64(5);
        let (x, _) = generate::laplace_gaussian_mixture(3, 0, 1000, &mut rng);
        let x = x + 4.;
        let model = Infomax::params()
            .random_state(1)
            .max_steps(20)
            .fit(&x)
            .unwrap();

        assert_abs_diff_eq!(
            model.transform(&x),
            model.activations().view(),
            epsilon = 1e-8
        );
        assert_abs_diff_eq!(
            model.mean().view(),
            Array1::from_elem(3, 4.),
            epsilon = 0.2
        );
    }

    #[test]
    fn full_rank_pca_matches_plain_sphering() {
        let mut rng = Xoshiro256Plus::seed_from_u64(8);
        let (x, _) = generate::laplace_gaussian_mixture(3, 0, 600, &mut rng);

        let full = Infomax::params()
            .posact(false)
            .random_state(2)
            .max_steps(5)
            .lrate(0.01)
            .fit(&x)
            .unwrap();

        // start the reduced run from the basis change between the two whitened spaces
        let mut centered = x.clone();
        remove_mean(&mut centered);
        let projection = reduce_dimensions(centered, 3).unwrap().projection();
        let pca = Infomax::params()
            .ncomponents(3)
            .posact(false)
            .random_state(2)
            .max_steps(5)
            .lrate(0.01)
            .initial_weights(projection.t().to_owned())
            .fit(&x)
            .unwrap();

        assert_eq!(pca.sphere(), &Array2::<f64>::eye(3));
        assert!(pca.subspace().is_some());
        assert_abs_diff_eq!(pca.unmixing(), full.unmixing(), epsilon = 1e-6);
    }

    #[test]
    fn pca_reduces_the_component_count() {
        let mut rng = Xoshiro256Plus::seed_from_u64(9);
        let (x, _) = generate::laplace_gaussian_mixture(2, 2, 1000, &mut rng);
        let model = Infomax::params()
            .ncomponents(2)
            .random_state(3)
            .max_steps(30)
            .fit(&x)
            .unwrap();

        assert_eq!(model.weights().dim(), (2, 4));
        assert_eq!(model.activations().dim(), (2, 1000));
        assert_eq!(model.subspace().map(|s| s.dim()), Some((2, 4)));
        assert_eq!(model.bias().map(|b| b.len()), Some(2));
    }

    #[test]
    fn extended_finds_sub_gaussian_sources() {
        let mut rng = Xoshiro256Plus::seed_from_u64(12);
        let sources = concatenate![
            Axis(0),
            generate::uniform_sources(2, 3000, &mut rng),
            generate::laplace_sources(1, 3000, &mut rng)
        ];
        let x = generate::random_mixing(3, &mut rng).dot(&sources);

        let model = Infomax::params()
            .extended(Extended::Reestimate { interval: 1 })
            .random_state(4)
            .fit(&x)
            .unwrap();

        let signs = model.signs().unwrap();
        let nsub = signs
            .iter()
            .filter(|s| **s == SourceDensity::SubGaussian)
            .count();
        assert_eq!(nsub, 2);
        for corr in best_matches(&model, &sources) {
            assert!(corr >= 0.9, "correlation {}", corr);
        }
    }

    #[test]
    fn partitioned_training_separates() {
        let mut rng = Xoshiro256Plus::seed_from_u64(21);
        let (x, sources) = generate::laplace_gaussian_mixture(3, 0, 4000, &mut rng);

        let model = Infomax::params()
            .execution(Execution::Partitioned {
                partitions: 2,
                merge_interval: 4,
            })
            .random_state(6)
            .fit(&x)
            .unwrap();

        for corr in best_matches(&model, &sources) {
            assert!(corr >= 0.9, "correlation {}", corr);
        }
    }

    #[test]
    fn unsphered_runs_report_identity() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let (x, _) = generate::laplace_gaussian_mixture(2, 0, 500, &mut rng);

        for sphering in [Sphering::Off, Sphering::Skip].iter() {
            let model = Infomax::params()
                .sphering(*sphering)
                .random_state(1)
                .max_steps(10)
                .fit(&x)
                .unwrap();
            assert_eq!(model.sphere(), &Array2::<f64>::eye(2));
        }
    }

    #[test]
    fn no_bias_no_signs() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let (x, _) = generate::laplace_gaussian_mixture(2, 0, 500, &mut rng);
        let model = Infomax::params()
            .bias(false)
            .random_state(1)
            .max_steps(10)
            .fit(&x)
            .unwrap();
        assert!(model.bias().is_none());
        assert!(model.signs().is_none());
    }

    #[test]
    fn dimension_errors() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let (x, _) = generate::laplace_gaussian_mixture(2, 0, 500, &mut rng);

        let res = Infomax::params().ncomponents(3).fit(&x);
        assert!(matches!(res, Err(IcaError::Dimension(_))));

        let res = Infomax::params().initial_weights(Array2::eye(3)).fit(&x);
        assert!(matches!(res, Err(IcaError::Dimension(_))));

        let res = Infomax::params().fit(&x.slice(ndarray::s![..1, ..]));
        assert!(matches!(res, Err(IcaError::Dimension(_))));

        let res = Infomax::params().fit(&x.slice(ndarray::s![.., ..2]));
        assert!(matches!(res, Err(IcaError::Dimension(_))));

        let res = Infomax::params().lrate(5.).fit(&x);
        assert!(matches!(res, Err(IcaError::InvalidParams(_))));
    }

    #[test]
    fn rank_deficient_pca_is_singular() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let (x, _) = generate::laplace_gaussian_mixture(2, 0, 500, &mut rng);
        let sum = &x.row(0) + &x.row(1);
        let x = ndarray::stack![Axis(0), x.row(0), x.row(1), sum];

        let res = Infomax::params()
            .ncomponents(3)
            .sphering(Sphering::Skip)
            .fit(&x);
        assert!(matches!(res, Err(IcaError::Singular("channel covariance"))));
    }

    #[test]
    fn pathological_lrate_diverges() {
        let mut rng = Xoshiro256Plus::seed_from_u64(2);
        let (x, _) = generate::laplace_gaussian_mixture(2, 0, 500, &mut rng);

        // bypass the lrate bounds of the builder
        let params = Infomax::<f64>::params().check().unwrap();
        let mut training = params.training_params(2, 2, 500).unwrap();
        training.lrate = 1e3;
        let res = crate::strategy::SingleProcess.train(&training, x.view(), Array2::eye(2));
        assert!(matches!(res, Err(IcaError::Diverged { .. })));
    }
}
