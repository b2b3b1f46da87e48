//! Utility functions for randomly generating sources and mixtures
//!
//! All sources have zero mean and unit variance, one source per row.

use ndarray::{concatenate, Array, Array2, Axis};
use ndarray_rand::{
    rand::Rng,
    rand_distr::{StandardNormal, Uniform},
    RandomExt,
};

/// Super-Gaussian sources drawn from a Laplace distribution
///
/// Samples are drawn by inverting the cumulative distribution function of a Laplace
/// distribution with scale `1/√2`.
pub fn laplace_sources(nsources: usize, frames: usize, rng: &mut impl Rng) -> Array2<f64> {
    let scale = std::f64::consts::FRAC_1_SQRT_2;
    let u: Array2<f64> = Array::random_using((nsources, frames), Uniform::new(-0.5, 0.5), rng);

    u.mapv(|u| {
        // u = -0.5 is part of the half-open range
        let tail = (1. - 2. * u.abs()).max(f64::MIN_POSITIVE);
        -scale * u.signum() * tail.ln()
    })
}

/// Sub-Gaussian sources drawn uniformly from `[-√3, √3)`
pub fn uniform_sources(nsources: usize, frames: usize, rng: &mut impl Rng) -> Array2<f64> {
    let bound = 3f64.sqrt();
    Array::random_using((nsources, frames), Uniform::new(-bound, bound), rng)
}

/// Gaussian sources, not separable from each other by ICA
pub fn gaussian_sources(nsources: usize, frames: usize, rng: &mut impl Rng) -> Array2<f64> {
    Array::random_using((nsources, frames), StandardNormal, rng)
}

/// Well conditioned square mixing matrix, the identity perturbed by uniform noise in
/// `[-0.5, 0.5)`
pub fn random_mixing(nchannels: usize, rng: &mut impl Rng) -> Array2<f64> {
    let noise: Array2<f64> =
        Array::random_using((nchannels, nchannels), Uniform::new(-0.5, 0.5), rng);
    Array2::eye(nchannels) + noise
}

/// Stack `nsuper` Laplace and `ngauss` Gaussian sources and mix them into as many channels
///
/// Returns the recording and the sources, the Laplace sources come first.
pub fn laplace_gaussian_mixture(
    nsuper: usize,
    ngauss: usize,
    frames: usize,
    rng: &mut impl Rng,
) -> (Array2<f64>, Array2<f64>) {
    let sources = concatenate![
        Axis(0),
        laplace_sources(nsuper, frames, rng),
        gaussian_sources(ngauss, frames, rng)
    ];
    let mixing = random_mixing(nsuper + ngauss, rng);
    (mixing.dot(&sources), sources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray_rand::rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;

    fn moments(a: &Array2<f64>) -> (f64, f64, f64) {
        let n = a.len() as f64;
        let mean = a.sum() / n;
        let var = a.mapv(|v| (v - mean).powi(2)).sum() / n;
        let kurt = a.mapv(|v| (v - mean).powi(4)).sum() / n / (var * var) - 3.;
        (mean, var, kurt)
    }

    #[test]
    fn laplace_is_standardized_and_peaky() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let (mean, var, kurt) = moments(&laplace_sources(2, 20000, &mut rng));
        assert!(mean.abs() < 0.05);
        assert!((var - 1.).abs() < 0.05);
        assert!(kurt > 2.);
    }

    #[test]
    fn uniform_is_standardized_and_flat() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let (mean, var, kurt) = moments(&uniform_sources(2, 20000, &mut rng));
        assert!(mean.abs() < 0.05);
        assert!((var - 1.).abs() < 0.05);
        assert!(kurt < -1.);
    }

    #[test]
    fn mixture_shapes() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let (x, s) = laplace_gaussian_mixture(2, 2, 100, &mut rng);
        assert_eq!(x.dim(), (4, 100));
        assert_eq!(s.dim(), (4, 100));
    }
}
