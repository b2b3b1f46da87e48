//! Orientation, composition and ordering of the trained components

use std::cmp::Ordering;

use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};

use crate::error::Result;
use crate::kurtosis::SourceDensity;
use crate::linalg::pinv_rows;
use crate::Float;

/// Per component state that is reordered as a whole
#[derive(Debug, Clone, PartialEq)]
pub struct Components<F> {
    /// `(ncomponents, channels)` unmixing weights
    pub weights: Array2<F>,
    /// `(ncomponents, frames)` component activations
    pub activations: Array2<F>,
    pub bias: Option<Array1<F>>,
    pub signs: Option<Vec<SourceDensity>>,
    /// `(ncomponents, channels)` retained principal subspace, if the data was reduced
    pub subspace: Option<Array2<F>>,
}

impl<F: Float> Components<F> {
    /// Reorder every per component field so that component `i` becomes `order[i]`
    pub fn permute(&mut self, order: &[usize]) {
        self.weights = self.weights.select(Axis(0), order);
        self.activations = self.activations.select(Axis(0), order);
        if let Some(bias) = self.bias.as_mut() {
            *bias = bias.select(Axis(0), order);
        }
        if let Some(signs) = self.signs.as_mut() {
            *signs = order.iter().map(|&i| signs[i]).collect();
        }
        if let Some(subspace) = self.subspace.as_mut() {
            *subspace = subspace.select(Axis(0), order);
        }
    }
}

/// Compute the activations `W X` and optionally orient each component
///
/// With `posact` every component whose activations have a negative third central moment is
/// negated, together with its row of weights and its bias entry.
pub fn orient<F: Float>(
    x: &ArrayBase<impl Data<Elem = F>, Ix2>,
    weights: &mut Array2<F>,
    bias: Option<&mut Array1<F>>,
    posact: bool,
) -> Array2<F> {
    let mut activations = weights.dot(x);
    if !posact {
        return activations;
    }

    let skew = third_moment(&activations);
    let mut bias = bias;
    let mut nflipped = 0;
    for (i, m3) in skew.iter().enumerate() {
        if *m3 < F::zero() {
            activations.row_mut(i).mapv_inplace(|v| -v);
            weights.row_mut(i).mapv_inplace(|v| -v);
            if let Some(bias) = bias.as_deref_mut() {
                bias[i] = -bias[i];
            }
            nflipped += 1;
        }
    }
    log::info!("inverted polarity of {} components", nflipped);

    activations
}

fn third_moment<F: Float>(a: &Array2<F>) -> Array1<F> {
    let frames = F::cast(a.ncols().max(1));
    a.rows()
        .into_iter()
        .map(|row| {
            let mean = row.sum() / frames;
            row.iter().map(|&v| (v - mean).powi(3)).sum::<F>() / frames
        })
        .collect()
}

/// Fold the sphering matrix and the principal subspace into the weights
///
/// Returns the composed `(ncomponents, channels)` weights and the sphere to report. With a
/// `(ncomponents, channels)` subspace the weights become `W S Eᵀ` and the sphere is the
/// identity, without one both are returned unchanged.
pub fn compose<F: Float>(
    weights: Array2<F>,
    sphere: Array2<F>,
    subspace: Option<&Array2<F>>,
) -> (Array2<F>, Array2<F>) {
    match subspace {
        Some(subspace) => {
            log::info!("composing the eigenvector, sphere and weight matrices");
            let composed = weights.dot(&sphere).dot(subspace);
            let nchannels = subspace.ncols();
            (composed, Array2::eye(nchannels))
        }
        None => (weights, sphere),
    }
}

/// Variance of the data accounted for by every component after back-projection
///
/// For component `i` this is `|pinv(W S)[:, i]|² Σ_t A_i(t)² / (channels frames - 1)`.
///
/// # Errors
///
/// If `W S` is not of full row rank
pub fn projected_variance<F: Float>(
    weights: &Array2<F>,
    sphere: &Array2<F>,
    activations: &Array2<F>,
) -> Result<Array1<F>> {
    let mixing = pinv_rows(&weights.dot(sphere), "unmixing matrix")?;
    let norms = mixing.map_axis(Axis(0), |col| col.dot(&col));
    let power = activations.map_axis(Axis(1), |row| row.dot(&row));
    let denom = F::cast(weights.ncols() * activations.ncols()) - F::one();

    Ok(norms * power / denom)
}

/// Stable order of decreasing variance
pub fn variance_order<F: Float>(variance: &Array1<F>) -> Vec<usize> {
    let mut order: Vec<usize> = (0..variance.len()).collect();
    order.sort_by(|&a, &b| {
        variance[b]
            .partial_cmp(&variance[a])
            .unwrap_or(Ordering::Equal)
    });
    order
}

/// Sort the components by decreasing variance and return the sorted variances
pub fn variance_sort<F: Float>(components: &mut Components<F>, variance: &Array1<F>) -> Array1<F> {
    log::info!("sorting components in order of decreasing variance");
    let order = variance_order(variance);
    components.permute(&order);
    variance.select(Axis(0), &order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Exp1;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    // rows with positive skew
    fn skewed(n: usize, frames: usize) -> Array2<f64> {
        let mut rng = Xoshiro256Plus::seed_from_u64(13);
        Array::random_using((n, frames), Exp1, &mut rng) - 1.
    }

    #[test]
    fn orient_flips_negative_skew() {
        let x = skewed(2, 2000);
        let mut weights = array![[-2., 0.], [0., 3.]];
        let mut bias = array![1., 1.];

        let activations = orient(&x, &mut weights, Some(&mut bias), true);
        assert_eq!(weights, array![[2., 0.], [0., 3.]]);
        assert_eq!(bias, array![-1., 1.]);
        assert_abs_diff_eq!(activations, weights.dot(&x), epsilon = 1e-12);
        assert!(third_moment(&activations).iter().all(|m| *m > 0.));
    }

    #[test]
    fn orient_without_posact() {
        let x = skewed(2, 500);
        let mut weights = array![[-2., 0.], [0., 3.]];
        let activations = orient(&x, &mut weights, None, false);
        assert_eq!(weights, array![[-2., 0.], [0., 3.]]);
        assert_abs_diff_eq!(activations, weights.dot(&x), epsilon = 1e-12);
    }

    #[test]
    fn compose_with_subspace() {
        let weights = array![[1., 2.], [0., 1.]];
        let sphere = array![[2., 0.], [0., 0.5]];
        let subspace = array![[0., 1., 0.], [0., 0., 1.]];

        let (w, s) = compose(weights.clone(), sphere.clone(), Some(&subspace));
        assert_eq!(w, array![[0., 2., 1.], [0., 0., 0.5]]);
        assert_eq!(s, Array2::<f64>::eye(3));

        let (w, s) = compose(weights.clone(), sphere.clone(), None);
        assert_eq!(w, weights);
        assert_eq!(s, sphere);
    }

    #[test]
    fn variance_of_orthonormal_unmixing() {
        let activations = array![[1., -1., 1., -1.], [2., 2., -2., -2.]];
        let weights = Array2::<f64>::eye(2);
        let sphere = Array2::<f64>::eye(2);

        let var = projected_variance(&weights, &sphere, &activations).unwrap();
        assert_abs_diff_eq!(var, array![4. / 7., 16. / 7.], epsilon = 1e-12);
    }

    #[test]
    fn sort_is_descending_and_consistent() {
        // component variances scale with 1, 25 and 9
        let x = skewed(3, 300) * &array![[1.], [5.], [3.]];
        let weights = Array2::<f64>::eye(3);
        let activations = weights.dot(&x);
        let mut components = Components {
            weights: weights.clone(),
            activations,
            bias: Some(array![0.1, 0.2, 0.3]),
            signs: Some(vec![
                SourceDensity::SubGaussian,
                SourceDensity::SuperGaussian,
                SourceDensity::SubGaussian,
            ]),
            subspace: Some(Array2::eye(3)),
        };

        let var = projected_variance(&weights, &Array2::eye(3), &components.activations).unwrap();
        assert_eq!(variance_order(&var), vec![1, 2, 0]);
        let sorted = variance_sort(&mut components, &var);

        assert!(sorted.windows(2).into_iter().all(|w| w[0] >= w[1]));
        assert_eq!(sorted[0], var[1]);
        assert_eq!(
            components.weights,
            array![[0., 1., 0.], [0., 0., 1.], [1., 0., 0.]]
        );
        assert_eq!(components.bias, Some(array![0.2, 0.3, 0.1]));
        assert_eq!(
            components.signs,
            Some(vec![
                SourceDensity::SuperGaussian,
                SourceDensity::SubGaussian,
                SourceDensity::SubGaussian,
            ])
        );
        assert_abs_diff_eq!(
            components.activations,
            components.weights.dot(&x),
            epsilon = 1e-12
        );
        assert_eq!(
            components.subspace.unwrap().row(0),
            array![0., 1., 0.].view()
        );
    }

    #[test]
    fn ties_keep_their_order() {
        let order = variance_order(&array![1., 3., 1., 3.]);
        assert_eq!(order, vec![1, 3, 0, 2]);
    }
}
