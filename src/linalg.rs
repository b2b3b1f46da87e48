//! Dense symmetric helpers shared by the preprocessing and postprocessing stages

use std::cmp::Ordering;

use linfa_linalg::eigh::Eigh;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, Axis, Data, Ix2};

use crate::error::{IcaError, Result};
use crate::Float;

/// Eigen-decomposition of a symmetric matrix with the eigenvalues in ascending order
///
/// Eigenvectors are stored column-wise, in the order of their eigenvalues.
pub fn eigh_ascending<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix2>,
) -> Result<(Array1<F>, Array2<F>)> {
    let (vals, vecs) = a.eigh()?;

    let mut order: Vec<usize> = (0..vals.len()).collect();
    order.sort_by(|&i, &j| vals[i].partial_cmp(&vals[j]).unwrap_or(Ordering::Equal));

    Ok((vals.select(Axis(0), &order), vecs.select(Axis(1), &order)))
}

/// Symmetric inverse square root `C^{-1/2}` of a positive definite matrix
pub fn inv_sqrtm<F: Float>(
    c: &ArrayBase<impl Data<Elem = F>, Ix2>,
    what: &'static str,
) -> Result<Array2<F>> {
    let (vals, vecs) = eigh_ascending(c)?;
    check_positive(&vals, what)?;

    let scale = vals.mapv(|v| v.sqrt().recip());
    Ok((&vecs * &scale.insert_axis(Axis(0))).dot(&vecs.t()))
}

/// Moore-Penrose pseudo-inverse `Aᵀ(AAᵀ)⁻¹` of a matrix with full row rank
pub fn pinv_rows<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix2>,
    what: &'static str,
) -> Result<Array2<F>> {
    let gram = a.dot(&a.t());
    let (vals, vecs) = eigh_ascending(&gram)?;
    check_positive(&vals, what)?;

    let inv = (&vecs * &vals.mapv(|v| v.recip()).insert_axis(Axis(0))).dot(&vecs.t());
    Ok(a.t().dot(&inv))
}

// Rejects eigenvalues that are not positive relative to the largest one
fn check_positive<F: Float>(vals: &Array1<F>, what: &'static str) -> Result<()> {
    check_rank(vals.view(), what, vals.len())
}

/// Rejects eigenvalues below the rounding error of a matrix accumulated from `terms` products
pub fn check_rank<F: Float>(vals: ArrayView1<F>, what: &'static str, terms: usize) -> Result<()> {
    let largest = vals.iter().fold(F::zero(), |m, &v| m.max(v.abs()));
    let tol = largest * F::epsilon() * F::cast(terms.max(vals.len()));

    if !largest.is_finite() || vals.iter().any(|&v| !(v > tol)) {
        return Err(IcaError::Singular(what));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn eigenvalues_are_ascending() {
        let a = array![[4., 1., 0.], [1., 3., 0.], [0., 0., 1.]];
        let (vals, vecs) = eigh_ascending(&a).unwrap();

        assert!(vals.windows(2).into_iter().all(|w| w[0] <= w[1]));
        for (i, &v) in vals.iter().enumerate() {
            let col = vecs.column(i);
            assert_abs_diff_eq!(a.dot(&col), &col * v, epsilon = 1e-9);
        }
    }

    #[test]
    fn inverse_square_root() {
        let c = array![[2., 0.5], [0.5, 1.]];
        let s = inv_sqrtm(&c, "covariance").unwrap();
        assert_abs_diff_eq!(s.dot(&c).dot(&s), Array2::<f64>::eye(2), epsilon = 1e-9);
    }

    #[test]
    fn singular_matrix_is_rejected() {
        let c = array![[1., 1.], [1., 1.]];
        assert!(matches!(
            inv_sqrtm(&c, "covariance"),
            Err(IcaError::Singular("covariance"))
        ));
    }

    #[test]
    fn rank_tolerance_grows_with_terms() {
        let vals = array![1e-14, 1.];
        assert!(check_rank(vals.view(), "covariance", 2).is_ok());
        assert!(matches!(
            check_rank(vals.view(), "covariance", 1000),
            Err(IcaError::Singular("covariance"))
        ));
        assert!(check_rank(array![0., 1.].view(), "covariance", 2).is_err());
    }

    #[test]
    fn pseudo_inverse_of_wide_matrix() {
        let a = array![[1., 2., 0.], [0., 1., 3.]];
        let p = pinv_rows(&a, "weights").unwrap();
        assert_eq!(p.dim(), (3, 2));
        assert_abs_diff_eq!(a.dot(&p), Array2::<f64>::eye(2), epsilon = 1e-9);
    }
}
