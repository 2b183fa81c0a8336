use crate::linalg::LinalgError;
use crate::traits::{FloatScalar, MatrixMut, MatrixRef};

/// Cholesky factorization in place: `A = L·Lᵀ`.
///
/// On return the lower triangle of `a` (including the diagonal) holds L and
/// the strict upper triangle is zeroed. Only the lower triangle of the input
/// is read.
///
/// Returns `NotPositiveDefinite` if a pivot is not strictly positive, which
/// includes NaN pivots.
pub(crate) fn cholesky_in_place<T: FloatScalar>(
    a: &mut impl MatrixMut<T>,
) -> Result<(), LinalgError> {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "Cholesky decomposition requires a square matrix");

    for j in 0..n {
        let mut d = *a.get(j, j);
        for k in 0..j {
            let ljk = *a.get(j, k);
            d = d - ljk * ljk;
        }
        if !(d > T::zero()) {
            return Err(LinalgError::NotPositiveDefinite);
        }
        let ljj = d.sqrt();
        *a.get_mut(j, j) = ljj;

        for i in (j + 1)..n {
            let mut sum = *a.get(i, j);
            for k in 0..j {
                sum = sum - *a.get(i, k) * *a.get(j, k);
            }
            *a.get_mut(i, j) = sum / ljj;
        }
        for x in a.row_as_mut_slice(j, j + 1) {
            *x = T::zero();
        }
    }

    Ok(())
}

/// Solve `L·X = B` in place, L lower triangular.
pub(crate) fn forward_substitute<T: FloatScalar>(l: &impl MatrixRef<T>, b: &mut impl MatrixMut<T>) {
    let n = l.nrows();
    for c in 0..b.ncols() {
        for i in 0..n {
            let mut sum = *b.get(i, c);
            for j in 0..i {
                sum = sum - *l.get(i, j) * *b.get(j, c);
            }
            *b.get_mut(i, c) = sum / *l.get(i, i);
        }
    }
}

/// Solve `Lᵀ·X = B` in place, L lower triangular.
pub(crate) fn back_substitute_transpose<T: FloatScalar>(
    l: &impl MatrixRef<T>,
    b: &mut impl MatrixMut<T>,
) {
    let n = l.nrows();
    for c in 0..b.ncols() {
        for i in (0..n).rev() {
            let mut sum = *b.get(i, c);
            for j in (i + 1)..n {
                sum = sum - *l.get(j, i) * *b.get(j, c);
            }
            *b.get_mut(i, c) = sum / *l.get(i, i);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::util::{approx_eq, is_lower_triangular, matmul};
    use crate::DenseMatrix;

    const TOL: f64 = 1e-12;

    fn spd_3x3() -> DenseMatrix<f64> {
        DenseMatrix::from_rows(3, 3, &[4.0, 12.0, -16.0, 12.0, 37.0, -43.0, -16.0, -43.0, 98.0])
    }

    #[test]
    fn known_factor() {
        let mut l = spd_3x3();
        cholesky_in_place(&mut l).unwrap();
        let expected = DenseMatrix::from_rows(3, 3, &[2.0, 0.0, 0.0, 6.0, 1.0, 0.0, -8.0, 5.0, 3.0]);
        assert!(approx_eq(&l, &expected, TOL));
        assert!(is_lower_triangular(&l));
    }

    #[test]
    fn substitutions_solve() {
        let a = spd_3x3();
        let mut l = a.clone();
        cholesky_in_place(&mut l).unwrap();

        let b = DenseMatrix::from_rows(3, 2, &[1.0, 0.0, 2.0, 1.0, 3.0, -1.0]);
        let mut x = b.clone();
        forward_substitute(&l, &mut x);
        back_substitute_transpose(&l, &mut x);
        let ax: DenseMatrix<f64> = matmul(&a, &x).unwrap();
        assert!(approx_eq(&ax, &b, 1e-10));
    }

    #[test]
    fn not_positive_definite() {
        let mut a = DenseMatrix::from_rows(2, 2, &[1.0, 2.0, 2.0, 1.0]);
        assert_eq!(cholesky_in_place(&mut a), Err(LinalgError::NotPositiveDefinite));
        let mut z = DenseMatrix::<f64>::zeros(2, 2);
        assert_eq!(cholesky_in_place(&mut z), Err(LinalgError::NotPositiveDefinite));
        let mut nan = DenseMatrix::from_rows(1, 1, &[f64::NAN]);
        assert_eq!(cholesky_in_place(&mut nan), Err(LinalgError::NotPositiveDefinite));
    }

    #[test]
    fn identity_is_its_own_factor() {
        let mut a = DenseMatrix::<f64>::eye(4);
        cholesky_in_place(&mut a).unwrap();
        assert_eq!(a, DenseMatrix::eye(4));
    }
}
