pub(crate) mod cholesky;
mod eigen;
mod generalized_eigen;
mod gram_schmidt;
pub(crate) mod hessenberg;
mod lu;
mod nmf;
mod qr;
pub(crate) mod schur;
mod svd;
pub(crate) mod symmetric_eigen;

pub use eigen::{EigenOptions, EigenvalueDecomposition};
pub use generalized_eigen::GeneralizedEigenvalueDecomposition;
pub use gram_schmidt::{GramSchmidtOptions, GramSchmidtOrthogonalization};
pub use lu::{LuDecomposition, LuOptions};
pub use nmf::{NmfOptions, NonnegativeMatrixFactorization};
pub use qr::{QrDecomposition, QrOptions};
pub use svd::{SingularValueDecomposition, SvdOptions};

use crate::dense::util::{first_non_finite, frobenius_norm};
use crate::traits::{FloatScalar, MatrixRef};

/// Errors from linear algebra operations.
///
/// Returned by decomposition constructors and by the fallible queries on a
/// decomposition (`solve`, `inverse`, `determinant`, ...).
///
/// ```
/// use dense_decomp::{DenseMatrix, LinalgError, LuDecomposition};
///
/// let singular = DenseMatrix::from_rows(2, 2, &[1.0_f64, 2.0, 2.0, 4.0]);
/// let lu = LuDecomposition::new(&singular).unwrap();
/// assert_eq!(lu.inverse().unwrap_err(), LinalgError::Singular);
///
/// let wide = DenseMatrix::<f64>::zeros(2, 3);
/// let lu = LuDecomposition::new(&wide).unwrap();
/// assert_eq!(
///     lu.determinant().unwrap_err(),
///     LinalgError::NotSquare { nrows: 2, ncols: 3 }
/// );
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LinalgError {
    /// Matrix is singular or nearly singular.
    Singular,
    /// Matrix is not positive definite (required for Cholesky).
    NotPositiveDefinite,
    /// Iterative algorithm did not converge within the iteration budget.
    ConvergenceFailure { iterations: usize },
    /// Operand shape does not match, as `(rows, cols)`.
    DimensionMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    /// Operation needs a square matrix.
    NotSquare { nrows: usize, ncols: usize },
    /// Input holds a NaN or infinity and the caller asked for rejection.
    NonFinite { row: usize, col: usize },
    /// Argument outside the operation's domain.
    InvalidArgument { reason: &'static str },
}

impl core::fmt::Display for LinalgError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LinalgError::Singular => write!(f, "matrix is singular"),
            LinalgError::NotPositiveDefinite => write!(f, "matrix is not positive definite"),
            LinalgError::ConvergenceFailure { iterations } => {
                write!(f, "iterative algorithm did not converge after {} iterations", iterations)
            }
            LinalgError::DimensionMismatch { expected, got } => write!(
                f,
                "dimension mismatch: expected {}x{}, got {}x{}",
                expected.0, expected.1, got.0, got.1
            ),
            LinalgError::NotSquare { nrows, ncols } => {
                write!(f, "matrix is {}x{}, expected square", nrows, ncols)
            }
            LinalgError::NonFinite { row, col } => {
                write!(f, "non-finite value at ({}, {})", row, col)
            }
            LinalgError::InvalidArgument { reason } => write!(f, "invalid argument: {}", reason),
        }
    }
}

impl std::error::Error for LinalgError {}

/// What a decomposition does with NaN or infinite input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NonFinitePolicy {
    /// Run the decomposition anyway. Non-finite values flow into the
    /// factors and derived quantities; iterative phases are skipped.
    #[default]
    Propagate,
    /// Fail with [`LinalgError::NonFinite`] before doing any work.
    Reject,
}

impl NonFinitePolicy {
    /// Apply the policy to `a`. Returns whether non-finite values are
    /// present (always `false` on the `Reject` path, which errors instead).
    pub(crate) fn check<T: FloatScalar>(self, a: &impl MatrixRef<T>) -> Result<bool, LinalgError> {
        match (self, first_non_finite(a)) {
            (_, None) => Ok(false),
            (NonFinitePolicy::Reject, Some((row, col))) => Err(LinalgError::NonFinite { row, col }),
            (NonFinitePolicy::Propagate, Some(_)) => Ok(true),
        }
    }
}

/// Sweep budget for the iterative kernels: `30 * max(m, n)` unless overridden.
#[inline]
pub(crate) fn iteration_budget(max_iterations: Option<usize>, m: usize, n: usize) -> usize {
    max_iterations.unwrap_or(30 * m.max(n).max(1))
}

/// Squared Householder cutoff `(max(m, n)·ε·‖A‖_F)²`. A column or row whose
/// squared norm is at or below it is left unreflected. Zero for non-finite
/// input, so NaN and infinity still go through the reflection.
pub(crate) fn householder_cutoff_sq<T: FloatScalar>(a: &impl MatrixRef<T>) -> T {
    let cutoff = T::from_usize(a.nrows().max(a.ncols())) * T::epsilon() * frobenius_norm(a);
    if cutoff.is_finite() {
        cutoff * cutoff
    } else {
        T::zero()
    }
}

#[inline]
pub(crate) fn require_square<T>(a: &impl MatrixRef<T>) -> Result<usize, LinalgError> {
    if a.nrows() == a.ncols() {
        Ok(a.nrows())
    } else {
        Err(LinalgError::NotSquare {
            nrows: a.nrows(),
            ncols: a.ncols(),
        })
    }
}

#[inline]
pub(crate) fn require_rows<T>(b: &impl MatrixRef<T>, rows: usize) -> Result<(), LinalgError> {
    if b.nrows() == rows {
        Ok(())
    } else {
        Err(LinalgError::DimensionMismatch {
            expected: (rows, b.ncols()),
            got: (b.nrows(), b.ncols()),
        })
    }
}

#[inline]
pub(crate) fn require_cols<T>(b: &impl MatrixRef<T>, cols: usize) -> Result<(), LinalgError> {
    if b.ncols() == cols {
        Ok(())
    } else {
        Err(LinalgError::DimensionMismatch {
            expected: (b.nrows(), cols),
            got: (b.nrows(), b.ncols()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DenseMatrix;

    #[test]
    fn display_messages() {
        assert_eq!(LinalgError::Singular.to_string(), "matrix is singular");
        assert_eq!(
            LinalgError::DimensionMismatch { expected: (3, 1), got: (2, 1) }.to_string(),
            "dimension mismatch: expected 3x1, got 2x1"
        );
        assert_eq!(
            LinalgError::ConvergenceFailure { iterations: 5 }.to_string(),
            "iterative algorithm did not converge after 5 iterations"
        );
    }

    #[test]
    fn policy_check() {
        let mut a = DenseMatrix::<f64>::eye(2);
        assert_eq!(NonFinitePolicy::Reject.check(&a), Ok(false));
        a[(1, 0)] = f64::NAN;
        assert_eq!(NonFinitePolicy::Propagate.check(&a), Ok(true));
        assert_eq!(
            NonFinitePolicy::Reject.check(&a),
            Err(LinalgError::NonFinite { row: 1, col: 0 })
        );
    }

    #[test]
    fn budget_default_and_override() {
        assert_eq!(iteration_budget(None, 4, 7), 210);
        assert_eq!(iteration_budget(Some(1), 4, 7), 1);
    }
}
