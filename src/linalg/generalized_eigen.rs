use log::debug;

use crate::dense::util::{is_symmetric, matmul, transpose};
use crate::linalg::cholesky::{back_substitute_transpose, cholesky_in_place, forward_substitute};
use crate::linalg::{
    require_square, EigenOptions, EigenvalueDecomposition, LinalgError, LuDecomposition,
};
use crate::traits::{FloatScalar, MatrixStorage};

/// Generalized eigenproblem `A·V = B·V·D`.
///
/// When A is symmetric and B symmetric positive definite the problem is
/// reduced with the Cholesky factor `B = L·Lᵀ` to the symmetric standard
/// problem for `L⁻¹·A·L⁻ᵀ`, giving real eigenvalues in ascending order.
/// Otherwise B is LU-factored and the standard problem for `B⁻¹·A` is
/// solved; complex pairs then use the same block layout as
/// [`EigenvalueDecomposition`].
///
/// # Example
///
/// ```
/// use dense_decomp::{DenseMatrix, GeneralizedEigenvalueDecomposition};
///
/// let a = DenseMatrix::from_rows(2, 2, &[2.0_f64, 0.0, 0.0, 6.0]);
/// let b = DenseMatrix::from_rows(2, 2, &[1.0_f64, 0.0, 0.0, 2.0]);
/// let ge = GeneralizedEigenvalueDecomposition::new(&a, &b).unwrap();
/// assert!(ge.is_symmetric());
/// assert!((ge.real_eigenvalues()[0] - 2.0).abs() < 1e-12);
/// assert!((ge.real_eigenvalues()[1] - 3.0).abs() < 1e-12);
/// ```
#[derive(Debug)]
pub struct GeneralizedEigenvalueDecomposition<T, M> {
    inner: EigenvalueDecomposition<T, M>,
    b: M,
    cholesky: bool,
}

impl<T: FloatScalar, M: MatrixStorage<T>> GeneralizedEigenvalueDecomposition<T, M> {
    pub fn new(a: &M, b: &M) -> Result<Self, LinalgError> {
        Self::with_options(a, b, EigenOptions::default())
    }

    /// `assume_symmetric` skips the symmetry check on A and B but still
    /// needs B to be positive definite; a failed Cholesky falls back to LU.
    pub fn with_options(a: &M, b: &M, options: EigenOptions) -> Result<Self, LinalgError> {
        let n = require_square(a)?;
        require_square(b)?;
        if b.nrows() != n {
            return Err(LinalgError::DimensionMismatch {
                expected: (n, n),
                got: (b.nrows(), b.ncols()),
            });
        }
        options.non_finite.check(a)?;
        options.non_finite.check(b)?;

        let symmetric =
            options.assume_symmetric || (is_symmetric(a, T::zero()) && is_symmetric(b, T::zero()));
        if symmetric {
            let mut l = b.clone();
            if cholesky_in_place(&mut l).is_ok() {
                let inner = Self::cholesky_path(a, &l, options)?;
                return Ok(Self {
                    inner,
                    b: b.clone(),
                    cholesky: true,
                });
            }
            debug!("generalized eigen: B is not positive definite, using LU");
        }

        let lu = LuDecomposition::new(b)?;
        if !lu.is_nonsingular() {
            return Err(LinalgError::Singular);
        }
        let c = lu.solve(a)?;
        let inner = EigenvalueDecomposition::with_options(&c, options.with_assume_symmetric(false))?;
        Ok(Self {
            inner,
            b: b.clone(),
            cholesky: false,
        })
    }

    fn cholesky_path(
        a: &M,
        l: &M,
        options: EigenOptions,
    ) -> Result<EigenvalueDecomposition<T, M>, LinalgError> {
        let n = a.nrows();
        // C = L⁻¹·A·L⁻ᵀ, via L⁻¹·(L⁻¹·A)ᵀ
        let mut x = a.clone();
        forward_substitute(l, &mut x);
        let mut c: M = transpose(&x);
        forward_substitute(l, &mut c);
        for i in 0..n {
            for j in (i + 1)..n {
                let avg = (*c.get(i, j) + *c.get(j, i)) * T::from_f64(0.5);
                *c.get_mut(i, j) = avg;
                *c.get_mut(j, i) = avg;
            }
        }

        let eig = EigenvalueDecomposition::with_options(&c, options.with_assume_symmetric(true))?;
        let (re, im, mut v) = eig.into_parts();
        back_substitute_transpose(l, &mut v);
        Ok(EigenvalueDecomposition::from_parts(re, im, v, true))
    }

    /// Real parts of the eigenvalues.
    #[inline]
    pub fn real_eigenvalues(&self) -> &[T] {
        self.inner.real_eigenvalues()
    }

    /// Imaginary parts of the eigenvalues; zero for real eigenvalues.
    #[inline]
    pub fn imaginary_eigenvalues(&self) -> &[T] {
        self.inner.imaginary_eigenvalues()
    }

    pub fn eigenvalues(&self) -> Vec<(T, T)> {
        self.inner.eigenvalues()
    }

    /// Eigenvector matrix V. On the Cholesky path the columns are
    /// B-orthonormal: `Vᵀ·B·V = I`.
    #[inline]
    pub fn eigenvectors(&self) -> &M {
        self.inner.eigenvectors()
    }

    /// Whether the Cholesky path was taken.
    #[inline]
    pub fn is_symmetric(&self) -> bool {
        self.cholesky
    }

    /// Block diagonal D, cached.
    pub fn diagonal_matrix(&self) -> &M {
        self.inner.diagonal_matrix()
    }

    /// Rebuild `A = B·V·D·V⁻¹`.
    pub fn reverse(&self) -> Result<M, LinalgError> {
        let v = self.inner.eigenvectors();
        let bv: M = matmul(&self.b, v)?;
        let bvd: M = matmul(&bv, self.inner.diagonal_matrix())?;
        let lu = LuDecomposition::new(v)?;
        matmul(&bvd, lu.inverse()?)
    }
}
