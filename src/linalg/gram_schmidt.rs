use crate::dense::util::frobenius_norm;
use crate::linalg::{require_rows, LinalgError};
use crate::traits::{FloatScalar, MatrixRef, MatrixStorage};

/// Options for [`GramSchmidtOrthogonalization`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GramSchmidtOptions {
    /// Modified (re-projects against the running residual) instead of
    /// classical (projects the original column).
    pub modified: bool,
}

impl Default for GramSchmidtOptions {
    fn default() -> Self {
        Self { modified: true }
    }
}

impl GramSchmidtOptions {
    pub fn with_modified(mut self, modified: bool) -> Self {
        self.modified = modified;
        self
    }
}

/// Gram-Schmidt orthogonalization of the columns of an `m x n` matrix:
/// `A = Q·R` with Q `m x n` (orthonormal nonzero columns) and R `n x n`
/// upper triangular.
///
/// A column that is linearly dependent on the previous ones yields a zero
/// column in Q and a zero on the diagonal of R.
///
/// ```
/// use dense_decomp::{DenseMatrix, GramSchmidtOrthogonalization};
///
/// let a = DenseMatrix::from_rows(3, 2, &[3.0_f64, 1.0, 4.0, 2.0, 0.0, 5.0]);
/// let gs = GramSchmidtOrthogonalization::new(&a);
/// let r = gs.upper_triangular_factor();
/// assert!((r[(0, 0)] - 5.0).abs() < 1e-12);
/// assert_eq!(r[(1, 0)], 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct GramSchmidtOrthogonalization<T, M> {
    q: M,
    r: M,
    _marker: core::marker::PhantomData<T>,
}

impl<T: FloatScalar, M: MatrixStorage<T>> GramSchmidtOrthogonalization<T, M> {
    pub fn new(a: &M) -> Self {
        Self::with_options(a, GramSchmidtOptions::default())
    }

    pub fn with_options(a: &M, options: GramSchmidtOptions) -> Self {
        let (m, n) = (a.nrows(), a.ncols());
        let cutoff = T::from_usize(m.max(n)) * T::epsilon() * frobenius_norm(a);
        let mut q = M::zeros(m, n);
        let mut r = M::zeros(n, n);
        let mut v = vec![T::zero(); m];

        for j in 0..n {
            for (i, vi) in v.iter_mut().enumerate() {
                *vi = *a.get(i, j);
            }
            for p in 0..j {
                let mut dot = T::zero();
                for (i, &vi) in v.iter().enumerate() {
                    let src = if options.modified { vi } else { *a.get(i, j) };
                    dot = dot + *q.get(i, p) * src;
                }
                *r.get_mut(p, j) = dot;
                for (i, vi) in v.iter_mut().enumerate() {
                    *vi = *vi - dot * *q.get(i, p);
                }
            }

            let norm = v.iter().fold(T::zero(), |s, &x| s + x * x).sqrt();
            if norm <= cutoff {
                continue;
            }
            *r.get_mut(j, j) = norm;
            for (i, &vi) in v.iter().enumerate() {
                *q.get_mut(i, j) = vi / norm;
            }
        }

        Self {
            q,
            r,
            _marker: core::marker::PhantomData,
        }
    }

    /// Orthogonal factor Q (`m x n`).
    #[inline]
    pub fn orthogonal_factor(&self) -> &M {
        &self.q
    }

    /// Upper triangular factor R (`n x n`).
    #[inline]
    pub fn upper_triangular_factor(&self) -> &M {
        &self.r
    }

    /// No zero on the diagonal of R.
    pub fn is_full_rank(&self) -> bool {
        (0..self.r.nrows()).all(|i| *self.r.get(i, i) != T::zero())
    }

    /// Rebuild `A = Q·R`.
    pub fn reverse(&self) -> M {
        let (m, n) = (self.q.nrows(), self.q.ncols());
        let mut a = M::zeros(m, n);
        for i in 0..m {
            for p in 0..n {
                let qip = *self.q.get(i, p);
                for (o, &rv) in a.row_as_mut_slice(i, 0).iter_mut().zip(self.r.row_as_slice(p, 0)) {
                    *o = *o + qip * rv;
                }
            }
        }
        a
    }

    /// Least-squares solution of `A·X = B` via `R·X = Qᵀ·B` (requires
    /// `m >= n` and full rank).
    pub fn solve(&self, b: &impl MatrixRef<T>) -> Result<M, LinalgError> {
        let (m, n) = (self.q.nrows(), self.q.ncols());
        require_rows(b, m)?;
        if m < n {
            return Err(LinalgError::InvalidArgument {
                reason: "least squares requires rows >= columns",
            });
        }
        if !self.is_full_rank() {
            return Err(LinalgError::Singular);
        }
        let nb = b.ncols();
        let mut x = M::zeros(n, nb);
        for c in 0..nb {
            for i in (0..n).rev() {
                let mut sum = T::zero();
                for p in 0..m {
                    sum = sum + *self.q.get(p, i) * *b.get(p, c);
                }
                for j in (i + 1)..n {
                    sum = sum - *self.r.get(i, j) * *x.get(j, c);
                }
                *x.get_mut(i, c) = sum / *self.r.get(i, i);
            }
        }
        Ok(x)
    }
}
