use std::sync::OnceLock;

use crate::dense::util::{frobenius_norm, identity};
use crate::linalg::{require_cols, require_rows, require_square, LinalgError, NonFinitePolicy};
use crate::traits::{FloatScalar, MatrixMut, MatrixRef, MatrixStorage};

/// QR decomposition in place using Householder reflections.
///
/// On return, `a` contains the packed QR factorization:
/// - Upper triangle (including diagonal): R
/// - Lower triangle (excluding diagonal): Householder vectors (scaled)
///
/// `tau` is filled with the Householder scalar factors (length `min(m, n)`).
/// Works on any shape. A column whose remaining part is below
/// `max(m, n)·ε·‖A‖_F` gets `tau = 0` and an exact zero on the diagonal of R.
pub(crate) fn qr_in_place<T: FloatScalar>(a: &mut impl MatrixMut<T>, tau: &mut [T]) {
    let m = a.nrows();
    let n = a.ncols();
    let k = m.min(n);
    assert_eq!(tau.len(), k, "tau length must equal min(M, N)");

    let cutoff = T::from_usize(m.max(n)) * T::epsilon() * frobenius_norm(&*a);
    let cutoff_sq = cutoff * cutoff;

    for col in 0..k {
        let mut norm_sq = T::zero();
        for i in col..m {
            let v = *a.get(i, col);
            norm_sq = norm_sq + v * v;
        }

        if norm_sq <= cutoff_sq {
            tau[col] = T::zero();
            for i in col..m {
                *a.get_mut(i, col) = T::zero();
            }
            continue;
        }

        let norm = norm_sq.sqrt();
        let a_col_col = *a.get(col, col);

        // sigma = sign(a[col,col]) * ||x|| so that v0 = a + sigma avoids cancellation.
        let sigma = if a_col_col < T::zero() { -norm } else { norm };

        // v[col] = a[col,col] + sigma; rest of v is a[col+1:m, col] (stored in-place)
        let v0 = a_col_col + sigma;
        let tau_val = v0 / sigma;
        tau[col] = tau_val;

        for i in (col + 1)..m {
            let val = *a.get(i, col) / v0;
            *a.get_mut(i, col) = val;
        }

        // Apply H to trailing columns: A[col:m, col+1:n] -= tau * v * (vᵀ * A)
        for j in (col + 1)..n {
            let mut dot = *a.get(col, j);
            for i in (col + 1)..m {
                dot = dot + *a.get(i, col) * *a.get(i, j);
            }
            dot = dot * tau_val;

            *a.get_mut(col, j) = *a.get(col, j) - dot;
            for i in (col + 1)..m {
                let vi = *a.get(i, col);
                *a.get_mut(i, j) = *a.get(i, j) - dot * vi;
            }
        }

        *a.get_mut(col, col) = -sigma;
    }
}

/// Options for [`QrDecomposition`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QrOptions {
    /// Thin factors (Q is `m x k`, R is `k x n`) instead of full ones
    /// (Q is `m x m`, R is `m x n`).
    pub economy: bool,
    pub non_finite: NonFinitePolicy,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            economy: true,
            non_finite: NonFinitePolicy::Propagate,
        }
    }
}

impl QrOptions {
    pub fn with_economy(mut self, economy: bool) -> Self {
        self.economy = economy;
        self
    }

    pub fn with_non_finite(mut self, policy: NonFinitePolicy) -> Self {
        self.non_finite = policy;
        self
    }
}

/// Householder QR decomposition: `A = Q·R`.
///
/// Works for any `m x n` matrix. Q has orthonormal columns and R is upper
/// triangular; [`QrOptions::economy`] selects thin or full factors. Both
/// factors are built on first access and cached.
///
/// # Example
///
/// ```
/// use dense_decomp::{DenseMatrix, QrDecomposition};
///
/// // Least-squares fit: y = c0 + c1*x to points (0,1), (1,2), (2,4)
/// let a = DenseMatrix::from_rows(3, 2, &[1.0_f64, 0.0, 1.0, 1.0, 1.0, 2.0]);
/// let qr = QrDecomposition::new(&a).unwrap();
/// let x = qr.solve_vec(&[1.0, 2.0, 4.0]).unwrap();
/// assert!((x[0] - 5.0 / 6.0).abs() < 1e-10);
/// assert!((x[1] - 3.0 / 2.0).abs() < 1e-10);
/// ```
#[derive(Debug)]
pub struct QrDecomposition<T, M> {
    qr: M,
    tau: Vec<T>,
    economy: bool,
    q: OnceLock<M>,
    r: OnceLock<M>,
    inverse: OnceLock<Result<M, LinalgError>>,
}

impl<T: FloatScalar, M: MatrixStorage<T>> QrDecomposition<T, M> {
    pub fn new(a: &M) -> Result<Self, LinalgError> {
        Self::with_options(a, QrOptions::default())
    }

    pub fn with_options(a: &M, options: QrOptions) -> Result<Self, LinalgError> {
        options.non_finite.check(a)?;
        let mut qr = a.clone();
        let mut tau = vec![T::zero(); a.nrows().min(a.ncols())];
        qr_in_place(&mut qr, &mut tau);
        Ok(Self {
            qr,
            tau,
            economy: options.economy,
            q: OnceLock::new(),
            r: OnceLock::new(),
            inverse: OnceLock::new(),
        })
    }

    #[inline]
    fn k(&self) -> usize {
        self.tau.len()
    }

    /// Apply `H_col` to every column of `x` (rows `col..m`).
    fn reflect(&self, col: usize, x: &mut M) {
        let m = self.qr.nrows();
        let tau_val = self.tau[col];
        if tau_val == T::zero() {
            return;
        }
        for j in 0..x.ncols() {
            let mut dot = *x.get(col, j);
            for i in (col + 1)..m {
                dot = dot + *self.qr.get(i, col) * *x.get(i, j);
            }
            dot = dot * tau_val;

            *x.get_mut(col, j) = *x.get(col, j) - dot;
            for i in (col + 1)..m {
                *x.get_mut(i, j) = *x.get(i, j) - dot * *self.qr.get(i, col);
            }
        }
    }

    /// Orthogonal factor Q: `m x k` in economy mode, `m x m` otherwise.
    ///
    /// Applies the Householder reflections in reverse to the leading
    /// columns of the identity.
    pub fn orthogonal_factor(&self) -> &M {
        self.q.get_or_init(|| {
            let m = self.qr.nrows();
            let cols = if self.economy { self.k() } else { m };
            let mut q = M::zeros(m, cols);
            for i in 0..cols {
                *q.get_mut(i, i) = T::one();
            }
            for col in (0..self.k()).rev() {
                self.reflect(col, &mut q);
            }
            q
        })
    }

    /// Upper triangular factor R: `k x n` in economy mode, `m x n` otherwise.
    pub fn upper_triangular_factor(&self) -> &M {
        self.r.get_or_init(|| {
            let (m, n) = (self.qr.nrows(), self.qr.ncols());
            let rows = if self.economy { self.k() } else { m };
            let mut r = M::zeros(rows, n);
            for i in 0..self.k() {
                r.row_as_mut_slice(i, i).copy_from_slice(self.qr.row_as_slice(i, i));
            }
            r
        })
    }

    /// Diagonal of R.
    pub fn diagonal(&self) -> Vec<T> {
        (0..self.k()).map(|i| *self.qr.get(i, i)).collect()
    }

    /// No zero on the diagonal of R.
    pub fn is_full_rank(&self) -> bool {
        (0..self.k()).all(|i| *self.qr.get(i, i) != T::zero())
    }

    /// Determinant of a square matrix: `(-1)^r · Π Rᵢᵢ`, `r` the number of
    /// reflections applied.
    pub fn determinant(&self) -> Result<T, LinalgError> {
        let n = require_square(&self.qr)?;
        let mut d = T::one();
        for i in 0..n {
            d = d * *self.qr.get(i, i);
            if self.tau[i] != T::zero() {
                d = -d;
            }
        }
        Ok(d)
    }

    /// Least-squares solution of `A·X = B` (requires `m >= n` and full rank).
    pub fn solve(&self, b: &impl MatrixRef<T>) -> Result<M, LinalgError> {
        let (m, n) = (self.qr.nrows(), self.qr.ncols());
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
        let mut qtb = M::zeros(m, nb);
        for i in 0..m {
            qtb.row_as_mut_slice(i, 0).copy_from_slice(b.row_as_slice(i, 0));
        }
        for col in 0..n {
            self.reflect(col, &mut qtb);
        }

        // Back substitution with R (upper triangle of qr, first N rows)
        let mut x = M::zeros(n, nb);
        for c in 0..nb {
            for i in (0..n).rev() {
                let mut sum = *qtb.get(i, c);
                for j in (i + 1)..n {
                    sum = sum - *self.qr.get(i, j) * *x.get(j, c);
                }
                *x.get_mut(i, c) = sum / *self.qr.get(i, i);
            }
        }
        Ok(x)
    }

    /// Least-squares solution for a single right-hand side.
    pub fn solve_vec(&self, b: &[T]) -> Result<Vec<T>, LinalgError> {
        let mut col = M::zeros(b.len(), 1);
        for (i, &v) in b.iter().enumerate() {
            *col.get_mut(i, 0) = v;
        }
        let x = self.solve(&col)?;
        Ok((0..x.nrows()).map(|i| *x.get(i, 0)).collect())
    }

    /// Minimum-norm solution of `X·A = B` (requires `m >= n` and full rank).
    ///
    /// With `A = Q·R`, solves `Rᵀ·Y = Bᵀ` by forward substitution and returns
    /// `X = (Q·Y)ᵀ`, never forming `Aᵀ`.
    pub fn solve_transpose(&self, b: &impl MatrixRef<T>) -> Result<M, LinalgError> {
        let (m, n) = (self.qr.nrows(), self.qr.ncols());
        require_cols(b, n)?;
        if m < n {
            return Err(LinalgError::InvalidArgument {
                reason: "transposed solve requires rows >= columns",
            });
        }
        if !self.is_full_rank() {
            return Err(LinalgError::Singular);
        }

        let p = b.nrows();
        // Y (m x p): top n rows from Rᵀ Y = Bᵀ, rest zero.
        let mut y = M::zeros(m, p);
        for c in 0..p {
            for i in 0..n {
                let mut sum = *b.get(c, i);
                for j in 0..i {
                    sum = sum - *self.qr.get(j, i) * *y.get(j, c);
                }
                *y.get_mut(i, c) = sum / *self.qr.get(i, i);
            }
        }
        for col in (0..n).rev() {
            self.reflect(col, &mut y);
        }

        let mut x = M::zeros(p, m);
        for i in 0..m {
            for c in 0..p {
                *x.get_mut(c, i) = *y.get(i, c);
            }
        }
        Ok(x)
    }

    /// `A⁻¹` of a square full-rank matrix, computed once and cached.
    pub fn inverse(&self) -> Result<&M, LinalgError> {
        self.inverse
            .get_or_init(|| {
                let n = require_square(&self.qr)?;
                let id: M = identity(n);
                self.solve(&id)
            })
            .as_ref()
            .map_err(|&e| e)
    }

    /// Rebuild `A = Q·R`.
    pub fn reverse(&self) -> M {
        let q = self.orthogonal_factor();
        let r = self.upper_triangular_factor();
        let (m, n, inner) = (q.nrows(), r.ncols(), q.ncols());
        let mut a = M::zeros(m, n);
        for i in 0..m {
            for p in 0..inner {
                let qip = *q.get(i, p);
                for (o, &rv) in a.row_as_mut_slice(i, 0).iter_mut().zip(r.row_as_slice(p, 0)) {
                    *o = *o + qip * rv;
                }
            }
        }
        a
    }
}
