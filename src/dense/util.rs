//! Storage-generic helpers: shape predicates, generators, products, norms
//! and tolerant comparison.
//!
//! Everything here is written against [`MatrixRef`] / [`MatrixStorage`], so
//! the same call works on [`DenseMatrix`](super::DenseMatrix) and
//! [`JaggedMatrix`](super::JaggedMatrix).
//!
//! ```
//! use dense_decomp::DenseMatrix;
//! use dense_decomp::dense::util;
//!
//! let m: DenseMatrix<f64> = util::magic(4);
//! assert_eq!(util::trace(&m), 34.0);
//! assert!(util::is_square(&m));
//! ```

use rand::Rng;

use crate::linalg::LinalgError;
use crate::traits::{FloatScalar, MatrixRef, MatrixStorage, Scalar};

// ── Shape predicates ────────────────────────────────────────────────

#[inline]
pub fn is_square<T>(a: &impl MatrixRef<T>) -> bool {
    a.nrows() == a.ncols()
}

/// Square and `|a[i][j] - a[j][i]| <= tol` for every pair.
///
/// With `tol = 0` this is an exact check; NaN entries make it fail.
pub fn is_symmetric<T: FloatScalar>(a: &impl MatrixRef<T>, tol: T) -> bool {
    if !is_square(a) {
        return false;
    }
    let n = a.nrows();
    for i in 0..n {
        for j in (i + 1)..n {
            if !((*a.get(i, j) - *a.get(j, i)).abs() <= tol) {
                return false;
            }
        }
    }
    true
}

/// All entries below the main diagonal are zero.
pub fn is_upper_triangular<T: Scalar>(a: &impl MatrixRef<T>) -> bool {
    for i in 0..a.nrows() {
        for j in 0..i.min(a.ncols()) {
            if *a.get(i, j) != T::zero() {
                return false;
            }
        }
    }
    true
}

/// All entries above the main diagonal are zero.
pub fn is_lower_triangular<T: Scalar>(a: &impl MatrixRef<T>) -> bool {
    for i in 0..a.nrows() {
        for j in (i + 1)..a.ncols() {
            if *a.get(i, j) != T::zero() {
                return false;
            }
        }
    }
    true
}

pub fn is_diagonal<T: Scalar>(a: &impl MatrixRef<T>) -> bool {
    is_upper_triangular(a) && is_lower_triangular(a)
}

/// Position of the first NaN or infinite entry in row-major order.
pub fn first_non_finite<T: FloatScalar>(a: &impl MatrixRef<T>) -> Option<(usize, usize)> {
    for i in 0..a.nrows() {
        if let Some(j) = a.row_as_slice(i, 0).iter().position(|x| !x.is_finite()) {
            return Some((i, j));
        }
    }
    None
}

#[inline]
pub fn has_non_finite<T: FloatScalar>(a: &impl MatrixRef<T>) -> bool {
    first_non_finite(a).is_some()
}

// ── Generators ──────────────────────────────────────────────────────

/// `n x n` identity.
pub fn identity<T: Scalar, M: MatrixStorage<T>>(n: usize) -> M {
    let mut m = M::zeros(n, n);
    for i in 0..n {
        *m.get_mut(i, i) = T::one();
    }
    m
}

/// Square matrix with `d` on the diagonal.
pub fn diagonal<T: Scalar, M: MatrixStorage<T>>(d: &[T]) -> M {
    let mut m = M::zeros(d.len(), d.len());
    for (i, &v) in d.iter().enumerate() {
        *m.get_mut(i, i) = v;
    }
    m
}

/// Magic square of order `n`: every row, column and both diagonals sum to
/// `n(n² + 1) / 2`.
///
/// Odd orders use the siamese construction, doubly-even orders the
/// complement pattern, singly-even orders four odd quadrants with column
/// exchanges. There is no magic square of order 2.
pub fn magic<T: FloatScalar, M: MatrixStorage<T>>(n: usize) -> M {
    let cells = magic_cells(n);
    let mut m = M::zeros(n, n);
    for i in 0..n {
        for j in 0..n {
            *m.get_mut(i, j) = T::from_usize(cells[i * n + j]);
        }
    }
    m
}

fn magic_cells(n: usize) -> Vec<usize> {
    let mut c = vec![0usize; n * n];
    if n == 0 {
        return c;
    }
    if n % 2 == 1 {
        let a = (n + 1) / 2;
        let b = n + 1;
        for i in 0..n {
            for j in 0..n {
                c[i * n + j] = n * ((i + j + a) % n) + ((i + 2 * j + b) % n) + 1;
            }
        }
    } else if n % 4 == 0 {
        for i in 0..n {
            for j in 0..n {
                c[i * n + j] = if ((i + 1) / 2) % 2 == ((j + 1) / 2) % 2 {
                    n * n - n * i - j
                } else {
                    n * i + j + 1
                };
            }
        }
    } else {
        let p = n / 2;
        let k = (n - 2) / 4;
        let q = magic_cells(p);
        for i in 0..p {
            for j in 0..p {
                let v = q[i * p + j];
                c[i * n + j] = v;
                c[i * n + j + p] = v + 2 * p * p;
                c[(i + p) * n + j] = v + 3 * p * p;
                c[(i + p) * n + j + p] = v + p * p;
            }
        }
        for i in 0..p {
            for j in (0..k).chain((n - k + 1)..n) {
                c.swap(i * n + j, (i + p) * n + j);
            }
        }
        c.swap(k * n, (k + p) * n);
        c.swap(k * n + k, (k + p) * n + k);
    }
    c
}

/// `m x n` matrix with entries drawn uniformly from `[lo, hi)`.
pub fn random<T: FloatScalar, M: MatrixStorage<T>>(
    m: usize,
    n: usize,
    lo: T,
    hi: T,
    rng: &mut impl Rng,
) -> M {
    let (lo64, hi64) = (lo.as_f64(), hi.as_f64());
    let mut out = M::zeros(m, n);
    for i in 0..m {
        for v in out.row_as_mut_slice(i, 0) {
            let u: f64 = rng.gen();
            *v = T::from_f64(lo64 + (hi64 - lo64) * u);
        }
    }
    out
}

// ── Algebra ─────────────────────────────────────────────────────────

pub fn transpose<T: Scalar, M: MatrixStorage<T>>(a: &impl MatrixRef<T>) -> M {
    let mut t = M::zeros(a.ncols(), a.nrows());
    for i in 0..a.nrows() {
        for (j, &v) in a.row_as_slice(i, 0).iter().enumerate() {
            *t.get_mut(j, i) = v;
        }
    }
    t
}

/// `A * B`, with the inner dimensions checked.
///
/// ```
/// use dense_decomp::{DenseMatrix, LinalgError};
/// use dense_decomp::dense::util::matmul;
///
/// let a = DenseMatrix::<f64>::zeros(2, 3);
/// let err = matmul::<_, DenseMatrix<f64>>(&a, &a).unwrap_err();
/// assert!(matches!(err, LinalgError::DimensionMismatch { .. }));
/// ```
pub fn matmul<T: Scalar, M: MatrixStorage<T>>(
    a: &impl MatrixRef<T>,
    b: &impl MatrixRef<T>,
) -> Result<M, LinalgError> {
    if a.ncols() != b.nrows() {
        return Err(LinalgError::DimensionMismatch {
            expected: (a.ncols(), b.ncols()),
            got: (b.nrows(), b.ncols()),
        });
    }
    let (m, k, n) = (a.nrows(), a.ncols(), b.ncols());
    let mut out = M::zeros(m, n);
    for i in 0..m {
        for p in 0..k {
            let aip = *a.get(i, p);
            let b_row = b.row_as_slice(p, 0);
            for (o, &bv) in out.row_as_mut_slice(i, 0).iter_mut().zip(b_row) {
                *o = *o + aip * bv;
            }
        }
    }
    Ok(out)
}

/// `Aᵀ * B` without forming the transpose.
pub fn matmul_transpose_left<T: Scalar, M: MatrixStorage<T>>(
    a: &impl MatrixRef<T>,
    b: &impl MatrixRef<T>,
) -> Result<M, LinalgError> {
    if a.nrows() != b.nrows() {
        return Err(LinalgError::DimensionMismatch {
            expected: (a.nrows(), b.ncols()),
            got: (b.nrows(), b.ncols()),
        });
    }
    let mut out = M::zeros(a.ncols(), b.ncols());
    for p in 0..a.nrows() {
        let a_row = a.row_as_slice(p, 0);
        let b_row = b.row_as_slice(p, 0);
        for (i, &api) in a_row.iter().enumerate() {
            for (o, &bv) in out.row_as_mut_slice(i, 0).iter_mut().zip(b_row) {
                *o = *o + api * bv;
            }
        }
    }
    Ok(out)
}

/// Main diagonal as a vector of length `min(m, n)`.
pub fn diagonal_of<T: Scalar>(a: &impl MatrixRef<T>) -> Vec<T> {
    (0..a.nrows().min(a.ncols())).map(|i| *a.get(i, i)).collect()
}

pub fn trace<T: Scalar>(a: &impl MatrixRef<T>) -> T {
    diagonal_of(a).into_iter().fold(T::zero(), |s, x| s + x)
}

pub fn frobenius_norm<T: FloatScalar>(a: &impl MatrixRef<T>) -> T {
    let mut sum = T::zero();
    for i in 0..a.nrows() {
        for &v in a.row_as_slice(i, 0) {
            sum = sum + v * v;
        }
    }
    sum.sqrt()
}

/// Largest absolute entry; NaN if any entry is NaN, zero for an empty matrix.
pub fn max_abs<T: FloatScalar>(a: &impl MatrixRef<T>) -> T {
    let mut best = T::zero();
    for i in 0..a.nrows() {
        for &v in a.row_as_slice(i, 0) {
            if v.is_nan() {
                return v;
            }
            best = best.max(v.abs());
        }
    }
    best
}

/// Copy of column `j`.
pub fn column<T: Scalar>(a: &impl MatrixRef<T>, j: usize) -> Vec<T> {
    (0..a.nrows()).map(|i| *a.get(i, j)).collect()
}

/// Copy `src` into a storage of the caller's choosing.
pub fn copy_into<T: Scalar, M: MatrixStorage<T>>(src: &impl MatrixRef<T>) -> M {
    let mut out = M::zeros(src.nrows(), src.ncols());
    for i in 0..src.nrows() {
        out.row_as_mut_slice(i, 0).copy_from_slice(src.row_as_slice(i, 0));
    }
    out
}

// ── Comparison ──────────────────────────────────────────────────────

#[inline]
fn cell_eq<T: FloatScalar>(x: T, y: T, atol: T) -> bool {
    if x.is_nan() || y.is_nan() {
        return x.is_nan() && y.is_nan();
    }
    if x.is_infinite() || y.is_infinite() {
        return x == y;
    }
    (x - y).abs() <= atol
}

/// Same shape, and every pair of cells within `atol`.
///
/// Two NaN cells compare equal, as do equal infinities.
pub fn approx_eq<T: FloatScalar>(a: &impl MatrixRef<T>, b: &impl MatrixRef<T>, atol: T) -> bool {
    if a.nrows() != b.nrows() || a.ncols() != b.ncols() {
        return false;
    }
    (0..a.nrows()).all(|i| approx_eq_slice(a.row_as_slice(i, 0), b.row_as_slice(i, 0), atol))
}

pub fn approx_eq_slice<T: FloatScalar>(a: &[T], b: &[T], atol: T) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| cell_eq(x, y, atol))
}
