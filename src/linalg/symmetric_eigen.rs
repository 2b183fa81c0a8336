use log::warn;
use num_traits::Float;

use crate::linalg::{householder_cutoff_sq, LinalgError};
use crate::traits::{FloatScalar, MatrixMut, MatrixRef};

/// Householder tridiagonalization of a symmetric matrix.
///
/// On return:
/// - `diag[0..n]` holds the diagonal of the tridiagonal matrix T
/// - `off_diag[0..n-1]` holds the sub-diagonal (`off_diag[i] = T[i+1][i]`)
/// - `q` holds the orthogonal Q with `Qᵀ·A·Q = T`
///
/// Only the values of `a` are read; symmetry is assumed, not checked.
pub(crate) fn tridiagonalize<T: FloatScalar>(
    a: &impl MatrixRef<T>,
    diag: &mut [T],
    off_diag: &mut [T],
    q: &mut impl MatrixMut<T>,
) {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "tridiagonalize requires a square matrix");
    assert!(diag.len() >= n);
    assert!(off_diag.len() + 1 >= n);

    // Row-major working copy
    let mut w = vec![T::zero(); n * n];
    for i in 0..n {
        w[i * n..(i + 1) * n].copy_from_slice(&a.row_as_slice(i, 0)[..n]);
    }

    for i in 0..n {
        for j in 0..n {
            *q.get_mut(i, j) = if i == j { T::one() } else { T::zero() };
        }
    }

    let tiny = householder_cutoff_sq(a);
    let two = T::one() + T::one();
    let mut v = vec![T::zero(); n];
    let mut p = vec![T::zero(); n];

    for k in 0..n.saturating_sub(2) {
        let sub = n - k - 1;

        let mut norm_sq = T::zero();
        for i in (k + 1)..n {
            norm_sq = norm_sq + w[i * n + k] * w[i * n + k];
        }
        if norm_sq <= tiny {
            off_diag[k] = T::zero();
            continue;
        }

        let x = w[(k + 1) * n + k];
        let norm = norm_sq.sqrt();
        let sigma = if x < T::zero() { -norm } else { norm };

        // v = w[k+1.., k] + sigma·e₁, tau = 2 / vᵀv
        v[0] = x + sigma;
        for i in 1..sub {
            v[i] = w[(k + 1 + i) * n + k];
        }
        let vtv = v[..sub].iter().fold(T::zero(), |s, &x| s + x * x);
        let tau = two / vtv;

        // p = tau·A_sub·v
        for i in 0..sub {
            let row = &w[(k + 1 + i) * n + k + 1..(k + 2 + i) * n];
            let dot = row.iter().zip(&v[..sub]).fold(T::zero(), |s, (&a, &b)| s + a * b);
            p[i] = tau * dot;
        }

        // p ← p - (tau/2)(vᵀp)·v
        let vtp = v[..sub].iter().zip(&p[..sub]).fold(T::zero(), |s, (&a, &b)| s + a * b);
        let half = tau / two * vtp;
        for i in 0..sub {
            p[i] = p[i] - half * v[i];
        }

        // A_sub ← A_sub - v·pᵀ - p·vᵀ
        for i in 0..sub {
            let row = k + 1 + i;
            for j in 0..sub {
                let col = k + 1 + j;
                w[row * n + col] = w[row * n + col] - v[i] * p[j] - p[i] * v[j];
            }
        }

        off_diag[k] = -sigma;

        // Q ← Q·(I - tau·v·vᵀ)
        for row in 0..n {
            let mut s = T::zero();
            for j in 0..sub {
                s = s + *q.get(row, k + 1 + j) * v[j];
            }
            s = s * tau;
            for j in 0..sub {
                let val = *q.get(row, k + 1 + j) - s * v[j];
                *q.get_mut(row, k + 1 + j) = val;
            }
        }
    }

    for i in 0..n {
        diag[i] = w[i * n + i];
    }
    if n >= 2 {
        off_diag[n - 2] = w[(n - 1) * n + (n - 2)];
    }
}

/// Implicit QR iteration with Wilkinson shift on a symmetric tridiagonal
/// matrix, accumulating the rotations into `q`.
///
/// On return `diag` holds the eigenvalues sorted ascending, `off_diag` is
/// destroyed and the columns of `q` are permuted to match. An already
/// sorted diagonal is left untouched. Returns the number of sweeps performed.
pub(crate) fn tridiagonal_qr_with_vecs<T: FloatScalar>(
    diag: &mut [T],
    off_diag: &mut [T],
    q: &mut impl MatrixMut<T>,
    max_iter: usize,
) -> Result<usize, LinalgError> {
    let n = diag.len();
    let eps = T::epsilon();
    let two = T::one() + T::one();
    let mut iter = 0usize;
    let mut hi = n.saturating_sub(1);

    while hi > 0 {
        let mut lo = hi;
        while lo > 0 {
            let threshold = eps * (diag[lo - 1].abs() + diag[lo].abs());
            if off_diag[lo - 1].abs() <= threshold {
                off_diag[lo - 1] = T::zero();
                break;
            }
            lo -= 1;
        }

        if lo == hi {
            hi -= 1;
            continue;
        }

        iter += 1;
        if iter > max_iter {
            warn!("symmetric eigen: QR did not converge in {} sweeps", max_iter);
            return Err(LinalgError::ConvergenceFailure {
                iterations: max_iter,
            });
        }

        // Wilkinson shift from the trailing 2×2
        let d = (diag[hi - 1] - diag[hi]) / two;
        let e = off_diag[hi - 1];
        let r = (d * d + e * e).sqrt();
        let shift = diag[hi] - e * e / (d + if d >= T::zero() { r } else { -r });

        let mut x = diag[lo] - shift;
        let mut z = off_diag[lo];

        for k in lo..hi {
            let (c, s) = givens(x, z);

            if k > lo {
                off_diag[k - 1] = c * x + s * z;
            }

            // T ← G·T·Gᵀ on rows/columns k, k+1
            let d_k = diag[k];
            let d_k1 = diag[k + 1];
            let e_k = off_diag[k];

            diag[k] = c * c * d_k + two * c * s * e_k + s * s * d_k1;
            diag[k + 1] = s * s * d_k - two * c * s * e_k + c * c * d_k1;
            off_diag[k] = c * s * (d_k1 - d_k) + (c * c - s * s) * e_k;

            if k + 1 < hi {
                // Bulge at (k, k+2)
                let e_next = off_diag[k + 1];
                x = off_diag[k];
                z = s * e_next;
                off_diag[k + 1] = c * e_next;
            }

            for i in 0..q.nrows() {
                let qik = *q.get(i, k);
                let qik1 = *q.get(i, k + 1);
                *q.get_mut(i, k) = c * qik + s * qik1;
                *q.get_mut(i, k + 1) = c * qik1 - s * qik;
            }
        }
    }

    sort_ascending_with_vecs(diag, q);
    Ok(iter)
}

/// Givens rotation: `(c, s)` such that `[c, s; -s, c]·[a; b] = [r; 0]`.
#[inline]
pub(crate) fn givens<R: Float>(a: R, b: R) -> (R, R) {
    if b == R::zero() {
        (R::one(), R::zero())
    } else if b.abs() > a.abs() {
        let t = a / b;
        let s = R::one() / (R::one() + t * t).sqrt();
        (s * t, s)
    } else {
        let t = b / a;
        let c = R::one() / (R::one() + t * t).sqrt();
        (c, c * t)
    }
}

/// Selection sort, ascending. Swaps only on strict decrease.
fn sort_ascending_with_vecs<T: FloatScalar>(diag: &mut [T], q: &mut impl MatrixMut<T>) {
    let n = diag.len();
    for i in 0..n {
        let mut min_idx = i;
        for j in (i + 1)..n {
            if diag[j] < diag[min_idx] {
                min_idx = j;
            }
        }
        if min_idx != i {
            diag.swap(i, min_idx);
            for row in 0..q.nrows() {
                let tmp = *q.get(row, i);
                *q.get_mut(row, i) = *q.get(row, min_idx);
                *q.get_mut(row, min_idx) = tmp;
            }
        }
    }
}
