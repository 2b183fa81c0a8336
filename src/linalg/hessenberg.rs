use crate::linalg::householder_cutoff_sq;
use crate::traits::{FloatScalar, MatrixMut};

/// Reduce a square matrix to upper Hessenberg form via Householder similarity
/// transforms: `Qᵀ·A·Q = H`.
///
/// On return:
/// - `a` is overwritten with the upper Hessenberg matrix H
/// - `q` accumulates the orthogonal transform Q
///
/// The result satisfies `A = Q·H·Qᵀ`. Non-finite entries are not
/// special-cased; a NaN in a column spreads through the reflector built
/// from it.
pub(crate) fn hessenberg<T: FloatScalar>(a: &mut impl MatrixMut<T>, q: &mut impl MatrixMut<T>) {
    let n = a.nrows();
    assert_eq!(n, a.ncols(), "hessenberg requires a square matrix");
    assert_eq!(q.nrows(), n);
    assert_eq!(q.ncols(), n);

    for i in 0..n {
        for j in 0..n {
            *q.get_mut(i, j) = if i == j { T::one() } else { T::zero() };
        }
    }

    let tiny = householder_cutoff_sq(&*a);
    let two = T::one() + T::one();
    let mut v = vec![T::zero(); n];

    for k in 0..n.saturating_sub(2) {
        let mut norm_sq = T::zero();
        for i in (k + 1)..n {
            let x = *a.get(i, k);
            norm_sq = norm_sq + x * x;
        }
        if norm_sq <= tiny {
            for i in (k + 2)..n {
                *a.get_mut(i, k) = T::zero();
            }
            continue;
        }

        let norm = norm_sq.sqrt();
        let x = *a.get(k + 1, k);
        let sigma = if x < T::zero() { -norm } else { norm };

        // Reflector I - tau·v·vᵀ acting on rows/columns k+1..n
        v[k + 1] = x + sigma;
        for i in (k + 2)..n {
            v[i] = *a.get(i, k);
        }
        let vtv = v[k + 1..].iter().fold(T::zero(), |s, &x| s + x * x);
        let tau = two / vtv;

        // Left: A[k+1.., k+1..] ← H·A[k+1.., k+1..]. Column k is set below.
        for j in (k + 1)..n {
            let mut dot = T::zero();
            for i in (k + 1)..n {
                dot = dot + v[i] * *a.get(i, j);
            }
            dot = dot * tau;
            for i in (k + 1)..n {
                let val = *a.get(i, j) - dot * v[i];
                *a.get_mut(i, j) = val;
            }
        }

        // Right: A[.., k+1..] ← A[.., k+1..]·H
        for i in 0..n {
            let row = a.row_as_mut_slice(i, k + 1);
            let dot = row.iter().zip(&v[k + 1..]).fold(T::zero(), |s, (&a, &b)| s + a * b) * tau;
            for (x, &vj) in row.iter_mut().zip(&v[k + 1..]) {
                *x = *x - dot * vj;
            }
        }

        // Q ← Q·H
        for i in 0..n {
            let row = q.row_as_mut_slice(i, k + 1);
            let dot = row.iter().zip(&v[k + 1..]).fold(T::zero(), |s, (&a, &b)| s + a * b) * tau;
            for (x, &vj) in row.iter_mut().zip(&v[k + 1..]) {
                *x = *x - dot * vj;
            }
        }

        *a.get_mut(k + 1, k) = -sigma;
        for i in (k + 2)..n {
            *a.get_mut(i, k) = T::zero();
        }
    }
}
