use log::warn;
use num_traits::Float;

use crate::dense::util::max_abs;
use crate::linalg::symmetric_eigen::givens;
use crate::linalg::LinalgError;
use crate::traits::{FloatScalar, MatrixMut, MatrixRef};

#[inline]
fn g<T: Copy>(m: &impl MatrixRef<T>, i: usize, j: usize) -> T {
    *m.get(i, j)
}

/// Francis double-shift QR iteration on an upper Hessenberg matrix.
///
/// Transforms `h` to real Schur form (quasi-upper-triangular) in place and
/// accumulates the orthogonal similarity transform into `q`. Everything
/// below the first sub-diagonal is exactly zero on return, and a sub-diagonal
/// entry is nonzero only inside a 2×2 block.
///
/// Returns the number of double-shift sweeps performed.
pub(crate) fn francis_qr<T: FloatScalar>(
    h: &mut impl MatrixMut<T>,
    q: &mut impl MatrixMut<T>,
    max_iter: usize,
) -> Result<usize, LinalgError> {
    let n = h.nrows();
    if n <= 1 {
        return Ok(0);
    }

    let scale = max_abs(&*h);
    let mut iter = 0usize;
    let mut p = n; // active submatrix is h[0..p, 0..p]

    while p > 2 {
        if negligible(&*h, scale, p - 1) {
            *h.get_mut(p - 1, p - 2) = T::zero();
            p -= 1;
            continue;
        }
        if negligible(&*h, scale, p - 2) {
            *h.get_mut(p - 2, p - 3) = T::zero();
            p -= 2;
            continue;
        }

        iter += 1;
        if iter > max_iter {
            warn!("eigen: Francis QR did not converge in {} sweeps", max_iter);
            return Err(LinalgError::ConvergenceFailure {
                iterations: max_iter,
            });
        }

        // Start of the unreduced block ending at p - 1
        let mut lo = p - 1;
        while lo > 0 {
            if negligible(&*h, scale, lo) {
                *h.get_mut(lo, lo - 1) = T::zero();
                break;
            }
            lo -= 1;
        }

        // Exceptional shift every 10 sweeps
        let (s, t) = if iter % 10 == 0 {
            let w = g(h, p - 1, p - 2).abs() + g(h, p - 2, p - 3).abs();
            (w + w, w * w)
        } else {
            let a11 = g(h, p - 2, p - 2);
            let a12 = g(h, p - 2, p - 1);
            let a21 = g(h, p - 1, p - 2);
            let a22 = g(h, p - 1, p - 1);
            (a11 + a22, a11 * a22 - a12 * a21)
        };

        // First column of H² - s·H + t·I
        let h00 = g(h, lo, lo);
        let h10 = g(h, lo + 1, lo);
        let h01 = g(h, lo, lo + 1);
        let h11 = g(h, lo + 1, lo + 1);

        let mut x = h00 * h00 + h01 * h10 - s * h00 + t;
        let mut y = h10 * (h00 + h11 - s);
        let mut z = if lo + 2 < p {
            h10 * g(h, lo + 2, lo + 1)
        } else {
            T::zero()
        };

        // Chase the bulge down the diagonal
        for k in lo..(p - 1) {
            let use3 = k + 2 < p;
            let (v1, v2, tau) = if use3 {
                householder3(x, y, z)
            } else {
                let (v1, tau) = householder2(x, y);
                (v1, T::zero(), tau)
            };

            let col_start = if k > lo { k - 1 } else { k };

            // Left
            for j in col_start..n {
                let mut dot = g(h, k, j) + v1 * g(h, k + 1, j);
                if use3 {
                    dot = dot + v2 * g(h, k + 2, j);
                }
                dot = tau * dot;
                *h.get_mut(k, j) = g(h, k, j) - dot;
                *h.get_mut(k + 1, j) = g(h, k + 1, j) - dot * v1;
                if use3 {
                    *h.get_mut(k + 2, j) = g(h, k + 2, j) - dot * v2;
                }
            }

            // Right
            let row_end = if use3 { (k + 4).min(p) } else { p };
            for i in 0..row_end {
                let mut dot = g(h, i, k) + v1 * g(h, i, k + 1);
                if use3 {
                    dot = dot + v2 * g(h, i, k + 2);
                }
                dot = tau * dot;
                *h.get_mut(i, k) = g(h, i, k) - dot;
                *h.get_mut(i, k + 1) = g(h, i, k + 1) - dot * v1;
                if use3 {
                    *h.get_mut(i, k + 2) = g(h, i, k + 2) - dot * v2;
                }
            }

            for i in 0..n {
                let mut dot = g(q, i, k) + v1 * g(q, i, k + 1);
                if use3 {
                    dot = dot + v2 * g(q, i, k + 2);
                }
                dot = tau * dot;
                *q.get_mut(i, k) = g(q, i, k) - dot;
                *q.get_mut(i, k + 1) = g(q, i, k + 1) - dot * v1;
                if use3 {
                    *q.get_mut(i, k + 2) = g(q, i, k + 2) - dot * v2;
                }
            }

            // Next bulge from the fill-in in column k
            if k + 2 < p - 1 {
                x = g(h, k + 1, k);
                y = g(h, k + 2, k);
                z = g(h, k + 3, k);
            } else if k + 1 < p - 1 {
                x = g(h, k + 1, k);
                y = g(h, k + 2, k);
                z = T::zero();
            }
        }
    }

    if negligible(&*h, scale, 1) {
        *h.get_mut(1, 0) = T::zero();
    }
    for i in 2..n {
        for j in 0..i - 1 {
            *h.get_mut(i, j) = T::zero();
        }
    }

    Ok(iter)
}

/// Whether `h[i][i-1]` is negligible next to its diagonal neighbours. Falls
/// back to the matrix scale when both neighbours are zero.
#[inline]
fn negligible<T: FloatScalar>(h: &impl MatrixRef<T>, scale: T, i: usize) -> bool {
    let mut s = g(h, i - 1, i - 1).abs() + g(h, i, i).abs();
    if s == T::zero() {
        s = scale;
    }
    g(h, i, i - 1).abs() <= T::epsilon() * s
}

/// 3-element Householder with implicit leading 1: `(v1, v2, tau)`.
/// The input is scaled by `|x| + |y| + |z|` first, so only an exactly zero
/// vector gives the identity.
#[inline]
fn householder3<T: Float>(x: T, y: T, z: T) -> (T, T, T) {
    let s = x.abs() + y.abs() + z.abs();
    if s == T::zero() {
        return (T::zero(), T::zero(), T::zero());
    }
    let (x, y, z) = (x / s, y / s, z / s);
    let norm = (x * x + y * y + z * z).sqrt();
    let u0 = if x >= T::zero() { x + norm } else { x - norm };
    let v1 = y / u0;
    let v2 = z / u0;
    let tau = (T::one() + T::one()) / (T::one() + v1 * v1 + v2 * v2);
    (v1, v2, tau)
}

/// 2-element Householder with implicit leading 1: `(v1, tau)`.
#[inline]
fn householder2<T: Float>(x: T, y: T) -> (T, T) {
    let s = x.abs() + y.abs();
    if s == T::zero() {
        return (T::zero(), T::zero());
    }
    let (x, y) = (x / s, y / s);
    let norm = (x * x + y * y).sqrt();
    let u0 = if x >= T::zero() { x + norm } else { x - norm };
    let v1 = y / u0;
    let tau = (T::one() + T::one()) / (T::one() + v1 * v1);
    (v1, tau)
}

/// `((a - d)/2)² + b·c` for the block at `i`; negative means a complex pair.
#[inline]
fn block_discriminant<T: FloatScalar>(s: &impl MatrixRef<T>, i: usize) -> T {
    let half = (g(s, i, i) - g(s, i + 1, i + 1)) / (T::one() + T::one());
    half * half + g(s, i, i + 1) * g(s, i + 1, i)
}

/// Split every 2×2 block of the Schur form whose eigenvalues are real,
/// applying the rotation to `s` and `q` so `A = Q·S·Qᵀ` still holds.
pub(crate) fn standardize_blocks<T: FloatScalar>(
    s: &mut impl MatrixMut<T>,
    q: &mut impl MatrixMut<T>,
) {
    let n = s.nrows();
    let mut i = 0;
    while i + 1 < n {
        if g(s, i + 1, i) == T::zero() {
            i += 1;
            continue;
        }
        let disc = block_discriminant(s, i);
        if disc >= T::zero() {
            // Eigenvector (λ - d, c) of the block, λ picked away from d
            let half = (g(s, i, i) - g(s, i + 1, i + 1)) / (T::one() + T::one());
            let root = disc.sqrt();
            let x = if half >= T::zero() { half + root } else { half - root };
            let (c, sn) = givens(x, g(s, i + 1, i));

            for j in 0..n {
                let (u, w) = (g(s, i, j), g(s, i + 1, j));
                *s.get_mut(i, j) = c * u + sn * w;
                *s.get_mut(i + 1, j) = c * w - sn * u;
            }
            for j in 0..n {
                let (u, w) = (g(s, j, i), g(s, j, i + 1));
                *s.get_mut(j, i) = c * u + sn * w;
                *s.get_mut(j, i + 1) = c * w - sn * u;
            }
            for j in 0..q.nrows() {
                let (u, w) = (g(q, j, i), g(q, j, i + 1));
                *q.get_mut(j, i) = c * u + sn * w;
                *q.get_mut(j, i + 1) = c * w - sn * u;
            }
            *s.get_mut(i + 1, i) = T::zero();
        }
        i += 2;
    }
}

/// Eigenvalues of a standardized real Schur form. A conjugate pair is
/// written positive imaginary part first.
pub(crate) fn schur_eigenvalues<T: FloatScalar>(s: &impl MatrixRef<T>) -> (Vec<T>, Vec<T>) {
    let n = s.nrows();
    let mut re = vec![T::zero(); n];
    let mut im = vec![T::zero(); n];
    let two = T::one() + T::one();
    let mut i = 0;
    while i < n {
        if i + 1 < n && g(s, i + 1, i) != T::zero() {
            let mid = (g(s, i, i) + g(s, i + 1, i + 1)) / two;
            let w = (-block_discriminant(s, i)).sqrt();
            re[i] = mid;
            re[i + 1] = mid;
            im[i] = w;
            im[i + 1] = -w;
            i += 2;
        } else {
            re[i] = g(s, i, i);
            i += 1;
        }
    }
    (re, im)
}

/// Complex product of `(re, im)` pairs.
#[inline]
fn cmul<T: FloatScalar>(a: (T, T), b: (T, T)) -> (T, T) {
    (a.0 * b.0 - a.1 * b.1, a.0 * b.1 + a.1 * b.0)
}

/// Complex quotient of `(re, im)` pairs by Smith's method.
#[inline]
fn cdiv<T: FloatScalar>(a: (T, T), b: (T, T)) -> (T, T) {
    if b.1.abs() <= b.0.abs() {
        let r = b.1 / b.0;
        let d = b.0 + r * b.1;
        ((a.0 + r * a.1) / d, (a.1 - r * a.0) / d)
    } else {
        let r = b.0 / b.1;
        let d = b.1 + r * b.0;
        ((r * a.0 + a.1) / d, (r * a.1 - a.0) / d)
    }
}

#[inline]
fn csub<T: FloatScalar>(a: (T, T), b: (T, T)) -> (T, T) {
    (a.0 - b.0, a.1 - b.1)
}

/// Eigenvectors of a standardized real Schur form by back-substitution.
///
/// Column `k` of the result solves `(S - λₖ)·y = 0` with `y[j] = 0` below
/// the block of `k`. For a pair at `(k, k+1)` the two columns hold the real
/// and imaginary parts of the vector for `re[k] + i·im[k]`. Complex values
/// are carried as `(re, im)` pairs. Zero divisors (repeated eigenvalues)
/// are replaced by `ε·‖S‖`.
pub(crate) fn schur_eigenvectors<T: FloatScalar>(
    s: &impl MatrixRef<T>,
    re: &[T],
    im: &[T],
    y: &mut impl MatrixMut<T>,
) {
    let n = s.nrows();
    let zero = (T::zero(), T::zero());
    let scale = max_abs(s);
    let small = if scale > T::zero() {
        T::epsilon() * scale
    } else {
        T::epsilon()
    };
    let guard = |d: (T, T)| -> (T, T) {
        if d.0.hypot(d.1) > small {
            d
        } else {
            (small, T::zero())
        }
    };
    let sc = |i: usize, j: usize| (g(s, i, j), T::zero());

    let mut z = vec![zero; n];

    let mut k = n;
    while k > 0 {
        let last = k - 1;
        let pair = im[last] != T::zero();
        let top = if pair { last - 1 } else { last };
        let mu = (re[top], im[top]);

        z.iter_mut().for_each(|v| *v = zero);
        if pair {
            let (a, b, c, d) = (sc(top, top), sc(top, last), sc(last, top), sc(last, last));
            if c.0.abs() >= b.0.abs() {
                z[top] = csub(mu, d);
                z[last] = c;
            } else {
                z[top] = b;
                z[last] = csub(mu, a);
            }
        } else {
            z[top] = (T::one(), T::zero());
        }

        // Σ S[row][t]·z[t] over t in from..=last
        let residual = |row: usize, from: usize, z: &[(T, T)]| {
            (from..=last).fold(zero, |acc, t| {
                let p = g(s, row, t);
                (acc.0 + p * z[t].0, acc.1 + p * z[t].1)
            })
        };

        let mut i = top;
        while i > 0 {
            let r = i - 1;
            if r > 0 && g(s, r, r - 1) != T::zero() {
                // 2×2 block on rows r-1, r
                let r1 = residual(r - 1, r + 1, &z);
                let r2 = residual(r, r + 1, &z);
                let a11 = csub(sc(r - 1, r - 1), mu);
                let a12 = sc(r - 1, r);
                let a21 = sc(r, r - 1);
                let a22 = csub(sc(r, r), mu);
                let det = guard(csub(cmul(a11, a22), cmul(a12, a21)));
                z[r - 1] = cdiv(csub(cmul(a12, r2), cmul(a22, r1)), det);
                z[r] = cdiv(csub(cmul(a21, r1), cmul(a11, r2)), det);
                i -= 2;
            } else {
                let rr = residual(r, r + 1, &z);
                z[r] = cdiv((-rr.0, -rr.1), guard(csub(sc(r, r), mu)));
                i -= 1;
            }
        }

        for row in 0..n {
            *y.get_mut(row, top) = z[row].0;
            if pair {
                *y.get_mut(row, last) = z[row].1;
            }
        }
        k = top;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::util::{approx_eq, matmul, matmul_transpose_left};
    use crate::linalg::hessenberg::hessenberg;
    use crate::DenseMatrix;

    const TOL: f64 = 1e-10;

    fn assert_near(a: f64, b: f64, tol: f64, msg: &str) {
        assert!(
            (a - b).abs() < tol,
            "{}: {} vs {} (diff {})",
            msg,
            a,
            b,
            (a - b).abs()
        );
    }

    fn schur(a: &DenseMatrix<f64>) -> (DenseMatrix<f64>, DenseMatrix<f64>) {
        let n = a.nrows();
        let mut s = a.clone();
        let mut q = DenseMatrix::zeros(n, n);
        hessenberg(&mut s, &mut q);
        francis_qr(&mut s, &mut q, 30 * n).unwrap();
        standardize_blocks(&mut s, &mut q);
        (s, q)
    }

    fn verify(a: &DenseMatrix<f64>, s: &DenseMatrix<f64>, q: &DenseMatrix<f64>) {
        let qs: DenseMatrix<f64> = matmul(q, s).unwrap();
        let back: DenseMatrix<f64> = matmul(&qs, &q.transpose()).unwrap();
        assert!(approx_eq(&back, a, 1e-9), "QSQᵀ = {:?}", back);
        let qtq: DenseMatrix<f64> = matmul_transpose_left(q, q).unwrap();
        assert!(approx_eq(&qtq, &DenseMatrix::eye(a.nrows()), 1e-12));
    }

    #[test]
    fn real_spectrum_is_triangular() {
        let a = DenseMatrix::from_rows(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0]);
        let (s, q) = schur(&a);
        verify(&a, &s, &q);
        for i in 1..3 {
            assert_eq!(s[(i, i - 1)], 0.0);
        }
        let (re, _) = schur_eigenvalues(&s);
        let trace: f64 = re.iter().sum();
        assert_near(trace, 16.0, TOL, "trace");
    }

    #[test]
    fn rotation_keeps_complex_block() {
        let a = DenseMatrix::from_rows(3, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        let (s, q) = schur(&a);
        verify(&a, &s, &q);
        let (re, im) = schur_eigenvalues(&s);
        let pos = im.iter().position(|&w| w > 0.0).unwrap();
        assert_near(re[pos], -0.5, TOL, "re");
        assert_near(im[pos], 3.0_f64.sqrt() / 2.0, TOL, "im");
        assert_near(im[pos + 1], -(3.0_f64.sqrt()) / 2.0, TOL, "conj");
    }

    #[test]
    fn two_by_two_real_block_split() {
        let a = DenseMatrix::from_rows(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let (s, q) = schur(&a);
        verify(&a, &s, &q);
        assert_eq!(s[(1, 0)], 0.0);
        let (re, im) = schur_eigenvalues(&s);
        let mut sorted = re.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
        assert_near(sorted[0], (5.0 - 33.0_f64.sqrt()) / 2.0, TOL, "λ0");
        assert_near(sorted[1], (5.0 + 33.0_f64.sqrt()) / 2.0, TOL, "λ1");
        assert!(im.iter().all(|&w| w == 0.0));
    }

    #[test]
    fn companion_roots() {
        // x⁴ - 10x³ + 35x² - 50x + 24 = (x-1)(x-2)(x-3)(x-4)
        let a = DenseMatrix::from_rows(4, 4, &[
            0.0, 0.0, 0.0, -24.0, 1.0, 0.0, 0.0, 50.0, 0.0, 1.0, 0.0, -35.0, 0.0, 0.0, 1.0, 10.0,
        ]);
        let (s, q) = schur(&a);
        verify(&a, &s, &q);
        let (mut re, _) = schur_eigenvalues(&s);
        re.sort_by(|a, b| a.partial_cmp(b).unwrap());
        for (i, &r) in re.iter().enumerate() {
            assert_near(r, (i + 1) as f64, 1e-9, "root");
        }
    }

    #[test]
    fn back_substitution_solves_schur_form() {
        // Eigenvalues 2, 1 ± 2i and -3, the pair in the middle block
        let s = DenseMatrix::from_rows(4, 4, &[
            2.0, 1.0, 3.0, -1.0, 0.0, 1.0, 4.0, 2.0, 0.0, -1.0, 1.0, 0.5, 0.0, 0.0, 0.0, -3.0,
        ]);
        let (re, im) = schur_eigenvalues(&s);
        assert_eq!(re, vec![2.0, 1.0, 1.0, -3.0]);
        assert_eq!(im, vec![0.0, 2.0, -2.0, 0.0]);
        let mut y = DenseMatrix::zeros(4, 4);
        schur_eigenvectors(&s, &re, &im, &mut y);

        let mut d = DenseMatrix::zeros(4, 4);
        for i in 0..4 {
            d[(i, i)] = re[i];
            if im[i] > 0.0 {
                d[(i, i + 1)] = im[i];
                d[(i + 1, i)] = -im[i];
            }
        }
        let sy: DenseMatrix<f64> = matmul(&s, &y).unwrap();
        let yd: DenseMatrix<f64> = matmul(&y, &d).unwrap();
        assert!(approx_eq(&sy, &yd, 1e-12), "SY = {:?}\nYD = {:?}", sy, yd);
        assert!(y.as_slice().iter().all(|x| x.abs() <= 4.0));
        assert_eq!(y[(3, 3)], 1.0);
    }

    #[test]
    fn tiny_scale_converges() {
        let a = DenseMatrix::from_rows(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0]);
        let small = a.map(|x| x * 1e-20);
        let (s, q) = schur(&small);
        let qs: DenseMatrix<f64> = matmul(&q, &s).unwrap();
        let back: DenseMatrix<f64> = matmul(&qs, &q.transpose()).unwrap();
        assert!(approx_eq(&back.map(|x| x * 1e20), &a, 1e-9));

        let (mut re, _) = schur_eigenvalues(&s);
        let (mut expected, _) = schur_eigenvalues(&schur(&a).0);
        re.sort_by(|x, y| x.partial_cmp(y).unwrap());
        expected.sort_by(|x, y| x.partial_cmp(y).unwrap());
        for (r, e) in re.iter().zip(&expected) {
            assert_near(r * 1e20, *e, 1e-9, "scaled eigenvalue");
        }
    }

    #[test]
    fn defective_block_is_guarded() {
        let s = DenseMatrix::from_rows(2, 2, &[2.0, 1.0, 0.0, 2.0]);
        let (re, im) = schur_eigenvalues(&s);
        let mut y = DenseMatrix::zeros(2, 2);
        schur_eigenvectors(&s, &re, &im, &mut y);
        assert!(y.as_slice().iter().all(|x| x.is_finite()));
        assert_eq!(y[(1, 1)], 1.0);
    }

    #[test]
    fn sweep_cap() {
        let a = DenseMatrix::from_rows(4, 4, &[
            1.0, 2.0, 0.0, 3.0, -2.0, 1.0, 4.0, 0.0, 0.0, -4.0, 1.0, 2.0, 1.0, 0.0, -2.0, 1.0,
        ]);
        let mut s = a.clone();
        let mut q = DenseMatrix::zeros(4, 4);
        hessenberg(&mut s, &mut q);
        assert_eq!(
            francis_qr(&mut s, &mut q, 1),
            Err(LinalgError::ConvergenceFailure { iterations: 1 })
        );
    }
}
