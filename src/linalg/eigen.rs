use std::cmp::Ordering;
use std::sync::OnceLock;

use log::{debug, warn};

use crate::dense::util::{has_non_finite, is_symmetric, matmul};
use crate::linalg::hessenberg::hessenberg;
use crate::linalg::schur::{francis_qr, schur_eigenvalues, schur_eigenvectors, standardize_blocks};
use crate::linalg::symmetric_eigen::{tridiagonal_qr_with_vecs, tridiagonalize};
use crate::linalg::{iteration_budget, require_square, LinalgError, LuDecomposition, NonFinitePolicy};
use crate::traits::{FloatScalar, MatrixMut, MatrixStorage};

/// Options for [`EigenvalueDecomposition`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct EigenOptions {
    /// Take the symmetric path without checking `A == Aᵀ`.
    pub assume_symmetric: bool,
    /// Order eigenvalues by descending real part. A conjugate pair moves as
    /// one block.
    pub sort: bool,
    /// Sweep cap for the QR iteration; `None` means `30 * n`.
    pub max_iterations: Option<usize>,
    pub non_finite: NonFinitePolicy,
}

impl EigenOptions {
    pub fn with_assume_symmetric(mut self, on: bool) -> Self {
        self.assume_symmetric = on;
        self
    }

    pub fn with_sort(mut self, on: bool) -> Self {
        self.sort = on;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = Some(max_iterations);
        self
    }

    pub fn with_non_finite(mut self, policy: NonFinitePolicy) -> Self {
        self.non_finite = policy;
        self
    }
}

/// Eigendecomposition of a square matrix: `A·V = V·D`.
///
/// A symmetric input gets real eigenvalues in ascending order and an
/// orthogonal V. Otherwise the real Schur form is computed and each
/// complex-conjugate pair `a ± b·i` (`b > 0` listed first) occupies two
/// adjacent positions: D holds the real block `[[a, b], [-b, a]]` there and
/// the matching columns of V hold the real and imaginary parts of the
/// eigenvector for `a + b·i`. Real-only columns are scaled to unit norm;
/// a pair is scaled jointly.
///
/// # Example
///
/// ```
/// use dense_decomp::{DenseMatrix, EigenvalueDecomposition};
///
/// // Rotation by 90°: eigenvalues ±i
/// let a = DenseMatrix::from_rows(2, 2, &[0.0_f64, -1.0, 1.0, 0.0]);
/// let eig = EigenvalueDecomposition::new(&a).unwrap();
/// assert_eq!(eig.real_eigenvalues(), &[0.0, 0.0]);
/// assert!((eig.imaginary_eigenvalues()[0] - 1.0).abs() < 1e-12);
///
/// let d = eig.diagonal_matrix();
/// assert!((d[(0, 1)] - 1.0).abs() < 1e-12);
/// assert!((d[(1, 0)] + 1.0).abs() < 1e-12);
/// ```
#[derive(Debug)]
pub struct EigenvalueDecomposition<T, M> {
    re: Vec<T>,
    im: Vec<T>,
    v: M,
    symmetric: bool,
    diagonal: OnceLock<M>,
}

impl<T: FloatScalar, M: MatrixStorage<T>> EigenvalueDecomposition<T, M> {
    pub fn new(a: &M) -> Result<Self, LinalgError> {
        Self::with_options(a, EigenOptions::default())
    }

    pub fn with_options(a: &M, options: EigenOptions) -> Result<Self, LinalgError> {
        let n = require_square(a)?;
        options.non_finite.check(a)?;
        let symmetric = options.assume_symmetric || is_symmetric(a, T::zero());
        let budget = iteration_budget(options.max_iterations, n, n);

        let (re, im, v) = if symmetric {
            symmetric_path(a, budget)?
        } else {
            general_path(a, budget)?
        };

        let mut eig = Self {
            re,
            im,
            v,
            symmetric,
            diagonal: OnceLock::new(),
        };
        if options.sort {
            eig.sort_descending();
        }
        Ok(eig)
    }

    /// Assemble from parts already in the documented layout.
    pub(crate) fn from_parts(re: Vec<T>, im: Vec<T>, v: M, symmetric: bool) -> Self {
        Self {
            re,
            im,
            v,
            symmetric,
            diagonal: OnceLock::new(),
        }
    }

    pub(crate) fn into_parts(self) -> (Vec<T>, Vec<T>, M) {
        (self.re, self.im, self.v)
    }

    fn sort_descending(&mut self) {
        let n = self.re.len();
        let mut blocks = Vec::with_capacity(n);
        let mut i = 0;
        while i < n {
            let len = if self.im[i] > T::zero() && i + 1 < n { 2 } else { 1 };
            blocks.push((i, len));
            i += len;
        }
        blocks.sort_by(|&(a, _), &(b, _)| {
            self.re[b].partial_cmp(&self.re[a]).unwrap_or(Ordering::Equal)
        });

        let order: Vec<usize> = blocks
            .iter()
            .flat_map(|&(start, len)| start..start + len)
            .collect();
        let re = order.iter().map(|&j| self.re[j]).collect();
        let im = order.iter().map(|&j| self.im[j]).collect();
        let mut v = M::zeros(n, n);
        for row in 0..n {
            for (dst, &src) in order.iter().enumerate() {
                *v.get_mut(row, dst) = *self.v.get(row, src);
            }
        }
        self.re = re;
        self.im = im;
        self.v = v;
    }

    /// Real parts of the eigenvalues.
    #[inline]
    pub fn real_eigenvalues(&self) -> &[T] {
        &self.re
    }

    /// Imaginary parts of the eigenvalues; zero for real eigenvalues.
    #[inline]
    pub fn imaginary_eigenvalues(&self) -> &[T] {
        &self.im
    }

    /// Eigenvalues as `(re, im)` pairs.
    pub fn eigenvalues(&self) -> Vec<(T, T)> {
        self.re.iter().copied().zip(self.im.iter().copied()).collect()
    }

    /// Eigenvector matrix V.
    #[inline]
    pub fn eigenvectors(&self) -> &M {
        &self.v
    }

    /// Whether the symmetric path was taken.
    #[inline]
    pub fn is_symmetric(&self) -> bool {
        self.symmetric
    }

    /// Block diagonal D, cached.
    pub fn diagonal_matrix(&self) -> &M {
        self.diagonal.get_or_init(|| block_diagonal(&self.re, &self.im))
    }

    /// Rebuild `A = V·D·V⁻¹`. The symmetric path uses `Vᵀ` for the inverse.
    pub fn reverse(&self) -> Result<M, LinalgError> {
        let vd: M = matmul(&self.v, self.diagonal_matrix())?;
        if self.symmetric {
            let n = self.v.nrows();
            let mut a = M::zeros(n, n);
            for i in 0..n {
                for j in 0..n {
                    let row = vd.row_as_slice(i, 0);
                    let vj = self.v.row_as_slice(j, 0);
                    *a.get_mut(i, j) = row.iter().zip(vj).fold(T::zero(), |s, (&x, &y)| s + x * y);
                }
            }
            return Ok(a);
        }
        let lu = LuDecomposition::new(&self.v)?;
        matmul(&vd, lu.inverse()?)
    }
}

/// Block-diagonal D for eigenvalues in the pair layout.
pub(crate) fn block_diagonal<T: FloatScalar, M: MatrixStorage<T>>(re: &[T], im: &[T]) -> M {
    let n = re.len();
    let mut d = M::zeros(n, n);
    for i in 0..n {
        *d.get_mut(i, i) = re[i];
        if im[i] > T::zero() && i + 1 < n {
            *d.get_mut(i, i + 1) = im[i];
            *d.get_mut(i + 1, i) = -im[i];
        }
    }
    d
}

fn poisoned<T: FloatScalar, M: MatrixStorage<T>>(n: usize) -> (Vec<T>, Vec<T>, M) {
    let mut v = M::zeros(n, n);
    for i in 0..n {
        v.row_as_mut_slice(i, 0).iter_mut().for_each(|x| *x = T::nan());
    }
    (vec![T::nan(); n], vec![T::zero(); n], v)
}

fn symmetric_path<T: FloatScalar, M: MatrixStorage<T>>(
    a: &M,
    budget: usize,
) -> Result<(Vec<T>, Vec<T>, M), LinalgError> {
    let n = a.nrows();
    let mut d = vec![T::zero(); n];
    let mut e = vec![T::zero(); n];
    let mut v = M::zeros(n, n);
    tridiagonalize(a, &mut d, &mut e, &mut v);

    if d.iter().chain(e.iter()).any(|x| !x.is_finite()) {
        warn!("eigen: non-finite values after tridiagonalization, skipping QR iteration");
        return Ok(poisoned(n));
    }
    let sweeps = tridiagonal_qr_with_vecs(&mut d, &mut e[..n.saturating_sub(1)], &mut v, budget)?;
    debug!("eigen: symmetric {}x{} converged in {} sweeps", n, n, sweeps);
    Ok((d, vec![T::zero(); n], v))
}

fn general_path<T: FloatScalar, M: MatrixStorage<T>>(
    a: &M,
    budget: usize,
) -> Result<(Vec<T>, Vec<T>, M), LinalgError> {
    let n = a.nrows();
    let mut s = a.clone();
    let mut q = M::zeros(n, n);
    hessenberg(&mut s, &mut q);

    if has_non_finite(&s) {
        warn!("eigen: non-finite values after Hessenberg reduction, skipping QR iteration");
        return Ok(poisoned(n));
    }
    let sweeps = francis_qr(&mut s, &mut q, budget)?;
    debug!("eigen: general {}x{} converged in {} sweeps", n, n, sweeps);

    standardize_blocks(&mut s, &mut q);
    let (re, im) = schur_eigenvalues(&s);
    let mut y = M::zeros(n, n);
    schur_eigenvectors(&s, &re, &im, &mut y);
    let mut v: M = matmul(&q, &y)?;
    normalize_columns(&mut v, &im);
    Ok((re, im, v))
}

/// Unit-norm columns; a conjugate pair shares one norm.
fn normalize_columns<T: FloatScalar>(v: &mut impl MatrixMut<T>, im: &[T]) {
    let n = v.nrows();
    let mut j = 0;
    while j < im.len() {
        let cols = if im[j] > T::zero() { j..j + 2 } else { j..j + 1 };
        let mut norm_sq = T::zero();
        for c in cols.clone() {
            for i in 0..n {
                let x = *v.get(i, c);
                norm_sq = norm_sq + x * x;
            }
        }
        let norm = norm_sq.sqrt();
        if norm > T::zero() {
            for c in cols.clone() {
                for i in 0..n {
                    *v.get_mut(i, c) = *v.get(i, c) / norm;
                }
            }
        }
        j = cols.end;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::util::{approx_eq, matmul_transpose_left};
    use crate::{DenseMatrix, JaggedMatrix};

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

    fn eig(a: &DenseMatrix<f64>) -> EigenvalueDecomposition<f64, DenseMatrix<f64>> {
        EigenvalueDecomposition::new(a).unwrap()
    }

    fn assert_av_vd(a: &DenseMatrix<f64>, e: &EigenvalueDecomposition<f64, DenseMatrix<f64>>, tol: f64) {
        let av: DenseMatrix<f64> = matmul(a, e.eigenvectors()).unwrap();
        let vd: DenseMatrix<f64> = matmul(e.eigenvectors(), e.diagonal_matrix()).unwrap();
        assert!(approx_eq(&av, &vd, tol), "AV = {:?}\nVD = {:?}", av, vd);
    }

    #[test]
    fn symmetric_ascending_orthogonal() {
        let a = DenseMatrix::from_rows(3, 3, &[4.0, 1.0, -2.0, 1.0, 2.0, 0.0, -2.0, 0.0, 3.0]);
        let e = eig(&a);
        assert!(e.is_symmetric());
        let re = e.real_eigenvalues();
        assert!(re.windows(2).all(|w| w[0] <= w[1]));
        assert!(e.imaginary_eigenvalues().iter().all(|&x| x == 0.0));
        assert_near(re.iter().sum::<f64>(), 9.0, TOL, "trace");
        let vtv: DenseMatrix<f64> = matmul_transpose_left(e.eigenvectors(), e.eigenvectors()).unwrap();
        assert!(approx_eq(&vtv, &DenseMatrix::eye(3), 1e-12));
        assert_av_vd(&a, &e, 1e-10);
        assert!(approx_eq(&e.reverse().unwrap(), &a, 1e-10));
    }

    #[test]
    fn known_symmetric_2x2() {
        let e = eig(&DenseMatrix::from_rows(2, 2, &[2.0, 1.0, 1.0, 2.0]));
        assert_near(e.real_eigenvalues()[0], 1.0, TOL, "λ0");
        assert_near(e.real_eigenvalues()[1], 3.0, TOL, "λ1");
    }

    #[test]
    fn general_real_spectrum() {
        let a = DenseMatrix::from_rows(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0]);
        let e = eig(&a);
        assert!(!e.is_symmetric());
        assert!(e.imaginary_eigenvalues().iter().all(|&x| x == 0.0));
        assert_av_vd(&a, &e, 1e-9);
        assert!(approx_eq(&e.reverse().unwrap(), &a, 1e-9));
        for j in 0..3 {
            let norm: f64 = (0..3).map(|i| e.eigenvectors()[(i, j)].powi(2)).sum();
            assert_near(norm, 1.0, 1e-12, "unit column");
        }
    }

    #[test]
    fn tiny_scale_matches_unscaled() {
        let sorted = EigenOptions::default().with_sort(true);
        for base in [
            DenseMatrix::<f64>::from_rows(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0]),
            DenseMatrix::from_rows(3, 3, &[4.0, 1.0, -2.0, 1.0, 2.0, 0.0, -2.0, 0.0, 3.0]),
            DenseMatrix::from_rows(3, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]),
        ] {
            let small = base.map(|x| x * 1e-20);
            let e0 = EigenvalueDecomposition::with_options(&base, sorted).unwrap();
            let e = EigenvalueDecomposition::with_options(&small, sorted).unwrap();
            assert_eq!(e.is_symmetric(), e0.is_symmetric());
            for (x, y) in e.eigenvalues().iter().zip(e0.eigenvalues()) {
                assert_near(x.0 * 1e20, y.0, 1e-9, "re");
                assert_near(x.1 * 1e20, y.1, 1e-9, "im");
            }
            assert!(approx_eq(&e.reverse().unwrap().map(|x| x * 1e20), &base, 1e-9));
        }
    }

    #[test]
    fn complex_pair_layout() {
        let a = DenseMatrix::from_rows(3, 3, &[0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 1.0, 0.0, 0.0]);
        let e = eig(&a);
        let im = e.imaginary_eigenvalues();
        let k = im.iter().position(|&w| w > 0.0).unwrap();
        assert_near(im[k], 3.0_f64.sqrt() / 2.0, TOL, "im");
        assert_near(im[k + 1], -(3.0_f64.sqrt()) / 2.0, TOL, "conj");
        assert_near(e.real_eigenvalues()[k], -0.5, TOL, "re");
        let d = e.diagonal_matrix();
        assert_near(d[(k, k + 1)], im[k], TOL, "D upper");
        assert_near(d[(k + 1, k)], -im[k], TOL, "D lower");
        assert_av_vd(&a, &e, 1e-10);
        assert!(approx_eq(&e.reverse().unwrap(), &a, 1e-10));
    }

    #[test]
    fn companion_with_mixed_spectrum() {
        let a = DenseMatrix::from_rows(4, 4, &[
            1.0, 2.0, 0.0, 3.0, -2.0, 1.0, 4.0, 0.0, 0.0, -4.0, 1.0, 2.0, 1.0, 0.0, -2.0, 1.0,
        ]);
        let e = eig(&a);
        assert_av_vd(&a, &e, 1e-9);
        let trace: f64 = e.real_eigenvalues().iter().sum();
        assert_near(trace, 4.0, 1e-9, "trace");
    }

    #[test]
    fn defective_matrix_stays_finite() {
        let a = DenseMatrix::from_rows(2, 2, &[2.0, 1.0, 0.0, 2.0]);
        let e = eig(&a);
        assert_eq!(e.real_eigenvalues(), &[2.0, 2.0]);
        assert!(e.eigenvectors().as_slice().iter().all(|x| x.is_finite()));
        assert_av_vd(&a, &e, 1e-12);
    }

    #[test]
    fn sort_descending_moves_pairs() {
        // Block diagonal: eigenvalue 1, pair 3 ± 2i, eigenvalue 5
        let a = DenseMatrix::from_rows(4, 4, &[
            1.0, 0.0, 0.0, 0.0, 0.0, 3.0, 2.0, 0.0, 0.0, -2.0, 3.0, 0.0, 0.0, 0.0, 0.0, 5.0,
        ]);
        let e = EigenvalueDecomposition::with_options(&a, EigenOptions::default().with_sort(true))
            .unwrap();
        let re = e.real_eigenvalues();
        let im = e.imaginary_eigenvalues();
        assert_near(re[0], 5.0, TOL, "first");
        assert_near(re[1], 3.0, TOL, "pair re");
        assert_near(re[2], 3.0, TOL, "pair re");
        assert!(im[1] > 0.0 && im[2] < 0.0);
        assert_near(re[3], 1.0, TOL, "last");
        assert_av_vd(&a, &e, 1e-10);
    }

    #[test]
    fn assume_symmetric_skips_check() {
        let a = DenseMatrix::from_rows(2, 2, &[2.0, 1.0, 1.0 + 1e-14, 2.0]);
        assert!(!eig(&a).is_symmetric());
        let e = EigenvalueDecomposition::with_options(
            &a,
            EigenOptions::default().with_assume_symmetric(true),
        )
        .unwrap();
        assert!(e.is_symmetric());
    }

    #[test]
    fn diagonal_matrix_cached() {
        let e = eig(&DenseMatrix::from_rows(2, 2, &[1.0, 2.0, 3.0, 4.0]));
        assert!(std::ptr::eq(e.diagonal_matrix(), e.diagonal_matrix()));
        assert!(std::ptr::eq(e.eigenvectors(), e.eigenvectors()));
    }

    #[test]
    fn not_square() {
        let a = DenseMatrix::<f64>::zeros(2, 3);
        assert_eq!(
            EigenvalueDecomposition::new(&a).unwrap_err(),
            LinalgError::NotSquare { nrows: 2, ncols: 3 }
        );
    }

    #[test]
    fn iteration_cap_reports_failure() {
        let a = DenseMatrix::from_rows(4, 4, &[
            1.0, 2.0, 0.0, 3.0, -2.0, 1.0, 4.0, 0.0, 0.0, -4.0, 1.0, 2.0, 1.0, 0.0, -2.0, 1.0,
        ]);
        let opts = EigenOptions::default().with_max_iterations(1);
        assert_eq!(
            EigenvalueDecomposition::with_options(&a, opts).unwrap_err(),
            LinalgError::ConvergenceFailure { iterations: 1 }
        );
    }

    #[test]
    fn nan_propagates_or_rejects() {
        let a = DenseMatrix::from_rows(2, 2, &[1.0, f64::NAN, 0.0, 1.0]);
        let e = eig(&a);
        assert!(e.real_eigenvalues().iter().all(|x| x.is_nan()));
        assert!(e.eigenvectors().as_slice().iter().all(|x| x.is_nan()));

        let opts = EigenOptions::default().with_non_finite(NonFinitePolicy::Reject);
        assert_eq!(
            EigenvalueDecomposition::with_options(&a, opts).unwrap_err(),
            LinalgError::NonFinite { row: 0, col: 1 }
        );
    }

    #[test]
    fn jagged_storage_matches_dense() {
        let a = DenseMatrix::from_rows(3, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 10.0]);
        let ed = eig(&a);
        let ej = EigenvalueDecomposition::new(&JaggedMatrix::from(&a)).unwrap();
        assert_eq!(ed.real_eigenvalues(), ej.real_eigenvalues());
        assert_eq!(DenseMatrix::from(ej.eigenvectors()), *ed.eigenvectors());
    }

    #[test]
    fn f32_support() {
        let a = DenseMatrix::from_rows(2, 2, &[2.0_f32, 1.0, 1.0, 2.0]);
        let e = EigenvalueDecomposition::new(&a).unwrap();
        assert!((e.real_eigenvalues()[1] - 3.0).abs() < 1e-5);
    }
}
