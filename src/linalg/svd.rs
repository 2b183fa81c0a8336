use std::sync::OnceLock;

use log::{debug, warn};

use crate::dense::util::{diagonal, transpose};
use crate::linalg::symmetric_eigen::givens;
use crate::linalg::{
    householder_cutoff_sq, iteration_budget, require_rows, LinalgError, NonFinitePolicy,
};
use crate::traits::{FloatScalar, MatrixMut, MatrixRef, MatrixStorage};

// ── Householder bidiagonalization ───────────────────────────────────

/// Householder bidiagonalization: reduce an M×N matrix (M ≥ N) to upper
/// bidiagonal form via orthogonal transforms.
///
/// On return:
/// - `diag[0..n]` contains the bidiagonal diagonal
/// - `off_diag[0..n-1]` contains the bidiagonal superdiagonal
/// - `u` (M×M) accumulates the left orthogonal transform
/// - `v` (N×N) accumulates the right orthogonal transform
///
/// The result satisfies `A = U · B · Vᵀ` where B = bidiag(diag, off_diag).
/// A NaN anywhere in a column is carried into the bidiagonal entries.
pub(crate) fn bidiagonalize<T: FloatScalar>(
    a: &mut impl MatrixMut<T>,
    diag: &mut [T],
    off_diag: &mut [T],
    u: &mut impl MatrixMut<T>,
    v: &mut impl MatrixMut<T>,
    compute_u: bool,
    compute_v: bool,
) {
    let m = a.nrows();
    let n = a.ncols();
    assert!(m >= n, "bidiagonalize requires M >= N");
    assert!(diag.len() >= n);
    assert!(off_diag.len() + 1 >= n);

    let tiny = householder_cutoff_sq(&*a);

    if compute_u {
        for i in 0..m {
            for j in 0..m {
                *u.get_mut(i, j) = if i == j { T::one() } else { T::zero() };
            }
        }
    }
    if compute_v {
        for i in 0..n {
            for j in 0..n {
                *v.get_mut(i, j) = if i == j { T::one() } else { T::zero() };
            }
        }
    }

    for k in 0..n {
        // ── Left Householder: zero out a[k+1:m, k] ──
        let mut norm_sq = T::zero();
        for i in k..m {
            let val = *a.get(i, k);
            norm_sq = norm_sq + val * val;
        }

        if norm_sq <= tiny {
            diag[k] = *a.get(k, k);
        } else {
            let norm = norm_sq.sqrt();
            let akk = *a.get(k, k);
            let sigma = if akk < T::zero() { -norm } else { norm };

            let v0 = akk + sigma;
            *a.get_mut(k, k) = v0;

            for i in (k + 1)..m {
                let val = *a.get(i, k) / v0;
                *a.get_mut(i, k) = val;
            }

            let tau = v0 / sigma;

            // Apply to trailing columns: A[k:m, k+1:n] -= tau * v * (vᵀ * A)
            for j in (k + 1)..n {
                let mut dot = *a.get(k, j);
                for i in (k + 1)..m {
                    dot = dot + *a.get(i, k) * *a.get(i, j);
                }
                dot = dot * tau;

                *a.get_mut(k, j) = *a.get(k, j) - dot;
                for i in (k + 1)..m {
                    let vi = *a.get(i, k);
                    *a.get_mut(i, j) = *a.get(i, j) - dot * vi;
                }
            }

            // Accumulate U: U = U * H_L
            if compute_u {
                for row in 0..m {
                    let mut dot = *u.get(row, k);
                    for i in (k + 1)..m {
                        dot = dot + *u.get(row, i) * *a.get(i, k);
                    }
                    dot = dot * tau;

                    *u.get_mut(row, k) = *u.get(row, k) - dot;
                    for i in (k + 1)..m {
                        let vi = *a.get(i, k);
                        *u.get_mut(row, i) = *u.get(row, i) - dot * vi;
                    }
                }
            }

            diag[k] = -sigma;
        }

        // ── Right Householder: zero out a[k, k+2:n] ──
        if k + 2 <= n.saturating_sub(1) {
            let mut norm_sq = T::zero();
            for j in (k + 1)..n {
                let val = *a.get(k, j);
                norm_sq = norm_sq + val * val;
            }

            if norm_sq <= tiny {
                off_diag[k] = *a.get(k, k + 1);
            } else {
                let norm = norm_sq.sqrt();
                let ak_k1 = *a.get(k, k + 1);
                let sigma = if ak_k1 < T::zero() { -norm } else { norm };

                let v0 = ak_k1 + sigma;
                *a.get_mut(k, k + 1) = v0;

                for j in (k + 2)..n {
                    let val = *a.get(k, j) / v0;
                    *a.get_mut(k, j) = val;
                }

                let tau = v0 / sigma;

                // Apply from the right to rows k+1..m
                for i in (k + 1)..m {
                    let mut dot = *a.get(i, k + 1);
                    for j in (k + 2)..n {
                        dot = dot + *a.get(i, j) * *a.get(k, j);
                    }
                    dot = dot * tau;

                    *a.get_mut(i, k + 1) = *a.get(i, k + 1) - dot;
                    for j in (k + 2)..n {
                        let vj = *a.get(k, j);
                        *a.get_mut(i, j) = *a.get(i, j) - dot * vj;
                    }
                }

                // Accumulate V: V = V * H_R
                if compute_v {
                    for row in 0..n {
                        let mut dot = *v.get(row, k + 1);
                        for j in (k + 2)..n {
                            dot = dot + *v.get(row, j) * *a.get(k, j);
                        }
                        dot = dot * tau;

                        *v.get_mut(row, k + 1) = *v.get(row, k + 1) - dot;
                        for j in (k + 2)..n {
                            let vj = *a.get(k, j);
                            *v.get_mut(row, j) = *v.get(row, j) - dot * vj;
                        }
                    }
                }

                off_diag[k] = -sigma;
            }
        } else if k + 1 < n {
            off_diag[k] = *a.get(k, k + 1);
        }
    }
}

// ── Golub-Kahan bidiagonal QR ───────────────────────────────────────

/// Golub-Kahan implicit-shift QR iteration on a bidiagonal matrix.
///
/// On entry:
/// - `diag[0..n]`: bidiagonal diagonal entries
/// - `off_diag[0..n-1]`: bidiagonal superdiagonal entries
/// - `u`, `v`: orthogonal matrices to accumulate rotations into
/// - `compute_u`, `compute_v`: whether to actually accumulate
///
/// On return:
/// - `diag` contains non-negative singular values sorted descending
/// - `off_diag` is zeroed
/// - `ordering[i]` is the position `diag[i]` held before the final sort
///
/// Returns the number of sweeps performed.
pub(crate) fn bidiagonal_qr<T: FloatScalar>(
    diag: &mut [T],
    off_diag: &mut [T],
    u: &mut impl MatrixMut<T>,
    v: &mut impl MatrixMut<T>,
    compute_u: bool,
    compute_v: bool,
    ordering: &mut [usize],
    max_iter: usize,
) -> Result<usize, LinalgError> {
    let n = diag.len();
    for (i, o) in ordering.iter_mut().enumerate() {
        *o = i;
    }

    let eps = T::epsilon();
    let b_norm = diag
        .iter()
        .chain(&off_diag[..n.saturating_sub(1)])
        .fold(T::zero(), |s, &x| s.max(x.abs()));
    let mut iter = 0usize;
    let mut hi = n.saturating_sub(1);

    while hi > 0 {
        // Deflation: check if trailing off_diag is negligible
        {
            let threshold = eps * (diag[hi - 1].abs() + diag[hi].abs());
            if off_diag[hi - 1].abs() <= threshold {
                off_diag[hi - 1] = T::zero();
                hi -= 1;
                continue;
            }
        }

        // Find lo: start of unreduced block
        let mut lo = hi - 1;
        while lo > 0 {
            let threshold = eps * (diag[lo - 1].abs() + diag[lo].abs());
            if off_diag[lo - 1].abs() <= threshold {
                off_diag[lo - 1] = T::zero();
                break;
            }
            lo -= 1;
        }

        iter += 1;
        if iter > max_iter {
            warn!("svd: bidiagonal QR did not converge in {} sweeps", max_iter);
            return Err(LinalgError::ConvergenceFailure {
                iterations: max_iter,
            });
        }

        // A zero on the diagonal breaks the Wilkinson shift. Chase the
        // matching off-diagonal entry to zero with left rotations, which
        // splits the block.
        {
            let mut found_zero = false;
            for idx in lo..hi {
                if diag[idx].abs() <= eps * b_norm {
                    diag[idx] = T::zero();
                    let mut z = off_diag[idx];
                    off_diag[idx] = T::zero();
                    for j in (idx + 1)..=hi {
                        let (c, s) = givens(diag[j], z);
                        diag[j] = c * diag[j] + s * z;
                        if j < hi {
                            z = -s * off_diag[j];
                            off_diag[j] = c * off_diag[j];
                        }
                        if compute_u {
                            for row in 0..u.nrows() {
                                let uj = *u.get(row, j);
                                let ui = *u.get(row, idx);
                                *u.get_mut(row, j) = c * uj + s * ui;
                                *u.get_mut(row, idx) = c * ui - s * uj;
                            }
                        }
                    }
                    found_zero = true;
                    break;
                }
            }
            if found_zero {
                continue;
            }
        }

        // Wilkinson shift from trailing 2×2 of BᵀB
        let d_hi = diag[hi];
        let d_hi1 = diag[hi - 1];
        let e_hi1 = off_diag[hi - 1];
        let e_hi2 = if hi >= 2 && hi - 2 >= lo {
            off_diag[hi - 2]
        } else {
            T::zero()
        };

        let t11 = d_hi1 * d_hi1 + e_hi2 * e_hi2;
        let t12 = d_hi1 * e_hi1;
        let t22 = d_hi * d_hi + e_hi1 * e_hi1;

        let two = T::one() + T::one();
        let d = (t11 - t22) / two;
        let sign_d = if d >= T::zero() { T::one() } else { -T::one() };
        let mu = t22 - t12 * t12 / (d + sign_d * (d * d + t12 * t12).sqrt());

        // Implicit QR chase
        let mut x = diag[lo] * diag[lo] - mu;
        let mut z = diag[lo] * off_diag[lo];

        for k in lo..hi {
            // Right Givens rotation on columns k, k+1: zero z
            let (c, s) = givens(x, z);

            if k > lo {
                off_diag[k - 1] = c * x + s * z;
            }

            let dk = diag[k];
            let ek = off_diag[k];
            let dk1 = diag[k + 1];

            diag[k] = c * dk + s * ek;
            off_diag[k] = c * ek - s * dk;
            let bulge = s * dk1;
            diag[k + 1] = c * dk1;

            if compute_v {
                for row in 0..v.nrows() {
                    let vk = *v.get(row, k);
                    let vk1 = *v.get(row, k + 1);
                    *v.get_mut(row, k) = c * vk + s * vk1;
                    *v.get_mut(row, k + 1) = c * vk1 - s * vk;
                }
            }

            // Left Givens rotation on rows k, k+1: zero the bulge at B[k+1, k]
            let (c2, s2) = givens(diag[k], bulge);

            diag[k] = c2 * diag[k] + s2 * bulge;
            let old_ek = off_diag[k];
            let old_dk1 = diag[k + 1];
            off_diag[k] = c2 * old_ek + s2 * old_dk1;
            diag[k + 1] = c2 * old_dk1 - s2 * old_ek;

            if k + 1 < hi {
                // The fill-in at B[k, k+2] drives the next right rotation
                let old_ek1 = off_diag[k + 1];
                x = off_diag[k];
                z = s2 * old_ek1;
                off_diag[k + 1] = c2 * old_ek1;
            }

            if compute_u {
                for row in 0..u.nrows() {
                    let uk = *u.get(row, k);
                    let uk1 = *u.get(row, k + 1);
                    *u.get_mut(row, k) = c2 * uk + s2 * uk1;
                    *u.get_mut(row, k + 1) = c2 * uk1 - s2 * uk;
                }
            }
        }
    }

    // Make all singular values non-negative
    for i in 0..n {
        if diag[i] < T::zero() {
            diag[i] = -diag[i];
            if compute_u {
                for row in 0..u.nrows() {
                    let val = *u.get(row, i);
                    *u.get_mut(row, i) = -val;
                }
            }
        }
    }

    // Sort singular values descending, permute U and V columns
    for i in 0..n {
        let mut max_idx = i;
        for j in (i + 1)..n {
            if diag[j] > diag[max_idx] {
                max_idx = j;
            }
        }
        if max_idx != i {
            diag.swap(i, max_idx);
            ordering.swap(i, max_idx);
            if compute_u {
                swap_columns(u, i, max_idx);
            }
            if compute_v {
                swap_columns(v, i, max_idx);
            }
        }
    }

    Ok(iter)
}

fn swap_columns<T: Copy>(m: &mut impl MatrixMut<T>, a: usize, b: usize) {
    for row in 0..m.nrows() {
        let tmp = *m.get(row, a);
        *m.get_mut(row, a) = *m.get(row, b);
        *m.get_mut(row, b) = tmp;
    }
}

// ── SingularValueDecomposition ──────────────────────────────────────

/// Options for [`SingularValueDecomposition`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SvdOptions {
    /// Accumulate U. When off, U is returned zero-filled.
    pub compute_left: bool,
    /// Accumulate V. When off, V is returned zero-filled.
    pub compute_right: bool,
    /// Decompose `Aᵀ` for wide input and swap the factors back. When off,
    /// a wide matrix is rejected.
    pub auto_transpose: bool,
    /// Sweep cap for the QR iteration; `None` means `30 * max(m, n)`.
    pub max_iterations: Option<usize>,
    pub non_finite: NonFinitePolicy,
}

impl Default for SvdOptions {
    fn default() -> Self {
        Self {
            compute_left: true,
            compute_right: true,
            auto_transpose: true,
            max_iterations: None,
            non_finite: NonFinitePolicy::Propagate,
        }
    }
}

impl SvdOptions {
    pub fn with_compute_left(mut self, on: bool) -> Self {
        self.compute_left = on;
        self
    }

    pub fn with_compute_right(mut self, on: bool) -> Self {
        self.compute_right = on;
        self
    }

    pub fn with_auto_transpose(mut self, on: bool) -> Self {
        self.auto_transpose = on;
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

/// Thin singular value decomposition: `A = U · diag(σ) · Vᵀ`.
///
/// Works for any `m x n` matrix. With `k = min(m, n)`, U is `m x k`, V is
/// `n x k` and the `k` singular values are non-negative and sorted
/// descending. Values at or below [`threshold`](Self::threshold) are
/// treated as zero by the solving and rank queries.
///
/// # Example
///
/// ```
/// use dense_decomp::{DenseMatrix, SingularValueDecomposition};
///
/// let a = DenseMatrix::from_rows(2, 2, &[1.0_f64, 1.0, 2.0, 2.0]);
/// let svd = SingularValueDecomposition::new(&a).unwrap();
/// assert_eq!(svd.rank(), 1);
///
/// let pinv = svd.inverse().unwrap();
/// assert!((pinv[(0, 0)] - 0.1).abs() < 1e-12);
/// assert!((pinv[(0, 1)] - 0.2).abs() < 1e-12);
/// ```
#[derive(Debug)]
pub struct SingularValueDecomposition<T, M> {
    u: M,
    s: Vec<T>,
    v: M,
    ordering: Vec<usize>,
    nrows: usize,
    ncols: usize,
    has_left: bool,
    has_right: bool,
    diagonal: OnceLock<M>,
    inverse: OnceLock<M>,
}

impl<T: FloatScalar, M: MatrixStorage<T>> SingularValueDecomposition<T, M> {
    pub fn new(a: &M) -> Result<Self, LinalgError> {
        Self::with_options(a, SvdOptions::default())
    }

    pub fn with_options(a: &M, options: SvdOptions) -> Result<Self, LinalgError> {
        let mut work = a.clone();
        Self::new_in_place(&mut work, options)
    }

    /// Decompose using `a` as workspace.
    ///
    /// When auto-transposition applies, `a` is first replaced by its
    /// transpose. Its contents afterwards are unspecified.
    pub fn new_in_place(a: &mut M, options: SvdOptions) -> Result<Self, LinalgError> {
        options.non_finite.check(&*a)?;
        let (m, n) = (a.nrows(), a.ncols());
        let k = m.min(n);

        let transposed = m < n;
        if transposed && !options.auto_transpose {
            return Err(LinalgError::InvalidArgument {
                reason: "wide matrix with auto-transpose disabled",
            });
        }
        if transposed {
            *a = transpose(&*a);
        }
        let (rows, cols) = (a.nrows(), a.ncols());

        // Left/right of the work matrix swap roles when transposed.
        let (want_u, want_v) = if transposed {
            (options.compute_right, options.compute_left)
        } else {
            (options.compute_left, options.compute_right)
        };
        let mut u_work = if want_u { M::zeros(rows, rows) } else { M::zeros(0, 0) };
        let mut v_work = if want_v { M::zeros(cols, cols) } else { M::zeros(0, 0) };
        let mut diag = vec![T::zero(); cols];
        let mut off_diag = vec![T::zero(); cols];
        let mut ordering: Vec<usize> = (0..cols).collect();

        if k > 0 {
            bidiagonalize(a, &mut diag, &mut off_diag, &mut u_work, &mut v_work, want_u, want_v);

            let poisoned = diag.iter().chain(off_diag.iter()).any(|x| !x.is_finite());
            if poisoned {
                warn!("svd: non-finite values after bidiagonalization, skipping QR iteration");
                diag.iter_mut().for_each(|x| *x = T::nan());
            } else {
                let budget = iteration_budget(options.max_iterations, m, n);
                let sweeps = bidiagonal_qr(
                    &mut diag,
                    &mut off_diag[..cols - 1],
                    &mut u_work,
                    &mut v_work,
                    want_u,
                    want_v,
                    &mut ordering,
                    budget,
                )?;
                debug!("svd: {}x{} converged in {} sweeps", m, n, sweeps);
            }
        }

        let take = |full: &M, want: bool, r: usize| -> M {
            let mut thin = M::zeros(r, k);
            if want {
                for i in 0..r {
                    thin.row_as_mut_slice(i, 0).copy_from_slice(&full.row_as_slice(i, 0)[..k]);
                }
            }
            thin
        };
        let (u, v) = if transposed {
            (take(&v_work, want_v, m), take(&u_work, want_u, n))
        } else {
            (take(&u_work, want_u, m), take(&v_work, want_v, n))
        };

        Ok(Self {
            u,
            s: diag,
            v,
            ordering,
            nrows: m,
            ncols: n,
            has_left: options.compute_left,
            has_right: options.compute_right,
            diagonal: OnceLock::new(),
            inverse: OnceLock::new(),
        })
    }

    /// Singular values, sorted descending.
    #[inline]
    pub fn singular_values(&self) -> &[T] {
        &self.s
    }

    /// `diag(σ)` as a `k x k` matrix, cached.
    pub fn diagonal_matrix(&self) -> &M {
        self.diagonal.get_or_init(|| diagonal(&self.s))
    }

    /// Left singular vectors U (`m x k`), zero-filled if not computed.
    #[inline]
    pub fn left_singular_vectors(&self) -> &M {
        &self.u
    }

    /// Right singular vectors V (`n x k`), zero-filled if not computed.
    #[inline]
    pub fn right_singular_vectors(&self) -> &M {
        &self.v
    }

    /// `ordering()[i]` is the position singular value `i` held on the
    /// bidiagonal before sorting.
    #[inline]
    pub fn ordering(&self) -> &[usize] {
        &self.ordering
    }

    /// Cutoff below which a singular value counts as zero: `max(m, n)·σ₀·ε`.
    pub fn threshold(&self) -> T {
        let s0 = self.s.first().copied().unwrap_or_else(T::zero);
        T::from_usize(self.nrows.max(self.ncols)) * s0 * T::epsilon()
    }

    /// Number of singular values above [`threshold`](Self::threshold).
    pub fn rank(&self) -> usize {
        let tol = self.threshold();
        self.s.iter().filter(|&&s| s > tol).count()
    }

    /// Rank below `min(m, n)`.
    pub fn is_singular(&self) -> bool {
        self.rank() < self.s.len()
    }

    /// `σ_max / σ_min`; infinity if the smallest singular value is zero.
    pub fn condition(&self) -> T {
        match (self.s.first(), self.s.last()) {
            (Some(&hi), Some(&lo)) => {
                if lo == T::zero() {
                    T::infinity()
                } else {
                    hi / lo
                }
            }
            _ => T::one(),
        }
    }

    /// Spectral norm, the largest singular value.
    pub fn two_norm(&self) -> T {
        self.s.first().copied().unwrap_or_else(T::zero)
    }

    fn require_square(&self) -> Result<(), LinalgError> {
        if self.nrows == self.ncols {
            Ok(())
        } else {
            Err(LinalgError::NotSquare {
                nrows: self.nrows,
                ncols: self.ncols,
            })
        }
    }

    /// `|det A|` as the product of all singular values.
    pub fn absolute_determinant(&self) -> Result<T, LinalgError> {
        self.require_square()?;
        Ok(self.s.iter().fold(T::one(), |p, &s| p * s))
    }

    /// `ln |det A|`.
    pub fn log_determinant(&self) -> Result<T, LinalgError> {
        self.require_square()?;
        Ok(self.s.iter().fold(T::zero(), |acc, &s| acc + s.ln()))
    }

    /// Product of the singular values above the threshold.
    pub fn pseudo_determinant(&self) -> T {
        let tol = self.threshold();
        self.s.iter().filter(|&&s| s > tol).fold(T::one(), |p, &s| p * s)
    }

    pub fn log_pseudo_determinant(&self) -> T {
        let tol = self.threshold();
        self.s
            .iter()
            .filter(|&&s| s > tol)
            .fold(T::zero(), |acc, &s| acc + s.ln())
    }

    fn require_vectors(&self) -> Result<(), LinalgError> {
        if self.has_left && self.has_right {
            Ok(())
        } else {
            Err(LinalgError::InvalidArgument {
                reason: "both singular vector sets are required",
            })
        }
    }

    /// Reciprocals of the singular values, zero at or below the threshold.
    fn reciprocals(&self) -> Vec<T> {
        let tol = self.threshold();
        self.s
            .iter()
            .map(|&s| if s <= tol { T::zero() } else { T::one() / s })
            .collect()
    }

    /// Minimum-norm least-squares solution of `A·X = B`: `V·Σ⁺·Uᵀ·B`.
    pub fn solve(&self, b: &impl MatrixRef<T>) -> Result<M, LinalgError> {
        self.require_vectors()?;
        require_rows(b, self.nrows)?;
        let k = self.s.len();
        let nb = b.ncols();
        let inv = self.reciprocals();

        // Y = Σ⁺ Uᵀ B (k x nb)
        let mut y = M::zeros(k, nb);
        for p in 0..self.nrows {
            let b_row = b.row_as_slice(p, 0);
            for j in 0..k {
                let upj = *self.u.get(p, j);
                for (o, &bv) in y.row_as_mut_slice(j, 0).iter_mut().zip(b_row) {
                    *o = *o + upj * bv;
                }
            }
        }
        for j in 0..k {
            for o in y.row_as_mut_slice(j, 0) {
                *o = *o * inv[j];
            }
        }

        let mut x = M::zeros(self.ncols, nb);
        for i in 0..self.ncols {
            for j in 0..k {
                let vij = *self.v.get(i, j);
                for (o, &yv) in x.row_as_mut_slice(i, 0).iter_mut().zip(y.row_as_slice(j, 0)) {
                    *o = *o + vij * yv;
                }
            }
        }
        Ok(x)
    }

    pub fn solve_vec(&self, b: &[T]) -> Result<Vec<T>, LinalgError> {
        let mut col = M::zeros(b.len(), 1);
        for (i, &v) in b.iter().enumerate() {
            *col.get_mut(i, 0) = v;
        }
        let x = self.solve(&col)?;
        Ok((0..x.nrows()).map(|i| *x.get(i, 0)).collect())
    }

    /// Solve `A·X = diag(d)`, `d` of length `m`.
    pub fn solve_for_diagonal(&self, d: &[T]) -> Result<M, LinalgError> {
        self.require_vectors()?;
        if d.len() != self.nrows {
            return Err(LinalgError::DimensionMismatch {
                expected: (self.nrows, 1),
                got: (d.len(), 1),
            });
        }
        let inv = self.reciprocals();
        let k = self.s.len();
        let mut x = M::zeros(self.ncols, self.nrows);
        for i in 0..self.ncols {
            for j in 0..self.nrows {
                let mut sum = T::zero();
                for p in 0..k {
                    sum = sum + *self.v.get(i, p) * inv[p] * *self.u.get(j, p);
                }
                *x.get_mut(i, j) = sum * d[j];
            }
        }
        Ok(x)
    }

    /// Moore-Penrose pseudo-inverse `V·Σ⁺·Uᵀ` (`n x m`), cached.
    pub fn inverse(&self) -> Result<&M, LinalgError> {
        self.require_vectors()?;
        Ok(self.inverse.get_or_init(|| {
            let inv = self.reciprocals();
            let k = self.s.len();
            let mut x = M::zeros(self.ncols, self.nrows);
            for i in 0..self.ncols {
                for j in 0..self.nrows {
                    let mut sum = T::zero();
                    for p in 0..k {
                        sum = sum + *self.v.get(i, p) * inv[p] * *self.u.get(j, p);
                    }
                    *x.get_mut(i, j) = sum;
                }
            }
            x
        }))
    }

    /// Diagonal of the pseudo-inverse.
    pub fn inverse_diagonal(&self) -> Result<Vec<T>, LinalgError> {
        let pinv = self.inverse()?;
        Ok((0..self.nrows.min(self.ncols)).map(|i| *pinv.get(i, i)).collect())
    }

    /// Rebuild `A = U·diag(σ)·Vᵀ`.
    pub fn reverse(&self) -> Result<M, LinalgError> {
        self.require_vectors()?;
        let k = self.s.len();
        let mut a = M::zeros(self.nrows, self.ncols);
        for i in 0..self.nrows {
            for j in 0..self.ncols {
                let mut sum = T::zero();
                for p in 0..k {
                    sum = sum + *self.u.get(i, p) * self.s[p] * *self.v.get(j, p);
                }
                *a.get_mut(i, j) = sum;
            }
        }
        Ok(a)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dense::util::{approx_eq, matmul, matmul_transpose_left};
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

    fn svd(a: &DenseMatrix<f64>) -> SingularValueDecomposition<f64, DenseMatrix<f64>> {
        SingularValueDecomposition::new(a).unwrap()
    }

    fn assert_orthonormal_columns(q: &DenseMatrix<f64>, tol: f64) {
        let qtq: DenseMatrix<f64> = matmul_transpose_left(q, q).unwrap();
        assert!(approx_eq(&qtq, &DenseMatrix::eye(q.ncols()), tol), "QᵀQ = {:?}", qtq);
    }

    #[test]
    fn identity_3x3() {
        let s = svd(&DenseMatrix::eye(3));
        for i in 0..3 {
            assert_near(s.singular_values()[i], 1.0, TOL, &format!("σ[{}]", i));
        }
        assert_orthonormal_columns(s.left_singular_vectors(), TOL);
    }

    #[test]
    fn diagonal_with_negative() {
        let a = DenseMatrix::from_rows(2, 2, &[-3.0, 0.0, 0.0, 2.0]);
        let s = svd(&a);
        assert_near(s.singular_values()[0], 3.0, TOL, "σ[0]");
        assert_near(s.singular_values()[1], 2.0, TOL, "σ[1]");
    }

    #[test]
    fn known_2x2() {
        let a = DenseMatrix::from_rows(2, 2, &[3.0, 2.0, 2.0, 3.0]);
        let s = svd(&a);
        // AᵀA = [[13, 12], [12, 13]], eigenvalues 25 and 1
        assert_near(s.singular_values()[0], 5.0, TOL, "σ[0]");
        assert_near(s.singular_values()[1], 1.0, TOL, "σ[1]");
        assert_near(s.condition(), 5.0, TOL, "cond");
        assert_near(s.two_norm(), 5.0, TOL, "norm");
        assert_near(s.absolute_determinant().unwrap(), 5.0, TOL, "|det|");
        assert_near(s.log_determinant().unwrap(), 5.0_f64.ln(), TOL, "ln|det|");
    }

    #[test]
    fn results_follow_input_scale() {
        let base = DenseMatrix::from_rows(4, 4, &[
            4.0, 1.0, -2.0, 2.0, 1.0, 2.0, 0.0, 1.0, -2.0, 0.0, 3.0, -2.0, 2.0, 1.0, -2.0, -1.0,
        ]);
        let s0 = svd(&base);
        for scale in [1e-20, 1e20] {
            let s = svd(&base.map(|x| x * scale));
            for (x, y) in s.singular_values().iter().zip(s0.singular_values()) {
                assert_near(x / scale, *y, 1e-9, "scaled σ");
            }
            assert_eq!(s.rank(), s0.rank());
            assert!(approx_eq(&s.reverse().unwrap().map(|x| x / scale), &base, 1e-9));
        }

        let small = svd(&DenseMatrix::from_rows(2, 2, &[3e-20, 2e-20, 2e-20, 3e-20]));
        assert_near(small.singular_values()[0] * 1e20, 5.0, TOL, "σ[0]");
        assert_near(small.singular_values()[1] * 1e20, 1.0, TOL, "σ[1]");
    }

    #[test]
    fn reconstruction_and_orthogonality_tall() {
        let a = DenseMatrix::from_rows(5, 3, &[
            1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 0.0, 10.0, 11.0, 1.0, 13.0, 14.0, 2.0,
        ]);
        let s = svd(&a);
        assert_eq!(s.left_singular_vectors().nrows(), 5);
        assert_eq!(s.left_singular_vectors().ncols(), 3);
        assert_eq!(s.right_singular_vectors().nrows(), 3);
        assert!(approx_eq(&s.reverse().unwrap(), &a, 1e-8));
        assert_orthonormal_columns(s.left_singular_vectors(), 1e-9);
        assert_orthonormal_columns(s.right_singular_vectors(), 1e-9);
        let sv = s.singular_values();
        assert!(sv.windows(2).all(|w| w[0] >= w[1]));
    }

    #[test]
    fn wide_matrix_auto_transposes() {
        let a = DenseMatrix::from_rows(2, 4, &[1.0, 2.0, 0.0, -1.0, 3.0, 1.0, 4.0, 2.0]);
        let s = svd(&a);
        assert_eq!(s.left_singular_vectors().nrows(), 2);
        assert_eq!(s.left_singular_vectors().ncols(), 2);
        assert_eq!(s.right_singular_vectors().nrows(), 4);
        assert_eq!(s.right_singular_vectors().ncols(), 2);
        assert!(approx_eq(&s.reverse().unwrap(), &a, 1e-9));

        let opts = SvdOptions::default().with_auto_transpose(false);
        assert!(matches!(
            SingularValueDecomposition::with_options(&a, opts),
            Err(LinalgError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn in_place_transposes_workspace() {
        let a = DenseMatrix::from_rows(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let mut work = a.clone();
        let s = SingularValueDecomposition::new_in_place(&mut work, SvdOptions::default()).unwrap();
        assert_eq!((work.nrows(), work.ncols()), (3, 2));
        assert!(approx_eq(&s.reverse().unwrap(), &a, 1e-9));
    }

    #[test]
    fn rank_one_pseudo_inverse() {
        let a = DenseMatrix::from_rows(2, 2, &[1.0, 1.0, 2.0, 2.0]);
        let s = svd(&a);
        assert_eq!(s.rank(), 1);
        assert!(s.is_singular());
        let expected = DenseMatrix::from_rows(2, 2, &[0.1, 0.2, 0.1, 0.2]);
        assert!(approx_eq(s.inverse().unwrap(), &expected, 1e-12));
        assert!(std::ptr::eq(s.inverse().unwrap(), s.inverse().unwrap()));
        assert_near(s.pseudo_determinant(), 10.0_f64.sqrt(), 1e-12, "pdet");
        assert_near(s.log_pseudo_determinant(), 0.5 * 10.0_f64.ln(), 1e-12, "ln pdet");
        assert_eq!(s.inverse_diagonal().unwrap().len(), 2);
        assert_near(s.inverse_diagonal().unwrap()[1], 0.2, 1e-12, "pinv[1][1]");
    }

    #[test]
    fn solve_matches_lstsq() {
        let a = DenseMatrix::from_rows(4, 2, &[1.0, 1.0, 1.0, 2.0, 1.0, 3.0, 1.0, 4.0]);
        let x = svd(&a).solve_vec(&[6.0, 5.0, 7.0, 10.0]).unwrap();
        assert_near(x[0], 3.5, 1e-9, "intercept");
        assert_near(x[1], 1.4, 1e-9, "slope");
    }

    #[test]
    fn solve_for_diagonal_matches_solve() {
        let a = DenseMatrix::from_rows(3, 3, &[4.0, 1.0, -1.0, 1.0, 3.0, 2.0, -1.0, 2.0, 5.0]);
        let s = svd(&a);
        let d = [1.0, 2.0, 3.0];
        let x = s.solve_for_diagonal(&d).unwrap();
        let ax: DenseMatrix<f64> = matmul(&a, &x).unwrap();
        assert!(approx_eq(&ax, &DenseMatrix::from_rows(3, 3, &[1.0, 0.0, 0.0, 0.0, 2.0, 0.0, 0.0, 0.0, 3.0]), 1e-9));
    }

    #[test]
    fn diagonal_matrix_cached() {
        let s = svd(&DenseMatrix::from_rows(2, 2, &[3.0, 2.0, 2.0, 3.0]));
        let d = s.diagonal_matrix();
        assert!(std::ptr::eq(d, s.diagonal_matrix()));
        assert_near(d[(0, 0)], 5.0, TOL, "d00");
        assert_eq!(d[(0, 1)], 0.0);
    }

    #[test]
    fn skipped_factors_are_zero_filled() {
        let a = DenseMatrix::from_rows(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let opts = SvdOptions::default().with_compute_left(false);
        let s = SingularValueDecomposition::with_options(&a, opts).unwrap();
        let u = s.left_singular_vectors();
        assert_eq!((u.nrows(), u.ncols()), (3, 2));
        assert!(u.as_slice().iter().all(|&x| x == 0.0));
        assert_orthonormal_columns(s.right_singular_vectors(), 1e-10);
        assert!(matches!(s.inverse(), Err(LinalgError::InvalidArgument { .. })));
        let full = svd(&a);
        for (x, y) in s.singular_values().iter().zip(full.singular_values()) {
            assert_near(*x, *y, 1e-12, "σ");
        }
    }

    #[test]
    fn ordering_is_a_permutation() {
        let a = DenseMatrix::from_rows(3, 3, &[1.0, 0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0, 3.0]);
        let s = svd(&a);
        let mut ord = s.ordering().to_vec();
        ord.sort_unstable();
        assert_eq!(ord, vec![0, 1, 2]);
        assert_near(s.singular_values()[0], 5.0, TOL, "σ[0]");
    }

    #[test]
    fn iteration_cap_reports_failure() {
        let a = DenseMatrix::from_rows(4, 4, &[
            4.0, 1.0, -2.0, 2.0, 1.0, 2.0, 0.0, 1.0, -2.0, 0.0, 3.0, -2.0, 2.0, 1.0, -2.0, -1.0,
        ]);
        let opts = SvdOptions::default().with_max_iterations(1);
        assert_eq!(
            SingularValueDecomposition::with_options(&a, opts).unwrap_err(),
            LinalgError::ConvergenceFailure { iterations: 1 }
        );
    }

    #[test]
    fn nan_propagates_or_rejects() {
        let a = DenseMatrix::from_rows(2, 2, &[1.0, 2.0, f64::NAN, 3.0]);
        let s = svd(&a);
        assert!(s.singular_values().iter().any(|x| x.is_nan()));
        assert!(s.inverse().unwrap().as_slice().iter().any(|x| x.is_nan()));

        let opts = SvdOptions::default().with_non_finite(NonFinitePolicy::Reject);
        assert_eq!(
            SingularValueDecomposition::with_options(&a, opts).unwrap_err(),
            LinalgError::NonFinite { row: 1, col: 0 }
        );
    }

    #[test]
    fn jagged_storage_matches_dense() {
        let a = DenseMatrix::from_rows(3, 2, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let sd = svd(&a);
        let sj = SingularValueDecomposition::new(&JaggedMatrix::from(&a)).unwrap();
        assert_eq!(sd.singular_values(), sj.singular_values());
        assert_eq!(DenseMatrix::from(sj.left_singular_vectors()), *sd.left_singular_vectors());
    }

    #[test]
    fn f32_support() {
        let a = DenseMatrix::from_rows(2, 2, &[3.0_f32, 1.0, 1.0, 3.0]);
        let s = SingularValueDecomposition::new(&a).unwrap();
        assert!((s.singular_values()[0] - 4.0).abs() < 1e-5);
        assert!((s.singular_values()[1] - 2.0).abs() < 1e-5);
    }

    #[test]
    fn empty_matrix() {
        let s = svd(&DenseMatrix::zeros(0, 3));
        assert!(s.singular_values().is_empty());
        assert_eq!(s.rank(), 0);
        assert_eq!(s.right_singular_vectors().nrows(), 3);
    }
}
