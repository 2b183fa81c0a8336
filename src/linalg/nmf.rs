use log::debug;
use rand::Rng;

use crate::dense::util::{frobenius_norm, matmul, matmul_transpose_left, random, transpose};
use crate::linalg::LinalgError;
use crate::traits::{FloatScalar, MatrixStorage};

/// Options for [`NonnegativeMatrixFactorization`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NmfOptions {
    /// Number of multiplicative updates. There is no tolerance-based stop.
    pub max_iterations: usize,
    /// Added to every update denominator.
    pub floor: f64,
}

impl Default for NmfOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            floor: 1e-9,
        }
    }
}

impl NmfOptions {
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_floor(mut self, floor: f64) -> Self {
        self.floor = floor;
        self
    }
}

/// Nonnegative factorization `A ≈ W·H` with `W` (`m x r`) and `H` (`r x n`).
///
/// Uses the Lee–Seung multiplicative updates for the Frobenius objective,
/// starting from uniform random factors drawn from the caller's generator.
/// A fixed number of sweeps is run, so the result is deterministic for a
/// seeded generator.
///
/// # Example
///
/// ```
/// use dense_decomp::{DenseMatrix, NonnegativeMatrixFactorization};
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let a = DenseMatrix::from_rows(2, 3, &[1.0_f64, 2.0, 3.0, 2.0, 4.0, 6.0]);
/// let mut rng = StdRng::seed_from_u64(42);
/// let nmf = NonnegativeMatrixFactorization::new(&a, 1, &mut rng).unwrap();
/// assert_eq!(nmf.left_factor().ncols(), 1);
/// assert!(nmf.right_factor().as_slice().iter().all(|&x| x >= 0.0));
/// ```
#[derive(Debug)]
pub struct NonnegativeMatrixFactorization<T, M> {
    w: M,
    h: M,
    error: T,
    iterations: usize,
}

impl<T: FloatScalar, M: MatrixStorage<T>> NonnegativeMatrixFactorization<T, M> {
    pub fn new(a: &M, rank: usize, rng: &mut impl Rng) -> Result<Self, LinalgError> {
        Self::with_options(a, rank, rng, NmfOptions::default())
    }

    pub fn with_options(
        a: &M,
        rank: usize,
        rng: &mut impl Rng,
        options: NmfOptions,
    ) -> Result<Self, LinalgError> {
        if rank == 0 {
            return Err(LinalgError::InvalidArgument {
                reason: "NMF rank must be positive",
            });
        }
        for i in 0..a.nrows() {
            if a.row_as_slice(i, 0).iter().any(|&x| x < T::zero()) {
                return Err(LinalgError::InvalidArgument {
                    reason: "NMF input must be nonnegative",
                });
            }
        }

        let (m, n) = (a.nrows(), a.ncols());
        let floor = T::from_f64(options.floor);
        let mut w: M = random(m, rank, T::zero(), T::one(), rng);
        let mut h: M = random(rank, n, T::zero(), T::one(), rng);

        for _ in 0..options.max_iterations {
            // H ← H ∘ (WᵀA) / (WᵀW·H + floor)
            let wta: M = matmul_transpose_left(&w, a)?;
            let wtw: M = matmul_transpose_left(&w, &w)?;
            let wtwh: M = matmul(&wtw, &h)?;
            scale_by_ratio(&mut h, &wta, &wtwh, floor);

            // W ← W ∘ (A·Hᵀ) / (W·H·Hᵀ + floor)
            let ht: M = transpose(&h);
            let aht: M = matmul(a, &ht)?;
            let hht: M = matmul(&h, &ht)?;
            let whht: M = matmul(&w, &hht)?;
            scale_by_ratio(&mut w, &aht, &whht, floor);
        }

        let error = residual_norm(a, &w, &h)?;
        debug!(
            "nmf: {}x{} rank {} after {} updates, rms residual {}",
            m,
            n,
            rank,
            options.max_iterations,
            error.as_f64()
        );
        Ok(Self {
            w,
            h,
            error,
            iterations: options.max_iterations,
        })
    }

    /// W (`m x r`).
    #[inline]
    pub fn left_factor(&self) -> &M {
        &self.w
    }

    /// H (`r x n`).
    #[inline]
    pub fn right_factor(&self) -> &M {
        &self.h
    }

    /// Root-mean-square residual `‖A - W·H‖_F / √(m·n)` at the final sweep.
    #[inline]
    pub fn error(&self) -> T {
        self.error
    }

    #[inline]
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// `W·H`.
    pub fn reverse(&self) -> Result<M, LinalgError> {
        matmul(&self.w, &self.h)
    }
}

/// `x ← x ∘ num / (den + floor)`, elementwise.
fn scale_by_ratio<T: FloatScalar, M: MatrixStorage<T>>(x: &mut M, num: &M, den: &M, floor: T) {
    for i in 0..x.nrows() {
        let (nr, dr) = (num.row_as_slice(i, 0), den.row_as_slice(i, 0));
        for ((v, &p), &q) in x.row_as_mut_slice(i, 0).iter_mut().zip(nr).zip(dr) {
            *v = *v * p / (q + floor);
        }
    }
}

fn residual_norm<T: FloatScalar, M: MatrixStorage<T>>(a: &M, w: &M, h: &M) -> Result<T, LinalgError> {
    let (m, n) = (a.nrows(), a.ncols());
    if m == 0 || n == 0 {
        return Ok(T::zero());
    }
    let mut r: M = matmul(w, h)?;
    for i in 0..m {
        for (x, &y) in r.row_as_mut_slice(i, 0).iter_mut().zip(a.row_as_slice(i, 0)) {
            *x = y - *x;
        }
    }
    Ok(frobenius_norm(&r) / T::from_usize(m * n).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DenseMatrix, JaggedMatrix};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rank_two() -> DenseMatrix<f64> {
        // Outer products of nonnegative vectors
        DenseMatrix::from_fn(6, 5, |i, j| {
            (i as f64 + 1.0) * (j as f64 + 0.5) + ((i % 2) as f64) * (5.0 - j as f64)
        })
    }

    #[test]
    fn factors_stay_nonnegative() {
        let a = rank_two();
        let mut rng = StdRng::seed_from_u64(1);
        let nmf = NonnegativeMatrixFactorization::new(&a, 2, &mut rng).unwrap();
        assert_eq!((nmf.left_factor().nrows(), nmf.left_factor().ncols()), (6, 2));
        assert_eq!((nmf.right_factor().nrows(), nmf.right_factor().ncols()), (2, 5));
        assert!(nmf.left_factor().as_slice().iter().all(|&x| x >= 0.0));
        assert!(nmf.right_factor().as_slice().iter().all(|&x| x >= 0.0));
        assert_eq!(nmf.iterations(), 100);
    }

    #[test]
    fn more_sweeps_fit_better() {
        let a = rank_two();
        let short = NonnegativeMatrixFactorization::with_options(
            &a,
            2,
            &mut StdRng::seed_from_u64(3),
            NmfOptions::default().with_max_iterations(5),
        )
        .unwrap();
        let long = NonnegativeMatrixFactorization::with_options(
            &a,
            2,
            &mut StdRng::seed_from_u64(3),
            NmfOptions::default().with_max_iterations(2000),
        )
        .unwrap();
        assert!(long.error() <= short.error());
        let scale = crate::dense::util::max_abs(&a);
        assert!(long.error() < 0.05 * scale, "rms residual {}", long.error());

        let wh = long.reverse().unwrap();
        assert_eq!((wh.nrows(), wh.ncols()), (6, 5));
    }

    #[test]
    fn seeded_runs_are_identical() {
        let a = rank_two();
        let n1 = NonnegativeMatrixFactorization::new(&a, 3, &mut StdRng::seed_from_u64(9)).unwrap();
        let n2 = NonnegativeMatrixFactorization::new(&a, 3, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(n1.left_factor(), n2.left_factor());
        assert_eq!(n1.right_factor(), n2.right_factor());

        let jagged = JaggedMatrix::from(&a);
        let nj = NonnegativeMatrixFactorization::new(&jagged, 3, &mut StdRng::seed_from_u64(9)).unwrap();
        assert_eq!(DenseMatrix::from(nj.left_factor()), *n1.left_factor());
    }

    #[test]
    fn rejects_bad_input() {
        let mut rng = StdRng::seed_from_u64(0);
        let neg = DenseMatrix::from_rows(2, 2, &[1.0, -1.0, 0.0, 2.0]);
        assert_eq!(
            NonnegativeMatrixFactorization::new(&neg, 1, &mut rng).unwrap_err(),
            LinalgError::InvalidArgument {
                reason: "NMF input must be nonnegative"
            }
        );
        let ok = DenseMatrix::<f64>::eye(2);
        assert_eq!(
            NonnegativeMatrixFactorization::new(&ok, 0, &mut rng).unwrap_err(),
            LinalgError::InvalidArgument {
                reason: "NMF rank must be positive"
            }
        );
    }

    #[test]
    fn nan_propagates() {
        let a = DenseMatrix::from_rows(2, 2, &[1.0, f64::NAN, 0.5, 2.0]);
        let nmf = NonnegativeMatrixFactorization::new(&a, 1, &mut StdRng::seed_from_u64(4)).unwrap();
        assert!(nmf.error().is_nan());
        assert!(nmf.right_factor().as_slice().iter().any(|x| x.is_nan()));
    }

    #[test]
    fn zero_matrix_is_stable() {
        let a = DenseMatrix::<f64>::zeros(3, 3);
        let nmf = NonnegativeMatrixFactorization::new(&a, 2, &mut StdRng::seed_from_u64(5)).unwrap();
        assert!(nmf.left_factor().as_slice().iter().all(|x| x.is_finite()));
        assert_eq!(nmf.error(), 0.0);
    }
}
