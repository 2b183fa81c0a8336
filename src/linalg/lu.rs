use std::sync::OnceLock;

use log::debug;

use crate::dense::util::{max_abs, transpose};
use crate::linalg::{require_cols, require_rows, require_square, LinalgError, NonFinitePolicy};
use crate::traits::{FloatScalar, MatrixRef, MatrixStorage};

/// Pivot cutoff `max(m, n)·ε·max|A|`. Zero when `A` holds a NaN or infinity,
/// so non-finite pivots are never mistaken for negligible ones.
pub(crate) fn pivot_tolerance<T: FloatScalar>(a: &impl MatrixRef<T>) -> T {
    let scale = max_abs(a);
    if !scale.is_finite() {
        return T::zero();
    }
    T::from_usize(a.nrows().max(a.ncols())) * T::epsilon() * scale
}

/// Perform LU decomposition with partial pivoting, in place.
///
/// Works on any `m x n` matrix, eliminating `min(m, n)` columns. On return,
/// `a` contains both L and U packed together:
/// - Upper triangle (including diagonal): U
/// - Lower triangle (excluding diagonal): L (diagonal of L is implicitly 1)
///
/// `perm` is filled with the row permutation: row `i` of `P·A` is row
/// `perm[i]` of `A`. A column whose pivot magnitude is at or below `tol` is
/// left as is and elimination moves on. Returns `(even, zero_pivots)` where
/// `even` is whether the number of row swaps was even.
pub(crate) fn lu_in_place<T: FloatScalar>(
    a: &mut impl MatrixStorage<T>,
    perm: &mut [usize],
    tol: T,
) -> (bool, usize) {
    let m = a.nrows();
    let n = a.ncols();
    assert_eq!(m, perm.len(), "permutation slice length must match row count");

    for (i, p) in perm.iter_mut().enumerate() {
        *p = i;
    }

    let mut even = true;
    let mut zero_pivots = 0;
    let mut pivot_row = vec![T::zero(); n];

    for col in 0..m.min(n) {
        // Partial pivoting: find row with largest modulus in this column
        let mut max_row = col;
        let mut max_val = a.get(col, col).abs();
        for row in (col + 1)..m {
            let val = a.get(row, col).abs();
            if val > max_val {
                max_val = val;
                max_row = row;
            }
        }

        if max_row != col {
            perm.swap(col, max_row);
            a.swap_rows(col, max_row);
            even = !even;
        }

        let pivot = *a.get(col, col);
        if pivot.abs() <= tol {
            // Entries below are no larger than the pivot; drop them so L
            // keeps a zero multiplier column.
            for row in (col + 1)..m {
                *a.get_mut(row, col) = T::zero();
            }
            zero_pivots += 1;
            continue;
        }

        // Row-oriented rank-1 update of the trailing block.
        pivot_row[col + 1..].copy_from_slice(a.row_as_slice(col, col + 1));
        for row in (col + 1)..m {
            let factor = *a.get(row, col) / pivot;
            *a.get_mut(row, col) = factor;
            let tail = a.row_as_mut_slice(row, col + 1);
            for (x, &p) in tail.iter_mut().zip(&pivot_row[col + 1..]) {
                *x = *x - factor * p;
            }
        }
    }

    (even, zero_pivots)
}

/// Options for [`LuDecomposition`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LuOptions {
    /// Factor `Aᵀ` instead of `A`.
    pub transpose: bool,
    pub non_finite: NonFinitePolicy,
}

impl LuOptions {
    pub fn with_transpose(mut self, transpose: bool) -> Self {
        self.transpose = transpose;
        self
    }

    pub fn with_non_finite(mut self, policy: NonFinitePolicy) -> Self {
        self.non_finite = policy;
        self
    }
}

/// LU decomposition with partial pivoting: `P·A = L·U`.
///
/// Accepts any `m x n` matrix. L is `m x k` unit lower triangular and U is
/// `k x n` upper triangular, `k = min(m, n)`. Construction never fails on
/// singular input; singularity surfaces from [`solve`](Self::solve) and
/// [`inverse`](Self::inverse).
///
/// In transposed mode (see [`new_transposed`](Self::new_transposed)) the
/// factors describe `Aᵀ`, while `solve`, `determinant` and
/// [`reverse`](Self::reverse) still refer to `A`.
///
/// # Example
///
/// ```
/// use dense_decomp::{DenseMatrix, LuDecomposition};
///
/// let a = DenseMatrix::from_rows(3, 3, &[
///     2.0_f64, 3.0, 0.0,
///     -1.0, 2.0, 1.0,
///     0.0, -1.0, 3.0,
/// ]);
/// let lu = LuDecomposition::new(&a).unwrap();
/// let x = lu.solve_vec(&[5.0, 0.0, 1.0]).unwrap();
/// assert!((x[0] - 1.6522).abs() < 1e-3);
/// assert!((x[1] - 0.5652).abs() < 1e-3);
/// assert!((x[2] - 0.5217).abs() < 1e-3);
///
/// let inv = lu.inverse().unwrap();
/// assert!(std::ptr::eq(inv, lu.inverse().unwrap()));
/// ```
#[derive(Debug)]
pub struct LuDecomposition<T, M> {
    lu: M,
    perm: Vec<usize>,
    pivot_sign: T,
    tol: T,
    transposed: bool,
    lower: OnceLock<M>,
    upper: OnceLock<M>,
    inverse: OnceLock<Result<M, LinalgError>>,
}

impl<T: FloatScalar, M: MatrixStorage<T>> LuDecomposition<T, M> {
    /// Decompose a matrix with default options.
    pub fn new(a: &M) -> Result<Self, LinalgError> {
        Self::with_options(a, LuOptions::default())
    }

    /// Decompose `Aᵀ`. Solving and [`reverse`](Self::reverse) still refer to `A`.
    pub fn new_transposed(a: &M) -> Result<Self, LinalgError> {
        Self::with_options(a, LuOptions::default().with_transpose(true))
    }

    pub fn with_options(a: &M, options: LuOptions) -> Result<Self, LinalgError> {
        options.non_finite.check(a)?;
        let mut lu = if options.transpose { transpose(a) } else { a.clone() };
        let mut perm = vec![0usize; lu.nrows()];
        let tol = pivot_tolerance(&lu);
        let (even, zero_pivots) = lu_in_place(&mut lu, &mut perm, tol);
        if zero_pivots > 0 {
            debug!(
                "lu: {}x{} factored with {} pivot(s) at or below {:?}",
                lu.nrows(),
                lu.ncols(),
                zero_pivots,
                tol
            );
        }
        Ok(Self {
            lu,
            perm,
            pivot_sign: if even { T::one() } else { -T::one() },
            tol,
            transposed: options.transpose,
            lower: OnceLock::new(),
            upper: OnceLock::new(),
            inverse: OnceLock::new(),
        })
    }

    #[inline]
    fn k(&self) -> usize {
        self.lu.nrows().min(self.lu.ncols())
    }

    /// Whether the factors describe `Aᵀ`.
    #[inline]
    pub fn is_transposed(&self) -> bool {
        self.transposed
    }

    /// Unit lower triangular factor L (`m x k`).
    pub fn lower_triangular_factor(&self) -> &M {
        self.lower.get_or_init(|| {
            let (m, k) = (self.lu.nrows(), self.k());
            let mut l = M::zeros(m, k);
            for i in 0..m {
                for j in 0..k.min(i + 1) {
                    *l.get_mut(i, j) = if i == j { T::one() } else { *self.lu.get(i, j) };
                }
            }
            l
        })
    }

    /// Upper triangular factor U (`k x n`).
    pub fn upper_triangular_factor(&self) -> &M {
        self.upper.get_or_init(|| {
            let (k, n) = (self.k(), self.lu.ncols());
            let mut u = M::zeros(k, n);
            for i in 0..k {
                u.row_as_mut_slice(i, i).copy_from_slice(self.lu.row_as_slice(i, i));
            }
            u
        })
    }

    /// Row permutation: row `i` of `P·A` is row `pivot_permutation()[i]` of `A`.
    #[inline]
    pub fn pivot_permutation(&self) -> &[usize] {
        &self.perm
    }

    /// `+1` for an even number of row exchanges, `-1` for odd.
    #[inline]
    pub fn pivot_sign(&self) -> T {
        self.pivot_sign
    }

    /// Square with every diagonal entry of U above the pivot cutoff
    /// `max(m, n)·ε·max|A|`. A NaN pivot does not count as singular.
    pub fn is_nonsingular(&self) -> bool {
        self.lu.nrows() == self.lu.ncols()
            && (0..self.k()).all(|i| !(self.lu.get(i, i).abs() <= self.tol))
    }

    /// Determinant: pivot sign times the product of U's diagonal.
    pub fn determinant(&self) -> Result<T, LinalgError> {
        let n = require_square(&self.lu)?;
        let mut d = self.pivot_sign;
        for i in 0..n {
            d = d * *self.lu.get(i, i);
        }
        Ok(d)
    }

    /// `ln |det A|` as `Σ ln |uᵢᵢ|`; `-inf` for a singular matrix.
    pub fn log_determinant(&self) -> Result<T, LinalgError> {
        let n = require_square(&self.lu)?;
        let mut sum = T::zero();
        for i in 0..n {
            sum = sum + self.lu.get(i, i).abs().ln();
        }
        Ok(sum)
    }

    fn ensure_solvable(&self) -> Result<usize, LinalgError> {
        let n = require_square(&self.lu)?;
        if self.is_nonsingular() {
            Ok(n)
        } else {
            Err(LinalgError::Singular)
        }
    }

    /// Solve `F·X = B` in place, `F = P⁻¹·L·U` the factored matrix.
    fn solve_factored(&self, b: &impl MatrixRef<T>) -> M {
        let n = self.lu.nrows();
        let nb = b.ncols();
        let mut x = M::zeros(n, nb);
        for i in 0..n {
            x.row_as_mut_slice(i, 0).copy_from_slice(b.row_as_slice(self.perm[i], 0));
        }
        // Ly = Pb
        for i in 0..n {
            for j in 0..i {
                let lij = *self.lu.get(i, j);
                for c in 0..nb {
                    *x.get_mut(i, c) = *x.get(i, c) - lij * *x.get(j, c);
                }
            }
        }
        // Ux = y
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                let uij = *self.lu.get(i, j);
                for c in 0..nb {
                    *x.get_mut(i, c) = *x.get(i, c) - uij * *x.get(j, c);
                }
            }
            let uii = *self.lu.get(i, i);
            for v in x.row_as_mut_slice(i, 0) {
                *v = *v / uii;
            }
        }
        x
    }

    /// Solve `Fᵀ·X = B`, with `Fᵀ = Uᵀ·Lᵀ·P`.
    fn solve_factored_transpose(&self, b: &impl MatrixRef<T>) -> M {
        let n = self.lu.nrows();
        let nb = b.ncols();
        let mut z = M::zeros(n, nb);
        for i in 0..n {
            z.row_as_mut_slice(i, 0).copy_from_slice(b.row_as_slice(i, 0));
        }
        // Uᵀ y = b
        for i in 0..n {
            for j in 0..i {
                let uji = *self.lu.get(j, i);
                for c in 0..nb {
                    *z.get_mut(i, c) = *z.get(i, c) - uji * *z.get(j, c);
                }
            }
            let uii = *self.lu.get(i, i);
            for v in z.row_as_mut_slice(i, 0) {
                *v = *v / uii;
            }
        }
        // Lᵀ z = y
        for i in (0..n).rev() {
            for j in (i + 1)..n {
                let lji = *self.lu.get(j, i);
                for c in 0..nb {
                    *z.get_mut(i, c) = *z.get(i, c) - lji * *z.get(j, c);
                }
            }
        }
        let mut x = M::zeros(n, nb);
        for i in 0..n {
            x.row_as_mut_slice(self.perm[i], 0).copy_from_slice(z.row_as_slice(i, 0));
        }
        x
    }

    /// Solve `A·X = B`.
    pub fn solve(&self, b: &impl MatrixRef<T>) -> Result<M, LinalgError> {
        let n = self.ensure_solvable()?;
        require_rows(b, n)?;
        Ok(if self.transposed {
            self.solve_factored_transpose(b)
        } else {
            self.solve_factored(b)
        })
    }

    /// Solve `A·x = b` for a single right-hand side.
    pub fn solve_vec(&self, b: &[T]) -> Result<Vec<T>, LinalgError> {
        let n = self.ensure_solvable()?;
        if b.len() != n {
            return Err(LinalgError::DimensionMismatch {
                expected: (n, 1),
                got: (b.len(), 1),
            });
        }
        let mut col = M::zeros(n, 1);
        for (i, &v) in b.iter().enumerate() {
            *col.get_mut(i, 0) = v;
        }
        let x = self.solve(&col)?;
        Ok((0..n).map(|i| *x.get(i, 0)).collect())
    }

    /// Solve `X·A = B`.
    pub fn solve_transpose(&self, b: &impl MatrixRef<T>) -> Result<M, LinalgError> {
        let n = self.ensure_solvable()?;
        require_cols(b, n)?;
        let bt: M = transpose(b);
        let xt = if self.transposed {
            self.solve_factored(&bt)
        } else {
            self.solve_factored_transpose(&bt)
        };
        Ok(transpose(&xt))
    }

    /// `A⁻¹`, computed once and cached.
    pub fn inverse(&self) -> Result<&M, LinalgError> {
        self.inverse
            .get_or_init(|| {
                let n = self.ensure_solvable()?;
                let id: M = crate::dense::util::identity(n);
                self.solve(&id)
            })
            .as_ref()
            .map_err(|&e| e)
    }

    /// Rebuild `A` from the factors (`P⁻¹·L·U`, transposed back in transposed mode).
    pub fn reverse(&self) -> M {
        let (m, n, k) = (self.lu.nrows(), self.lu.ncols(), self.k());
        let mut a = M::zeros(m, n);
        for i in 0..m {
            let row = self.perm[i];
            for j in 0..n {
                let mut sum = T::zero();
                for p in 0..k.min(i + 1).min(j + 1) {
                    let l = if p == i { T::one() } else { *self.lu.get(i, p) };
                    sum = sum + l * *self.lu.get(p, j);
                }
                *a.get_mut(row, j) = sum;
            }
        }
        if self.transposed {
            transpose(&a)
        } else {
            a
        }
    }
}
