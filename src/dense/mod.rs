mod jagged;
mod ops;
pub mod util;

pub use jagged::JaggedMatrix;

use core::ops::{Index, IndexMut};

use crate::traits::{MatrixMut, MatrixRef, MatrixStorage, Scalar};

/// Contiguous row-major matrix.
///
/// Elements live in a single `Vec<T>` with row stride `ncols`. Implements
/// [`MatrixRef`], [`MatrixMut`] and [`MatrixStorage`], so every decomposition
/// in [`linalg`](crate::linalg) accepts it directly.
///
/// # Examples
///
/// ```
/// use dense_decomp::DenseMatrix;
///
/// let a = DenseMatrix::from_rows(2, 3, &[1.0_f64, 2.0, 3.0, 4.0, 5.0, 6.0]);
/// assert_eq!(a[(0, 2)], 3.0);
/// assert_eq!(a[(1, 0)], 4.0);
/// assert_eq!(a.nrows(), 2);
/// assert_eq!(a.ncols(), 3);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct DenseMatrix<T> {
    data: Vec<T>,
    nrows: usize,
    ncols: usize,
}

// ── Constructors ────────────────────────────────────────────────────

impl<T: Scalar> DenseMatrix<T> {
    /// Create an `nrows x ncols` matrix of zeros.
    ///
    /// ```
    /// use dense_decomp::DenseMatrix;
    /// let m = DenseMatrix::<f64>::zeros(2, 3);
    /// assert_eq!(m[(1, 2)], 0.0);
    /// ```
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            data: vec![T::zero(); nrows * ncols],
            nrows,
            ncols,
        }
    }

    /// Create a matrix filled with a given value.
    pub fn fill(nrows: usize, ncols: usize, value: T) -> Self {
        Self {
            data: vec![value; nrows * ncols],
            nrows,
            ncols,
        }
    }

    /// Create an `n x n` identity matrix.
    ///
    /// ```
    /// use dense_decomp::DenseMatrix;
    /// let id = DenseMatrix::<f64>::eye(3);
    /// assert_eq!(id[(1, 1)], 1.0);
    /// assert_eq!(id[(0, 1)], 0.0);
    /// ```
    pub fn eye(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m[(i, i)] = T::one();
        }
        m
    }

    /// Create a matrix from a flat slice in row-major order.
    ///
    /// Panics if `row_major.len() != nrows * ncols`.
    pub fn from_rows(nrows: usize, ncols: usize, row_major: &[T]) -> Self {
        assert_eq!(
            row_major.len(),
            nrows * ncols,
            "slice length {} does not match {}x{} matrix",
            row_major.len(),
            nrows,
            ncols,
        );
        Self {
            data: row_major.to_vec(),
            nrows,
            ncols,
        }
    }

    /// Create a matrix from an owned row-major `Vec<T>`.
    ///
    /// Panics if `data.len() != nrows * ncols`.
    pub fn from_vec(nrows: usize, ncols: usize, data: Vec<T>) -> Self {
        assert_eq!(
            data.len(),
            nrows * ncols,
            "vec length {} does not match {}x{} matrix",
            data.len(),
            nrows,
            ncols,
        );
        Self { data, nrows, ncols }
    }

    /// Copy any [`MatrixRef`] into contiguous storage.
    pub fn from_matrix(m: &impl MatrixRef<T>) -> Self {
        Self::from_fn(m.nrows(), m.ncols(), |i, j| *m.get(i, j))
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        Self::from_fn(self.ncols, self.nrows, |i, j| self[(j, i)])
    }
}

impl<T> DenseMatrix<T> {
    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.nrows
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Whether the matrix is square.
    #[inline]
    pub fn is_square(&self) -> bool {
        self.nrows == self.ncols
    }

    /// Row-major backing slice.
    #[inline]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Consume the matrix, returning its row-major backing vector.
    pub fn into_vec(self) -> Vec<T> {
        self.data
    }

    /// Borrow row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[T] {
        &self.data[i * self.ncols..(i + 1) * self.ncols]
    }

    /// Create a matrix by calling `f(row, col)` for each element.
    ///
    /// ```
    /// use dense_decomp::DenseMatrix;
    /// let m = DenseMatrix::from_fn(2, 2, |i, j| (i * 2 + j) as f64);
    /// assert_eq!(m[(1, 0)], 2.0);
    /// ```
    pub fn from_fn(nrows: usize, ncols: usize, f: impl Fn(usize, usize) -> T) -> Self {
        let mut data = Vec::with_capacity(nrows * ncols);
        for i in 0..nrows {
            for j in 0..ncols {
                data.push(f(i, j));
            }
        }
        Self { data, nrows, ncols }
    }

    /// Apply a function to every element, producing a new matrix.
    pub fn map<U>(&self, f: impl Fn(T) -> U) -> DenseMatrix<U>
    where
        T: Copy,
    {
        DenseMatrix {
            data: self.data.iter().map(|&x| f(x)).collect(),
            nrows: self.nrows,
            ncols: self.ncols,
        }
    }
}

// ── MatrixRef / MatrixMut / MatrixStorage ───────────────────────────

impl<T> MatrixRef<T> for DenseMatrix<T> {
    #[inline]
    fn nrows(&self) -> usize {
        self.nrows
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> &T {
        &self.data[row * self.ncols + col]
    }

    #[inline]
    fn row_as_slice(&self, row: usize, col_start: usize) -> &[T] {
        &self.data[row * self.ncols + col_start..(row + 1) * self.ncols]
    }
}

impl<T> MatrixMut<T> for DenseMatrix<T> {
    #[inline]
    fn get_mut(&mut self, row: usize, col: usize) -> &mut T {
        &mut self.data[row * self.ncols + col]
    }

    #[inline]
    fn row_as_mut_slice(&mut self, row: usize, col_start: usize) -> &mut [T] {
        &mut self.data[row * self.ncols + col_start..(row + 1) * self.ncols]
    }
}

impl<T: Scalar + Send + Sync> MatrixStorage<T> for DenseMatrix<T> {
    #[inline]
    fn zeros(nrows: usize, ncols: usize) -> Self {
        DenseMatrix::zeros(nrows, ncols)
    }

    fn swap_rows(&mut self, a: usize, b: usize) {
        if a != b {
            let n = self.ncols;
            for j in 0..n {
                self.data.swap(a * n + j, b * n + j);
            }
        }
    }
}

// ── Index ───────────────────────────────────────────────────────────

impl<T> Index<(usize, usize)> for DenseMatrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.data[row * self.ncols + col]
    }
}

impl<T> IndexMut<(usize, usize)> for DenseMatrix<T> {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        &mut self.data[row * self.ncols + col]
    }
}

// ── Conversions: DenseMatrix ↔ JaggedMatrix ─────────────────────────

impl<T: Scalar> From<&JaggedMatrix<T>> for DenseMatrix<T> {
    fn from(m: &JaggedMatrix<T>) -> Self {
        Self::from_matrix(m)
    }
}

impl<T: Scalar> From<JaggedMatrix<T>> for DenseMatrix<T> {
    fn from(m: JaggedMatrix<T>) -> Self {
        Self::from_matrix(&m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zeros() {
        let m = DenseMatrix::<f64>::zeros(3, 4);
        assert_eq!(m.nrows(), 3);
        assert_eq!(m.ncols(), 4);
        assert!(m.as_slice().iter().all(|&x| x == 0.0));
    }

    #[test]
    fn eye() {
        let m = DenseMatrix::<f64>::eye(3);
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_eq!(m[(i, j)], expected);
            }
        }
    }

    #[test]
    fn from_rows_is_row_major() {
        let m = DenseMatrix::from_rows(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m[(0, 0)], 1.0);
        assert_eq!(m[(0, 2)], 3.0);
        assert_eq!(m[(1, 0)], 4.0);
        assert_eq!(m.row(1), &[4.0, 5.0, 6.0]);
    }

    #[test]
    #[should_panic(expected = "slice length")]
    fn from_rows_wrong_length() {
        let _ = DenseMatrix::from_rows(2, 2, &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn row_slices() {
        let mut m = DenseMatrix::from_rows(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.row_as_slice(1, 1), &[5.0, 6.0]);
        m.row_as_mut_slice(0, 2)[0] = 9.0;
        assert_eq!(m[(0, 2)], 9.0);
    }

    #[test]
    fn swap_rows() {
        let mut m = DenseMatrix::from_rows(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        MatrixStorage::swap_rows(&mut m, 0, 1);
        assert_eq!(m[(0, 0)], 3.0);
        assert_eq!(m[(1, 1)], 2.0);
    }

    #[test]
    fn transpose() {
        let m = DenseMatrix::from_rows(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = m.transpose();
        assert_eq!(t.nrows(), 3);
        assert_eq!(t[(2, 1)], 6.0);
    }

    #[test]
    fn jagged_round_trip() {
        let m = DenseMatrix::from_rows(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let j = JaggedMatrix::from(&m);
        let back = DenseMatrix::from(&j);
        assert_eq!(m, back);
    }
}
