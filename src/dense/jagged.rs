use core::ops::{Index, IndexMut};

use crate::traits::{MatrixMut, MatrixRef, MatrixStorage, Scalar};

use super::DenseMatrix;

/// Row-of-rows matrix: each row is its own `Vec<T>`.
///
/// All rows have the same length; constructors enforce it. Algorithms see
/// the same [`MatrixRef`] / [`MatrixMut`] surface as [`DenseMatrix`] and
/// produce identical results on either storage.
///
/// ```
/// use dense_decomp::JaggedMatrix;
///
/// let m = JaggedMatrix::from_row_vecs(vec![vec![1.0_f64, 2.0], vec![3.0, 4.0]]);
/// assert_eq!(m[(1, 0)], 3.0);
/// assert_eq!(m.rows()[0], vec![1.0, 2.0]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct JaggedMatrix<T> {
    rows: Vec<Vec<T>>,
    ncols: usize,
}

impl<T: Scalar> JaggedMatrix<T> {
    /// Create an `nrows x ncols` matrix of zeros.
    pub fn zeros(nrows: usize, ncols: usize) -> Self {
        Self {
            rows: vec![vec![T::zero(); ncols]; nrows],
            ncols,
        }
    }

    /// Create an `n x n` identity matrix.
    pub fn eye(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.rows[i][i] = T::one();
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
        let rows = (0..nrows)
            .map(|i| row_major[i * ncols..(i + 1) * ncols].to_vec())
            .collect();
        Self { rows, ncols }
    }

    /// Copy any [`MatrixRef`] into row-of-rows storage.
    pub fn from_matrix(m: &impl MatrixRef<T>) -> Self {
        let rows = (0..m.nrows())
            .map(|i| m.row_as_slice(i, 0).to_vec())
            .collect();
        Self {
            rows,
            ncols: m.ncols(),
        }
    }

    /// Transposed copy.
    pub fn transpose(&self) -> Self {
        let nrows = self.rows.len();
        let rows = (0..self.ncols)
            .map(|j| (0..nrows).map(|i| self.rows[i][j]).collect())
            .collect();
        Self { rows, ncols: nrows }
    }
}

impl<T> JaggedMatrix<T> {
    /// Take ownership of a vector of rows.
    ///
    /// Panics if the rows have different lengths.
    pub fn from_row_vecs(rows: Vec<Vec<T>>) -> Self {
        let ncols = rows.first().map_or(0, Vec::len);
        for (i, r) in rows.iter().enumerate() {
            assert_eq!(
                r.len(),
                ncols,
                "row {} has length {}, expected {}",
                i,
                r.len(),
                ncols
            );
        }
        Self { rows, ncols }
    }

    /// Create a matrix by calling `f(row, col)` for each element.
    pub fn from_fn(nrows: usize, ncols: usize, f: impl Fn(usize, usize) -> T) -> Self {
        let rows = (0..nrows)
            .map(|i| (0..ncols).map(|j| f(i, j)).collect())
            .collect();
        Self { rows, ncols }
    }

    /// Number of rows.
    #[inline]
    pub fn nrows(&self) -> usize {
        self.rows.len()
    }

    /// Number of columns.
    #[inline]
    pub fn ncols(&self) -> usize {
        self.ncols
    }

    /// Borrow the rows.
    #[inline]
    pub fn rows(&self) -> &[Vec<T>] {
        &self.rows
    }

    /// Consume the matrix, returning its rows.
    pub fn into_row_vecs(self) -> Vec<Vec<T>> {
        self.rows
    }
}

impl<T> MatrixRef<T> for JaggedMatrix<T> {
    #[inline]
    fn nrows(&self) -> usize {
        self.rows.len()
    }

    #[inline]
    fn ncols(&self) -> usize {
        self.ncols
    }

    #[inline]
    fn get(&self, row: usize, col: usize) -> &T {
        &self.rows[row][col]
    }

    #[inline]
    fn row_as_slice(&self, row: usize, col_start: usize) -> &[T] {
        &self.rows[row][col_start..]
    }
}

impl<T> MatrixMut<T> for JaggedMatrix<T> {
    #[inline]
    fn get_mut(&mut self, row: usize, col: usize) -> &mut T {
        &mut self.rows[row][col]
    }

    #[inline]
    fn row_as_mut_slice(&mut self, row: usize, col_start: usize) -> &mut [T] {
        &mut self.rows[row][col_start..]
    }
}

impl<T: Scalar + Send + Sync> MatrixStorage<T> for JaggedMatrix<T> {
    #[inline]
    fn zeros(nrows: usize, ncols: usize) -> Self {
        JaggedMatrix::zeros(nrows, ncols)
    }

    #[inline]
    fn swap_rows(&mut self, a: usize, b: usize) {
        self.rows.swap(a, b);
    }
}

impl<T> Index<(usize, usize)> for JaggedMatrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (row, col): (usize, usize)) -> &T {
        &self.rows[row][col]
    }
}

impl<T> IndexMut<(usize, usize)> for JaggedMatrix<T> {
    #[inline]
    fn index_mut(&mut self, (row, col): (usize, usize)) -> &mut T {
        &mut self.rows[row][col]
    }
}

impl<T: Scalar> From<&DenseMatrix<T>> for JaggedMatrix<T> {
    fn from(m: &DenseMatrix<T>) -> Self {
        Self::from_matrix(m)
    }
}

impl<T: Scalar> From<DenseMatrix<T>> for JaggedMatrix<T> {
    fn from(m: DenseMatrix<T>) -> Self {
        Self::from_matrix(&m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows() {
        let m = JaggedMatrix::from_rows(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(m.nrows(), 2);
        assert_eq!(m.ncols(), 3);
        assert_eq!(m[(1, 2)], 6.0);
    }

    #[test]
    #[should_panic(expected = "row 1 has length")]
    fn ragged_rows_rejected() {
        let _ = JaggedMatrix::from_row_vecs(vec![vec![1.0, 2.0], vec![3.0]]);
    }

    #[test]
    fn swap_rows_moves_vectors() {
        let mut m = JaggedMatrix::from_rows(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        MatrixStorage::swap_rows(&mut m, 0, 1);
        assert_eq!(m.rows()[0], vec![3.0, 4.0]);
    }

    #[test]
    fn transpose() {
        let m = JaggedMatrix::from_rows(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t = m.transpose();
        assert_eq!(t.nrows(), 3);
        assert_eq!(t.ncols(), 2);
        assert_eq!(t[(2, 0)], 3.0);
    }

    #[test]
    fn zero_rows() {
        let m = JaggedMatrix::<f64>::from_row_vecs(Vec::new());
        assert_eq!(m.nrows(), 0);
        assert_eq!(m.ncols(), 0);
    }
}
