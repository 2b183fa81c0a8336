use core::fmt::Debug;
use num_traits::{Float, Num, One, Zero};

/// Trait for types that can be used as matrix elements.
///
/// Blanket-implemented for all types satisfying the bounds.
/// Covers `f32`, `f64`, and all integer types.
pub trait Scalar: Copy + PartialEq + Debug + Zero + One + Num {}

impl<T: Copy + PartialEq + Debug + Zero + One + Num> Scalar for T {}

/// Trait for floating-point matrix elements.
///
/// Required by every decomposition. Implemented for `f32` and `f64`.
pub trait FloatScalar: Scalar + Float + Send + Sync + 'static {
    /// Convert from an `f64` literal or sample.
    fn from_f64(v: f64) -> Self;

    /// Widen to `f64`.
    fn as_f64(self) -> f64;

    /// Convert a count (matrix dimension, iteration index) into `Self`.
    fn from_usize(n: usize) -> Self;
}

macro_rules! impl_float_scalar {
    ($($t:ty),*) => {
        $(
            impl FloatScalar for $t {
                #[inline] fn from_f64(v: f64) -> $t { v as $t }
                #[inline] fn as_f64(self) -> f64 { self as f64 }
                #[inline] fn from_usize(n: usize) -> $t { n as $t }
            }
        )*
    };
}

impl_float_scalar!(f32, f64);

/// Read-only access to a matrix-like type.
///
/// Every algorithm in this crate is written once against this trait, so the
/// physical layout (contiguous or row-of-rows) is a storage policy rather
/// than a code fork.
pub trait MatrixRef<T> {
    fn nrows(&self) -> usize;
    fn ncols(&self) -> usize;
    fn get(&self, row: usize, col: usize) -> &T;

    /// Contiguous view of `row`, columns `col_start..ncols`.
    fn row_as_slice(&self, row: usize, col_start: usize) -> &[T];
}

/// Mutable access to a matrix-like type.
///
/// Extends `MatrixRef` with mutable element access, enabling
/// in-place algorithms (LU, Householder, etc.) to work generically.
pub trait MatrixMut<T>: MatrixRef<T> {
    fn get_mut(&mut self, row: usize, col: usize) -> &mut T;

    /// Mutable contiguous view of `row`, columns `col_start..ncols`.
    fn row_as_mut_slice(&mut self, row: usize, col_start: usize) -> &mut [T];
}

/// An owned storage strategy that decompositions can allocate factors in.
///
/// Decompositions return their factors in the same storage type as their
/// input, so a caller working with [`JaggedMatrix`](crate::JaggedMatrix)
/// gets jagged factors back.
pub trait MatrixStorage<T>: MatrixMut<T> + Clone + Debug + Send + Sync {
    /// An `nrows x ncols` matrix of zeros.
    fn zeros(nrows: usize, ncols: usize) -> Self;

    /// Swap two rows in place.
    fn swap_rows(&mut self, a: usize, b: usize);
}
