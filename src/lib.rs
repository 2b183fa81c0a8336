//! # dense-decomp
//!
//! Dense matrix decompositions in pure Rust: LU, QR, Gram-Schmidt, SVD,
//! eigenvalue, generalized eigenvalue and nonnegative matrix factorization.
//! Every decomposition is generic over the element type (`f32`/`f64`) and
//! over the matrix storage, so the same code runs on contiguous and on
//! row-of-rows matrices.
//!
//! ## Quick start
//!
//! ```
//! use dense_decomp::{DenseMatrix, LuDecomposition};
//!
//! // Solve a linear system Ax = b
//! let a = DenseMatrix::from_rows(3, 3, &[
//!     2.0_f64, 1.0, -1.0,
//!     -3.0, -1.0, 2.0,
//!     -2.0, 1.0, 2.0,
//! ]);
//! let lu = LuDecomposition::new(&a).unwrap();
//! let x = lu.solve_vec(&[8.0, -11.0, -3.0]).unwrap(); // x = [2, 3, -1]
//! assert!((x[0] - 2.0).abs() < 1e-12);
//! assert!((x[1] - 3.0).abs() < 1e-12);
//! assert!((x[2] + 1.0).abs() < 1e-12);
//! ```
//!
//! ## Modules
//!
//! - [`dense`] — [`DenseMatrix`] (one `Vec<T>`, row-major) and
//!   [`JaggedMatrix`] (one `Vec<T>` per row). Both implement
//!   [`MatrixStorage`]. [`dense::util`] holds the shared helpers: shape
//!   predicates, identity/magic/random generators, transpose, products,
//!   norms and tolerance comparison.
//!
//! - [`linalg`] — the decompositions. Each is a struct built eagerly by
//!   `new` (or `with_options`) from a borrowed input, answering queries such
//!   as `solve`, `inverse`, `determinant`, `rank` and `reverse` without
//!   refactoring. Derived matrices (inverse, explicit diagonal) are computed
//!   on first access and cached, so repeated calls return the same reference.
//!
//! - [`traits`] — element and storage traits:
//!   - [`Scalar`] — all matrix elements (`Copy + PartialEq + Debug + Zero + One + Num`)
//!   - [`FloatScalar`] — `f32` and `f64`, used by every decomposition
//!   - [`MatrixRef`] / [`MatrixMut`] — generic read/write access for algorithms
//!   - [`MatrixStorage`] — owned storage a decomposition can allocate results in
//!
//! ## Non-finite input
//!
//! NaN and infinity are propagated by default: they flow into the factors
//! and the iterative phases of SVD and eigen are skipped, leaving NaN in
//! their outputs. Set [`NonFinitePolicy::Reject`] in a decomposition's
//! options to fail with [`LinalgError::NonFinite`] instead.
//!
//! ## Logging
//!
//! Diagnostics go through the [`log`] facade: sweep counts at `debug`,
//! skipped iterations and convergence failures at `warn`. Install any
//! logger to see them.

pub mod dense;
pub mod linalg;
pub mod traits;

pub use dense::{DenseMatrix, JaggedMatrix};
pub use linalg::{
    EigenOptions, EigenvalueDecomposition, GeneralizedEigenvalueDecomposition, GramSchmidtOptions,
    GramSchmidtOrthogonalization, LinalgError, LuDecomposition, LuOptions, NmfOptions,
    NonFinitePolicy, NonnegativeMatrixFactorization, QrDecomposition, QrOptions,
    SingularValueDecomposition, SvdOptions,
};
pub use traits::{FloatScalar, MatrixMut, MatrixRef, MatrixStorage, Scalar};
