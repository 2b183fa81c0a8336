use core::ops::{Add, Mul, Neg, Sub};

use crate::traits::Scalar;

use super::DenseMatrix;

// ── Element-wise addition / subtraction ─────────────────────────────

macro_rules! impl_elementwise {
    ($trait:ident, $method:ident, $op:tt, $sym:literal) => {
        impl<T: Scalar> $trait<&DenseMatrix<T>> for &DenseMatrix<T> {
            type Output = DenseMatrix<T>;

            fn $method(self, rhs: &DenseMatrix<T>) -> DenseMatrix<T> {
                assert_eq!(
                    (self.nrows, self.ncols),
                    (rhs.nrows, rhs.ncols),
                    concat!("dimension mismatch: {}x{} ", $sym, " {}x{}"),
                    self.nrows, self.ncols, rhs.nrows, rhs.ncols,
                );
                let data = self
                    .data
                    .iter()
                    .zip(rhs.data.iter())
                    .map(|(&a, &b)| a $op b)
                    .collect();
                DenseMatrix {
                    data,
                    nrows: self.nrows,
                    ncols: self.ncols,
                }
            }
        }

        impl<T: Scalar> $trait for DenseMatrix<T> {
            type Output = DenseMatrix<T>;

            fn $method(self, rhs: Self) -> DenseMatrix<T> {
                (&self).$method(&rhs)
            }
        }

        impl<T: Scalar> $trait<&DenseMatrix<T>> for DenseMatrix<T> {
            type Output = DenseMatrix<T>;

            fn $method(self, rhs: &DenseMatrix<T>) -> DenseMatrix<T> {
                (&self).$method(rhs)
            }
        }
    };
}

impl_elementwise!(Add, add, +, "+");
impl_elementwise!(Sub, sub, -, "-");

// ── Matrix multiplication ───────────────────────────────────────────

impl<T: Scalar> Mul<&DenseMatrix<T>> for &DenseMatrix<T> {
    type Output = DenseMatrix<T>;

    /// Matrix product. Panics on inner-dimension mismatch; use
    /// [`util::matmul`](super::util::matmul) for a fallible version.
    fn mul(self, rhs: &DenseMatrix<T>) -> DenseMatrix<T> {
        assert_eq!(
            self.ncols, rhs.nrows,
            "dimension mismatch: {}x{} * {}x{}",
            self.nrows, self.ncols, rhs.nrows, rhs.ncols,
        );
        let (m, k, n) = (self.nrows, self.ncols, rhs.ncols);
        let mut out = DenseMatrix::zeros(m, n);
        for i in 0..m {
            for p in 0..k {
                let a = self.data[i * k + p];
                let b_row = &rhs.data[p * n..(p + 1) * n];
                let out_row = &mut out.data[i * n..(i + 1) * n];
                for (o, &b) in out_row.iter_mut().zip(b_row) {
                    *o = *o + a * b;
                }
            }
        }
        out
    }
}

impl<T: Scalar> Mul for DenseMatrix<T> {
    type Output = DenseMatrix<T>;

    fn mul(self, rhs: Self) -> DenseMatrix<T> {
        &self * &rhs
    }
}

impl<T: Scalar> Mul<&DenseMatrix<T>> for DenseMatrix<T> {
    type Output = DenseMatrix<T>;

    fn mul(self, rhs: &DenseMatrix<T>) -> DenseMatrix<T> {
        &self * rhs
    }
}

// ── Scalar multiplication ───────────────────────────────────────────

macro_rules! impl_scalar_mul {
    ($($t:ty),*) => {
        $(
            impl Mul<$t> for &DenseMatrix<$t> {
                type Output = DenseMatrix<$t>;

                fn mul(self, rhs: $t) -> DenseMatrix<$t> {
                    self.map(|x| x * rhs)
                }
            }

            impl Mul<$t> for DenseMatrix<$t> {
                type Output = DenseMatrix<$t>;

                fn mul(self, rhs: $t) -> DenseMatrix<$t> {
                    &self * rhs
                }
            }
        )*
    };
}

impl_scalar_mul!(f32, f64);

// ── Negation ────────────────────────────────────────────────────────

impl<T: Scalar + Neg<Output = T>> Neg for &DenseMatrix<T> {
    type Output = DenseMatrix<T>;

    fn neg(self) -> DenseMatrix<T> {
        self.map(|x| -x)
    }
}

impl<T: Scalar + Neg<Output = T>> Neg for DenseMatrix<T> {
    type Output = DenseMatrix<T>;

    fn neg(self) -> DenseMatrix<T> {
        -&self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_sub() {
        let a = DenseMatrix::from_rows(2, 2, &[1.0, 2.0, 3.0, 4.0]);
        let b = DenseMatrix::from_rows(2, 2, &[4.0, 3.0, 2.0, 1.0]);
        let s = &a + &b;
        assert!(s.as_slice().iter().all(|&x| x == 5.0));
        let d = a - &b;
        assert_eq!(d.as_slice(), &[-3.0, -1.0, 1.0, 3.0]);
    }

    #[test]
    fn matmul_rectangular() {
        let a = DenseMatrix::from_rows(2, 3, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let b = DenseMatrix::from_rows(3, 2, &[7.0, 8.0, 9.0, 10.0, 11.0, 12.0]);
        let c = &a * &b;
        assert_eq!(c.nrows(), 2);
        assert_eq!(c.ncols(), 2);
        assert_eq!(c.as_slice(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    #[should_panic(expected = "dimension mismatch")]
    fn matmul_mismatch_panics() {
        let a = DenseMatrix::<f64>::zeros(2, 3);
        let b = DenseMatrix::<f64>::zeros(2, 3);
        let _ = &a * &b;
    }

    #[test]
    fn scalar_and_neg() {
        let a = DenseMatrix::from_rows(1, 2, &[1.0_f64, -2.0]);
        assert_eq!((&a * 3.0).as_slice(), &[3.0, -6.0]);
        assert_eq!((-a).as_slice(), &[-1.0, 2.0]);
    }
}
