//! Fixed-shape dense matrix kernel used by the attitude filter.
//!
//! Shapes are carried in the types, so a mismatched multiply or add is a
//! compile error rather than a runtime condition. The only fallible operation
//! is inversion, which fails closed to the identity.

use libm::fabsf;
use nalgebra::{SMatrix, SVector};

/// Determinant magnitude below which a matrix is treated as singular.
pub const SINGULAR_EPSILON: f32 = 1e-6;

pub type Matrix6 = SMatrix<f32, 6, 6>;
pub type Matrix2x6 = SMatrix<f32, 2, 6>;
pub type Matrix6x2 = SMatrix<f32, 6, 2>;
pub type Matrix1x6 = SMatrix<f32, 1, 6>;
pub type Matrix6x1 = SMatrix<f32, 6, 1>;
pub type Matrix2 = SMatrix<f32, 2, 2>;
pub type Matrix1 = SMatrix<f32, 1, 1>;
pub type Vector6 = SVector<f32, 6>;

#[inline]
#[must_use]
pub fn multiply<const M: usize, const N: usize, const P: usize>(
    a: &SMatrix<f32, M, N>,
    b: &SMatrix<f32, N, P>,
) -> SMatrix<f32, M, P> {
    a * b
}

#[inline]
#[must_use]
pub fn transpose<const M: usize, const N: usize>(a: &SMatrix<f32, M, N>) -> SMatrix<f32, N, M> {
    a.transpose()
}

#[inline]
#[must_use]
pub fn add<const M: usize, const N: usize>(
    a: &SMatrix<f32, M, N>,
    b: &SMatrix<f32, M, N>,
) -> SMatrix<f32, M, N> {
    a + b
}

#[inline]
#[must_use]
pub fn subtract<const M: usize, const N: usize>(
    a: &SMatrix<f32, M, N>,
    b: &SMatrix<f32, M, N>,
) -> SMatrix<f32, M, N> {
    a - b
}

/// Result of a fail-closed inversion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Inversion<const N: usize> {
    Regular(SMatrix<f32, N, N>),
    /// The determinant was within [`SINGULAR_EPSILON`] of zero.
    Singular,
}

impl<const N: usize> Inversion<N> {
    #[inline]
    #[must_use]
    pub fn is_singular(&self) -> bool {
        matches!(self, Inversion::Singular)
    }

    /// The inverse, or the identity when the input was singular.
    #[inline]
    #[must_use]
    pub fn or_identity(self) -> SMatrix<f32, N, N> {
        match self {
            Inversion::Regular(inverse) => inverse,
            Inversion::Singular => SMatrix::identity(),
        }
    }
}

#[must_use]
pub fn inverse2x2(a: &Matrix2) -> Inversion<2> {
    let det = a[(0, 0)] * a[(1, 1)] - a[(0, 1)] * a[(1, 0)];
    if fabsf(det) < SINGULAR_EPSILON {
        return Inversion::Singular;
    }

    let inv_det = 1.0 / det;
    Inversion::Regular(
        Matrix2::new(a[(1, 1)], -a[(0, 1)], -a[(1, 0)], a[(0, 0)]) * inv_det,
    )
}

#[must_use]
pub fn inverse1x1(a: &Matrix1) -> Inversion<1> {
    let det = a[(0, 0)];
    if fabsf(det) < SINGULAR_EPSILON {
        return Inversion::Singular;
    }
    Inversion::Regular(Matrix1::from_element(1.0 / det))
}

#[cfg(test)]
mod tests {
    extern crate std;
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_multiply_shapes() {
        let h = Matrix2x6::from_fn(|i, j| if i == j { 1.0 } else { 0.0 });
        let p = Matrix6::from_fn(|i, j| (i * 6 + j) as f32);

        let hp = multiply(&h, &p);
        assert_eq!(hp.row(0), p.row(0));
        assert_eq!(hp.row(1), p.row(1));

        let hpht: Matrix2 = multiply(&hp, &transpose(&h));
        assert_relative_eq!(hpht, Matrix2::new(0.0, 1.0, 6.0, 7.0));
    }

    #[test]
    fn test_transpose() {
        let a = Matrix1x6::from_row_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        let t: Matrix6x1 = transpose(&a);
        assert_eq!(t, Matrix6x1::from_column_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    }

    #[test]
    fn test_add_subtract() {
        let a = Matrix2::new(1.0, 2.0, 3.0, 4.0);
        let b = Matrix2::new(0.5, 0.5, 0.5, 0.5);
        assert_eq!(add(&a, &b), Matrix2::new(1.5, 2.5, 3.5, 4.5));
        assert_eq!(subtract(&a, &b), Matrix2::new(0.5, 1.5, 2.5, 3.5));
    }

    #[test]
    fn test_inverse2x2() {
        let a = Matrix2::new(4.0, 7.0, 2.0, 6.0);
        let inverse = inverse2x2(&a);
        assert!(!inverse.is_singular());
        assert_relative_eq!(a * inverse.or_identity(), Matrix2::identity(), epsilon = 1e-6);
    }

    #[test]
    fn test_inverse2x2_singular_falls_back_to_identity() {
        let a = Matrix2::new(1.0, 2.0, 2.0, 4.0);
        let inverse = inverse2x2(&a);
        assert!(inverse.is_singular());
        assert_eq!(inverse.or_identity(), Matrix2::identity());
    }

    #[test]
    fn test_inverse1x1() {
        assert_relative_eq!(
            inverse1x1(&Matrix1::from_element(4.0)).or_identity()[(0, 0)],
            0.25
        );

        let tiny = inverse1x1(&Matrix1::from_element(1e-7));
        assert!(tiny.is_singular());
        assert_eq!(tiny.or_identity(), Matrix1::identity());
    }
}
