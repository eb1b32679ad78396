//! Gauss quadrature rules on the reference square and cube.
use nalgebra::{Point2, Point3};

/// Weights and points of a quadrature rule.
pub type QuadraturePair<Point, const N: usize> = ([f64; N], [Point; N]);

/// The two-point Gauss-Legendre rule on `[-1, 1]`.
pub fn gauss_2() -> ([f64; 2], [f64; 2]) {
    let a = 1.0 / 3.0f64.sqrt();
    ([1.0, 1.0], [-a, a])
}

/// Tensor product Gauss rule with 2x2 points on `[-1, 1]^2`. The first coordinate varies fastest.
pub fn quadrilateral_gauss_2() -> QuadraturePair<Point2<f64>, 4> {
    let (w, x) = gauss_2();
    let mut weights = [0.0; 4];
    let mut points = [Point2::origin(); 4];
    for j in 0..2 {
        for i in 0..2 {
            weights[2 * j + i] = w[i] * w[j];
            points[2 * j + i] = Point2::new(x[i], x[j]);
        }
    }
    (weights, points)
}

/// Tensor product Gauss rule with 2x2x2 points on `[-1, 1]^3`. The first coordinate varies
/// fastest.
pub fn hexahedron_gauss_2() -> QuadraturePair<Point3<f64>, 8> {
    let (w, x) = gauss_2();
    let mut weights = [0.0; 8];
    let mut points = [Point3::origin(); 8];
    for k in 0..2 {
        for j in 0..2 {
            for i in 0..2 {
                let q = 4 * k + 2 * j + i;
                weights[q] = w[i] * w[j] * w[k];
                points[q] = Point3::new(x[i], x[j], x[k]);
            }
        }
    }
    (weights, points)
}
