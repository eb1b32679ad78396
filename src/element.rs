//! Trilinear hexahedral (Q1) elements spanning one cell of the structured grid.
//!
//! Local nodes follow the usual Hex8 ordering on the reference cube $[-1, 1]^3$:
//!
//! ```text
//!     7 -------- 6
//!    /|         /|
//!   4 -------- 5 |
//!   | 3 -------|-2        zeta
//!   |/         |/          | eta
//!   0 -------- 1           |/__ xi
//! ```
//!
//! The horizontal coordinates are affine in $(\xi, \eta)$, while the elevation of each node
//! follows the ice geometry, so the vertical coordinate is trilinear.
use nalgebra::{Point3, Vector3};

pub mod face;
pub mod q1;

pub use face::Q1Element3Face;
pub use q1::Q1Element3;

/// Number of nodes (and basis functions) of a Q1 hexahedron.
pub const N_CHI: usize = 8;

/// Grid offsets `(di, dj, dk)` of each local node relative to the element's lower corner.
pub const NODE_OFFSETS: [(usize, usize, usize); N_CHI] = [
    (0, 0, 0),
    (1, 0, 0),
    (1, 1, 0),
    (0, 1, 0),
    (0, 0, 1),
    (1, 0, 1),
    (1, 1, 1),
    (0, 1, 1),
];

/// Number of faces of a hexahedron.
pub const N_FACES: usize = 6;

/// Local nodes of each face, ordered `-xi, +xi, -eta, +eta, -zeta, +zeta`.
pub const FACE_NODES: [[usize; 4]; N_FACES] = [
    [0, 3, 7, 4],
    [1, 2, 6, 5],
    [0, 1, 5, 4],
    [3, 2, 6, 7],
    [0, 1, 2, 3],
    [4, 5, 6, 7],
];

/// Value and physical gradient of a basis function at a quadrature point.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BasisValue {
    pub val: f64,
    pub dx: f64,
    pub dy: f64,
    pub dz: f64,
}

/// Reference coordinates of a local node.
fn reference_node(n: usize) -> [f64; 3] {
    let (di, dj, dk) = NODE_OFFSETS[n];
    let sign = |d: usize| if d == 0 { -1.0 } else { 1.0 };
    [sign(di), sign(dj), sign(dk)]
}

/// Linear basis function on the interval [-1, 1].
///
/// `alpha == -1` denotes the basis function associated with the node at `x == -1`,
/// and `alpha == 1` for `x == 1`.
#[inline(always)]
fn phi_linear_1d(alpha: f64, xi: f64) -> f64 {
    (1.0 + alpha * xi) / 2.0
}

#[inline(always)]
fn phi_linear_1d_grad(alpha: f64) -> f64 {
    alpha / 2.0
}

/// Values of the eight trilinear basis functions at `xi`.
pub fn hex8_basis(xi: &Point3<f64>) -> [f64; N_CHI] {
    let mut phi = [0.0; N_CHI];
    for (n, phi_n) in phi.iter_mut().enumerate() {
        let [a, b, c] = reference_node(n);
        *phi_n = phi_linear_1d(a, xi[0]) * phi_linear_1d(b, xi[1]) * phi_linear_1d(c, xi[2]);
    }
    phi
}

/// Reference gradients of the eight trilinear basis functions at `xi`.
#[rustfmt::skip]
pub fn hex8_gradients(xi: &Point3<f64>) -> [Vector3<f64>; N_CHI] {
    let phi_1d = phi_linear_1d;
    let grad_1d = phi_linear_1d_grad;
    let mut gradients = [Vector3::zeros(); N_CHI];
    for (n, grad) in gradients.iter_mut().enumerate() {
        let [a, b, c] = reference_node(n);
        *grad = Vector3::new(
            grad_1d(a) * phi_1d(b, xi[1]) * phi_1d(c, xi[2]),
            phi_1d(a, xi[0]) * grad_1d(b) * phi_1d(c, xi[2]),
            phi_1d(a, xi[0]) * phi_1d(b, xi[1]) * grad_1d(c)
        );
    }
    gradients
}

/// Partial derivatives `(p, q, r) = (dz/dxi, dz/deta, dz/dzeta)` of the elevation.
fn elevation_derivatives(z_nodal: &[f64; N_CHI], reference_gradients: &[Vector3<f64>; N_CHI]) -> Vector3<f64> {
    z_nodal
        .iter()
        .zip(reference_gradients)
        .fold(Vector3::zeros(), |acc, (z, g)| acc + g * *z)
}
