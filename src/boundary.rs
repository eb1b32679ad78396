//! Boundary conditions of the stress balance.
use nalgebra::{Vector2, Vector3};

/// Prescribed velocity at the ice base and traction on the lateral ice boundary.
pub trait BoundaryConditions {
    /// Velocity at a Dirichlet node.
    fn dirichlet_velocity(&self, x: f64, y: f64, z: f64) -> Vector2<f64>;

    /// Traction at a point of the Neumann boundary with outward unit normal `normal`.
    fn neumann_traction(&self, x: f64, y: f64, z: f64, normal: &Vector3<f64>) -> Vector2<f64>;
}

/// Ice frozen to the bed and a stress-free lateral boundary.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct NoSlipStressFree;

impl BoundaryConditions for NoSlipStressFree {
    fn dirichlet_velocity(&self, _x: f64, _y: f64, _z: f64) -> Vector2<f64> {
        Vector2::zeros()
    }

    fn neumann_traction(&self, _x: f64, _y: f64, _z: f64, _normal: &Vector3<f64>) -> Vector2<f64> {
        Vector2::zeros()
    }
}

/// Velocity prescribed at ice-free (exterior) nodes.
pub fn exterior_velocity() -> Vector2<f64> {
    Vector2::zeros()
}

/// Scaling of the equations at Dirichlet and exterior nodes for cells of size `dx x dy x dz`.
///
/// Chosen so that these rows are comparable in magnitude to the diagonal of interior rows.
/// The viscosity does not enter the scaling.
pub fn dirichlet_scale(dx: f64, dy: f64, dz: f64) -> Vector2<f64> {
    Vector2::new(
        dx * dy / dz + dx * dz / dy + 4.0 * dy * dz / dx,
        dx * dy / dz + 4.0 * dx * dz / dy + dy * dz / dx,
    )
}
