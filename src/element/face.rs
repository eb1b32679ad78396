use crate::element::{elevation_derivatives, hex8_basis, hex8_gradients, FACE_NODES, N_CHI, N_FACES};
use crate::quadrature::quadrilateral_gauss_2;
use eyre::eyre;
use nalgebra::{Matrix3, Point3, Vector3};

/// Number of quadrature points on a face.
pub const N_FACE_PTS: usize = 4;

/// Reference outward normal of each face.
fn reference_normal(face: usize) -> Vector3<f64> {
    let mut n = Vector3::zeros();
    n[face / 2] = if face % 2 == 0 { -1.0 } else { 1.0 };
    n
}

/// Embeds a point of the reference square into the given face of the reference cube.
fn face_point(face: usize, s: f64, t: f64) -> Point3<f64> {
    let axis = face / 2;
    let fixed = if face % 2 == 0 { -1.0 } else { 1.0 };
    let mut xi = Point3::origin();
    let mut free = [s, t].into_iter();
    for (d, x) in xi.coords.iter_mut().enumerate() {
        *x = if d == axis { fixed } else { free.next().unwrap_or(0.0) };
    }
    xi
}

/// Quadrature on one face of a [`Q1Element3`](crate::element::Q1Element3) with 2x2 Gauss points.
///
/// Surface weights and outward unit normals follow from Nanson's formula,
/// $\vec n \, dA = \det J \, J^{-T} \vec N \, d\hat A$.
#[derive(Clone, Debug)]
pub struct Q1Element3Face {
    dx: f64,
    dy: f64,
    /// Values of all eight basis functions at the quadrature points of every face.
    reference_values: [[[f64; N_CHI]; N_FACE_PTS]; N_FACES],
    reference_gradients: [[[Vector3<f64>; N_CHI]; N_FACE_PTS]; N_FACES],
    reference_weights: [f64; N_FACE_PTS],
    face: usize,
    weights: [f64; N_FACE_PTS],
    normals: [Vector3<f64>; N_FACE_PTS],
}

impl Q1Element3Face {
    pub fn new(dx: f64, dy: f64) -> Self {
        let (reference_weights, points) = quadrilateral_gauss_2();
        let mut reference_values = [[[0.0; N_CHI]; N_FACE_PTS]; N_FACES];
        let mut reference_gradients = [[[Vector3::zeros(); N_CHI]; N_FACE_PTS]; N_FACES];
        for face in 0..N_FACES {
            for (q, p) in points.iter().enumerate() {
                let xi = face_point(face, p[0], p[1]);
                reference_values[face][q] = hex8_basis(&xi);
                reference_gradients[face][q] = hex8_gradients(&xi);
            }
        }
        Self {
            dx,
            dy,
            reference_values,
            reference_gradients,
            reference_weights,
            face: 0,
            weights: [0.0; N_FACE_PTS],
            normals: [Vector3::zeros(); N_FACE_PTS],
        }
    }

    pub fn n_pts(&self) -> usize {
        N_FACE_PTS
    }

    /// Local nodes of the current face.
    pub fn nodes(&self) -> &[usize; 4] {
        &FACE_NODES[self.face]
    }

    /// Selects `face` of the element with node elevations `z_nodal`.
    pub fn reset(&mut self, face: usize, z_nodal: &[f64; N_CHI]) -> eyre::Result<()> {
        assert!(face < N_FACES, "Face index {} out of bounds", face);
        self.face = face;
        let normal = reference_normal(face);
        let (a, b) = (0.5 * self.dx, 0.5 * self.dy);
        for q in 0..N_FACE_PTS {
            let z_ref = elevation_derivatives(z_nodal, &self.reference_gradients[face][q]);
            #[rustfmt::skip]
            let j = Matrix3::new(
                a,        0.0,      0.0,
                0.0,      b,        0.0,
                z_ref[0], z_ref[1], z_ref[2]);
            let j_inv = j
                .try_inverse()
                .ok_or_else(|| eyre!("Singular element Jacobian encountered on face {}", face))?;
            let scaled_normal = j_inv.transpose() * normal;
            let length = scaled_normal.norm();
            self.weights[q] = self.reference_weights[q] * j.determinant().abs() * length;
            self.normals[q] = scaled_normal / length;
        }
        Ok(())
    }

    /// Surface quadrature weight at `q`.
    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    /// Outward unit normal at `q`.
    pub fn normal(&self, q: usize) -> &Vector3<f64> {
        &self.normals[q]
    }

    /// Value of the basis function of local node `n` at `q`. Zero for nodes not on the face.
    pub fn chi(&self, q: usize, n: usize) -> f64 {
        self.reference_values[self.face][q][n]
    }

    pub fn evaluate(&self, nodal: &[f64; N_CHI], q: usize) -> f64 {
        (0..N_CHI).map(|n| nodal[n] * self.chi(q, n)).sum()
    }
}
