use crate::element::{elevation_derivatives, hex8_basis, hex8_gradients, BasisValue, NODE_OFFSETS, N_CHI};
use crate::quadrature::hexahedron_gauss_2;
use eyre::eyre;
use nalgebra::{Matrix2x3, Vector2, Vector3};

/// Number of quadrature points of [`Q1Element3`].
pub const N_PTS: usize = 8;

/// A Q1 hexahedron on a column-following grid with 2x2x2 Gauss quadrature.
///
/// The map from the reference cube has the Jacobian
///
/// $$
/// J = \begin{pmatrix} a & 0 & 0 \\\\ 0 & b & 0 \\\\ p & q & r \end{pmatrix},
/// $$
///
/// with $a = \Delta x / 2$, $b = \Delta y / 2$ and $(p, q, r)$ the reference derivatives of
/// the elevation. Physical gradients are obtained from reference gradients by solving
/// $J^T \nabla \chi = \hat \nabla \chi$, which only needs a division by each diagonal entry.
#[derive(Clone, Debug)]
pub struct Q1Element3 {
    dx: f64,
    dy: f64,
    corner: (usize, usize, usize),
    reference_weights: [f64; N_PTS],
    reference_values: [[f64; N_CHI]; N_PTS],
    reference_gradients: [[Vector3<f64>; N_CHI]; N_PTS],
    chi: [[BasisValue; N_CHI]; N_PTS],
    weights: [f64; N_PTS],
    row_invalid: [bool; N_CHI],
    col_invalid: [bool; N_CHI],
}

impl Q1Element3 {
    pub fn new(dx: f64, dy: f64) -> Self {
        let (reference_weights, points) = hexahedron_gauss_2();
        Self {
            dx,
            dy,
            corner: (0, 0, 0),
            reference_weights,
            reference_values: points.map(|xi| hex8_basis(&xi)),
            reference_gradients: points.map(|xi| hex8_gradients(&xi)),
            chi: [[BasisValue::default(); N_CHI]; N_PTS],
            weights: [0.0; N_PTS],
            row_invalid: [false; N_CHI],
            col_invalid: [false; N_CHI],
        }
    }

    pub fn n_chi(&self) -> usize {
        N_CHI
    }

    pub fn n_pts(&self) -> usize {
        N_PTS
    }

    /// Moves the element to the cell with lower corner `(i, j, k)` and node elevations `z_nodal`.
    ///
    /// Recomputes basis gradients and quadrature weights, and marks every row and column valid.
    /// Fails if the element is degenerate or inverted.
    pub fn reset(&mut self, (i, j, k): (usize, usize, usize), z_nodal: &[f64; N_CHI]) -> eyre::Result<()> {
        self.corner = (i, j, k);
        self.row_invalid = [false; N_CHI];
        self.col_invalid = [false; N_CHI];

        let a = 0.5 * self.dx;
        let b = 0.5 * self.dy;
        for q in 0..N_PTS {
            let ref_grads = &self.reference_gradients[q];
            let z_ref = elevation_derivatives(z_nodal, ref_grads);
            let (p, q_, r) = (z_ref[0], z_ref[1], z_ref[2]);

            let det_j = a * b * r;
            if !(det_j > 0.0) {
                return Err(eyre!(
                    "Degenerate element Jacobian (det = {}) in cell ({}, {}, {})",
                    det_j,
                    i,
                    j,
                    k
                ));
            }
            self.weights[q] = self.reference_weights[q] * det_j;

            for n in 0..N_CHI {
                let g = &ref_grads[n];
                let dz = g[2] / r;
                self.chi[q][n] = BasisValue {
                    val: self.reference_values[q][n],
                    dx: (g[0] - p * dz) / a,
                    dy: (g[1] - q_ * dz) / b,
                    dz,
                };
            }
        }
        Ok(())
    }

    /// Grid index of local node `n` of the current cell.
    pub fn local_to_global(&self, n: usize) -> (usize, usize, usize) {
        let (i, j, k) = self.corner;
        let (di, dj, dk) = NODE_OFFSETS[n];
        (i + di, j + dj, k + dk)
    }

    pub fn chi(&self, q: usize, n: usize) -> &BasisValue {
        &self.chi[q][n]
    }

    /// Quadrature weight at `q`, including the Jacobian determinant.
    pub fn weight(&self, q: usize) -> f64 {
        self.weights[q]
    }

    /// Excludes the equation of local node `n` when element contributions are added to the
    /// global residual or Jacobian.
    pub fn mark_row_invalid(&mut self, n: usize) {
        self.row_invalid[n] = true;
    }

    /// Excludes the unknowns of local node `n` when the element Jacobian is added to the global one.
    pub fn mark_col_invalid(&mut self, n: usize) {
        self.col_invalid[n] = true;
    }

    pub fn row_is_valid(&self, n: usize) -> bool {
        !self.row_invalid[n]
    }

    pub fn col_is_valid(&self, n: usize) -> bool {
        !self.col_invalid[n]
    }

    pub fn evaluate(&self, nodal: &[f64; N_CHI], q: usize) -> f64 {
        (0..N_CHI).map(|n| nodal[n] * self.chi[q][n].val).sum()
    }

    pub fn evaluate_gradient(&self, nodal: &[f64; N_CHI], q: usize) -> Vector3<f64> {
        (0..N_CHI).fold(Vector3::zeros(), |acc, n| {
            let chi = &self.chi[q][n];
            acc + nodal[n] * Vector3::new(chi.dx, chi.dy, chi.dz)
        })
    }

    /// Value and gradient of a vector field at `q`.
    ///
    /// Row `c` of the gradient holds the `x`, `y` and `z` derivatives of component `c`.
    pub fn evaluate_vector(&self, nodal: &[Vector2<f64>; N_CHI], q: usize) -> (Vector2<f64>, Matrix2x3<f64>) {
        let mut value = Vector2::zeros();
        let mut gradient = Matrix2x3::zeros();
        for n in 0..N_CHI {
            let chi = &self.chi[q][n];
            value += nodal[n] * chi.val;
            gradient += nodal[n] * Vector3::new(chi.dx, chi.dy, chi.dz).transpose();
        }
        (value, gradient)
    }
}
