//! Assembly of the discrete Blatter-Pattyn residual and its Jacobian.
//!
//! Unknowns are the two horizontal velocity components at every node of a grid level, stored
//! in a global vector with the natural ordering of [`DofMap`]. Element loops run over every
//! cell with at least one node in the ghosted box of the process, but contributions are only
//! added to rows of owned nodes.
use crate::boundary::BoundaryConditions;
use crate::element::{NODE_OFFSETS, N_CHI};
use crate::flow_law::FlowLaw;
use crate::grid::decomposition::LocalInfo;
use crate::grid::hierarchy::GridLevel;
use crate::node_type::NodeType;
use eyre::eyre;
use nalgebra::storage::StorageMut;
use nalgebra::{DVector, Dim, Matrix, Vector2};

pub mod jacobian;
pub mod residual;

pub use jacobian::{Jacobian, JacobianAssembler};

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Symmetry {
    NonSymmetric,
    Symmetric,
}

/// Natural ordering of the unknowns of a grid level.
///
/// Component `c` of the velocity at node `(i, j, k)` has index `2 ((j M_x + i) M_z + k) + c`,
/// so the unknowns of a column are contiguous.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DofMap {
    mx: usize,
    my: usize,
    mz: usize,
}

impl DofMap {
    pub fn new(info: &LocalInfo) -> Self {
        Self {
            mx: info.mx,
            my: info.my,
            mz: info.mz,
        }
    }

    pub fn grid_size(&self) -> (usize, usize, usize) {
        (self.mx, self.my, self.mz)
    }

    pub fn num_nodes(&self) -> usize {
        self.mx * self.my * self.mz
    }

    pub fn num_dofs(&self) -> usize {
        2 * self.num_nodes()
    }

    pub fn node_index(&self, i: usize, j: usize, k: usize) -> usize {
        debug_assert!(i < self.mx && j < self.my && k < self.mz);
        (j * self.mx + i) * self.mz + k
    }

    pub fn dof(&self, (i, j, k): (usize, usize, usize), component: usize) -> usize {
        2 * self.node_index(i, j, k) + component
    }

    pub fn velocity(&self, x: &DVector<f64>, node: (usize, usize, usize)) -> Vector2<f64> {
        let d = self.dof(node, 0);
        Vector2::new(x[d], x[d + 1])
    }

    pub fn set_velocity(&self, x: &mut DVector<f64>, node: (usize, usize, usize), value: &Vector2<f64>) {
        let d = self.dof(node, 0);
        x[d] = value[0];
        x[d + 1] = value[1];
    }

    fn check_length(&self, v: &DVector<f64>, name: &str) -> eyre::Result<()> {
        if v.len() != self.num_dofs() {
            return Err(eyre!(
                "{} has length {}, but the grid has {} unknowns",
                name,
                v.len(),
                self.num_dofs()
            ));
        }
        Ok(())
    }
}

/// Copies the strictly upper triangular part of a square matrix into its lower triangular part.
pub(crate) fn clone_upper_to_lower<R, C, S>(matrix: &mut Matrix<f64, R, C, S>)
where
    R: Dim,
    C: Dim,
    S: StorageMut<f64, R, C>,
{
    for j in 0..matrix.ncols() {
        for i in (j + 1)..matrix.nrows() {
            matrix[(i, j)] = matrix[(j, i)];
        }
    }
}

/// Node data of one element gathered from the parameters of a grid level.
#[derive(Clone, Debug)]
struct ElementNodes {
    /// Types of the columns the nodes belong to (never `Dirichlet`).
    column_types: [NodeType; N_CHI],
    x: [f64; N_CHI],
    y: [f64; N_CHI],
    z: [f64; N_CHI],
    surface: [f64; N_CHI],
    hardness: [f64; N_CHI],
}

impl ElementNodes {
    fn gather(level: &GridLevel, (i, j, k): (usize, usize, usize)) -> Self {
        let grid = level.grid_info();
        let parameters = level.parameters();
        let hardness = level.hardness();

        let mut nodes = ElementNodes {
            column_types: [NodeType::Exterior; N_CHI],
            x: [0.0; N_CHI],
            y: [0.0; N_CHI],
            z: [0.0; N_CHI],
            surface: [0.0; N_CHI],
            hardness: [0.0; N_CHI],
        };
        for (n, &(di, dj, dk)) in NODE_OFFSETS.iter().enumerate() {
            let (ii, jj, kk) = (i + di, j + dj, k + dk);
            let p = &parameters[(ii, jj)];
            nodes.column_types[n] = p.node_type;
            nodes.x[n] = grid.x(ii);
            nodes.y[n] = grid.y(jj);
            nodes.z[n] = level.node_z(ii, jj, kk);
            nodes.surface[n] = p.surface();
            nodes.hardness[n] = hardness[(ii, jj, kk)];
        }
        nodes
    }

    /// An element is exterior if one or more of its nodes are exterior.
    fn is_exterior(&self) -> bool {
        self.column_types.iter().any(|&t| t == NodeType::Exterior)
    }
}

/// Residual and Jacobian assembly on one grid level.
#[derive(Debug)]
pub struct LevelAssembler<'a, B, F> {
    level: &'a GridLevel,
    boundary: &'a B,
    flow_law: &'a F,
    driving_stress_scale: f64,
}

impl<'a, B, F> LevelAssembler<'a, B, F>
where
    B: BoundaryConditions,
    F: FlowLaw,
{
    /// `driving_stress_scale` multiplies the surface gradient term of the weak form, usually
    /// $\rho g$.
    pub fn new(level: &'a GridLevel, boundary: &'a B, flow_law: &'a F, driving_stress_scale: f64) -> Self {
        Self {
            level,
            boundary,
            flow_law,
            driving_stress_scale,
        }
    }

    pub fn level(&self) -> &GridLevel {
        self.level
    }

    pub fn dof_map(&self) -> DofMap {
        DofMap::new(self.level.local_info())
    }

    /// Strain rate invariant
    /// $\gamma = u_x^2 + v_y^2 + u_x v_y + \frac{1}{4} ((u_y + v_x)^2 + u_z^2 + v_z^2)$.
    fn strain_rate_invariant(ux: f64, uy: f64, uz: f64, vx: f64, vy: f64, vz: f64) -> f64 {
        ux * ux + vy * vy + ux * vy + 0.25 * ((uy + vx) * (uy + vx) + uz * uz + vz * vz)
    }

    /// Cell size used for the scaling of the Dirichlet equations in column `(i, j)`.
    fn dirichlet_cell_size(&self, i: usize, j: usize) -> (f64, f64, f64) {
        let grid = self.level.grid_info();
        let mz = self.level.local_info().mz;
        let thickness = self.level.parameters()[(i, j)].thickness;
        let dz = thickness.max(grid.min_thickness) / (mz - 1) as f64;
        (grid.dx, grid.dy, dz)
    }
}
