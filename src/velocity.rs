//! The computed velocity in the form handed to the rest of the model.
use crate::assembly::DofMap;
use crate::error::BlatterError;
use crate::grid::array::{Array3, GridBox};
use crate::grid::hierarchy::GridLevel;
use crate::parameters::InputGrid;
use nalgebra::{DVector, Vector2};

/// Horizontal ice velocity on the columns of the input grid.
///
/// Values are stored on the normalized vertical levels `sigma` of the solver, from the base
/// (`0`) to the surface (`1`). Padding columns of the solver grid are not included.
#[derive(Clone, Debug, PartialEq)]
pub struct VelocityField {
    sigma: Vec<f64>,
    u: Array3<f64>,
    v: Array3<f64>,
}

impl VelocityField {
    /// A zero velocity on the input columns owned by the process of `level`.
    pub fn zeros(level: &GridLevel, input_grid: &InputGrid) -> Self {
        let grid_box = input_columns(level, input_grid);
        let mz = level.local_info().mz;
        Self {
            sigma: level.sigma(),
            u: Array3::new(grid_box, mz, 0.0),
            v: Array3::new(grid_box, mz, 0.0),
        }
    }

    /// Extracts the velocity from a solution vector of the finest level.
    pub fn from_solution(level: &GridLevel, input_grid: &InputGrid, solution: &DVector<f64>) -> Result<Self, BlatterError> {
        let dofs = DofMap::new(level.local_info());
        if solution.len() != dofs.num_dofs() {
            return Err(BlatterError::InvalidInput(format!(
                "solution has length {}, but the grid has {} unknowns",
                solution.len(),
                dofs.num_dofs()
            )));
        }
        let grid_box = input_columns(level, input_grid);
        let mz = level.local_info().mz;
        Ok(Self {
            sigma: level.sigma(),
            u: Array3::from_fn(grid_box, mz, |i, j, k| solution[dofs.dof((i, j, k), 0)]),
            v: Array3::from_fn(grid_box, mz, |i, j, k| solution[dofs.dof((i, j, k), 1)]),
        })
    }

    pub fn sigma(&self) -> &[f64] {
        &self.sigma
    }

    /// Columns covered by this field.
    pub fn grid_box(&self) -> &GridBox {
        self.u.grid_box()
    }

    pub fn u(&self) -> &Array3<f64> {
        &self.u
    }

    pub fn v(&self) -> &Array3<f64> {
        &self.v
    }

    pub fn velocity(&self, i: usize, j: usize, k: usize) -> Vector2<f64> {
        Vector2::new(self.u[(i, j, k)], self.v[(i, j, k)])
    }

    /// Velocity at the ice surface.
    pub fn surface_velocity(&self, i: usize, j: usize) -> Vector2<f64> {
        self.velocity(i, j, self.sigma.len() - 1)
    }
}

/// Owned columns of `level` that belong to the input grid.
fn input_columns(level: &GridLevel, input_grid: &InputGrid) -> GridBox {
    let owned = level.local_info().owned;
    let x_end = owned.x_end().min(input_grid.mx);
    let y_end = owned.y_end().min(input_grid.my);
    GridBox::new(
        owned.xs,
        owned.ys,
        x_end.saturating_sub(owned.xs),
        y_end.saturating_sub(owned.ys),
    )
}
