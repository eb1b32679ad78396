//! Model parameters consumed by the stress balance.
use crate::error::BlatterError;
use crate::grid::array::{Array2, Array3, GridBox};
use crate::node_type::NodeType;

/// Parameters stored for every grid column.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct ColumnParameters {
    /// Bed elevation.
    pub bed: f64,
    pub thickness: f64,
    /// Basal yield stress.
    pub tauc: f64,
    /// Sea level elevation, used to determine if a column is grounded.
    pub sea_level: f64,
    pub node_type: NodeType,
}

impl ColumnParameters {
    pub fn surface(&self) -> f64 {
        self.bed + self.thickness
    }
}

/// The horizontal grid on which input fields are provided.
///
/// The domain is `[-lx, lx] x [-ly, ly]` with `mx x my` equally spaced columns.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct InputGrid {
    pub mx: usize,
    pub my: usize,
    pub lx: f64,
    pub ly: f64,
}

impl InputGrid {
    pub fn new(mx: usize, my: usize, lx: f64, ly: f64) -> Self {
        Self { mx, my, lx, ly }
    }

    pub fn dx(&self) -> f64 {
        2.0 * self.lx / (self.mx - 1) as f64
    }

    pub fn dy(&self) -> f64 {
        2.0 * self.ly / (self.my - 1) as f64
    }

    pub fn x(&self, i: usize) -> f64 {
        -self.lx + i as f64 * self.dx()
    }

    pub fn y(&self, j: usize) -> f64 {
        -self.ly + j as f64 * self.dy()
    }

    pub fn full_box(&self) -> GridBox {
        GridBox::new(0, 0, self.mx, self.my)
    }

    pub fn validate(&self) -> Result<(), BlatterError> {
        if self.mx < 2 || self.my < 2 {
            return Err(BlatterError::InvalidConfiguration(format!(
                "input grid must have at least 2x2 columns, got {}x{}",
                self.mx, self.my
            )));
        }
        if !(self.lx > 0.0 && self.ly > 0.0) {
            return Err(BlatterError::InvalidConfiguration(format!(
                "domain half-widths must be positive, got ({}, {})",
                self.lx, self.ly
            )));
        }
        Ok(())
    }
}

/// Fields provided by the rest of the model for a single solve.
///
/// All 2D fields must cover the same box of input grid columns. The hardness has any number
/// (at least one) of levels equally spaced in the normalized vertical coordinate
/// $\sigma \in [0, 1]$ and is linearly interpolated between them.
#[derive(Clone, Debug, PartialEq)]
pub struct Inputs {
    pub bed: Array2<f64>,
    pub thickness: Array2<f64>,
    pub basal_yield_stress: Array2<f64>,
    pub sea_level: Array2<f64>,
    /// Ice hardness $B$ in $\text{Pa}\,\text{s}^{1/n}$.
    pub hardness: Array3<f64>,
}

impl Inputs {
    /// Inputs on the whole input grid with bed and thickness given as functions of `(x, y)`,
    /// a uniform hardness, zero yield stress and zero sea level.
    pub fn from_functions(
        grid: &InputGrid,
        bed: impl Fn(f64, f64) -> f64,
        thickness: impl Fn(f64, f64) -> f64,
        hardness: f64,
    ) -> Self {
        let grid_box = grid.full_box();
        Self {
            bed: Array2::from_fn(grid_box, |i, j| bed(grid.x(i), grid.y(j))),
            thickness: Array2::from_fn(grid_box, |i, j| thickness(grid.x(i), grid.y(j))),
            basal_yield_stress: Array2::new(grid_box, 0.0),
            sea_level: Array2::new(grid_box, 0.0),
            hardness: Array3::new(grid_box, 1, hardness),
        }
    }

    pub fn validate(&self) -> Result<(), BlatterError> {
        let grid_box = self.thickness.grid_box();
        let boxes = [
            self.bed.grid_box(),
            self.basal_yield_stress.grid_box(),
            self.sea_level.grid_box(),
            self.hardness.grid_box(),
        ];
        if boxes.iter().any(|b| *b != grid_box) {
            return Err(BlatterError::InvalidInput(
                "all input fields must cover the same grid columns".to_string(),
            ));
        }
        if self.hardness.mz() == 0 {
            return Err(BlatterError::InvalidInput(
                "hardness must have at least one level".to_string(),
            ));
        }
        Ok(())
    }

    /// Parameters of the solver column `(i, j)`.
    ///
    /// Columns beyond the input grid (padding) copy the nearest input column, except that they
    /// are ice free.
    pub fn column_parameters(&self, grid: &InputGrid, i: usize, j: usize) -> Result<ColumnParameters, BlatterError> {
        let (ii, jj) = nearest_input_column(grid, i, j);
        let padding = (ii, jj) != (i, j);
        let value = |field: &Array2<f64>, name: &str| {
            field.get(ii, jj).copied().ok_or_else(|| {
                BlatterError::InvalidInput(format!(
                    "{} is not available at input column ({}, {}) (stored box {:?})",
                    name,
                    ii,
                    jj,
                    field.grid_box()
                ))
            })
        };
        Ok(ColumnParameters {
            bed: value(&self.bed, "bed elevation")?,
            thickness: if padding {
                0.0
            } else {
                value(&self.thickness, "thickness")?
            },
            tauc: value(&self.basal_yield_stress, "basal yield stress")?,
            sea_level: value(&self.sea_level, "sea level")?,
            node_type: NodeType::Exterior,
        })
    }

    /// Hardness of the solver column `(i, j)` interpolated to the normalized height `sigma`.
    pub fn hardness_at(&self, grid: &InputGrid, i: usize, j: usize, sigma: f64) -> Result<f64, BlatterError> {
        let (ii, jj) = nearest_input_column(grid, i, j);
        if !self.hardness.grid_box().contains(ii, jj) {
            return Err(BlatterError::InvalidInput(format!(
                "hardness is not available at input column ({}, {})",
                ii, jj
            )));
        }
        Ok(interpolate_column(self.hardness.column(ii, jj), sigma))
    }
}

fn nearest_input_column(grid: &InputGrid, i: usize, j: usize) -> (usize, usize) {
    (i.min(grid.mx - 1), j.min(grid.my - 1))
}

/// Linear interpolation of values at equally spaced levels in `[0, 1]`.
pub fn interpolate_column(values: &[f64], sigma: f64) -> f64 {
    match values.len() {
        0 => 0.0,
        1 => values[0],
        n => {
            let position = sigma.clamp(0.0, 1.0) * (n - 1) as f64;
            let k = (position.floor() as usize).min(n - 2);
            let t = position - k as f64;
            (1.0 - t) * values[k] + t * values[k + 1]
        }
    }
}
