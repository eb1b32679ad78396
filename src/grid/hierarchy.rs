use crate::comm::Communicator;
use crate::config::BlatterConfig;
use crate::error::BlatterError;
use crate::grid::array::{Array2, Array3};
use crate::grid::decomposition::{Decomposition, LocalInfo};
use crate::grid::padding::{coarsened_size, grid_padding};
use crate::node_type::classify_columns;
use crate::parameters::{ColumnParameters, InputGrid, Inputs};
use log::warn;

/// Geometry of the horizontal grid of one level.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridInfo {
    pub x_min: f64,
    pub y_min: f64,
    pub dx: f64,
    pub dy: f64,
    pub min_thickness: f64,
}

impl GridInfo {
    pub fn x(&self, i: usize) -> f64 {
        self.x_min + i as f64 * self.dx
    }

    pub fn y(&self, j: usize) -> f64 {
        self.y_min + j as f64 * self.dy
    }

    /// Grid spacing of the level obtained by coarsening once.
    pub fn coarsen(&self) -> Self {
        Self {
            dx: 2.0 * self.dx,
            dy: 2.0 * self.dy,
            ..*self
        }
    }
}

/// Elevation of level `k` in a column with bed elevation `b` and thickness `thickness`.
pub fn grid_z(b: f64, thickness: f64, mz: usize, k: usize) -> f64 {
    b + thickness * k as f64 / (mz - 1) as f64
}

/// Normalized heights of the `mz` levels of a column. The last one is exactly 1.
pub fn sigma_levels(mz: usize) -> Vec<f64> {
    let dz = 1.0 / (mz - 1) as f64;
    let mut sigma: Vec<_> = (0..mz).map(|k| k as f64 * dz).collect();
    if let Some(last) = sigma.last_mut() {
        *last = 1.0;
    }
    sigma
}

/// One level of the grid hierarchy together with its (ghosted) parameters.
#[derive(Clone, Debug)]
pub struct GridLevel {
    info: LocalInfo,
    grid: GridInfo,
    decomposition: Decomposition,
    rank: usize,
    parameters: Array2<ColumnParameters>,
    hardness: Array3<f64>,
}

/// Full weighting along one direction: weights of the fine points `2I - 1, 2I, 2I + 1`.
fn full_weighting(center: usize, m: usize) -> impl Iterator<Item = (usize, f64)> {
    let offsets = [(-1isize, 0.5), (0, 1.0), (1, 0.5)];
    offsets.into_iter().filter_map(move |(d, w)| {
        let index = center as isize + d;
        (index >= 0 && (index as usize) < m).then(|| (index as usize, w))
    })
}

impl GridLevel {
    pub fn new(grid: GridInfo, decomposition: Decomposition, rank: usize, mz: usize) -> Self {
        let info = LocalInfo::new(&decomposition, rank, mz);
        Self {
            parameters: Array2::new(info.ghosted, ColumnParameters::default()),
            hardness: Array3::new(info.ghosted, mz, 0.0),
            info,
            grid,
            decomposition,
            rank,
        }
    }

    pub fn local_info(&self) -> &LocalInfo {
        &self.info
    }

    pub fn grid_info(&self) -> &GridInfo {
        &self.grid
    }

    pub fn decomposition(&self) -> &Decomposition {
        &self.decomposition
    }

    pub fn parameters(&self) -> &Array2<ColumnParameters> {
        &self.parameters
    }

    pub fn hardness(&self) -> &Array3<f64> {
        &self.hardness
    }

    /// Elevation of node `(i, j, k)`.
    ///
    /// The thickness is floored to the minimum thickness, so the vertical spacing is positive
    /// even in ice-free columns.
    pub fn node_z(&self, i: usize, j: usize, k: usize) -> f64 {
        let p = &self.parameters[(i, j)];
        grid_z(p.bed, p.thickness.max(self.grid.min_thickness), self.info.mz, k)
    }

    /// Ghosted parameters and hardness, for filling them directly.
    ///
    /// Callers must refresh ghosts and node types afterwards, see [`GridLevel::update_node_types`].
    pub fn parameters_mut(&mut self) -> (&mut Array2<ColumnParameters>, &mut Array3<f64>) {
        (&mut self.parameters, &mut self.hardness)
    }

    pub fn sigma(&self) -> Vec<f64> {
        sigma_levels(self.info.mz)
    }

    /// Creates the level with half the resolution in every direction.
    ///
    /// The extent of the domain is unchanged. Parameters of the new level are empty until
    /// [`GridLevel::restrict_into`] is called.
    pub fn coarsen(&self) -> Result<GridLevel, BlatterError> {
        let LocalInfo { mx, my, mz, .. } = self.info;
        if (mx - 1) % 2 != 0 || (my - 1) % 2 != 0 || (mz - 1) % 2 != 0 || mx < 3 || my < 3 || mz < 3 {
            return Err(BlatterError::InvalidConfiguration(format!(
                "a {}x{}x{} grid cannot be coarsened",
                mx, my, mz
            )));
        }
        let decomposition = self.decomposition.coarsen()?;
        let coarse = GridLevel::new(self.grid.coarsen(), decomposition, self.rank, coarsened_size(mz));
        debug_assert_eq!(coarse.info.mx, coarsened_size(mx));
        debug_assert_eq!(coarse.info.my, coarsened_size(my));
        Ok(coarse)
    }

    /// Stores `inputs` on this level and classifies its nodes.
    pub fn set_inputs<C: Communicator>(
        &mut self,
        comm: &C,
        input_grid: &InputGrid,
        inputs: &Inputs,
    ) -> Result<(), BlatterError> {
        inputs.validate()?;
        let sigma = self.sigma();
        for (i, j) in self.info.owned.columns() {
            self.parameters[(i, j)] = inputs.column_parameters(input_grid, i, j)?;
            let column = self.hardness.column_mut(i, j);
            for (k, &s) in sigma.iter().enumerate() {
                column[k] = inputs.hardness_at(input_grid, i, j, s)?;
            }
        }
        comm.update_ghosts_3d(&self.info, &mut self.hardness)?;
        self.update_node_types(comm)
    }

    /// Refreshes the halo of the parameters and recomputes the node types from the thickness.
    pub fn update_node_types<C: Communicator>(&mut self, comm: &C) -> Result<(), BlatterError> {
        comm.update_ghosts_2d(&self.info, &mut self.parameters)?;
        classify_columns(&self.info, &mut self.parameters, self.grid.min_thickness)?;
        comm.update_ghosts_2d(&self.info, &mut self.parameters)
    }

    /// Restricts all parameters to the next coarser level by full weighting and recomputes the
    /// node types of the coarse level from the restricted thickness.
    ///
    /// The halo of this level must be up to date.
    pub fn restrict_into<C: Communicator>(&self, coarse: &mut GridLevel, comm: &C) -> Result<(), BlatterError> {
        let fine = &self.info;
        for (ci, cj) in coarse.info.owned.columns() {
            let mut p = ColumnParameters::default();
            let mut total = 0.0;
            for (i, wx) in full_weighting(2 * ci, fine.mx) {
                for (j, wy) in full_weighting(2 * cj, fine.my) {
                    let w = wx * wy;
                    let fp = &self.parameters[(i, j)];
                    p.bed += w * fp.bed;
                    p.thickness += w * fp.thickness;
                    p.tauc += w * fp.tauc;
                    p.sea_level += w * fp.sea_level;
                    total += w;
                }
            }
            p.bed /= total;
            p.thickness /= total;
            p.tauc /= total;
            p.sea_level /= total;
            coarse.parameters[(ci, cj)] = p;

            for ck in 0..coarse.info.mz {
                let mut value = 0.0;
                let mut total = 0.0;
                for (i, wx) in full_weighting(2 * ci, fine.mx) {
                    for (j, wy) in full_weighting(2 * cj, fine.my) {
                        let column = self.hardness.column(i, j);
                        for (k, wz) in full_weighting(2 * ck, fine.mz) {
                            let w = wx * wy * wz;
                            value += w * column[k];
                            total += w;
                        }
                    }
                }
                coarse.hardness[(ci, cj, ck)] = value / total;
            }
        }
        comm.update_ghosts_3d(&coarse.info, &mut coarse.hardness)?;
        coarse.update_node_types(comm)
    }
}

/// Grid levels ordered from the finest (index 0) to the coarsest.
#[derive(Clone, Debug)]
pub struct GridHierarchy {
    levels: Vec<GridLevel>,
}

impl GridHierarchy {
    /// Builds the hierarchy for the given input grid, split over a `px x py` grid of processes.
    ///
    /// The finest grid is the input grid padded in `x`, `y` and `z` so that it can be coarsened
    /// `config.n_levels - 1` times. Padding is appended on the `+x` and `+y` sides.
    pub fn new<C: Communicator>(
        comm: &C,
        input_grid: &InputGrid,
        processes: (usize, usize),
        config: &BlatterConfig,
    ) -> Result<Self, BlatterError> {
        config.validate()?;
        input_grid.validate()?;
        let (px, py) = processes;
        if px * py != comm.size() {
            return Err(BlatterError::Communication(format!(
                "process grid {}x{} does not match the number of processes ({})",
                px,
                py,
                comm.size()
            )));
        }

        let n_levels = config.n_levels;
        let pad_x = grid_padding(input_grid.mx, n_levels);
        let pad_y = grid_padding(input_grid.my, n_levels);
        let pad_z = grid_padding(config.mz, n_levels);
        if pad_x + pad_y + pad_z > 0 {
            warn!(
                "Padding the {}x{}x{} grid by ({}, {}, {}) to support {} multigrid levels",
                input_grid.mx, input_grid.my, config.mz, pad_x, pad_y, pad_z, n_levels
            );
        }

        let decomposition = Decomposition::new((input_grid.mx, input_grid.my), (px, py), (pad_x, pad_y))?;
        let grid = GridInfo {
            x_min: -input_grid.lx,
            y_min: -input_grid.ly,
            dx: input_grid.dx(),
            dy: input_grid.dy(),
            min_thickness: config.min_thickness,
        };

        let mut levels = vec![GridLevel::new(grid, decomposition, comm.rank(), config.mz + pad_z)];
        for _ in 1..n_levels {
            let coarse = levels[levels.len() - 1].coarsen()?;
            levels.push(coarse);
        }
        Ok(Self { levels })
    }

    pub fn levels(&self) -> &[GridLevel] {
        &self.levels
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn finest(&self) -> &GridLevel {
        &self.levels[0]
    }

    pub fn finest_mut(&mut self) -> &mut GridLevel {
        &mut self.levels[0]
    }

    /// Stores `inputs` on the finest level and restricts them to all coarser levels.
    pub fn set_inputs<C: Communicator>(
        &mut self,
        comm: &C,
        input_grid: &InputGrid,
        inputs: &Inputs,
    ) -> Result<(), BlatterError> {
        self.finest_mut().set_inputs(comm, input_grid, inputs)?;
        self.restrict(comm)
    }

    /// Restricts the parameters of every level to the next coarser one, finest first.
    pub fn restrict<C: Communicator>(&mut self, comm: &C) -> Result<(), BlatterError> {
        for l in 1..self.levels.len() {
            let (finer, coarser) = self.levels.split_at_mut(l);
            finer[l - 1].restrict_into(&mut coarser[0], comm)?;
        }
        Ok(())
    }
}
