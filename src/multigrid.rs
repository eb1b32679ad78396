//! Geometric multigrid preconditioned conjugate gradient solver for the Newton systems.
//!
//! The operators on coarse levels are rediscretized: the Jacobian of every level is assembled
//! from that level's restricted parameters at the injected velocity. Grid transfer uses
//! trilinear prolongation and its transpose as restriction, so together with a symmetric
//! Gauss-Seidel smoother one V-cycle is a symmetric positive definite preconditioner.
//!
//! The equations of Dirichlet and exterior nodes are scaled by the cell size only, so their
//! magnitude differs from the viscous equations by orders of magnitude. They are decoupled from
//! all other unknowns and solved exactly by the smoother, and grid transfer skips them on both
//! levels.
use crate::assembly::{DofMap, Jacobian};
use crate::comm::Communicator;
use crate::config::LinearSolverConfig;
use crate::error::BlatterError;
use crate::grid::GridHierarchy;
use crate::sparse::cg::{CgWorkspace, ConjugateGradient, LinearOperator, RelativeResidualCriterion};
use eyre::eyre;
use itertools::iproduct;
use log::debug;
use nalgebra::{Cholesky, DMatrix, DVector, DVectorView, DVectorViewMut, Dyn};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use std::error::Error;

/// Result of a successful linear solve.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LinearSolveOutput {
    pub iterations: usize,
    pub residual_norm: f64,
}

/// Solves the linearized systems of the Newton iteration.
pub trait LinearSolver {
    /// Solves `J x = rhs` with `J = jacobians[0].matrix`, starting from `solution`.
    ///
    /// `jacobians[l]` is the Jacobian on level `l` of the hierarchy the solver was built for.
    fn solve(
        &mut self,
        jacobians: &[Jacobian],
        rhs: &DVector<f64>,
        solution: &mut DVector<f64>,
    ) -> eyre::Result<LinearSolveOutput>;
}

/// Injects a velocity into the next coarser level: `u_c(I) = u_f(2I)`.
pub fn inject_velocity(fine: &DofMap, coarse: &DofMap, u_fine: &DVector<f64>) -> eyre::Result<DVector<f64>> {
    check_coarsening(fine, coarse)?;
    if u_fine.len() != fine.num_dofs() {
        return Err(eyre!(
            "Velocity has length {}, but the fine grid has {} unknowns",
            u_fine.len(),
            fine.num_dofs()
        ));
    }
    let (mx, my, mz) = coarse.grid_size();
    let mut u_coarse = DVector::zeros(coarse.num_dofs());
    for (j, i, k) in iproduct!(0..my, 0..mx, 0..mz) {
        let u = fine.velocity(u_fine, (2 * i, 2 * j, 2 * k));
        coarse.set_velocity(&mut u_coarse, (i, j, k), &u);
    }
    Ok(u_coarse)
}

fn check_coarsening(fine: &DofMap, coarse: &DofMap) -> eyre::Result<()> {
    let (fx, fy, fz) = fine.grid_size();
    let (cx, cy, cz) = coarse.grid_size();
    let refines = |f: usize, c: usize| f == 2 * (c - 1) + 1;
    if cx == 0 || cy == 0 || cz == 0 || !(refines(fx, cx) && refines(fy, cy) && refines(fz, cz)) {
        return Err(eyre!(
            "A {}x{}x{} grid is not the coarsening of a {}x{}x{} grid",
            cx,
            cy,
            cz,
            fx,
            fy,
            fz
        ));
    }
    Ok(())
}

/// Coarse indices and weights of 1D linear interpolation onto fine index `i`.
fn interpolation_stencil(i: usize) -> [(usize, f64); 2] {
    if i % 2 == 0 {
        [(i / 2, 1.0), (i / 2, 0.0)]
    } else {
        [(i / 2, 0.5), (i / 2 + 1, 0.5)]
    }
}

/// Trilinear interpolation from `coarse` to `fine`, applied to both velocity components.
pub fn prolongation_matrix(coarse: &DofMap, fine: &DofMap) -> eyre::Result<CsrMatrix<f64>> {
    check_coarsening(fine, coarse)?;
    let (mx, my, mz) = fine.grid_size();
    let mut coo = CooMatrix::new(fine.num_dofs(), coarse.num_dofs());
    for (j, i, k) in iproduct!(0..my, 0..mx, 0..mz) {
        let stencil = iproduct!(interpolation_stencil(j), interpolation_stencil(i), interpolation_stencil(k));
        for ((jc, wy), (ic, wx), (kc, wz)) in stencil {
            let w = wx * wy * wz;
            if w == 0.0 {
                continue;
            }
            for c in 0..2 {
                coo.push(fine.dof((i, j, k), c), coarse.dof((ic, jc, kc), c), w);
            }
        }
    }
    Ok(CsrMatrix::from(&coo))
}

/// Removes constrained unknowns from a prolongation `P`: the rows of constrained fine unknowns
/// and the columns of constrained coarse unknowns are zeroed.
pub fn mask_prolongation(
    prolongation: &CsrMatrix<f64>,
    fine_constrained: &[bool],
    coarse_constrained: &[bool],
) -> eyre::Result<CsrMatrix<f64>> {
    if fine_constrained.len() != prolongation.nrows() || coarse_constrained.len() != prolongation.ncols() {
        return Err(eyre!(
            "Masks of lengths {} and {} do not fit a {}x{} prolongation",
            fine_constrained.len(),
            coarse_constrained.len(),
            prolongation.nrows(),
            prolongation.ncols()
        ));
    }
    let mut masked = prolongation.clone();
    for (row, col, value) in masked.triplet_iter_mut() {
        if fine_constrained[row] || coarse_constrained[col] {
            *value = 0.0;
        }
    }
    Ok(masked)
}

/// One Gauss-Seidel sweep for `A x = b`, visiting rows in increasing or decreasing order.
fn gauss_seidel_sweep(a: &CsrMatrix<f64>, b: &DVector<f64>, x: &mut DVector<f64>, forward: bool) -> eyre::Result<()> {
    let n = a.nrows();
    let mut relax = |row: usize| -> eyre::Result<()> {
        let lane = a.row(row);
        let mut diagonal = 0.0;
        let mut sum = b[row];
        for (&col, &value) in lane.col_indices().iter().zip(lane.values()) {
            if col == row {
                diagonal += value;
            } else {
                sum -= value * x[col];
            }
        }
        if diagonal == 0.0 {
            return Err(eyre!("Zero diagonal entry in row {} of a multigrid operator", row));
        }
        x[row] = sum / diagonal;
        Ok(())
    };
    if forward {
        (0..n).try_for_each(&mut relax)
    } else {
        (0..n).rev().try_for_each(&mut relax)
    }
}

/// `sweeps` forward followed by `sweeps` backward Gauss-Seidel sweeps.
fn symmetric_gauss_seidel(a: &CsrMatrix<f64>, b: &DVector<f64>, x: &mut DVector<f64>, sweeps: usize) -> eyre::Result<()> {
    for _ in 0..sweeps {
        gauss_seidel_sweep(a, b, x, true)?;
    }
    for _ in 0..sweeps {
        gauss_seidel_sweep(a, b, x, false)?;
    }
    Ok(())
}

#[derive(Debug)]
enum CoarseSolver {
    Direct(Cholesky<f64, Dyn>),
    Smoothing { sweeps: usize },
}

impl CoarseSolver {
    fn new(a: &CsrMatrix<f64>, config: &LinearSolverConfig) -> eyre::Result<Self> {
        if a.nrows() <= config.coarse_direct_max_dofs {
            let dense = DMatrix::from(a);
            let factorization = Cholesky::new(dense)
                .ok_or_else(|| eyre!("Coarse grid operator is not positive definite"))?;
            Ok(Self::Direct(factorization))
        } else {
            Ok(Self::Smoothing {
                sweeps: config.coarse_smoothing_sweeps,
            })
        }
    }

    fn solve(&self, a: &CsrMatrix<f64>, b: &DVector<f64>, x: &mut DVector<f64>) -> eyre::Result<()> {
        match self {
            Self::Direct(cholesky) => {
                x.copy_from(&cholesky.solve(b));
                Ok(())
            }
            Self::Smoothing { sweeps } => symmetric_gauss_seidel(a, b, x, *sweeps),
        }
    }
}

/// A single V-cycle with zero initial guess, used as the CG preconditioner.
struct VCycle<'a> {
    jacobians: &'a [Jacobian],
    /// Prolongations with constrained unknowns masked out.
    prolongations: Vec<CsrMatrix<f64>>,
    restrictions: Vec<CsrMatrix<f64>>,
    coarse: CoarseSolver,
    sweeps: usize,
}

impl<'a> VCycle<'a> {
    fn cycle(&self, level: usize, b: &DVector<f64>, x: &mut DVector<f64>) -> eyre::Result<()> {
        let a = &self.jacobians[level].matrix;
        if level + 1 == self.jacobians.len() {
            return self.coarse.solve(a, b, x);
        }

        for _ in 0..self.sweeps {
            gauss_seidel_sweep(a, b, x, true)?;
        }

        let residual = b - a * &*x;
        let b_coarse = &self.restrictions[level] * &residual;
        let mut x_coarse = DVector::zeros(b_coarse.len());
        self.cycle(level + 1, &b_coarse, &mut x_coarse)?;
        *x += &self.prolongations[level] * &x_coarse;

        for _ in 0..self.sweeps {
            gauss_seidel_sweep(a, b, x, false)?;
        }
        Ok(())
    }
}

impl<'a> LinearOperator<f64> for VCycle<'a> {
    fn apply(&self, mut y: DVectorViewMut<f64>, x: DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let b = x.clone_owned();
        let mut result = DVector::zeros(b.len());
        self.cycle(0, &b, &mut result)?;
        y.copy_from(&result);
        Ok(())
    }
}

/// Conjugate gradients preconditioned by one multigrid V-cycle per iteration.
///
/// Only runs on a single process.
#[derive(Debug)]
pub struct MultigridCg {
    config: LinearSolverConfig,
    /// `prolongations[l]` interpolates from level `l + 1` to level `l`.
    prolongations: Vec<CsrMatrix<f64>>,
    workspace: CgWorkspace<f64>,
}

impl MultigridCg {
    pub fn new<C: Communicator>(
        comm: &C,
        hierarchy: &GridHierarchy,
        config: &LinearSolverConfig,
    ) -> Result<Self, BlatterError> {
        if comm.size() > 1 {
            return Err(BlatterError::Communication(format!(
                "the multigrid CG solver runs on a single process, but {} processes were given",
                comm.size()
            )));
        }

        let dof_maps: Vec<_> = hierarchy
            .levels()
            .iter()
            .map(|level| DofMap::new(level.local_info()))
            .collect();
        let mut prolongations = Vec::with_capacity(dof_maps.len().saturating_sub(1));
        for pair in dof_maps.windows(2) {
            let p = prolongation_matrix(&pair[1], &pair[0])
                .map_err(|e| BlatterError::InvalidConfiguration(e.to_string()))?;
            prolongations.push(p);
        }

        Ok(Self {
            config: *config,
            prolongations,
            workspace: CgWorkspace::default(),
        })
    }

    pub fn num_levels(&self) -> usize {
        self.prolongations.len() + 1
    }
}

impl LinearSolver for MultigridCg {
    fn solve(
        &mut self,
        jacobians: &[Jacobian],
        rhs: &DVector<f64>,
        solution: &mut DVector<f64>,
    ) -> eyre::Result<LinearSolveOutput> {
        if jacobians.len() != self.num_levels() {
            return Err(eyre!(
                "Expected Jacobians on {} levels, got {}",
                self.num_levels(),
                jacobians.len()
            ));
        }
        let finest = &jacobians[0].matrix;
        if rhs.len() != finest.nrows() || solution.len() != finest.nrows() {
            return Err(eyre!(
                "Dimension mismatch: the Jacobian has {} rows, rhs and solution have lengths {} and {}",
                finest.nrows(),
                rhs.len(),
                solution.len()
            ));
        }

        let prolongations = self
            .prolongations
            .iter()
            .zip(jacobians.windows(2))
            .map(|(p, pair)| mask_prolongation(p, &pair[0].constrained, &pair[1].constrained))
            .collect::<eyre::Result<Vec<_>>>()?;
        let restrictions = prolongations.iter().map(CsrMatrix::transpose).collect();

        let coarsest = &jacobians[jacobians.len() - 1].matrix;
        let preconditioner = VCycle {
            jacobians,
            prolongations,
            restrictions,
            coarse: CoarseSolver::new(coarsest, &self.config)?,
            sweeps: self.config.smoothing_sweeps,
        };

        let output = ConjugateGradient::with_workspace(&mut self.workspace)
            .with_operator(finest)
            .with_preconditioner(&preconditioner)
            .with_stopping_criterion(RelativeResidualCriterion::new(self.config.relative_tolerance))
            .with_max_iter(self.config.max_iterations)
            .solve_with_guess(rhs, &mut *solution)
            .map_err(|e| eyre!("Multigrid CG failed: {}", e))?;

        debug!(
            "Multigrid CG converged in {} iterations (residual norm {:.3e})",
            output.num_iterations, output.residual_norm
        );
        Ok(LinearSolveOutput {
            iterations: output.num_iterations,
            residual_norm: output.residual_norm,
        })
    }
}
