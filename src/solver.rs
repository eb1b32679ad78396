//! The nonlinear stress balance solver.
use crate::assembly::{JacobianAssembler, LevelAssembler};
use crate::boundary::{BoundaryConditions, NoSlipStressFree};
use crate::comm::Communicator;
use crate::config::{BlatterConfig, LineSearchConfig};
use crate::error::BlatterError;
use crate::flow_law::{FlowLaw, GlenFlowLaw};
use crate::grid::hierarchy::GridHierarchy;
use crate::multigrid::{inject_velocity, LinearSolver, MultigridCg};
use crate::optimize::calculus::{DifferentiableVectorFunction, VectorFunction};
use crate::optimize::newton::{
    newton_line_search, BacktrackingLineSearch, DampedLineSearch, NewtonSettings, NoLineSearch,
};
use crate::parameters::{InputGrid, Inputs};
use crate::velocity::VelocityField;
use log::info;
use nalgebra::{DVector, DVectorView, DVectorViewMut};
use std::error::Error;

/// The discrete stress balance `F(u) = R(u) - b` on the finest level of a grid hierarchy.
///
/// The Jacobian systems are solved with the Jacobians of all levels, assembled at the velocity
/// injected into each level.
pub struct BlatterProblem<'a, C, B, F, S> {
    comm: &'a C,
    hierarchy: &'a GridHierarchy,
    boundary: &'a B,
    flow_law: &'a F,
    driving_stress_scale: f64,
    assemblers: &'a [JacobianAssembler],
    linear_solver: &'a mut S,
    rhs: Option<DVector<f64>>,
}

impl<'a, C, B, F, S> BlatterProblem<'a, C, B, F, S>
where
    C: Communicator,
    B: BoundaryConditions,
    F: FlowLaw,
    S: LinearSolver,
{
    /// `assemblers[l]` must have been built for level `l` of `hierarchy`.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        comm: &'a C,
        hierarchy: &'a GridHierarchy,
        boundary: &'a B,
        flow_law: &'a F,
        driving_stress_scale: f64,
        assemblers: &'a [JacobianAssembler],
        linear_solver: &'a mut S,
    ) -> Self {
        Self {
            comm,
            hierarchy,
            boundary,
            flow_law,
            driving_stress_scale,
            assemblers,
            linear_solver,
            rhs: None,
        }
    }

    /// Subtracts `rhs` from the residual, so that the solution satisfies `R(u) = rhs`.
    pub fn with_rhs(self, rhs: DVector<f64>) -> Self {
        Self { rhs: Some(rhs), ..self }
    }

    fn level_assembler(&self, level: usize) -> LevelAssembler<'_, B, F> {
        LevelAssembler::new(
            &self.hierarchy.levels()[level],
            self.boundary,
            self.flow_law,
            self.driving_stress_scale,
        )
    }

    /// Residual of the finest level, combined over all processes.
    pub fn residual(&self, x: &DVector<f64>) -> Result<DVector<f64>, Box<dyn Error>> {
        let mut r = DVector::zeros(x.len());
        self.level_assembler(0).compute_residual(x, &mut r)?;
        self.comm.sum_vector(&mut r)?;
        if let Some(rhs) = &self.rhs {
            if rhs.len() != r.len() {
                return Err(Box::new(BlatterError::InvalidInput(format!(
                    "right-hand side has length {}, but the grid has {} unknowns",
                    rhs.len(),
                    r.len()
                ))));
            }
            r -= rhs;
        }
        Ok(r)
    }
}

impl<'a, C, B, F, S> VectorFunction<f64> for BlatterProblem<'a, C, B, F, S>
where
    C: Communicator,
    B: BoundaryConditions,
    F: FlowLaw,
    S: LinearSolver,
{
    fn dimension(&self) -> usize {
        self.hierarchy.finest().local_info().global_dofs()
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<f64>, x: &DVectorView<f64>) -> Result<(), Box<dyn Error>> {
        let r = self.residual(&x.clone_owned())?;
        f.copy_from(&r);
        Ok(())
    }

    /// Euclidean norm over the rows owned by this process, reduced over all processes.
    fn norm(&self, f: &DVectorView<f64>) -> Result<f64, Box<dyn Error>> {
        let info = self.hierarchy.finest().local_info();
        let dofs = self.level_assembler(0).dof_map();
        let mut local = 0.0;
        for (i, j) in info.owned.columns() {
            for k in 0..info.mz {
                for c in 0..2 {
                    local += f[dofs.dof((i, j, k), c)].powi(2);
                }
            }
        }
        Ok(self.comm.all_reduce_sum(local)?.sqrt())
    }
}

impl<'a, C, B, F, S> DifferentiableVectorFunction<f64> for BlatterProblem<'a, C, B, F, S>
where
    C: Communicator,
    B: BoundaryConditions,
    F: FlowLaw,
    S: LinearSolver,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<f64>,
        x: &DVectorView<f64>,
        rhs: &DVectorView<f64>,
    ) -> Result<(), Box<dyn Error>> {
        let mut velocity = x.clone_owned();
        let mut jacobians = Vec::with_capacity(self.hierarchy.num_levels());
        for (l, assembler) in self.assemblers.iter().enumerate() {
            if l > 0 {
                let fine = self.assemblers[l - 1].dof_map();
                velocity = inject_velocity(fine, assembler.dof_map(), &velocity)?;
            }
            jacobians.push(self.level_assembler(l).compute_jacobian(&velocity, assembler)?);
        }

        let mut solution = DVector::zeros(rhs.len());
        self.linear_solver
            .solve(&jacobians, &rhs.clone_owned(), &mut solution)?;
        sol.copy_from(&solution);
        Ok(())
    }
}

/// Summary of a successful nonlinear solve.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SolveReport {
    /// Number of Newton steps.
    pub iterations: usize,
    pub initial_residual_norm: f64,
    pub residual_norm: f64,
}

/// The Blatter-Pattyn stress balance solver.
///
/// Owns the grid hierarchy and the current solution, which is used as the initial guess of the
/// next solve.
#[derive(Debug)]
pub struct Blatter<C, B = NoSlipStressFree, F = GlenFlowLaw> {
    comm: C,
    config: BlatterConfig,
    input_grid: InputGrid,
    hierarchy: GridHierarchy,
    boundary: B,
    flow_law: F,
    assemblers: Vec<JacobianAssembler>,
    linear_solver: MultigridCg,
    solution: DVector<f64>,
    velocity: VelocityField,
}

impl<C, B> Blatter<C, B>
where
    C: Communicator,
    B: BoundaryConditions,
{
    /// Builds the grid hierarchy for `input_grid`, distributed over `processes = (px, py)`.
    ///
    /// The ice follows Glen's flow law with the parameters of `config.flow_law`.
    pub fn new(
        comm: C,
        input_grid: InputGrid,
        processes: (usize, usize),
        config: BlatterConfig,
        boundary: B,
    ) -> Result<Self, BlatterError> {
        let flow_law = GlenFlowLaw::from(&config.flow_law);
        Self::with_flow_law(comm, input_grid, processes, config, boundary, flow_law)
    }
}

impl<C, B, F> Blatter<C, B, F>
where
    C: Communicator,
    B: BoundaryConditions,
    F: FlowLaw,
{
    /// Same as [`Blatter::new`], with an arbitrary flow law in place of Glen's law.
    pub fn with_flow_law(
        comm: C,
        input_grid: InputGrid,
        processes: (usize, usize),
        config: BlatterConfig,
        boundary: B,
        flow_law: F,
    ) -> Result<Self, BlatterError> {
        let hierarchy = GridHierarchy::new(&comm, &input_grid, processes, &config)?;
        let assemblers = hierarchy
            .levels()
            .iter()
            .map(|level| JacobianAssembler::new(level.local_info()))
            .collect::<eyre::Result<Vec<_>>>()
            .map_err(|e| BlatterError::InvalidConfiguration(e.to_string()))?;
        let linear_solver = MultigridCg::new(&comm, &hierarchy, &config.linear)?;
        let solution = DVector::zeros(hierarchy.finest().local_info().global_dofs());
        let velocity = VelocityField::zeros(hierarchy.finest(), &input_grid);
        Ok(Self {
            comm,
            config,
            input_grid,
            hierarchy,
            boundary,
            flow_law,
            assemblers,
            linear_solver,
            solution,
            velocity,
        })
    }

    pub fn config(&self) -> &BlatterConfig {
        &self.config
    }

    pub fn input_grid(&self) -> &InputGrid {
        &self.input_grid
    }

    pub fn hierarchy(&self) -> &GridHierarchy {
        &self.hierarchy
    }

    pub fn flow_law(&self) -> &F {
        &self.flow_law
    }

    /// The solution vector of the finest level in natural ordering.
    pub fn solution(&self) -> &DVector<f64> {
        &self.solution
    }

    /// Replaces the initial guess of the next solve.
    pub fn set_solution(&mut self, solution: DVector<f64>) -> Result<(), BlatterError> {
        if solution.len() != self.solution.len() {
            return Err(BlatterError::InvalidInput(format!(
                "solution has length {}, but the grid has {} unknowns",
                solution.len(),
                self.solution.len()
            )));
        }
        self.solution = solution;
        Ok(())
    }

    pub fn velocity(&self) -> &VelocityField {
        &self.velocity
    }

    /// Stores new model inputs on all levels of the hierarchy.
    pub fn set_inputs(&mut self, inputs: &Inputs) -> Result<(), BlatterError> {
        self.hierarchy.set_inputs(&self.comm, &self.input_grid, inputs)
    }

    /// The discrete problem for the current inputs.
    pub fn problem(&mut self) -> BlatterProblem<'_, C, B, F, MultigridCg> {
        BlatterProblem::new(
            &self.comm,
            &self.hierarchy,
            &self.boundary,
            &self.flow_law,
            self.config.ice_density * self.config.standard_gravity,
            &self.assemblers,
            &mut self.linear_solver,
        )
    }

    /// Stores `inputs` and solves for the velocity, starting from the previous solution.
    ///
    /// On failure the previous solution and velocity field are kept.
    pub fn update(&mut self, inputs: &Inputs) -> Result<SolveReport, BlatterError> {
        self.set_inputs(inputs)?;
        self.solve()
    }

    /// Solves for the velocity with the current inputs.
    pub fn solve(&mut self) -> Result<SolveReport, BlatterError> {
        self.solve_impl(None)
    }

    /// Solves `R(u) = rhs` instead of `R(u) = 0`.
    pub fn solve_with_rhs(&mut self, rhs: DVector<f64>) -> Result<SolveReport, BlatterError> {
        self.solve_impl(Some(rhs))
    }

    fn solve_impl(&mut self, rhs: Option<DVector<f64>>) -> Result<SolveReport, BlatterError> {
        let newton_config = self.config.newton;
        let settings = NewtonSettings {
            max_iterations: Some(newton_config.max_iterations),
            absolute_tolerance: newton_config.absolute_tolerance,
            relative_tolerance: newton_config.relative_tolerance,
        };

        let n = self.solution.len();
        let mut x = self.solution.clone();
        let mut f = DVector::zeros(n);
        let mut dx = DVector::zeros(n);

        let mut problem = self.problem();
        if let Some(rhs) = rhs {
            problem = problem.with_rhs(rhs);
        }
        let output = match newton_config.line_search {
            LineSearchConfig::Full => newton_line_search(problem, &mut x, &mut f, &mut dx, settings, &mut NoLineSearch),
            LineSearchConfig::Damped { factor } => newton_line_search(
                problem,
                &mut x,
                &mut f,
                &mut dx,
                settings,
                &mut DampedLineSearch { factor },
            ),
            LineSearchConfig::Backtracking => newton_line_search(
                problem,
                &mut x,
                &mut f,
                &mut dx,
                settings,
                &mut BacktrackingLineSearch,
            ),
        }?;

        self.velocity = VelocityField::from_solution(self.hierarchy.finest(), &self.input_grid, &x)?;
        self.solution = x;

        info!(
            "Blatter solve converged in {} Newton iterations (residual norm {:.3e} -> {:.3e})",
            output.iterations, output.initial_residual_norm, output.residual_norm
        );
        Ok(SolveReport {
            iterations: output.iterations,
            initial_residual_norm: output.initial_residual_norm,
            residual_norm: output.residual_norm,
        })
    }
}
