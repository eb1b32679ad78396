//! Solver configuration.
//!
//! All quantities are in SI units.
use crate::error::BlatterError;
use serde::{Deserialize, Serialize};

/// Length of a year in seconds.
pub const SECONDS_PER_YEAR: f64 = 3.15569259747e7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlatterConfig {
    /// Number of vertical levels before padding.
    pub mz: usize,
    /// Maximum number of multigrid levels, including the finest.
    pub n_levels: usize,
    /// Columns with thickness at or below this floor are treated as ice free.
    pub min_thickness: f64,
    pub ice_density: f64,
    pub standard_gravity: f64,
    pub flow_law: FlowLawConfig,
    pub newton: NewtonConfig,
    pub linear: LinearSolverConfig,
}

impl Default for BlatterConfig {
    fn default() -> Self {
        Self {
            mz: 17,
            n_levels: 3,
            min_thickness: 0.1,
            ice_density: 910.0,
            standard_gravity: 9.81,
            flow_law: FlowLawConfig::default(),
            newton: NewtonConfig::default(),
            linear: LinearSolverConfig::default(),
        }
    }
}

/// Parameters of the regularized Glen flow law.
///
/// The strain rate invariant is regularized by
/// $\epsilon = (v_{\text{Schoof}} / L_{\text{Schoof}})^2$.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowLawConfig {
    /// Glen exponent $n$.
    pub exponent: f64,
    /// Regularizing velocity in m/s.
    pub schoof_velocity: f64,
    /// Regularizing length in m.
    pub schoof_length: f64,
}

impl Default for FlowLawConfig {
    fn default() -> Self {
        Self {
            exponent: 3.0,
            schoof_velocity: 1.0 / SECONDS_PER_YEAR,
            schoof_length: 1000.0e3,
        }
    }
}

impl FlowLawConfig {
    pub fn regularization(&self) -> f64 {
        (self.schoof_velocity / self.schoof_length).powi(2)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum LineSearchConfig {
    /// Full Newton steps.
    Full,
    /// Newton steps scaled by a fixed factor in `(0, 1]`.
    Damped { factor: f64 },
    /// Armijo backtracking.
    Backtracking,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NewtonConfig {
    pub max_iterations: usize,
    pub absolute_tolerance: f64,
    pub relative_tolerance: f64,
    pub line_search: LineSearchConfig,
}

impl Default for NewtonConfig {
    fn default() -> Self {
        Self {
            max_iterations: 50,
            absolute_tolerance: 1e-50,
            relative_tolerance: 1e-8,
            line_search: LineSearchConfig::Full,
        }
    }
}

/// Settings for the multigrid-preconditioned Conjugate Gradient solver.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LinearSolverConfig {
    pub relative_tolerance: f64,
    pub max_iterations: usize,
    /// Symmetric Gauss-Seidel sweeps before and after each coarse-grid correction.
    pub smoothing_sweeps: usize,
    /// The coarsest level is factorized directly if it has at most this many unknowns.
    pub coarse_direct_max_dofs: usize,
    /// Sweeps used on the coarsest level when it is too large to factorize.
    pub coarse_smoothing_sweeps: usize,
}

impl Default for LinearSolverConfig {
    fn default() -> Self {
        Self {
            relative_tolerance: 1e-10,
            max_iterations: 1000,
            smoothing_sweeps: 2,
            coarse_direct_max_dofs: 3000,
            coarse_smoothing_sweeps: 50,
        }
    }
}

fn invalid(msg: impl Into<String>) -> BlatterError {
    BlatterError::InvalidConfiguration(msg.into())
}

impl BlatterConfig {
    pub fn validate(&self) -> Result<(), BlatterError> {
        if self.mz < 2 {
            return Err(invalid(format!("mz must be at least 2, got {}", self.mz)));
        }
        if self.n_levels == 0 {
            return Err(invalid("n_levels must be at least 1"));
        }
        // 2^(n_levels - 1) must not overflow
        if self.n_levels > 30 {
            return Err(invalid(format!("n_levels = {} is too large", self.n_levels)));
        }
        if !(self.min_thickness > 0.0) {
            return Err(invalid(format!(
                "min_thickness must be positive, got {}",
                self.min_thickness
            )));
        }
        if !(self.ice_density > 0.0 && self.standard_gravity >= 0.0) {
            return Err(invalid("ice density must be positive and gravity non-negative"));
        }

        let flow_law = &self.flow_law;
        if !(flow_law.exponent >= 1.0) {
            return Err(invalid(format!(
                "flow law exponent must be at least 1, got {}",
                flow_law.exponent
            )));
        }
        if !(flow_law.schoof_velocity > 0.0 && flow_law.schoof_length > 0.0) {
            return Err(invalid("Schoof regularization velocity and length must be positive"));
        }

        let newton = &self.newton;
        if !(newton.absolute_tolerance > 0.0 && newton.relative_tolerance > 0.0) {
            return Err(invalid("Newton tolerances must be positive"));
        }
        if let LineSearchConfig::Damped { factor } = newton.line_search {
            if !(factor > 0.0 && factor <= 1.0) {
                return Err(invalid(format!("damping factor must be in (0, 1], got {}", factor)));
            }
        }

        let linear = &self.linear;
        if !(linear.relative_tolerance > 0.0) {
            return Err(invalid("linear solver tolerance must be positive"));
        }
        if linear.max_iterations == 0 {
            return Err(invalid("linear solver needs at least one iteration"));
        }
        // Without smoothing the V-cycle only acts on the range of the prolongation
        if self.n_levels > 1 && linear.smoothing_sweeps == 0 {
            return Err(invalid("multigrid with more than one level needs at least one smoothing sweep"));
        }
        if self.n_levels == 1 && linear.coarse_direct_max_dofs == 0 && linear.coarse_smoothing_sweeps == 0 {
            return Err(invalid("a single-level solve without a direct solver needs smoothing sweeps"));
        }
        Ok(())
    }
}
