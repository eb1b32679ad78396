use crate::calculus::{DifferentiableVectorFunction, VectorFunction};
use crate::Real;
use itertools::iterate;
use log::debug;
use nalgebra::{convert, DVectorView, DVectorViewMut, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;
use std::fmt;
use std::fmt::Display;

/// Stopping criteria for Newton iterations.
///
/// The iteration has converged when `|F(u)| <= absolute_tolerance` or
/// `|F(u)| <= relative_tolerance * |F(u_0)|`, where the norm is the one provided by the function.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonSettings<T> {
    pub max_iterations: Option<usize>,
    pub absolute_tolerance: T,
    pub relative_tolerance: T,
}

impl<T: Real> NewtonSettings<T> {
    fn has_converged(&self, residual_norm: T, initial_residual_norm: T) -> bool {
        residual_norm <= self.absolute_tolerance || residual_norm <= self.relative_tolerance * initial_residual_norm
    }

    fn iterations_exhausted(&self, iterations: usize) -> bool {
        self.max_iterations.map_or(false, |max| iterations >= max)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct NewtonOutput<T> {
    /// Number of Newton steps taken.
    pub iterations: usize,
    pub initial_residual_norm: T,
    pub residual_norm: T,
}

#[derive(Debug)]
pub enum NewtonError {
    /// No convergence after the given number of iterations.
    MaximumIterationsReached(usize),
    FunctionError(Box<dyn Error>),
    /// The linearized system could not be solved.
    JacobianError(Box<dyn Error>),
    /// The line search found no acceptable step along the Newton direction.
    LineSearchError(Box<dyn Error>),
    /// The residual norm became NaN or infinite at the given iteration.
    NonFiniteResidual(usize),
}

impl Display for NewtonError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NewtonError::MaximumIterationsReached(iterations) => {
                write!(f, "No convergence after {} Newton iterations", iterations)
            }
            NewtonError::FunctionError(err) => write!(f, "Residual evaluation failed: {}", err),
            NewtonError::JacobianError(err) => write!(f, "Linear solve failed: {}", err),
            NewtonError::LineSearchError(err) => write!(f, "Line search failed: {}", err),
            NewtonError::NonFiniteResidual(iteration) => {
                write!(f, "Residual norm is not finite in Newton iteration {}", iteration)
            }
        }
    }
}

impl Error for NewtonError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            NewtonError::FunctionError(err) | NewtonError::JacobianError(err) | NewtonError::LineSearchError(err) => {
                Some(err.as_ref())
            }
            _ => None,
        }
    }
}

/// Attempts to solve the non-linear equation F(u) = 0 by taking full Newton steps.
///
/// No heap allocation is performed. `x` holds the initial guess on entry and the solution on
/// successful exit.
pub fn newton<'a, T, F>(
    function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
) -> Result<NewtonOutput<T>, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    newton_line_search(function, x, f, dx, settings, &mut NoLineSearch)
}

/// Same as `newton`, but each step along the Newton direction is chosen by `line_search`.
///
/// On failure `x` holds the last iterate, not the initial guess.
pub fn newton_line_search<'a, T, F>(
    mut function: F,
    x: impl Into<DVectorViewMut<'a, T>>,
    f: impl Into<DVectorViewMut<'a, T>>,
    dx: impl Into<DVectorViewMut<'a, T>>,
    settings: NewtonSettings<T>,
    line_search: &mut impl LineSearch<T, F>,
) -> Result<NewtonOutput<T>, NewtonError>
where
    T: Real,
    F: DifferentiableVectorFunction<T>,
{
    let mut x = x.into();
    let mut f = f.into();
    let mut dx = dx.into();
    assert_eq!(x.nrows(), f.nrows(), "Solution and residual must have the same length");
    assert_eq!(dx.nrows(), f.nrows(), "Step and residual must have the same length");

    function
        .eval_into(&mut f, &DVectorView::from(&x))
        .map_err(NewtonError::FunctionError)?;
    let initial_residual_norm = function
        .norm(&DVectorView::from(&f))
        .map_err(NewtonError::FunctionError)?;

    let mut output = NewtonOutput {
        iterations: 0,
        initial_residual_norm,
        residual_norm: initial_residual_norm,
    };
    loop {
        if !output.residual_norm.is_finite() {
            return Err(NewtonError::NonFiniteResidual(output.iterations));
        }
        debug!(
            "Newton iteration {}: residual norm {}",
            output.iterations, output.residual_norm
        );
        if settings.has_converged(output.residual_norm, initial_residual_norm) {
            return Ok(output);
        }
        if settings.iterations_exhausted(output.iterations) {
            return Err(NewtonError::MaximumIterationsReached(output.iterations));
        }

        // J dx = -F  is solved as  J (-dx) = F
        dx.fill(T::zero());
        function
            .solve_jacobian_system(&mut dx, &DVectorView::from(&x), &DVectorView::from(&f))
            .map_err(NewtonError::JacobianError)?;
        dx.neg_mut();

        let step_length = line_search
            .step(
                &mut function,
                DVectorViewMut::from(&mut f),
                DVectorViewMut::from(&mut x),
                DVectorView::from(&dx),
            )
            .map_err(NewtonError::LineSearchError)?;
        debug!("Newton step length {}", step_length);

        output.residual_norm = function
            .norm(&DVectorView::from(&f))
            .map_err(NewtonError::FunctionError)?;
        output.iterations += 1;
    }
}

/// Takes a step along `direction`, updating `x` and the function value `f` at the new `x`.
///
/// Returns the step length.
pub trait LineSearch<T: Scalar, F: VectorFunction<T>> {
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>>;
}

/// The full Newton step.
#[derive(Clone, Debug)]
pub struct NoLineSearch;

impl<T, F> LineSearch<T, F> for NoLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        f: DVectorViewMut<T>,
        x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        DampedLineSearch { factor: T::one() }.step(function, f, x, direction)
    }
}

/// A Newton step scaled by a fixed factor in `(0, 1]`.
#[derive(Clone, Debug)]
pub struct DampedLineSearch<T> {
    pub factor: T,
}

impl<T, F> LineSearch<T, F> for DampedLineSearch<T>
where
    T: Real,
    F: VectorFunction<T>,
{
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        x.axpy(self.factor, &direction, T::one());
        function.eval_into(&mut f, &DVectorView::from(&x))?;
        Ok(self.factor)
    }
}

/// Backtracking on the merit function `g(x) = |F(x)|^2 / 2` with the Armijo condition
/// `g(x + a p) <= (1 - c a) g(x)`, valid when `p` is the Newton direction.
///
/// Step lengths `1, 3/4, 1/2` are tried first, then the step is divided by four until it drops
/// below `1e-6`. See Nocedal & Wright (2006), Numerical Optimization, Chapter 3.1.
#[derive(Clone, Debug)]
pub struct BacktrackingLineSearch;

impl<T, F> LineSearch<T, F> for BacktrackingLineSearch
where
    T: Real,
    F: VectorFunction<T>,
{
    #[replace_float_literals(convert::<f64, T>(literal))]
    fn step(
        &mut self,
        function: &mut F,
        mut f: DVectorViewMut<T>,
        mut x: DVectorViewMut<T>,
        direction: DVectorView<T>,
    ) -> Result<T, Box<dyn Error>> {
        let sufficient_decrease = 1e-4;
        let min_step = 1e-6;
        let merit = |function: &F, f: &DVectorViewMut<T>| -> Result<T, Box<dyn Error>> {
            Ok(0.5 * function.norm(&DVectorView::from(f))?.powi(2))
        };
        let initial_merit = merit(function, &f)?;

        let step_lengths = [1.0, 0.75, 0.5]
            .into_iter()
            .chain(iterate(0.25, |alpha| 0.25 * *alpha))
            .take_while(|&alpha| alpha >= min_step);

        // x holds x_k + taken * p
        let mut taken = 0.0;
        for alpha in step_lengths {
            x.axpy(alpha - taken, &direction, T::one());
            taken = alpha;
            function.eval_into(&mut f, &DVectorView::from(&x))?;
            if merit(function, &f)? <= (1.0 - sufficient_decrease * alpha) * initial_merit {
                return Ok(alpha);
            }
        }

        Err(Box::from(format!(
            "No sufficient decrease of the residual for step lengths down to {}",
            min_step
        )))
    }
}
