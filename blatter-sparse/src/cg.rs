//! Preconditioned Conjugate Gradient for symmetric positive definite systems.
use core::fmt;
use nalgebra::base::constraint::AreMultipliable;
use nalgebra::constraint::{DimEq, ShapeConstraint};
use nalgebra::storage::Storage;
use nalgebra::{DVector, DVectorView, DVectorViewMut, Dim, Dyn, Matrix, RealField, Scalar, U1};
use nalgebra_sparse::CsrMatrix;
use std::error::Error;

/// An operator `y = A x` acting on (process-local) vectors.
pub trait LinearOperator<T: Scalar> {
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

impl<T, R, C, S> LinearOperator<T> for Matrix<T, R, C, S>
where
    T: RealField,
    R: Dim,
    C: Dim,
    S: Storage<T, R, C>,
    ShapeConstraint: DimEq<Dyn, R> + DimEq<C, Dyn> + AreMultipliable<R, C, Dyn, U1>,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T: RealField> LinearOperator<T> for CsrMatrix<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        if y.len() != self.nrows() || x.len() != self.ncols() {
            return Err(Box::from(format!(
                "Cannot apply a {}x{} matrix to a vector of length {} with output length {}.",
                self.nrows(),
                self.ncols(),
                x.len(),
                y.len()
            )));
        }
        for (y_i, row) in y.iter_mut().zip(self.row_iter()) {
            *y_i = row
                .col_indices()
                .iter()
                .zip(row.values())
                .fold(T::zero(), |sum, (&j, a_ij)| sum + a_ij.clone() * x[j].clone());
        }
        Ok(())
    }
}

/// `y = x`, i.e. no preconditioning.
pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// State of a CG solve right before a convergence check.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CgIterate<T> {
    /// Number of updates made to the solution so far.
    pub iteration: usize,
    /// Norm of the recursively updated residual.
    pub residual_norm: T,
    pub rhs_norm: T,
}

pub trait CgStoppingCriterion<T> {
    fn has_converged(&self, iterate: &CgIterate<T>) -> Result<bool, Box<dyn Error>>;
}

/// Stops once `||r|| <= tol * ||b||`.
///
/// The residual is the one updated by the CG recurrence. It can drift away from `b - Ax` when
/// the system is badly conditioned.
#[derive(Debug, Clone, Copy)]
pub struct RelativeResidualCriterion<T> {
    tol: T,
}

impl<T> RelativeResidualCriterion<T> {
    pub fn new(tol: T) -> Self {
        Self { tol }
    }
}

impl Default for RelativeResidualCriterion<f64> {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

impl<T: RealField> CgStoppingCriterion<T> for RelativeResidualCriterion<T> {
    fn has_converged(&self, iterate: &CgIterate<T>) -> Result<bool, Box<dyn Error>> {
        Ok(iterate.residual_norm <= self.tol.clone() * iterate.rhs_norm.clone())
    }
}

/// Vectors reused between solves of the same size.
#[derive(Debug, Clone)]
pub struct CgWorkspace<T: Scalar> {
    residual: DVector<T>,
    preconditioned_residual: DVector<T>,
    direction: DVector<T>,
    operator_times_direction: DVector<T>,
}

impl<T: RealField> Default for CgWorkspace<T> {
    fn default() -> Self {
        Self {
            residual: DVector::zeros(0),
            preconditioned_residual: DVector::zeros(0),
            direction: DVector::zeros(0),
            operator_times_direction: DVector::zeros(0),
        }
    }
}

impl<T: RealField> CgWorkspace<T> {
    fn resize(&mut self, dim: usize) {
        for v in [
            &mut self.residual,
            &mut self.preconditioned_residual,
            &mut self.direction,
            &mut self.operator_times_direction,
        ] {
            v.resize_vertically_mut(dim, T::zero());
        }
    }
}

#[derive(Debug)]
enum Workspace<'a, T: Scalar> {
    Owned(CgWorkspace<T>),
    Borrowed(&'a mut CgWorkspace<T>),
}

impl<'a, T: Scalar> Workspace<'a, T> {
    fn get_mut(&mut self) -> &mut CgWorkspace<T> {
        match self {
            Self::Owned(workspace) => workspace,
            Self::Borrowed(workspace) => workspace,
        }
    }
}

/// Preconditioned Conjugate Gradient for symmetric positive definite operators.
///
/// The preconditioner is any [`LinearOperator`] approximating the inverse of the operator, such
/// as a single multigrid V-cycle. It must be symmetric positive definite as well.
#[derive(Debug)]
pub struct ConjugateGradient<'a, T: Scalar, A, P, Criterion> {
    workspace: Workspace<'a, T>,
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl<T: RealField> ConjugateGradient<'static, T, (), IdentityOperator, ()> {
    pub fn new() -> Self {
        Self::from_workspace(Workspace::Owned(CgWorkspace::default()))
    }
}

impl<T: RealField> Default for ConjugateGradient<'static, T, (), IdentityOperator, ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Scalar> ConjugateGradient<'a, T, (), IdentityOperator, ()> {
    pub fn with_workspace(workspace: &'a mut CgWorkspace<T>) -> Self {
        Self::from_workspace(Workspace::Borrowed(workspace))
    }

    fn from_workspace(workspace: Workspace<'a, T>) -> Self {
        Self {
            workspace,
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: (),
            max_iter: None,
        }
    }
}

impl<'a, T: Scalar, P, Criterion> ConjugateGradient<'a, T, (), P, Criterion> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<'a, T, A, P, Criterion> {
        let Self {
            workspace,
            preconditioner,
            stopping_criterion,
            max_iter,
            ..
        } = self;
        ConjugateGradient {
            workspace,
            operator,
            preconditioner,
            stopping_criterion,
            max_iter,
        }
    }
}

impl<'a, T: Scalar, A, P> ConjugateGradient<'a, T, A, P, ()> {
    pub fn with_stopping_criterion<Criterion>(
        self,
        stopping_criterion: Criterion,
    ) -> ConjugateGradient<'a, T, A, P, Criterion> {
        let Self {
            workspace,
            operator,
            preconditioner,
            max_iter,
            ..
        } = self;
        ConjugateGradient {
            workspace,
            operator,
            preconditioner,
            stopping_criterion,
            max_iter,
        }
    }
}

impl<'a, T: Scalar, A, P, Criterion> ConjugateGradient<'a, T, A, P, Criterion> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<'a, T, A, P2, Criterion> {
        let Self {
            workspace,
            operator,
            stopping_criterion,
            max_iter,
            ..
        } = self;
        ConjugateGradient {
            workspace,
            operator,
            preconditioner,
            stopping_criterion,
            max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    StoppingCriterionError(Box<dyn Error>),
    /// `p^T A p <= 0` for a search direction `p`.
    IndefiniteOperator,
    /// `r^T P r <= 0` for a nonzero residual `r`.
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => write!(f, "Failed to apply operator: {}", err),
            Self::PreconditionerError(err) => write!(f, "Failed to apply preconditioner: {}", err),
            Self::StoppingCriterionError(err) => write!(f, "Failed to evaluate stopping criterion: {}", err),
            Self::IndefiniteOperator => write!(f, "Operator is not positive definite."),
            Self::IndefinitePreconditioner => write!(f, "Preconditioner is not positive definite."),
            Self::MaxIterationsReached { max_iter } => write!(f, "No convergence within {} iterations.", max_iter),
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError<T> {
    /// Progress at the time of failure.
    pub output: CgOutput<T>,
    pub kind: SolveErrorKind,
}

impl<T: Clone> SolveError<T> {
    fn new(output: &CgOutput<T>, kind: SolveErrorKind) -> Self {
        Self {
            output: output.clone(),
            kind,
        }
    }
}

impl<T> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CG failed after {} iterations: {}", self.output.num_iterations, self.kind)
    }
}

impl<T: fmt::Debug> Error for SolveError<T> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.kind {
            SolveErrorKind::OperatorError(err)
            | SolveErrorKind::PreconditionerError(err)
            | SolveErrorKind::StoppingCriterionError(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CgOutput<T> {
    /// Number of updates made to the initial guess.
    pub num_iterations: usize,
    /// Norm of the recursively updated residual.
    pub residual_norm: T,
}

impl<'a, T, A, P, Criterion> ConjugateGradient<'a, T, A, P, Criterion>
where
    T: RealField,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    Criterion: CgStoppingCriterion<T>,
{
    /// Solves `A x = b`, using the value of `x` as initial guess.
    ///
    /// A zero right-hand side immediately returns `x = 0`.
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<CgOutput<T>, SolveError<T>> {
        use SolveErrorKind::*;
        let b = b.into();
        let mut x = x.into();
        assert_eq!(b.len(), x.len(), "Right-hand side and solution must have the same length");

        let mut output = CgOutput {
            num_iterations: 0,
            residual_norm: T::zero(),
        };
        let rhs_norm = b.norm();
        if rhs_norm == T::zero() {
            x.fill(T::zero());
            return Ok(output);
        }

        let workspace = self.workspace.get_mut();
        workspace.resize(b.len());
        let CgWorkspace {
            residual: r,
            preconditioned_residual: z,
            direction: p,
            operator_times_direction: ap,
        } = workspace;

        // r = b - A x
        self.operator
            .apply(DVectorViewMut::from(&mut *r), DVectorView::from(&x))
            .map_err(|err| SolveError::new(&output, OperatorError(err)))?;
        r.axpy(T::one(), &b, -T::one());

        self.preconditioner
            .apply(DVectorViewMut::from(&mut *z), DVectorView::from(&*r))
            .map_err(|err| SolveError::new(&output, PreconditionerError(err)))?;
        p.copy_from(z);
        let mut z_dot_r = z.dot(r);

        loop {
            output.residual_norm = r.norm();
            let iterate = CgIterate {
                iteration: output.num_iterations,
                residual_norm: output.residual_norm.clone(),
                rhs_norm: rhs_norm.clone(),
            };
            let converged = self
                .stopping_criterion
                .has_converged(&iterate)
                .map_err(|err| SolveError::new(&output, StoppingCriterionError(err)))?;
            if converged {
                return Ok(output);
            }
            if let Some(max_iter) = self.max_iter.filter(|&max_iter| output.num_iterations >= max_iter) {
                return Err(SolveError::new(&output, MaxIterationsReached { max_iter }));
            }
            if z_dot_r <= T::zero() {
                return Err(SolveError::new(&output, IndefinitePreconditioner));
            }

            self.operator
                .apply(DVectorViewMut::from(&mut *ap), DVectorView::from(&*p))
                .map_err(|err| SolveError::new(&output, OperatorError(err)))?;
            let p_dot_ap = p.dot(ap);
            if p_dot_ap <= T::zero() {
                return Err(SolveError::new(&output, IndefiniteOperator));
            }

            let alpha = z_dot_r.clone() / p_dot_ap;
            x.axpy(alpha.clone(), &*p, T::one());
            r.axpy(-alpha, &*ap, T::one());
            output.num_iterations += 1;

            self.preconditioner
                .apply(DVectorViewMut::from(&mut *z), DVectorView::from(&*r))
                .map_err(|err| SolveError::new(&output, PreconditionerError(err)))?;
            let z_dot_r_next = z.dot(r);
            let beta = z_dot_r_next.clone() / z_dot_r;
            // p = z + beta p
            p.axpy(T::one(), &*z, beta);
            z_dot_r = z_dot_r_next;
        }
    }
}
