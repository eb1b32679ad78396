use crate::Real;
use nalgebra::{convert, DMatrix, DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use numeric_literals::replace_float_literals;
use std::error::Error;

/// A function $F: \mathbb{R}^n \rightarrow \mathbb{R}^n$ whose evaluation may fail.
pub trait VectorFunction<T>
where
    T: Scalar,
{
    fn dimension(&self) -> usize;

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), Box<dyn Error>>;

    /// The norm used to measure function values, e.g. for convergence checks.
    ///
    /// Functions whose values are distributed across several processes must override this
    /// with a global reduction, which may fail.
    fn norm(&self, f: &DVectorView<T>) -> Result<T, Box<dyn Error>>
    where
        T: RealField,
    {
        Ok(f.norm())
    }
}

impl<T, X> VectorFunction<T> for &mut X
where
    T: Scalar,
    X: VectorFunction<T>,
{
    fn dimension(&self) -> usize {
        X::dimension(self)
    }

    fn eval_into(&mut self, f: &mut DVectorViewMut<T>, x: &DVectorView<T>) -> Result<(), Box<dyn Error>> {
        X::eval_into(self, f, x)
    }

    fn norm(&self, f: &DVectorView<T>) -> Result<T, Box<dyn Error>>
    where
        T: RealField,
    {
        X::norm(self, f)
    }
}

pub trait DifferentiableVectorFunction<T>: VectorFunction<T>
where
    T: Scalar,
{
    /// Solves `J(x) sol = rhs`, where `J(x)` is the Jacobian of the function at `x`.
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>>;
}

impl<T, X> DifferentiableVectorFunction<T> for &mut X
where
    T: Scalar,
    X: DifferentiableVectorFunction<T>,
{
    fn solve_jacobian_system(
        &mut self,
        sol: &mut DVectorViewMut<T>,
        x: &DVectorView<T>,
        rhs: &DVectorView<T>,
    ) -> Result<(), Box<dyn Error>> {
        X::solve_jacobian_system(self, sol, x, rhs)
    }
}

/// Central finite difference approximation of the Jacobian of `f` at `x` with step `h`.
///
/// Column `j` is `(f(x + h e_j) - f(x - h e_j)) / 2h`, so the cost is `2 n` evaluations of `f`.
/// Meant for checking analytic Jacobians on small problems. Fails if an evaluation fails.
#[replace_float_literals(convert::<f64, T>(literal))]
pub fn approximate_jacobian<T>(
    mut f: impl VectorFunction<T>,
    x: &DVector<T>,
    h: &T,
) -> Result<DMatrix<T>, Box<dyn Error>>
where
    T: Real,
{
    let n = x.len();
    let mut jacobian = DMatrix::zeros(f.dimension(), n);
    let mut perturbed = x.clone();
    let mut f_minus = DVector::zeros(f.dimension());

    for j in 0..n {
        perturbed[j] = x[j] - *h;
        f.eval_into(&mut DVectorViewMut::from(&mut f_minus), &DVectorView::from(&perturbed))?;
        perturbed[j] = x[j] + *h;
        f.eval_into(&mut jacobian.column_mut(j), &DVectorView::from(&perturbed))?;
        perturbed[j] = x[j];

        let mut column = jacobian.column_mut(j);
        column -= &f_minus;
        column /= 2.0 * *h;
    }

    Ok(jacobian)
}
