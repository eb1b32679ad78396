use nalgebra::RealField;

/// Calculus helper traits and numerical differentiation
pub mod calculus;
/// Implementations of the Newton method with different line search strategies
pub mod newton;

pub use nalgebra;

/// Scalar type used by the generic solvers in this crate.
pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}
