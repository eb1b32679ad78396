//! Linear operators and preconditioned Conjugate Gradient.
pub mod cg;
