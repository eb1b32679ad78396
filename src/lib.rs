//! A finite element solver for the Blatter-Pattyn approximation of glacier and ice sheet flow.
//!
//! The horizontal velocity $(u, v)$ of the ice is computed on a structured hexahedral grid whose
//! vertical coordinate follows the ice geometry. The nonlinear system is solved by Newton's
//! method, with each linear step solved by a multigrid-preconditioned Conjugate Gradient method
//! on a hierarchy of geometrically coarsened grids.
pub mod assembly;
pub mod boundary;
pub mod comm;
pub mod config;
pub mod element;
pub mod error;
pub mod flow_law;
pub mod grid;
pub mod multigrid;
pub mod node_type;
pub mod parameters;
pub mod quadrature;
pub mod solver;
pub mod velocity;

pub mod optimize {
    pub use blatter_optimize::*;
}

pub mod sparse {
    pub use blatter_sparse::*;
}

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;

pub use config::BlatterConfig;
pub use error::BlatterError;
pub use solver::{Blatter, BlatterProblem, SolveReport};
pub use velocity::VelocityField;
