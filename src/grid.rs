//! Structured grids, their distribution over processes and the multigrid hierarchy.
pub mod array;
pub mod decomposition;
pub mod hierarchy;
pub mod padding;

pub use array::{Array2, Array3, GridBox};
pub use decomposition::{Decomposition, LocalInfo};
pub use hierarchy::{grid_z, sigma_levels, GridHierarchy, GridInfo, GridLevel};
pub use padding::grid_padding;
