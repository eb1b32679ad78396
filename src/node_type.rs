//! Classification of grid nodes from the ice thickness.
//!
//! A 2D cell is *icy* if the thickness at all four of its corners exceeds the thickness floor.
//! A column is
//!
//! - [`NodeType::Interior`] if all four cells around it are icy,
//! - [`NodeType::Boundary`] if one to three of them are,
//! - [`NodeType::Exterior`] if none of them are.
//!
//! Cells outside of the domain are never icy. The base node of every non-exterior column is
//! [`NodeType::Dirichlet`].
use crate::error::BlatterError;
use crate::grid::array::Array2;
use crate::grid::decomposition::LocalInfo;
use crate::parameters::ColumnParameters;
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Interior,
    /// Part of the lateral boundary of the ice, where a traction (Neumann) condition applies.
    Boundary,
    /// Ice free. The velocity is fixed at zero.
    Exterior,
    /// Ice base. The velocity is prescribed.
    Dirichlet,
}

impl Default for NodeType {
    fn default() -> Self {
        NodeType::Exterior
    }
}

/// Returns `true` if the cell with lower-left corner column `(i, j)` is covered by ice.
fn icy_cell(thickness: &impl Fn(usize, usize) -> f64, (mx, my): (usize, usize), i: isize, j: isize, floor: f64) -> bool {
    if i < 0 || j < 0 || i as usize + 1 >= mx || j as usize + 1 >= my {
        return false;
    }
    let (i, j) = (i as usize, j as usize);
    [(i, j), (i + 1, j), (i + 1, j + 1), (i, j + 1)]
        .iter()
        .all(|&(ii, jj)| thickness(ii, jj) > floor)
}

/// Type of the column `(i, j)` of an `mx x my` grid.
///
/// `thickness` must be defined on the column and its eight neighbors (where they exist).
pub fn column_type(
    thickness: impl Fn(usize, usize) -> f64,
    grid_size: (usize, usize),
    (i, j): (usize, usize),
    floor: f64,
) -> NodeType {
    let (i, j) = (i as isize, j as isize);
    let icy_cells = [(i - 1, j - 1), (i, j - 1), (i, j), (i - 1, j)]
        .iter()
        .filter(|&&(ci, cj)| icy_cell(&thickness, grid_size, ci, cj, floor))
        .count();
    match icy_cells {
        4 => NodeType::Interior,
        0 => NodeType::Exterior,
        _ => NodeType::Boundary,
    }
}

/// Type of the node at level `k` of a column of the given type.
pub fn node_type(column: NodeType, k: usize) -> NodeType {
    if column != NodeType::Exterior && is_dirichlet_level(k) {
        NodeType::Dirichlet
    } else {
        column
    }
}

/// The base of the ice is the Dirichlet part of the boundary.
pub fn is_dirichlet_level(k: usize) -> bool {
    k == 0
}

/// A face belongs to the Neumann boundary if all four of its nodes lie in boundary columns.
///
/// A base node in a boundary column counts as a boundary node here.
pub fn is_neumann_face(column_types: &[NodeType; 4]) -> bool {
    column_types.iter().all(|&t| t == NodeType::Boundary)
}

/// Recomputes the node types of all owned columns from the thickness.
///
/// The thickness must be up to date in the halo. Ghosts of the node types are *not* updated.
pub fn classify_columns(
    info: &LocalInfo,
    parameters: &mut Array2<ColumnParameters>,
    floor: f64,
) -> Result<(), BlatterError> {
    if !parameters.grid_box().contains_box(&info.ghosted) {
        return Err(BlatterError::InvalidInput(format!(
            "node classification needs parameters on {:?}, got {:?}",
            info.ghosted,
            parameters.grid_box()
        )));
    }

    let types: Vec<_> = info
        .owned
        .columns()
        .map(|(i, j)| {
            let thickness = |ii, jj| parameters[(ii, jj)].thickness;
            column_type(thickness, (info.mx, info.my), (i, j), floor)
        })
        .collect();

    for ((i, j), t) in info.owned.columns().zip(types) {
        parameters[(i, j)].node_type = t;
    }
    Ok(())
}
