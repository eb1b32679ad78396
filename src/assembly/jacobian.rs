use crate::assembly::{clone_upper_to_lower, DofMap, ElementNodes, LevelAssembler, Symmetry};
use crate::boundary::{dirichlet_scale, BoundaryConditions};
use crate::element::{Q1Element3, N_CHI};
use crate::flow_law::FlowLaw;
use crate::grid::decomposition::LocalInfo;
use crate::node_type::{is_dirichlet_level, NodeType};
use eyre::eyre;
use nalgebra::{DVector, SMatrix, Vector2};
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;

/// Element matrix with two unknowns per node, ordered `(u_0, v_0, u_1, v_1, ...)`.
type ElementMatrix = SMatrix<f64, { 2 * N_CHI }, { 2 * N_CHI }>;

/// An assembled Jacobian together with its known structure.
#[derive(Clone, Debug, PartialEq)]
pub struct Jacobian {
    pub matrix: CsrMatrix<f64>,
    pub symmetry: Symmetry,
    /// Unknowns of Dirichlet and exterior nodes. Their rows and columns hold nothing but the
    /// diagonal scaling of the boundary equations.
    pub constrained: Vec<bool>,
}

/// Holds the sparsity pattern of the Jacobian of a grid level.
///
/// Every owned node couples to the nodes of the 3x3x3 box around it, with a dense 2x2 block
/// per pair of nodes. The pattern is built once and reused for every assembly.
#[derive(Clone, Debug)]
pub struct JacobianAssembler {
    dofs: DofMap,
    pattern: SparsityPattern,
}

/// Indices `lo..=hi` of the neighbors of `i` in a grid of size `m`.
fn neighbors(i: usize, m: usize) -> std::ops::RangeInclusive<usize> {
    i.saturating_sub(1)..=usize::min(i + 1, m - 1)
}

impl JacobianAssembler {
    pub fn new(info: &LocalInfo) -> eyre::Result<Self> {
        let dofs = DofMap::new(info);
        let (mx, my, mz) = dofs.grid_size();
        let n = dofs.num_dofs();

        let mut offsets = Vec::with_capacity(n + 1);
        let mut indices = Vec::new();
        offsets.push(0);
        // Rows are visited in increasing order of their index, and the columns of each row
        // are generated sorted
        for j in 0..my {
            for i in 0..mx {
                for k in 0..mz {
                    for _component in 0..2 {
                        if info.is_owned(i, j) {
                            for jj in neighbors(j, my) {
                                for ii in neighbors(i, mx) {
                                    for kk in neighbors(k, mz) {
                                        let d = dofs.dof((ii, jj, kk), 0);
                                        indices.push(d);
                                        indices.push(d + 1);
                                    }
                                }
                            }
                        }
                        offsets.push(indices.len());
                    }
                }
            }
        }

        let pattern = SparsityPattern::try_from_offsets_and_indices(n, n, offsets, indices)
            .map_err(|e| eyre!("Failed to construct Jacobian sparsity pattern: {}", e))?;
        Ok(Self { dofs, pattern })
    }

    pub fn dof_map(&self) -> &DofMap {
        &self.dofs
    }

    pub fn pattern(&self) -> &SparsityPattern {
        &self.pattern
    }

    /// A matrix with the sparsity pattern of the Jacobian and all stored entries zero.
    pub fn zero_matrix(&self) -> eyre::Result<CsrMatrix<f64>> {
        let values = vec![0.0; self.pattern.nnz()];
        CsrMatrix::try_from_pattern_and_values(self.pattern.clone(), values)
            .map_err(|e| eyre!("Failed to construct Jacobian: {}", e))
    }
}

/// Adds `value` to the stored entry `(row, col)` of `matrix`.
fn add_to_entry(matrix: &mut CsrMatrix<f64>, row: usize, col: usize, value: f64) -> eyre::Result<()> {
    let mut row_view = matrix.row_mut(row);
    let (cols, values) = row_view.cols_and_values_mut();
    let idx = cols
        .binary_search(&col)
        .map_err(|_| eyre!("Entry ({}, {}) is not in the Jacobian sparsity pattern", row, col))?;
    values[idx] += value;
    Ok(())
}

impl<'a, B, F> LevelAssembler<'a, B, F>
where
    B: BoundaryConditions,
    F: FlowLaw,
{
    /// Assembles the Jacobian of [`compute_residual`](Self::compute_residual) at the velocity `x`.
    ///
    /// Rows and columns of Dirichlet and exterior nodes only hold the diagonal scaling of
    /// these equations, so the matrix stays symmetric.
    pub fn compute_jacobian(&self, x: &DVector<f64>, assembler: &JacobianAssembler) -> eyre::Result<Jacobian> {
        let dofs = self.dof_map();
        if dofs != *assembler.dof_map() {
            return Err(eyre!("Jacobian assembler was built for a different grid"));
        }
        dofs.check_length(x, "velocity")?;

        let info = self.level.local_info();
        let grid = self.level.grid_info();
        let parameters = self.level.parameters();

        let mut matrix = assembler.zero_matrix()?;
        let mut element = Q1Element3::new(grid.dx, grid.dy);
        let mut k_element = ElementMatrix::zeros();

        for (i, j) in info.element_columns() {
            for k in 0..info.mz - 1 {
                let nodes = ElementNodes::gather(self.level, (i, j, k));
                if nodes.is_exterior() {
                    continue;
                }

                element.reset((i, j, k), &nodes.z)?;

                let mut u_nodal = [Vector2::zeros(); N_CHI];
                for (n, u_n) in u_nodal.iter_mut().enumerate() {
                    let node = element.local_to_global(n);
                    *u_n = dofs.velocity(x, node);
                    if is_dirichlet_level(node.2) {
                        element.mark_row_invalid(n);
                        element.mark_col_invalid(n);
                        *u_n = self.boundary.dirichlet_velocity(nodes.x[n], nodes.y[n], nodes.z[n]);
                    }
                }

                k_element.fill(0.0);
                for q in 0..element.n_pts() {
                    let w = element.weight(q);
                    let (_, grad_u) = element.evaluate_vector(&u_nodal, q);
                    let hardness = element.evaluate(&nodes.hardness, q);

                    let (ux, uy, uz) = (grad_u[(0, 0)], grad_u[(0, 1)], grad_u[(0, 2)]);
                    let (vx, vy, vz) = (grad_u[(1, 0)], grad_u[(1, 1)], grad_u[(1, 2)]);
                    let gamma = Self::strain_rate_invariant(ux, uy, uz, vx, vy, vz);
                    let (eta, deta) = self.flow_law.effective_viscosity(hardness, gamma);

                    // Upper triangle of the node blocks only
                    for t in 0..N_CHI {
                        let psi = element.chi(q, t);
                        // Stresses tested with psi, as in the residual
                        let stress_u = psi.dx * (4.0 * ux + 2.0 * vy) + psi.dy * (uy + vx) + psi.dz * uz;
                        let stress_v = psi.dx * (uy + vx) + psi.dy * (4.0 * vy + 2.0 * ux) + psi.dz * vz;
                        for s in t..N_CHI {
                            let phi = element.chi(q, s);

                            let gamma_u =
                                2.0 * ux * phi.dx + vy * phi.dx + 0.5 * phi.dy * (uy + vx) + 0.5 * uz * phi.dz;
                            let gamma_v =
                                2.0 * vy * phi.dy + ux * phi.dy + 0.5 * phi.dx * (uy + vx) + 0.5 * vz * phi.dz;
                            let eta_u = deta * gamma_u;
                            let eta_v = deta * gamma_v;

                            let (tu, tv, su, sv) = (2 * t, 2 * t + 1, 2 * s, 2 * s + 1);
                            k_element[(tu, su)] += w
                                * (eta * (4.0 * psi.dx * phi.dx + psi.dy * phi.dy + psi.dz * phi.dz)
                                    + eta_u * stress_u);
                            k_element[(tu, sv)] +=
                                w * (eta * (2.0 * psi.dx * phi.dy + psi.dy * phi.dx) + eta_v * stress_u);
                            k_element[(tv, su)] +=
                                w * (eta * (2.0 * psi.dy * phi.dx + psi.dx * phi.dy) + eta_u * stress_v);
                            k_element[(tv, sv)] += w
                                * (eta * (4.0 * psi.dy * phi.dy + psi.dx * phi.dx + psi.dz * phi.dz)
                                    + eta_v * stress_v);
                        }
                    }
                }
                clone_upper_to_lower(&mut k_element);

                for t in 0..N_CHI {
                    let row_node = element.local_to_global(t);
                    if !element.row_is_valid(t) || !info.is_owned(row_node.0, row_node.1) {
                        continue;
                    }
                    for s in 0..N_CHI {
                        if !element.col_is_valid(s) {
                            continue;
                        }
                        let col_node = element.local_to_global(s);
                        for c in 0..2 {
                            for d in 0..2 {
                                add_to_entry(
                                    &mut matrix,
                                    dofs.dof(row_node, c),
                                    dofs.dof(col_node, d),
                                    k_element[(2 * t + c, 2 * s + d)],
                                )?;
                            }
                        }
                    }
                }
            }
        }

        let mut constrained = vec![false; dofs.num_dofs()];
        for (i, j) in info.owned.columns() {
            let exterior = parameters[(i, j)].node_type == NodeType::Exterior;
            for k in 0..info.mz {
                if !(exterior || is_dirichlet_level(k)) {
                    continue;
                }
                let (dx, dy, dz) = self.dirichlet_cell_size(i, j);
                let scale = dirichlet_scale(dx, dy, dz);
                for c in 0..2 {
                    let d = dofs.dof((i, j, k), c);
                    add_to_entry(&mut matrix, d, d, scale[c])?;
                    constrained[d] = true;
                }
            }
        }

        Ok(Jacobian {
            matrix,
            symmetry: Symmetry::Symmetric,
            constrained,
        })
    }
}
