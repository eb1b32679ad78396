use crate::assembly::{ElementNodes, LevelAssembler};
use crate::boundary::{dirichlet_scale, exterior_velocity, BoundaryConditions};
use crate::element::{Q1Element3, Q1Element3Face, FACE_NODES, NODE_OFFSETS, N_CHI, N_FACES};
use crate::flow_law::FlowLaw;
use crate::node_type::{is_dirichlet_level, is_neumann_face, NodeType};
use nalgebra::{DVector, Vector2};

impl<'a, B, F> LevelAssembler<'a, B, F>
where
    B: BoundaryConditions,
    F: FlowLaw,
{
    /// Computes the residual `r` of the velocity `x`.
    ///
    /// Only the rows of owned nodes are written; all other rows are set to zero. At Dirichlet and
    /// exterior nodes the residual is the scaled difference between `x` and the prescribed
    /// velocity, independent of all other values.
    pub fn compute_residual(&self, x: &DVector<f64>, r: &mut DVector<f64>) -> eyre::Result<()> {
        let dofs = self.dof_map();
        dofs.check_length(x, "velocity")?;
        dofs.check_length(r, "residual")?;

        let info = self.level.local_info();
        let grid = self.level.grid_info();
        let parameters = self.level.parameters();

        r.fill(0.0);

        for (i, j) in info.owned.columns() {
            let p = &parameters[(i, j)];
            for k in 0..info.mz {
                if !(is_dirichlet_level(k) || p.node_type == NodeType::Exterior) {
                    continue;
                }
                let (dx, dy, dz) = self.dirichlet_cell_size(i, j);
                let s = dirichlet_scale(dx, dy, dz);
                let u_bc = if is_dirichlet_level(k) {
                    let z = self.level.node_z(i, j, k);
                    self.boundary.dirichlet_velocity(grid.x(i), grid.y(j), z)
                } else {
                    exterior_velocity()
                };
                let difference = dofs.velocity(x, (i, j, k)) - u_bc;
                dofs.set_velocity(r, (i, j, k), &s.component_mul(&difference));
            }
        }

        let mut element = Q1Element3::new(grid.dx, grid.dy);
        let mut face = Q1Element3Face::new(grid.dx, grid.dy);
        let rho_g = self.driving_stress_scale;

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
                    // Dirichlet nodes receive no contribution and their values are replaced by
                    // the boundary values
                    if is_dirichlet_level(node.2) {
                        element.mark_row_invalid(n);
                        *u_n = self.boundary.dirichlet_velocity(nodes.x[n], nodes.y[n], nodes.z[n]);
                    }
                }

                // Relative to one node, so that a flat surface has exactly zero slope
                let surface = nodes.surface.map(|s| s - nodes.surface[0]);

                let mut r_nodal = [Vector2::<f64>::zeros(); N_CHI];
                for q in 0..element.n_pts() {
                    let w = element.weight(q);
                    let (_, grad_u) = element.evaluate_vector(&u_nodal, q);
                    let hardness = element.evaluate(&nodes.hardness, q);
                    let grad_s = element.evaluate_gradient(&surface, q);

                    let (ux, uy, uz) = (grad_u[(0, 0)], grad_u[(0, 1)], grad_u[(0, 2)]);
                    let (vx, vy, vz) = (grad_u[(1, 0)], grad_u[(1, 1)], grad_u[(1, 2)]);
                    let gamma = Self::strain_rate_invariant(ux, uy, uz, vx, vy, vz);
                    let (eta, _) = self.flow_law.effective_viscosity(hardness, gamma);

                    for (t, r_t) in r_nodal.iter_mut().enumerate() {
                        let psi = element.chi(q, t);
                        r_t[0] += w
                            * (eta * (psi.dx * (4.0 * ux + 2.0 * vy) + psi.dy * (uy + vx) + psi.dz * uz)
                                + rho_g * psi.val * grad_s[0]);
                        r_t[1] += w
                            * (eta * (psi.dx * (uy + vx) + psi.dy * (2.0 * ux + 4.0 * vy) + psi.dz * vz)
                                + rho_g * psi.val * grad_s[1]);
                    }
                }

                for f in 0..N_FACES {
                    let face_types = FACE_NODES[f].map(|n| nodes.column_types[n]);
                    if !is_neumann_face(&face_types) {
                        continue;
                    }
                    face.reset(f, &nodes.z)?;
                    for q in 0..face.n_pts() {
                        let w = face.weight(q);
                        let normal = face.normal(q);
                        let (xq, yq, zq) = (
                            face.evaluate(&nodes.x, q),
                            face.evaluate(&nodes.y, q),
                            face.evaluate(&nodes.z, q),
                        );
                        let traction = self.boundary.neumann_traction(xq, yq, zq, normal);
                        for (t, r_t) in r_nodal.iter_mut().enumerate() {
                            *r_t -= traction * (w * face.chi(q, t));
                        }
                    }
                }

                for (n, &(di, dj, dk)) in NODE_OFFSETS.iter().enumerate() {
                    let node = (i + di, j + dj, k + dk);
                    if element.row_is_valid(n) && info.is_owned(node.0, node.1) {
                        let d = dofs.dof(node, 0);
                        r[d] += r_nodal[n][0];
                        r[d + 1] += r_nodal[n][1];
                    }
                }
            }
        }
        Ok(())
    }
}
