use crate::unit_tests::{hierarchy_with_inputs, unit_config, FakeProcess};
use blatter::assembly::{DofMap, Jacobian, JacobianAssembler, LevelAssembler};
use blatter::boundary::NoSlipStressFree;
use blatter::comm::SingleProcess;
use blatter::flow_law::GlenFlowLaw;
use blatter::grid::{GridHierarchy, LocalInfo};
use blatter::config::{BlatterConfig, SECONDS_PER_YEAR};
use blatter::multigrid::{inject_velocity, mask_prolongation, prolongation_matrix, LinearSolver, MultigridCg};
use blatter::parameters::{InputGrid, Inputs};
use blatter::BlatterError;
use nalgebra::{DMatrix, DVector, Vector2};

fn dof_map(mx: usize, my: usize, mz: usize) -> DofMap {
    let grid_box = blatter::grid::GridBox::new(0, 0, mx, my);
    DofMap::new(&LocalInfo {
        mx,
        my,
        mz,
        owned: grid_box,
        ghosted: grid_box,
    })
}

#[test]
fn injection_samples_even_nodes() {
    let fine = dof_map(5, 3, 5);
    let coarse = dof_map(3, 2, 3);
    let u_fine = DVector::from_fn(fine.num_dofs(), |d, _| d as f64);

    let u_coarse = inject_velocity(&fine, &coarse, &u_fine).unwrap();
    assert_eq!(u_coarse.len(), coarse.num_dofs());
    assert_eq!(u_coarse[coarse.dof((2, 1, 1), 1)], u_fine[fine.dof((4, 2, 2), 1)]);
    assert_eq!(u_coarse[coarse.dof((1, 0, 2), 0)], u_fine[fine.dof((2, 0, 4), 0)]);

    assert!(inject_velocity(&fine, &dof_map(3, 3, 3), &u_fine).is_err());
    assert!(inject_velocity(&fine, &coarse, &DVector::zeros(4)).is_err());
}

#[test]
fn prolongation_reproduces_trilinear_functions() {
    let fine = dof_map(5, 7, 3);
    let coarse = dof_map(3, 4, 2);
    let p = prolongation_matrix(&coarse, &fine).unwrap();
    assert_eq!((p.nrows(), p.ncols()), (fine.num_dofs(), coarse.num_dofs()));

    // f(x, y, z) = 1 + x - 2y + 3z + xyz in fine index coordinates, per component
    let f = |x: f64, y: f64, z: f64, c: usize| (c + 1) as f64 * (1.0 + x - 2.0 * y + 3.0 * z + x * y * z);
    let sample = |dofs: &DofMap, h: f64| {
        let (mx, my, mz) = dofs.grid_size();
        let mut v = DVector::zeros(dofs.num_dofs());
        for j in 0..my {
            for i in 0..mx {
                for k in 0..mz {
                    for c in 0..2 {
                        v[dofs.dof((i, j, k), c)] = f(h * i as f64, h * j as f64, h * k as f64, c);
                    }
                }
            }
        }
        v
    };

    let interpolated = &p * &sample(&coarse, 2.0);
    let expected = sample(&fine, 1.0);
    assert!((interpolated - expected).amax() <= 1e-12);

    // Restriction weights are 1/2, 1, 1/2 per direction, truncated at the base
    let restriction = p.transpose();
    let row_sum: f64 = restriction.row(coarse.dof((1, 1, 0), 0)).values().iter().sum();
    assert!((row_sum - 6.0).abs() <= 1e-12);
}

/// Marks both components of every node at the base of the grid.
fn base_mask(dofs: &DofMap) -> Vec<bool> {
    let (mx, my, _) = dofs.grid_size();
    let mut mask = vec![false; dofs.num_dofs()];
    for j in 0..my {
        for i in 0..mx {
            for c in 0..2 {
                mask[dofs.dof((i, j, 0), c)] = true;
            }
        }
    }
    mask
}

#[test]
fn masked_prolongation_skips_constrained_unknowns() {
    let fine = dof_map(5, 3, 3);
    let coarse = dof_map(3, 2, 2);
    let p = prolongation_matrix(&coarse, &fine).unwrap();
    let fine_base = base_mask(&fine);
    let coarse_base = base_mask(&coarse);
    let masked = mask_prolongation(&p, &fine_base, &coarse_base).unwrap();
    assert_eq!((masked.nrows(), masked.ncols()), (p.nrows(), p.ncols()));

    let x_coarse = DVector::from_fn(coarse.num_dofs(), |d, _| 1.0 + d as f64);
    let x_fine = &masked * &x_coarse;
    for (d, &constrained) in fine_base.iter().enumerate() {
        if constrained {
            assert_eq!(x_fine[d], 0.0);
        }
    }
    // Coinciding interior nodes are still injected
    assert_eq!(x_fine[fine.dof((2, 2, 2), 1)], x_coarse[coarse.dof((1, 1, 1), 1)]);

    // Values at the coarse base do not reach the fine grid
    let only_base = DVector::from_fn(coarse.num_dofs(), |d, _| if coarse_base[d] { 1.0 } else { 0.0 });
    assert_eq!((&masked * &only_base).amax(), 0.0);

    // Nor does the restriction write to the coarse base
    let restricted = &masked.transpose() * &DVector::from_element(fine.num_dofs(), 1.0);
    for (d, &constrained) in coarse_base.iter().enumerate() {
        assert_eq!(restricted[d] == 0.0, constrained);
    }

    assert!(mask_prolongation(&p, &coarse_base, &coarse_base).is_err());
    assert!(mask_prolongation(&p, &fine_base, &fine_base).is_err());
}

/// Jacobians on all levels of a hierarchy at the velocity `u`.
fn jacobians(hierarchy: &GridHierarchy, flow_law: &GlenFlowLaw, u: &DVector<f64>) -> Vec<Jacobian> {
    let mut velocity = u.clone();
    let mut result = Vec::new();
    for (l, level) in hierarchy.levels().iter().enumerate() {
        let dofs = DofMap::new(level.local_info());
        if l > 0 {
            let fine = DofMap::new(hierarchy.levels()[l - 1].local_info());
            velocity = inject_velocity(&fine, &dofs, &velocity).unwrap();
        }
        let assembler = JacobianAssembler::new(level.local_info()).unwrap();
        let jacobian = LevelAssembler::new(level, &NoSlipStressFree, flow_law, 1.0)
            .compute_jacobian(&velocity, &assembler)
            .unwrap();
        result.push(jacobian);
    }
    result
}

fn sloped_slab(grid: &InputGrid) -> Inputs {
    Inputs::from_functions(grid, |x, y| -0.1 * x + 0.05 * y, |x, _| 1.0 + 0.1 * x, 1.0)
}

#[test]
fn multigrid_cg_solves_newton_system() {
    let grid = InputGrid::new(9, 9, 1.0, 1.0);
    let config = unit_config(5, 3, 3.0);
    let hierarchy = hierarchy_with_inputs(&grid, &config, &sloped_slab(&grid));
    let law = GlenFlowLaw::from(&config.flow_law);

    let n = hierarchy.finest().local_info().global_dofs();
    let u = DVector::from_fn(n, |d, _| 0.1 * (0.3 * d as f64).cos());
    let jacobians = jacobians(&hierarchy, &law, &u);
    let rhs = DVector::from_fn(n, |d, _| ((d % 7) as f64 - 3.0) / 3.0);

    let mut solver = MultigridCg::new(&SingleProcess, &hierarchy, &config.linear).unwrap();
    assert_eq!(solver.num_levels(), 3);
    let mut solution = DVector::zeros(n);
    let output = solver.solve(&jacobians, &rhs, &mut solution).unwrap();
    assert!(output.iterations > 0);

    let residual = &rhs - &jacobians[0].matrix * &solution;
    assert!(residual.norm() <= 1e-9 * rhs.norm());
    let expected = DMatrix::from(&jacobians[0].matrix).lu().solve(&rhs).unwrap();
    assert!((&solution - &expected).amax() <= 1e-5 * expected.amax());
}

#[test]
fn multigrid_cg_uses_smoothing_on_large_coarse_level() {
    let grid = InputGrid::new(9, 9, 1.0, 1.0);
    let mut config = unit_config(5, 2, 1.0);
    config.linear.coarse_direct_max_dofs = 10;
    let hierarchy = hierarchy_with_inputs(&grid, &config, &sloped_slab(&grid));
    let law = GlenFlowLaw::from(&config.flow_law);

    let n = hierarchy.finest().local_info().global_dofs();
    let jacobians = jacobians(&hierarchy, &law, &DVector::zeros(n));
    let rhs = DVector::from_fn(n, |d, _| (d as f64).sin());

    let mut solver = MultigridCg::new(&SingleProcess, &hierarchy, &config.linear).unwrap();
    let mut solution = DVector::zeros(n);
    solver.solve(&jacobians, &rhs, &mut solution).unwrap();

    let residual = &rhs - &jacobians[0].matrix * &solution;
    assert!(residual.norm() <= 1e-8 * rhs.norm());
}

#[test]
fn multigrid_cg_rejects_wrong_number_of_levels() {
    let grid = InputGrid::new(9, 9, 1.0, 1.0);
    let config = unit_config(5, 3, 1.0);
    let hierarchy = hierarchy_with_inputs(&grid, &config, &sloped_slab(&grid));
    let law = GlenFlowLaw::from(&config.flow_law);

    let n = hierarchy.finest().local_info().global_dofs();
    let mut jacobians = jacobians(&hierarchy, &law, &DVector::zeros(n));
    jacobians.pop();

    let mut solver = MultigridCg::new(&SingleProcess, &hierarchy, &config.linear).unwrap();
    let mut solution = DVector::zeros(n);
    assert!(solver.solve(&jacobians, &DVector::zeros(n), &mut solution).is_err());
}

#[test]
fn multigrid_cg_refuses_to_run_distributed() {
    let grid = InputGrid::new(9, 9, 1.0, 1.0);
    let config = unit_config(5, 2, 3.0);
    let first_of_two = FakeProcess { rank: 0, size: 2 };
    let hierarchy = GridHierarchy::new(&first_of_two, &grid, (2, 1), &config).unwrap();
    assert_eq!(hierarchy.finest().local_info().owned.xm, 5);

    let result = MultigridCg::new(&first_of_two, &hierarchy, &config.linear);
    assert!(matches!(result, Err(BlatterError::Communication(_))));

    // The serial hierarchy is accepted
    let serial = GridHierarchy::new(&SingleProcess, &grid, (1, 1), &config).unwrap();
    assert!(MultigridCg::new(&SingleProcess, &serial, &config.linear).is_ok());
}

/// A parabolic dome 40 km across and 1 km thick on a flat bed.
fn ice_dome(grid: &InputGrid) -> Inputs {
    Inputs::from_functions(
        grid,
        |_, _| 0.0,
        |x, y| 1000.0 * (1.0 - (x * x + y * y) / (20.0e3 * 20.0e3)).max(0.0),
        1.7e8,
    )
}

#[test]
fn multigrid_cg_solves_newton_system_in_physical_units() {
    let grid = InputGrid::new(17, 17, 25.0e3, 25.0e3);
    let config = BlatterConfig {
        mz: 5,
        ..BlatterConfig::default()
    };
    assert_eq!(config.n_levels, 3);
    let hierarchy = hierarchy_with_inputs(&grid, &config, &ice_dome(&grid));
    let law = GlenFlowLaw::from(&config.flow_law);

    // Radial flow of about 100 m/yr at the surface, vanishing at the bed
    let dofs = DofMap::new(hierarchy.finest().local_info());
    let (mx, my, mz) = dofs.grid_size();
    let speed = 100.0 / SECONDS_PER_YEAR;
    let mut u = DVector::zeros(dofs.num_dofs());
    for j in 0..my {
        for i in 0..mx {
            for k in 0..mz {
                let sigma = k as f64 / (mz - 1) as f64;
                let velocity = Vector2::new(grid.x(i), grid.y(j)) * (speed * sigma / 20.0e3);
                dofs.set_velocity(&mut u, (i, j, k), &velocity);
            }
        }
    }
    let jacobians = jacobians(&hierarchy, &law, &u);

    let driving_scale = config.ice_density * config.standard_gravity;
    let mut rhs = DVector::zeros(dofs.num_dofs());
    LevelAssembler::new(hierarchy.finest(), &NoSlipStressFree, &law, driving_scale)
        .compute_residual(&u, &mut rhs)
        .unwrap();
    assert!(rhs.norm() > 0.0);

    let mut solver = MultigridCg::new(&SingleProcess, &hierarchy, &config.linear).unwrap();
    let mut solution = DVector::zeros(dofs.num_dofs());
    let output = solver.solve(&jacobians, &rhs, &mut solution).unwrap();
    assert!(output.iterations < config.linear.max_iterations);

    let residual = &rhs - &jacobians[0].matrix * &solution;
    assert!(residual.norm() <= 1e-9 * rhs.norm());
}
