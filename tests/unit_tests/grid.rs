use crate::unit_tests::{hierarchy_with_inputs, unit_config};
use blatter::comm::SingleProcess;
use blatter::grid::padding::coarsened_size;
use blatter::grid::{
    grid_padding, grid_z, sigma_levels, Array2, Array3, Decomposition, GridBox, GridHierarchy, LocalInfo,
};
use blatter::node_type::NodeType;
use blatter::parameters::{interpolate_column, InputGrid, Inputs};
use blatter::BlatterError;
use matrixcompare::assert_scalar_eq;
use proptest::prelude::*;
use util::assert_panics;

#[test]
fn grid_padding_examples() {
    assert_eq!(grid_padding(9, 3), 0);
    assert_eq!(grid_padding(10, 3), 3);
    assert_eq!(grid_padding(2, 3), 3);
    assert_eq!(grid_padding(17, 1), 0);
    assert_eq!(grid_padding(16, 5), 1);
    assert_eq!(coarsened_size(17), 9);
    assert_eq!(coarsened_size(3), 2);
}

proptest! {
    #[test]
    fn grid_padding_is_minimal(n in 1..200usize, n_levels in 1..6usize) {
        let c = 1 << (n_levels - 1);
        let p = grid_padding(n, n_levels);
        prop_assert!(p < c);
        prop_assert_eq!((n + p - 1) % c, 0);
    }
}

#[test]
fn sigma_levels_end_at_one() {
    let sigma = sigma_levels(7);
    assert_eq!(sigma.len(), 7);
    assert_eq!(sigma[0], 0.0);
    assert_eq!(sigma[6], 1.0);
    assert_scalar_eq!(sigma[3], 0.5, comp = abs, tol = 1e-15);
    assert_scalar_eq!(grid_z(10.0, 4.0, 5, 2), 12.0, comp = abs, tol = 1e-14);
}

#[test]
fn arrays_are_indexed_by_global_indices() {
    let grid_box = GridBox::new(2, 3, 2, 2);
    assert_eq!(grid_box.columns().collect::<Vec<_>>(), vec![(2, 3), (3, 3), (2, 4), (3, 4)]);

    let a = Array2::from_fn(grid_box, |i, j| 10 * j + i);
    assert_eq!(a[(3, 4)], 43);
    assert_eq!(a.get(1, 3), None);
    assert_panics!(a[(4, 3)]);

    let b = Array3::from_fn(grid_box, 3, |i, j, k| 100 * k + 10 * j + i);
    assert_eq!(b.column(2, 4), &[42, 142, 242]);
    assert_eq!(b[(3, 3, 2)], 233);
    assert_panics!(b[(3, 3, 3)]);
}

#[test]
fn decomposition_splits_evenly_and_pads_last_process() {
    let decomposition = Decomposition::new((10, 7), (3, 2), (3, 2)).unwrap();
    assert_eq!(decomposition.lx(), &[4, 3, 6]);
    assert_eq!(decomposition.ly(), &[4, 5]);
    assert_eq!(decomposition.mx(), 13);
    assert_eq!(decomposition.my(), 9);
    assert_eq!(decomposition.owned_box(4), GridBox::new(4, 4, 3, 5));

    // Coarse node I is owned by the owner of fine node 2I
    let coarse = decomposition.coarsen().unwrap();
    assert_eq!(coarse.lx(), &[2, 2, 3]);
    assert_eq!(coarse.ly(), &[2, 3]);

    let info = LocalInfo::new(&decomposition, 4, 5);
    assert_eq!(info.ghosted, GridBox::new(3, 3, 5, 6));
    assert!(info.is_owned(6, 8));
    assert!(!info.is_owned(7, 8));
    assert_eq!(info.element_columns().count(), 4 * 5);
}

#[test]
fn decomposition_rejects_process_without_coarse_nodes() {
    let decomposition = Decomposition::from_ownership_ranges(vec![1, 1, 3], vec![5]).unwrap();
    assert!(matches!(decomposition.coarsen(), Err(BlatterError::InvalidConfiguration(_))));
    assert!(Decomposition::new((4, 4), (5, 1), (0, 0)).is_err());
}

#[test]
fn hierarchy_levels_are_consistently_coarsened() {
    let grid = InputGrid::new(10, 6, 1.0, 1.0);
    let config = unit_config(4, 3, 3.0);
    let hierarchy = GridHierarchy::new(&SingleProcess, &grid, (1, 1), &config).unwrap();

    let sizes: Vec<_> = hierarchy
        .levels()
        .iter()
        .map(|level| {
            let info = level.local_info();
            (info.mx, info.my, info.mz)
        })
        .collect();
    assert_eq!(sizes, vec![(13, 9, 5), (7, 5, 3), (4, 3, 2)]);

    for (l, &(mx, my, mz)) in sizes.iter().enumerate() {
        let c = 1 << (sizes.len() - 1 - l);
        assert_eq!((mx - 1) % c, 0);
        assert_eq!((my - 1) % c, 0);
        assert_eq!((mz - 1) % c, 0);
    }

    // The domain extent is preserved
    let fine = hierarchy.finest().grid_info();
    let coarse = hierarchy.levels()[2].grid_info();
    assert_scalar_eq!(fine.x(12), coarse.x(3), comp = abs, tol = 1e-14);
    assert_scalar_eq!(coarse.dx, 4.0 * fine.dx, comp = abs, tol = 1e-14);
}

#[test]
fn hierarchy_rejects_mismatched_process_grid() {
    let grid = InputGrid::new(9, 9, 1.0, 1.0);
    let result = GridHierarchy::new(&SingleProcess, &grid, (2, 1), &unit_config(5, 2, 3.0));
    assert!(matches!(result, Err(BlatterError::Communication(_))));
}

#[test]
fn restriction_preserves_uniform_fields() {
    let grid = InputGrid::new(9, 9, 1.0, 1.0);
    let config = unit_config(5, 3, 3.0);
    let inputs = Inputs::from_functions(&grid, |_, _| -2.0, |_, _| 3.0, 5.0);
    let hierarchy = hierarchy_with_inputs(&grid, &config, &inputs);

    for level in hierarchy.levels() {
        let info = level.local_info();
        for (i, j) in info.owned.columns() {
            let p = &level.parameters()[(i, j)];
            assert_scalar_eq!(p.bed, -2.0, comp = abs, tol = 1e-12);
            assert_scalar_eq!(p.thickness, 3.0, comp = abs, tol = 1e-12);
            for k in 0..info.mz {
                assert_scalar_eq!(level.hardness()[(i, j, k)], 5.0, comp = abs, tol = 1e-12);
            }
        }
    }
}

#[test]
fn coarse_node_types_follow_restricted_thickness() {
    let grid = InputGrid::new(9, 9, 2.0, 2.0);
    let config = unit_config(5, 2, 3.0);
    let inputs = crate::unit_tests::ice_patch_inputs(&grid);
    let hierarchy = hierarchy_with_inputs(&grid, &config, &inputs);

    let fine = hierarchy.finest().parameters();
    assert_eq!(fine[(4, 4)].node_type, NodeType::Interior);
    assert_eq!(fine[(2, 4)].node_type, NodeType::Boundary);
    assert_eq!(fine[(1, 4)].node_type, NodeType::Exterior);

    // Fine columns 1..=7 contribute to coarse column 2 with full weighting. The coarse
    // thickness is the weighted average of the fine thickness.
    let coarse = &hierarchy.levels()[1];
    let p = &coarse.parameters()[(1, 2)];
    assert_scalar_eq!(p.thickness, 0.75, comp = abs, tol = 1e-12);
    assert_eq!(coarse.parameters()[(2, 2)].node_type, NodeType::Interior);
    assert_eq!(coarse.parameters()[(0, 2)].node_type, NodeType::Exterior);
    assert_eq!(coarse.parameters()[(1, 2)].node_type, NodeType::Boundary);
}

#[test]
fn padding_columns_are_ice_free() {
    let grid = InputGrid::new(6, 5, 1.0, 1.0);
    let config = unit_config(3, 2, 3.0);
    let inputs = Inputs::from_functions(&grid, |x, _| x, |_, _| 1.0, 1.0);
    let hierarchy = hierarchy_with_inputs(&grid, &config, &inputs);

    let level = hierarchy.finest();
    assert_eq!(level.local_info().mx, 7);
    let padding = &level.parameters()[(6, 2)];
    assert_eq!(padding.thickness, 0.0);
    assert_eq!(padding.node_type, NodeType::Exterior);
    assert_scalar_eq!(padding.bed, 1.0, comp = abs, tol = 1e-14);
}

#[test]
fn interpolate_hardness_in_sigma() {
    let values = [1.0, 3.0, 7.0];
    assert_eq!(interpolate_column(&values, 0.0), 1.0);
    assert_eq!(interpolate_column(&values, 1.0), 7.0);
    assert_scalar_eq!(interpolate_column(&values, 0.25), 2.0, comp = abs, tol = 1e-14);
    assert_scalar_eq!(interpolate_column(&values, 0.75), 5.0, comp = abs, tol = 1e-14);
    assert_eq!(interpolate_column(&[4.0], 0.3), 4.0);
}

#[test]
fn node_elevations_use_floored_thickness() {
    let grid = InputGrid::new(5, 5, 1.0, 1.0);
    let config = unit_config(3, 1, 3.0);
    let inputs = Inputs::from_functions(&grid, |x, _| 0.2 * x, |x, _| if x <= 0.5 { 1.0 } else { 0.0 }, 1.0);
    let hierarchy = hierarchy_with_inputs(&grid, &config, &inputs);
    let level = hierarchy.finest();
    assert_eq!(config.min_thickness, 0.1);

    // Icy column at x = -1
    assert_scalar_eq!(level.node_z(0, 2, 0), -0.2, comp = abs, tol = 1e-14);
    assert_scalar_eq!(level.node_z(0, 2, 1), 0.3, comp = abs, tol = 1e-14);
    assert_scalar_eq!(level.node_z(0, 2, 2), 0.8, comp = abs, tol = 1e-14);

    // Ice-free column at x = 1 still has a positive vertical spacing
    assert_eq!(level.parameters()[(4, 2)].thickness, 0.0);
    assert_scalar_eq!(level.node_z(4, 2, 0), 0.2, comp = abs, tol = 1e-14);
    assert_scalar_eq!(level.node_z(4, 2, 2), 0.3, comp = abs, tol = 1e-14);
    assert!(level.node_z(4, 2, 1) > level.node_z(4, 2, 0));
}
