use blatter::element::{hex8_basis, hex8_gradients, Q1Element3, Q1Element3Face, FACE_NODES, NODE_OFFSETS, N_CHI};
use matrixcompare::assert_scalar_eq;
use nalgebra::{Point3, Vector2, Vector3};
use proptest::prelude::*;
use util::assert_approx_matrix_eq;

fn point_in_hex_ref_domain() -> impl Strategy<Value = Point3<f64>> {
    // Generate points x, y, z in [-1, 1]^3
    let r = -1.0..=1.0;
    [r.clone(), r.clone(), r].prop_map(|[x, y, z]| Point3::new(x, y, z))
}

fn reference_node(n: usize) -> Point3<f64> {
    let (di, dj, dk) = NODE_OFFSETS[n];
    let sign = |d: usize| 2.0 * d as f64 - 1.0;
    Point3::new(sign(di), sign(dj), sign(dk))
}

/// Physical coordinates of the nodes of the cell with lower corner at the origin, with
/// elevation `z(x, y, k)` for the bottom (`k = 0`) and top (`k = 1`) nodes.
fn cell_nodes(dx: f64, dy: f64, z: impl Fn(f64, f64, usize) -> f64) -> ([f64; N_CHI], [f64; N_CHI], [f64; N_CHI]) {
    let mut x = [0.0; N_CHI];
    let mut y = [0.0; N_CHI];
    let mut z_nodal = [0.0; N_CHI];
    for (n, &(di, dj, dk)) in NODE_OFFSETS.iter().enumerate() {
        x[n] = di as f64 * dx;
        y[n] = dj as f64 * dy;
        z_nodal[n] = z(x[n], y[n], dk);
    }
    (x, y, z_nodal)
}

#[test]
fn hex8_basis_is_nodal() {
    for n in 0..N_CHI {
        let phi = hex8_basis(&reference_node(n));
        for (m, phi_m) in phi.iter().enumerate() {
            let expected = if m == n { 1.0 } else { 0.0 };
            assert_scalar_eq!(*phi_m, expected, comp = abs, tol = 1e-14);
        }
    }
}

proptest! {
    #[test]
    fn hex8_partition_of_unity(xi in point_in_hex_ref_domain()) {
        let phi_sum: f64 = hex8_basis(&xi).iter().sum();
        let grad_sum = hex8_gradients(&xi).iter().fold(Vector3::zeros(), |acc, g| acc + g);
        prop_assert!((phi_sum - 1.0).abs() <= 1e-12);
        prop_assert!(grad_sum.norm() <= 1e-12);
    }
}

#[test]
fn q1_element_box_cell() {
    let (dx, dy, dz) = (2.0, 3.0, 0.5);
    let (x, _, z) = cell_nodes(dx, dy, |_, _, k| k as f64 * dz);

    let mut element = Q1Element3::new(dx, dy);
    element.reset((0, 0, 0), &z).unwrap();

    let volume: f64 = (0..element.n_pts()).map(|q| element.weight(q)).sum();
    assert_scalar_eq!(volume, dx * dy * dz, comp = abs, tol = 1e-12);

    for q in 0..element.n_pts() {
        assert_approx_matrix_eq!(element.evaluate_gradient(&x, q), Vector3::new(1.0, 0.0, 0.0), abstol = 1e-12);
        assert_approx_matrix_eq!(element.evaluate_gradient(&z, q), Vector3::new(0.0, 0.0, 1.0), abstol = 1e-12);
    }
}

#[test]
fn q1_element_reproduces_linear_functions_on_sloped_cell() {
    let (dx, dy) = (1.5, 0.75);
    let bed = |x: f64, y: f64| 0.3 * x - 0.1 * y;
    let thickness = |x: f64| 1.0 + 0.2 * x;
    let (x, y, z) = cell_nodes(dx, dy, |x, y, k| bed(x, y) + k as f64 * thickness(x));

    let mut element = Q1Element3::new(dx, dy);
    element.reset((3, 4, 5), &z).unwrap();
    assert_eq!(element.local_to_global(6), (4, 5, 6));

    // The thickness is linear in x, so its average over the cell is its value at the center
    let volume: f64 = (0..element.n_pts()).map(|q| element.weight(q)).sum();
    assert_scalar_eq!(volume, dx * dy * thickness(0.5 * dx), comp = abs, tol = 1e-12);

    let f: [f64; N_CHI] = std::array::from_fn(|n| x[n] + 2.0 * y[n] + 3.0 * z[n]);
    let g: [f64; N_CHI] = std::array::from_fn(|n| -x[n]);
    let velocity: [Vector2<f64>; N_CHI] = std::array::from_fn(|n| Vector2::new(f[n], g[n]));
    for q in 0..element.n_pts() {
        assert_approx_matrix_eq!(element.evaluate_gradient(&f, q), Vector3::new(1.0, 2.0, 3.0), abstol = 1e-12);

        let (value, gradient) = element.evaluate_vector(&velocity, q);
        assert_scalar_eq!(value[0], element.evaluate(&f, q), comp = abs, tol = 1e-12);
        assert_scalar_eq!(value[1], element.evaluate(&g, q), comp = abs, tol = 1e-12);
        assert_approx_matrix_eq!(gradient.row(0).transpose(), Vector3::new(1.0, 2.0, 3.0), abstol = 1e-12);
        assert_approx_matrix_eq!(gradient.row(1).transpose(), Vector3::new(-1.0, 0.0, 0.0), abstol = 1e-12);
    }
}

#[test]
fn q1_element_rejects_inverted_cell() {
    let (_, _, z) = cell_nodes(1.0, 1.0, |_, _, k| 1.0 - k as f64);
    let mut element = Q1Element3::new(1.0, 1.0);
    assert!(element.reset((0, 0, 0), &z).is_err());

    let (_, _, flat) = cell_nodes(1.0, 1.0, |_, _, _| 0.0);
    assert!(element.reset((0, 0, 0), &flat).is_err());
}

#[test]
fn q1_element_reset_clears_invalid_nodes() {
    let (_, _, z) = cell_nodes(1.0, 1.0, |_, _, k| k as f64);
    let mut element = Q1Element3::new(1.0, 1.0);
    element.reset((0, 0, 0), &z).unwrap();
    element.mark_row_invalid(2);
    element.mark_col_invalid(5);
    assert!(!element.row_is_valid(2));
    assert!(element.col_is_valid(2));
    assert!(!element.col_is_valid(5));

    element.reset((1, 0, 0), &z).unwrap();
    assert!((0..N_CHI).all(|n| element.row_is_valid(n) && element.col_is_valid(n)));
}

#[test]
fn q1_face_box_cell() {
    let (dx, dy, dz) = (2.0, 3.0, 0.5);
    let (_, _, z) = cell_nodes(dx, dy, |_, _, k| k as f64 * dz);
    let areas = [dy * dz, dy * dz, dx * dz, dx * dz, dx * dy, dx * dy];
    let normals = [
        -Vector3::x(),
        Vector3::x(),
        -Vector3::y(),
        Vector3::y(),
        -Vector3::z(),
        Vector3::z(),
    ];

    let mut face = Q1Element3Face::new(dx, dy);
    for f in 0..6 {
        face.reset(f, &z).unwrap();
        assert_eq!(face.nodes(), &FACE_NODES[f]);

        let area: f64 = (0..face.n_pts()).map(|q| face.weight(q)).sum();
        assert_scalar_eq!(area, areas[f], comp = abs, tol = 1e-12);

        for q in 0..face.n_pts() {
            assert_approx_matrix_eq!(face.normal(q), &normals[f], abstol = 1e-12);
            let chi_sum: f64 = FACE_NODES[f].iter().map(|&n| face.chi(q, n)).sum();
            assert_scalar_eq!(chi_sum, 1.0, comp = abs, tol = 1e-12);
            for n in (0..N_CHI).filter(|n| !FACE_NODES[f].contains(n)) {
                assert_scalar_eq!(face.chi(q, n), 0.0, comp = abs, tol = 1e-14);
            }
        }
    }
}

#[test]
fn q1_face_sloped_surface() {
    let (dx, dy, slope) = (1.0, 2.0, 0.25);
    let (_, _, z) = cell_nodes(dx, dy, |x, _, k| slope * x + k as f64);

    let mut face = Q1Element3Face::new(dx, dy);
    face.reset(5, &z).unwrap();

    let stretch = (1.0 + slope * slope).sqrt();
    let area: f64 = (0..face.n_pts()).map(|q| face.weight(q)).sum();
    assert_scalar_eq!(area, dx * dy * stretch, comp = abs, tol = 1e-12);

    let expected_normal = Vector3::new(-slope, 0.0, 1.0) / stretch;
    for q in 0..face.n_pts() {
        assert_approx_matrix_eq!(face.normal(q), &expected_normal, abstol = 1e-12);
    }
}
