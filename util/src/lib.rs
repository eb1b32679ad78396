//! Assertion helpers shared by the tests of the workspace.
use nalgebra::{DMatrix, RealField};

/// Asserts that two matrices (or vectors) agree entrywise up to an absolute tolerance.
///
/// Both operands are evaluated once, so they must be `Copy` (references or small fixed-size
/// matrices).
#[macro_export]
macro_rules! assert_approx_matrix_eq {
    ($x:expr, $y:expr, abstol = $tol:expr) => {{
        let (x, y, tol) = ($x, $y, $tol);
        let diff = x - y;
        let max_absdiff = diff.abs().max();
        if !(max_absdiff <= tol) {
            panic!(
                "Matrices differ by {:e} (abstol {:e})\nleft: {}\nright: {}\ndiff: {:e}",
                max_absdiff, tol, x, y, diff
            );
        }
    }};
}

/// Asserts that evaluating the expression panics.
#[macro_export]
macro_rules! assert_panics {
    ($e:expr) => {{
        let result = std::panic::catch_unwind(|| $e);
        assert!(result.is_err(), "assert_panics!({}) failed: no panic", stringify!($e));
    }};
}

/// Largest entry of `|A - A^T|`.
pub fn max_asymmetry<T: RealField + Copy>(a: &DMatrix<T>) -> T {
    assert_eq!(a.nrows(), a.ncols(), "Matrix must be square.");
    (a - a.transpose()).abs().max()
}
