/// Number of grid points that have to be appended to a grid of `n` points so that it can be
/// coarsened `n_levels - 1` times.
///
/// Returns the smallest `p` such that `n + p - 1` is divisible by `2^(n_levels - 1)`.
///
/// # Panics
///
/// Panics if `n` or `n_levels` is zero.
pub fn grid_padding(n: usize, n_levels: usize) -> usize {
    assert!(n > 0, "Grid must have at least one point");
    assert!(n_levels > 0, "Need at least one grid level");
    let c = 1usize << (n_levels - 1);
    let remainder = (n - 1) % c;
    if remainder == 0 {
        0
    } else {
        c - remainder
    }
}

/// Number of points of the grid obtained by coarsening a grid of `n` points once.
pub fn coarsened_size(n: usize) -> usize {
    (n - 1) / 2 + 1
}
