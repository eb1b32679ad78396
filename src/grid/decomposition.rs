//! Distribution of grid columns over a rectangular grid of processes.
use crate::error::BlatterError;
use crate::grid::array::GridBox;

/// Ownership ranges of a structured grid split over `px x py` processes.
///
/// `lx[p]` is the number of grid columns owned by process column `p` in the `x` direction, and
/// similarly for `ly`. The vertical direction is never split. Process `rank` has coordinates
/// `(rank % px, rank / px)` in the process grid.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Decomposition {
    lx: Vec<usize>,
    ly: Vec<usize>,
}

/// Splits `n` points over `p` processes as evenly as possible.
fn split_evenly(n: usize, p: usize) -> Vec<usize> {
    (0..p).map(|r| n / p + usize::from(r < n % p)).collect()
}

/// Coarse ownership counts, assuming coarse point `I` is owned by the owner of fine point `2I`.
fn coarsen_ranges(l: &[usize]) -> Result<Vec<usize>, BlatterError> {
    let mut start = 0;
    let mut result = Vec::with_capacity(l.len());
    for &count in l {
        let end = start + count;
        // Coarse points I with start <= 2I < end
        let first = (start + 1) / 2;
        let last = (end + 1) / 2;
        if last <= first {
            return Err(BlatterError::InvalidConfiguration(format!(
                "grid is too coarse for the process layout: fine range [{}, {}) owns no coarse points",
                start, end
            )));
        }
        result.push(last - first);
        start = end;
    }
    Ok(result)
}

impl Decomposition {
    /// Splits an `mx x my` grid over `px x py` processes, then appends `pad_x` (`pad_y`) padding
    /// columns to the last process in the `x` (`y`) direction.
    pub fn new(
        (mx, my): (usize, usize),
        (px, py): (usize, usize),
        (pad_x, pad_y): (usize, usize),
    ) -> Result<Self, BlatterError> {
        if px == 0 || py == 0 || px > mx || py > my {
            return Err(BlatterError::InvalidConfiguration(format!(
                "cannot split a {}x{} grid over {}x{} processes",
                mx, my, px, py
            )));
        }
        let mut lx = split_evenly(mx, px);
        let mut ly = split_evenly(my, py);
        lx[px - 1] += pad_x;
        ly[py - 1] += pad_y;
        Ok(Self { lx, ly })
    }

    pub fn from_ownership_ranges(lx: Vec<usize>, ly: Vec<usize>) -> Result<Self, BlatterError> {
        if lx.is_empty() || ly.is_empty() || lx.contains(&0) || ly.contains(&0) {
            return Err(BlatterError::InvalidConfiguration(
                "every process must own at least one grid column".to_string(),
            ));
        }
        Ok(Self { lx, ly })
    }

    pub fn lx(&self) -> &[usize] {
        &self.lx
    }

    pub fn ly(&self) -> &[usize] {
        &self.ly
    }

    pub fn mx(&self) -> usize {
        self.lx.iter().sum()
    }

    pub fn my(&self) -> usize {
        self.ly.iter().sum()
    }

    pub fn num_processes(&self) -> usize {
        self.lx.len() * self.ly.len()
    }

    /// Ownership ranges of the grid obtained by coarsening once.
    pub fn coarsen(&self) -> Result<Self, BlatterError> {
        Ok(Self {
            lx: coarsen_ranges(&self.lx)?,
            ly: coarsen_ranges(&self.ly)?,
        })
    }

    /// The box of columns owned by the given process.
    ///
    /// # Panics
    ///
    /// Panics if `rank` is not smaller than the number of processes.
    pub fn owned_box(&self, rank: usize) -> GridBox {
        assert!(rank < self.num_processes(), "rank {} out of bounds", rank);
        let px = self.lx.len();
        let (ri, rj) = (rank % px, rank / px);
        let xs = self.lx[..ri].iter().sum();
        let ys = self.ly[..rj].iter().sum();
        GridBox::new(xs, ys, self.lx[ri], self.ly[rj])
    }
}

/// The part of a grid level seen by one process.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct LocalInfo {
    pub mx: usize,
    pub my: usize,
    pub mz: usize,
    /// Columns owned by this process.
    pub owned: GridBox,
    /// Owned columns plus a halo of width 1, clipped to the grid.
    pub ghosted: GridBox,
}

/// Width of the halo needed by the Q1 stencil.
pub const STENCIL_WIDTH: usize = 1;

impl LocalInfo {
    pub fn new(decomposition: &Decomposition, rank: usize, mz: usize) -> Self {
        let (mx, my) = (decomposition.mx(), decomposition.my());
        let owned = decomposition.owned_box(rank);
        Self {
            mx,
            my,
            mz,
            owned,
            ghosted: owned.grow(STENCIL_WIDTH, mx, my),
        }
    }

    /// Lower-left corner columns `(i, j)` of all elements with at least one node in the ghosted
    /// box.
    pub fn element_columns(&self) -> impl Iterator<Item = (usize, usize)> {
        let g = self.ghosted;
        let elements = GridBox::new(g.xs, g.ys, g.xm.saturating_sub(1), g.ym.saturating_sub(1));
        elements.columns()
    }

    pub fn is_owned(&self, i: usize, j: usize) -> bool {
        self.owned.contains(i, j)
    }

    /// Number of unknowns of the whole level (two per node).
    pub fn global_dofs(&self) -> usize {
        2 * self.mx * self.my * self.mz
    }
}
