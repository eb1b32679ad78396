//! Storage for fields defined on a rectangular box of grid columns.
//!
//! Arrays are addressed by *global* grid indices. `Array2` stores one value per column with
//! `i` varying fastest. `Array3` stores a full column of `mz` values per horizontal index with
//! `k` varying fastest, so every column is contiguous in memory.
use std::ops::{Index, IndexMut};

/// A rectangular box of grid columns `[xs, xs + xm) x [ys, ys + ym)`.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct GridBox {
    pub xs: usize,
    pub ys: usize,
    pub xm: usize,
    pub ym: usize,
}

impl GridBox {
    pub fn new(xs: usize, ys: usize, xm: usize, ym: usize) -> Self {
        Self { xs, ys, xm, ym }
    }

    pub fn x_end(&self) -> usize {
        self.xs + self.xm
    }

    pub fn y_end(&self) -> usize {
        self.ys + self.ym
    }

    pub fn num_columns(&self) -> usize {
        self.xm * self.ym
    }

    pub fn contains(&self, i: usize, j: usize) -> bool {
        i >= self.xs && i < self.x_end() && j >= self.ys && j < self.y_end()
    }

    pub fn contains_box(&self, other: &GridBox) -> bool {
        other.num_columns() == 0
            || (other.xs >= self.xs
                && other.x_end() <= self.x_end()
                && other.ys >= self.ys
                && other.y_end() <= self.y_end())
    }

    /// Grows the box by `width` in every direction, clipped to `[0, mx) x [0, my)`.
    pub fn grow(&self, width: usize, mx: usize, my: usize) -> GridBox {
        let xs = self.xs.saturating_sub(width);
        let ys = self.ys.saturating_sub(width);
        let x_end = (self.x_end() + width).min(mx);
        let y_end = (self.y_end() + width).min(my);
        GridBox::new(xs, ys, x_end - xs, y_end - ys)
    }

    /// Iterates over all `(i, j)` in the box, with `i` varying fastest.
    pub fn columns(&self) -> impl Iterator<Item = (usize, usize)> {
        let GridBox { xs, ys, xm, ym } = *self;
        (ys..ys + ym).flat_map(move |j| (xs..xs + xm).map(move |i| (i, j)))
    }

    fn offset(&self, i: usize, j: usize) -> usize {
        assert!(
            self.contains(i, j),
            "Column ({}, {}) is outside the stored box {:?}",
            i,
            j,
            self
        );
        (j - self.ys) * self.xm + (i - self.xs)
    }
}

/// A 2D field with one value per grid column.
#[derive(Clone, Debug, PartialEq)]
pub struct Array2<T> {
    grid_box: GridBox,
    data: Vec<T>,
}

impl<T: Clone> Array2<T> {
    pub fn new(grid_box: GridBox, value: T) -> Self {
        Self {
            grid_box,
            data: vec![value; grid_box.num_columns()],
        }
    }
}

impl<T> Array2<T> {
    pub fn from_fn(grid_box: GridBox, mut f: impl FnMut(usize, usize) -> T) -> Self {
        let data = grid_box.columns().map(|(i, j)| f(i, j)).collect();
        Self { grid_box, data }
    }

    pub fn grid_box(&self) -> &GridBox {
        &self.grid_box
    }

    pub fn get(&self, i: usize, j: usize) -> Option<&T> {
        if self.grid_box.contains(i, j) {
            Some(&self[(i, j)])
        } else {
            None
        }
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }
}

impl<T> Index<(usize, usize)> for Array2<T> {
    type Output = T;

    fn index(&self, (i, j): (usize, usize)) -> &T {
        &self.data[self.grid_box.offset(i, j)]
    }
}

impl<T> IndexMut<(usize, usize)> for Array2<T> {
    fn index_mut(&mut self, (i, j): (usize, usize)) -> &mut T {
        let offset = self.grid_box.offset(i, j);
        &mut self.data[offset]
    }
}

/// A 3D field with a full column of `mz` values per grid column.
#[derive(Clone, Debug, PartialEq)]
pub struct Array3<T> {
    grid_box: GridBox,
    mz: usize,
    data: Vec<T>,
}

impl<T: Clone> Array3<T> {
    pub fn new(grid_box: GridBox, mz: usize, value: T) -> Self {
        Self {
            grid_box,
            mz,
            data: vec![value; grid_box.num_columns() * mz],
        }
    }
}

impl<T> Array3<T> {
    pub fn from_fn(grid_box: GridBox, mz: usize, mut f: impl FnMut(usize, usize, usize) -> T) -> Self {
        let data = grid_box
            .columns()
            .flat_map(|(i, j)| (0..mz).map(move |k| (i, j, k)))
            .map(|(i, j, k)| f(i, j, k))
            .collect();
        Self { grid_box, mz, data }
    }

    pub fn grid_box(&self) -> &GridBox {
        &self.grid_box
    }

    pub fn mz(&self) -> usize {
        self.mz
    }

    pub fn column(&self, i: usize, j: usize) -> &[T] {
        let start = self.grid_box.offset(i, j) * self.mz;
        &self.data[start..start + self.mz]
    }

    pub fn column_mut(&mut self, i: usize, j: usize) -> &mut [T] {
        let start = self.grid_box.offset(i, j) * self.mz;
        &mut self.data[start..start + self.mz]
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }
}

impl<T> Index<(usize, usize, usize)> for Array3<T> {
    type Output = T;

    fn index(&self, (i, j, k): (usize, usize, usize)) -> &T {
        assert!(k < self.mz, "Level {} is out of bounds (mz = {})", k, self.mz);
        &self.data[self.grid_box.offset(i, j) * self.mz + k]
    }
}

impl<T> IndexMut<(usize, usize, usize)> for Array3<T> {
    fn index_mut(&mut self, (i, j, k): (usize, usize, usize)) -> &mut T {
        assert!(k < self.mz, "Level {} is out of bounds (mz = {})", k, self.mz);
        let offset = self.grid_box.offset(i, j) * self.mz + k;
        &mut self.data[offset]
    }
}
