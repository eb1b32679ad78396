//! Collective operations between the processes sharing a grid.
//!
//! Every method of [`Communicator`] is collective: all processes must call it in the same order,
//! otherwise the solve deadlocks.
use crate::error::BlatterError;
use crate::grid::array::{Array2, Array3, GridBox};
use crate::grid::decomposition::LocalInfo;
use nalgebra::DVector;

pub trait Communicator {
    fn rank(&self) -> usize;

    fn size(&self) -> usize;

    fn barrier(&self) -> Result<(), BlatterError>;

    fn all_reduce_sum(&self, value: f64) -> Result<f64, BlatterError>;

    fn all_reduce_max(&self, value: f64) -> Result<f64, BlatterError>;

    /// Replaces `v` on every process by the sum of `v` over all processes.
    ///
    /// Used to combine global vectors of which each process has filled its owned rows.
    fn sum_vector(&self, v: &mut DVector<f64>) -> Result<(), BlatterError>;

    /// Overwrites the halo of a ghosted 2D array with the values owned by neighboring processes.
    fn update_ghosts_2d<T: Copy>(&self, info: &LocalInfo, array: &mut Array2<T>) -> Result<(), BlatterError>;

    /// Overwrites the halo of a ghosted 3D array with the values owned by neighboring processes.
    fn update_ghosts_3d<T: Copy>(&self, info: &LocalInfo, array: &mut Array3<T>) -> Result<(), BlatterError>;
}

fn check_ghosted_box(info: &LocalInfo, array_box: &GridBox) -> Result<(), BlatterError> {
    if *array_box != info.ghosted {
        return Err(BlatterError::Communication(format!(
            "halo exchange needs an array covering the ghosted box {:?}, got {:?}",
            info.ghosted, array_box
        )));
    }
    Ok(())
}

/// The trivial communicator of a run with a single process.
///
/// The only process owns the whole grid, so there are no ghosts to exchange.
#[derive(Copy, Clone, Debug, Default)]
pub struct SingleProcess;

impl Communicator for SingleProcess {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn barrier(&self) -> Result<(), BlatterError> {
        Ok(())
    }

    fn all_reduce_sum(&self, value: f64) -> Result<f64, BlatterError> {
        Ok(value)
    }

    fn all_reduce_max(&self, value: f64) -> Result<f64, BlatterError> {
        Ok(value)
    }

    fn sum_vector(&self, _v: &mut DVector<f64>) -> Result<(), BlatterError> {
        Ok(())
    }

    fn update_ghosts_2d<T: Copy>(&self, info: &LocalInfo, array: &mut Array2<T>) -> Result<(), BlatterError> {
        check_ghosted_box(info, array.grid_box())
    }

    fn update_ghosts_3d<T: Copy>(&self, info: &LocalInfo, array: &mut Array3<T>) -> Result<(), BlatterError> {
        check_ghosted_box(info, array.grid_box())?;
        if array.mz() != info.mz {
            return Err(BlatterError::Communication(format!(
                "halo exchange needs {} levels, got {}",
                info.mz,
                array.mz()
            )));
        }
        Ok(())
    }
}
