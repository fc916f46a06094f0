//! Algorithms over adapter arrays: element-wise maps, reductions (whole and
//! per block) and the rank collectives they run on.

pub mod controller;
pub mod elementwise;
pub mod per_block;
pub mod reduction;

#[cfg(feature = "mpi-support")]
pub use controller::MpiComm;
pub use controller::{
    global_controller, set_global_controller, Controller, LocalComm, ReduceOp, SelfComm,
};
