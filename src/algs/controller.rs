//! Thin façade over the rank collectives the reduction engines need.
//!
//! The engines only ever issue element-wise all-reduces over small flat
//! buffers, so the [`Controller`] trait is minimal by design: size, rank and
//! two typed `allreduce` calls. Three backends: [`SelfComm`] for serial
//! runs, [`LocalComm`] for intra-process thread groups (tests and
//! shared-memory pipelines), and `MpiComm` behind the `mpi-support`
//! feature.

use once_cell::sync::Lazy;
use parking_lot::{Mutex, RwLock};
use std::sync::{Arc, Barrier};

/// Combination applied element-wise by an all-reduce.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReduceOp {
    Sum,
    Min,
    Max,
    /// All-ranks logical AND over zero/nonzero values.
    LogicalAnd,
}

impl ReduceOp {
    fn apply_f64(self, a: f64, b: f64) -> f64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
            ReduceOp::LogicalAnd => {
                if a != 0.0 && b != 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
        }
    }

    fn apply_i64(self, a: i64, b: i64) -> i64 {
        match self {
            ReduceOp::Sum => a + b,
            ReduceOp::Min => a.min(b),
            ReduceOp::Max => a.max(b),
            ReduceOp::LogicalAnd => i64::from(a != 0 && b != 0),
        }
    }

    fn identity_f64(self) -> f64 {
        match self {
            ReduceOp::Sum => 0.0,
            ReduceOp::Min => f64::INFINITY,
            ReduceOp::Max => f64::NEG_INFINITY,
            ReduceOp::LogicalAnd => 1.0,
        }
    }

    fn identity_i64(self) -> i64 {
        match self {
            ReduceOp::Sum => 0,
            ReduceOp::Min => i64::MAX,
            ReduceOp::Max => i64::MIN,
            ReduceOp::LogicalAnd => 1,
        }
    }
}

/// Rank collectives.
///
/// All-reduces are collective: every rank of the group must call with a
/// buffer of the same length, and every rank receives the combined result.
pub trait Controller: Send + Sync {
    /// Number of ranks in the group.
    fn size(&self) -> usize;

    /// This rank's index.
    fn rank(&self) -> usize;

    /// True when the group has more than one rank.
    fn is_parallel(&self) -> bool {
        self.size() > 1
    }

    /// Element-wise all-reduce over a real buffer.
    fn allreduce_f64(&self, local: &[f64], op: ReduceOp) -> Vec<f64>;

    /// Element-wise all-reduce over an integer buffer.
    fn allreduce_i64(&self, local: &[i64], op: ReduceOp) -> Vec<i64>;
}

/// Single-rank controller: all-reduces return their input.
#[derive(Clone, Copy, Debug, Default)]
pub struct SelfComm;

impl Controller for SelfComm {
    fn size(&self) -> usize {
        1
    }

    fn rank(&self) -> usize {
        0
    }

    fn allreduce_f64(&self, local: &[f64], _op: ReduceOp) -> Vec<f64> {
        local.to_vec()
    }

    fn allreduce_i64(&self, local: &[i64], _op: ReduceOp) -> Vec<i64> {
        local.to_vec()
    }
}

struct GroupState {
    size: usize,
    barrier: Barrier,
    slots_f64: Mutex<Vec<Vec<f64>>>,
    slots_i64: Mutex<Vec<Vec<i64>>>,
    result_f64: Mutex<Vec<f64>>,
    result_i64: Mutex<Vec<i64>>,
}

/// Intra-process controller: one rank per thread over a shared group.
///
/// The rendezvous is a three-barrier exchange: deposit, combine on rank 0,
/// read, with a final barrier before the slots may be overwritten.
#[derive(Clone)]
pub struct LocalComm {
    rank: usize,
    group: Arc<GroupState>,
}

impl LocalComm {
    /// A group of `size` controllers, one per rank, to be moved into
    /// threads.
    pub fn group(size: usize) -> Vec<LocalComm> {
        let state = Arc::new(GroupState {
            size,
            barrier: Barrier::new(size),
            slots_f64: Mutex::new(vec![Vec::new(); size]),
            slots_i64: Mutex::new(vec![Vec::new(); size]),
            result_f64: Mutex::new(Vec::new()),
            result_i64: Mutex::new(Vec::new()),
        });
        (0..size)
            .map(|rank| LocalComm {
                rank,
                group: state.clone(),
            })
            .collect()
    }
}

impl Controller for LocalComm {
    fn size(&self) -> usize {
        self.group.size
    }

    fn rank(&self) -> usize {
        self.rank
    }

    fn allreduce_f64(&self, local: &[f64], op: ReduceOp) -> Vec<f64> {
        self.group.slots_f64.lock()[self.rank] = local.to_vec();
        self.group.barrier.wait();
        if self.rank == 0 {
            let slots = self.group.slots_f64.lock();
            let n = slots.iter().map(|s| s.len()).max().unwrap_or(0);
            let mut acc = vec![op.identity_f64(); n];
            for slot in slots.iter() {
                for (a, &v) in acc.iter_mut().zip(slot.iter()) {
                    *a = op.apply_f64(*a, v);
                }
            }
            *self.group.result_f64.lock() = acc;
        }
        self.group.barrier.wait();
        let out = self.group.result_f64.lock().clone();
        self.group.barrier.wait();
        out
    }

    fn allreduce_i64(&self, local: &[i64], op: ReduceOp) -> Vec<i64> {
        self.group.slots_i64.lock()[self.rank] = local.to_vec();
        self.group.barrier.wait();
        if self.rank == 0 {
            let slots = self.group.slots_i64.lock();
            let n = slots.iter().map(|s| s.len()).max().unwrap_or(0);
            let mut acc = vec![op.identity_i64(); n];
            for slot in slots.iter() {
                for (a, &v) in acc.iter_mut().zip(slot.iter()) {
                    *a = op.apply_i64(*a, v);
                }
            }
            *self.group.result_i64.lock() = acc;
        }
        self.group.barrier.wait();
        let out = self.group.result_i64.lock().clone();
        self.group.barrier.wait();
        out
    }
}

#[cfg(feature = "mpi-support")]
mod mpi_backend {
    use super::{Controller, ReduceOp};
    use mpi::collective::SystemOperation;
    use mpi::topology::SimpleCommunicator;
    use mpi::traits::{Communicator, CommunicatorCollectives};

    /// Inter-process controller over an MPI communicator.
    pub struct MpiComm {
        world: SimpleCommunicator,
    }

    impl MpiComm {
        /// Controller over the world communicator.
        pub fn world() -> Self {
            let universe = mpi::initialize().expect("MPI initialization");
            let world = universe.world();
            std::mem::forget(universe);
            MpiComm { world }
        }
    }

    fn system_op(op: ReduceOp) -> SystemOperation {
        match op {
            ReduceOp::Sum => SystemOperation::sum(),
            ReduceOp::Min => SystemOperation::min(),
            ReduceOp::Max => SystemOperation::max(),
            // Inputs are zero/one flags, so MIN is AND.
            ReduceOp::LogicalAnd => SystemOperation::min(),
        }
    }

    impl Controller for MpiComm {
        fn size(&self) -> usize {
            self.world.size() as usize
        }

        fn rank(&self) -> usize {
            self.world.rank() as usize
        }

        fn allreduce_f64(&self, local: &[f64], op: ReduceOp) -> Vec<f64> {
            let mut out = vec![0.0; local.len()];
            self.world
                .all_reduce_into(local, &mut out[..], system_op(op));
            out
        }

        fn allreduce_i64(&self, local: &[i64], op: ReduceOp) -> Vec<i64> {
            let mut out = vec![0i64; local.len()];
            self.world
                .all_reduce_into(local, &mut out[..], system_op(op));
            out
        }
    }
}

#[cfg(feature = "mpi-support")]
pub use mpi_backend::MpiComm;

static GLOBAL_CONTROLLER: Lazy<RwLock<Arc<dyn Controller>>> =
    Lazy::new(|| RwLock::new(Arc::new(SelfComm)));

/// The process-wide default controller used when a reduction is called
/// without an explicit one. Serial unless replaced.
pub fn global_controller() -> Arc<dyn Controller> {
    GLOBAL_CONTROLLER.read().clone()
}

/// Replace the process-wide default controller.
pub fn set_global_controller(controller: Arc<dyn Controller>) {
    *GLOBAL_CONTROLLER.write() = controller;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn self_comm_is_identity() {
        let c = SelfComm;
        assert!(!c.is_parallel());
        assert_eq!(c.allreduce_f64(&[1.0, 2.0], ReduceOp::Sum), vec![1.0, 2.0]);
        assert_eq!(c.allreduce_i64(&[5], ReduceOp::Min), vec![5]);
    }

    #[test]
    fn local_group_sum_and_min() {
        let group = LocalComm::group(3);
        let handles: Vec<_> = group
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let r = c.rank() as f64;
                    let sum = c.allreduce_f64(&[r, 10.0], ReduceOp::Sum);
                    let min = c.allreduce_i64(&[c.rank() as i64 + 1], ReduceOp::Min);
                    (sum, min)
                })
            })
            .collect();
        for h in handles {
            let (sum, min) = h.join().unwrap();
            assert_eq!(sum, vec![3.0, 30.0]);
            assert_eq!(min, vec![1]);
        }
    }

    #[test]
    fn logical_and_requires_every_rank() {
        let group = LocalComm::group(2);
        let handles: Vec<_> = group
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let flag = if c.rank() == 0 { 1.0 } else { 0.0 };
                    c.allreduce_f64(&[flag], ReduceOp::LogicalAnd)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![0.0]);
        }
    }

    #[test]
    fn ragged_buffers_use_identity_padding() {
        let group = LocalComm::group(2);
        let handles: Vec<_> = group
            .into_iter()
            .map(|c| {
                thread::spawn(move || {
                    let buf = if c.rank() == 0 { vec![1.0, 2.0] } else { vec![5.0] };
                    c.allreduce_f64(&buf, ReduceOp::Max)
                })
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), vec![5.0, 2.0]);
        }
    }
}
