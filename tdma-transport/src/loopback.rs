use std::sync::{Arc, Barrier, Mutex};

use crate::descriptor::{pack, unpack, Descriptor};
use crate::error::TransportError;
use crate::{Communicator, Completed, Request};

/// Shared state backing every rank handle of one [`LoopbackComm`] group.
///
/// Each collective is modelled as a two-phase rendezvous: every rank deposits its
/// contribution into a slot, all ranks cross a barrier, every rank reads out the slots it
/// needs, and a second barrier prevents the next collective from overwriting a slot before
/// the slowest reader has consumed it. `std::sync::Barrier` is reusable across phases, so one
/// instance serves the whole group's lifetime as long as every rank calls the same sequence
/// of collectives in the same order -- exactly the compatibility contract the caller already
/// owes a real communicator.
struct LoopbackState {
    size: usize,
    barrier: Barrier,
    f64_slots: Mutex<Vec<Vec<f64>>>,
    usize_slots: Mutex<Vec<usize>>,
    alltoall_slots: Mutex<Vec<Vec<Vec<f64>>>>,
}

impl LoopbackState {
    fn new(size: usize) -> Self {
        LoopbackState {
            size,
            barrier: Barrier::new(size),
            f64_slots: Mutex::new(vec![Vec::new(); size]),
            usize_slots: Mutex::new(vec![0; size]),
            alltoall_slots: Mutex::new(vec![vec![Vec::new(); size]; size]),
        }
    }

    fn round_f64(&self, rank: usize, payload: Vec<f64>) -> Vec<Vec<f64>> {
        self.f64_slots.lock().unwrap()[rank] = payload;
        self.barrier.wait();
        let snapshot = self.f64_slots.lock().unwrap().clone();
        self.barrier.wait();
        snapshot
    }

    fn round_usize(&self, rank: usize, payload: usize) -> Vec<usize> {
        self.usize_slots.lock().unwrap()[rank] = payload;
        self.barrier.wait();
        let snapshot = self.usize_slots.lock().unwrap().clone();
        self.barrier.wait();
        snapshot
    }
}

/// An in-process SPMD communicator: `size` rank handles sharing one [`LoopbackState`] over
/// plain threads instead of separate OS processes. Every collective executes eagerly and
/// synchronously, so the `Request` handles this backend returns are always already complete;
/// there is no overlap between the four per-stream exchanges the design allows for. That is
/// a documented simplification (see crate-level docs), not a correctness gap: the design
/// explicitly forbids assuming overlap happens.
///
/// Good for exercising the solver end to end in a single test binary, and for the `P == 1`
/// degenerate path, which never touches the transport at all.
#[derive(Clone)]
pub struct LoopbackComm {
    rank: usize,
    state: Arc<LoopbackState>,
}

impl LoopbackComm {
    /// Builds one handle per rank of a `size`-process loopback group.
    pub fn group(size: usize) -> Vec<LoopbackComm> {
        let state = Arc::new(LoopbackState::new(size));
        (0..size)
            .map(|rank| LoopbackComm { rank, state: state.clone() })
            .collect()
    }
}

impl Communicator for LoopbackComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.state.size
    }

    fn all_gather_usize(&self, value: usize) -> Result<Vec<usize>, TransportError> {
        Ok(self.state.round_usize(self.rank, value))
    }

    fn igather_f64(
        &self,
        root: usize,
        send: &[f64],
    ) -> Box<dyn Request<Option<Vec<f64>>>> {
        let all = self.state.round_f64(self.rank, send.to_vec());
        let result = if self.rank == root {
            Some(all.into_iter().flatten().collect())
        } else {
            None
        };
        Box::new(Completed::new(result))
    }

    fn iscatter_f64(
        &self,
        root: usize,
        send: Option<&[f64]>,
        recv_count: usize,
    ) -> Box<dyn Request<Vec<f64>>> {
        let payload = send.map(<[f64]>::to_vec).unwrap_or_default();
        let all = self.state.round_f64(self.rank, payload);
        let start = self.rank * recv_count;
        let mine = all[root][start..start + recv_count].to_vec();
        Box::new(Completed::new(mine))
    }

    fn ialltoall_descriptors_f64(
        &self,
        local: &[f64],
        send_descriptors: &[Descriptor],
        recv_len: usize,
        recv_descriptors: &[Descriptor],
    ) -> Box<dyn Request<Vec<f64>>> {
        let p = self.size();
        debug_assert_eq!(send_descriptors.len(), p);
        debug_assert_eq!(recv_descriptors.len(), p);

        {
            let mut slots = self.state.alltoall_slots.lock().unwrap();
            for (peer, desc) in send_descriptors.iter().enumerate() {
                slots[self.rank][peer] = pack(local, desc);
            }
        }
        self.state.barrier.wait();

        let mut out = vec![0.0; recv_len];
        {
            let slots = self.state.alltoall_slots.lock().unwrap();
            for (source, desc) in recv_descriptors.iter().enumerate() {
                let staged = &slots[source][self.rank];
                unpack(staged, &mut out, desc);
            }
        }
        self.state.barrier.wait();

        Box::new(Completed::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gather_then_scatter_round_trips() {
        let group = LoopbackComm::group(4);
        std::thread::scope(|scope| {
            for comm in &group {
                scope.spawn(move || {
                    let boundary = [comm.rank() as f64, comm.rank() as f64 + 0.5];
                    let gathered = comm.igather_f64(0, &boundary).wait().unwrap();
                    if comm.rank() == 0 {
                        let gathered = gathered.unwrap();
                        assert_eq!(gathered.len(), 8);
                        for r in 0..4 {
                            assert_eq!(gathered[2 * r], r as f64);
                            assert_eq!(gathered[2 * r + 1], r as f64 + 0.5);
                        }
                    } else {
                        assert!(gathered.is_none());
                    }

                    // Root now "solves" and scatters the doubled values back out.
                    let send = if comm.rank() == 0 {
                        Some(vec![0.0; 8].iter().enumerate().map(|(i, _)| i as f64 * 10.0).collect::<Vec<_>>())
                    } else {
                        None
                    };
                    let mine = comm
                        .iscatter_f64(0, send.as_deref(), 2)
                        .wait()
                        .unwrap();
                    assert_eq!(mine, vec![comm.rank() as f64 * 20.0, comm.rank() as f64 * 20.0 + 10.0]);
                });
            }
        });
    }

    #[test]
    fn all_to_all_descriptors_transposes_block() {
        // 3 ranks, each locally holding a (2, 2) boundary array (n_sys=2, 2 columns).
        // Rank 0 owns reduced system 0, ranks 1 and 2 jointly own reduced system 1
        // (n_sys_rt = [1, 1] is not exact but exercises an uneven split: [2, 0]).
        let n_sys = 2usize;
        let p = 3usize;
        let group = LoopbackComm::group(p);
        let n_sys_rt = [2usize, 0, 0]; // rank 0 owns both systems; ranks 1,2 own none.

        std::thread::scope(|scope| {
            for comm in &group {
                let n_sys_rt = n_sys_rt;
                scope.spawn(move || {
                    let local: Vec<f64> = (0..n_sys * 2)
                        .map(|i| (comm.rank() * 100 + i) as f64)
                        .collect();

                    let mut offset = 0usize;
                    let send_descs: Vec<Descriptor> = (0..p)
                        .map(|k| {
                            let d = Descriptor::new(offset * 2, n_sys_rt[k], 2, 2);
                            offset += n_sys_rt[k];
                            d
                        })
                        .collect();
                    let my_count = n_sys_rt[comm.rank()];
                    let recv_descs: Vec<Descriptor> = (0..p)
                        .map(|src| Descriptor::new(2 * src, my_count, 2, 2 * p))
                        .collect();

                    let transposed = comm
                        .ialltoall_descriptors_f64(&local, &send_descs, my_count * 2 * p, &recv_descs)
                        .wait()
                        .unwrap();

                    if comm.rank() == 0 {
                        assert_eq!(transposed.len(), 2 * 2 * p);
                        // Row 0, columns [0,2) came from rank 0's first system.
                        assert_eq!(&transposed[0..2], &local[0..2]);
                        // Row 1 columns [0,2) came from rank 0's second system.
                        assert_eq!(&transposed[2 * p..2 * p + 2], &local[2..4]);
                    } else {
                        assert!(transposed.is_empty());
                    }
                });
            }
        });
    }
}
