//! Real-transport [`Communicator`] backed by [`mpi`] (rsmpi), gated behind `mpi-transport`.
//!
//! rsmpi's safe API does not expose non-blocking variants of gather/scatter/all-to-all-varcount,
//! so each call here issues the blocking collective immediately and wraps the result in a
//! [`Completed`] handle -- the same eager model [`crate::loopback::LoopbackComm`] uses. The
//! `join4`/`Request` shape at the call site is unchanged either way, which is the point: the
//! rest of `pascal-tdma` does not need to know which backend it is talking to.

use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::*;

use crate::{Communicator, Completed, Descriptor, Request, TransportError};

/// Wraps an already-initialized MPI communicator (typically `universe.world()`, or a
/// sub-communicator built by a Cartesian-topology helper upstream of this crate).
pub struct MpiComm {
    world: SimpleCommunicator,
}

impl MpiComm {
    pub fn new(world: SimpleCommunicator) -> Self {
        MpiComm { world }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_gather_usize(&self, value: usize) -> Result<Vec<usize>, TransportError> {
        let send = value as u64;
        let mut recv = vec![0u64; self.size()];
        self.world.all_gather_into(&send, &mut recv[..]);
        Ok(recv.into_iter().map(|v| v as usize).collect())
    }

    fn igather_f64(&self, root: usize, send: &[f64]) -> Box<dyn Request<Option<Vec<f64>>>> {
        let root_process = self.world.process_at_rank(root as i32);
        let result = if self.rank() == root {
            let mut recv = vec![0.0f64; send.len() * self.size()];
            root_process.gather_into_root(send, &mut recv[..]);
            Some(recv)
        } else {
            root_process.gather_into(send);
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
        let root_process = self.world.process_at_rank(root as i32);
        let mut recv = vec![0.0f64; recv_count];
        if self.rank() == root {
            let send = send.expect("root must supply data to scatter");
            root_process.scatter_into_root(send, &mut recv[..]);
        } else {
            root_process.scatter_into(&mut recv[..]);
        }
        Box::new(Completed::new(recv))
    }

    fn ialltoall_descriptors_f64(
        &self,
        local: &[f64],
        send_descriptors: &[Descriptor],
        recv_len: usize,
        recv_descriptors: &[Descriptor],
    ) -> Box<dyn Request<Vec<f64>>> {
        let p = self.size();
        log::trace!(
            "rank {} issuing block-transpose all-to-all: {} peers, {} elements sent",
            self.rank(),
            p,
            local.len()
        );

        // Pack each peer's tile into a contiguous send buffer and record its placement.
        let mut send_buf = Vec::with_capacity(send_descriptors.iter().map(Descriptor::len).sum());
        let mut send_counts = vec![0i32; p];
        let mut send_displs = vec![0i32; p];
        for (peer, desc) in send_descriptors.iter().enumerate() {
            send_displs[peer] = send_buf.len() as i32;
            send_buf.extend(crate::pack(local, desc));
            send_counts[peer] = desc.len() as i32;
        }

        let mut recv_counts = vec![0i32; p];
        let mut recv_displs = vec![0i32; p];
        let mut running = 0i32;
        for (peer, desc) in recv_descriptors.iter().enumerate() {
            recv_displs[peer] = running;
            recv_counts[peer] = desc.len() as i32;
            running += desc.len() as i32;
        }
        let mut recv_buf = vec![0.0f64; running as usize];

        let send_partition = Partition::new(&send_buf[..], send_counts, send_displs);
        let mut recv_partition = PartitionMut::new(&mut recv_buf[..], recv_counts, recv_displs);
        self.world
            .all_to_all_varcount_into(&send_partition, &mut recv_partition);

        // Each received segment is still laid out contiguously per source rank; scatter it
        // into the caller's transposed buffer via the receive descriptors.
        let mut out = vec![0.0; recv_len];
        let mut cursor = 0usize;
        for desc in recv_descriptors {
            let staged = &recv_buf[cursor..cursor + desc.len()];
            crate::unpack(staged, &mut out, desc);
            cursor += desc.len();
        }

        Box::new(Completed::new(out))
    }
}
