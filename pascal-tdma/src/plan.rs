//! Plan lifecycle: the cached, communicator-bound state that lets many solves reuse one set
//! of descriptors and scratch buffers instead of re-deriving them on every call.
//!
//! A plan is immutable for its lifetime except for its own scratch buffers, which a solve call
//! is free to overwrite. Creating and destroying a plan are collective operations: every rank
//! in `comm` must call them, in the same order, or the group deadlocks (see the concurrency
//! notes in `tdma_transport`).

use tdma_transport::{Communicator, Descriptor};
use tdma_util::partition;

use crate::error::{TdmaError, TdmaResult};

/// Plan for a single global tridiagonal system split `(n_row,)` per rank.
///
/// Unlike [`PlanMany`], a single-system plan does not pin down `n_row`: the boundary summary
/// it gathers is always two rows regardless of how long each rank's local block is, so the
/// same plan can be reused across solves of differing local length as long as `rank`/`P`
/// stay fixed to the communicator it was built from.
pub struct PlanSingle<C: Communicator> {
    comm: C,
    rank: usize,
    p: usize,
    gather_rank: usize,
    // Scratch for the gathered reduced system, reused across solves to avoid reallocating on
    // every call. Only meaningful on `gather_rank`; other ranks leave it empty.
    reduced_a: Vec<f64>,
    reduced_b: Vec<f64>,
    reduced_c: Vec<f64>,
    reduced_d: Vec<f64>,
}

impl<C: Communicator> PlanSingle<C> {
    pub fn create(comm: C, gather_rank: usize) -> TdmaResult<Self> {
        let rank = comm.rank();
        let p = comm.size();
        if gather_rank >= p {
            return Err(TdmaError::Configuration(format!(
                "gather_rank {gather_rank} is out of range for a {p}-rank communicator"
            )));
        }
        let reduced_len = if rank == gather_rank { 2 * p } else { 0 };
        Ok(PlanSingle {
            comm,
            rank,
            p,
            gather_rank,
            reduced_a: vec![0.0; reduced_len],
            reduced_b: vec![0.0; reduced_len],
            reduced_c: vec![0.0; reduced_len],
            reduced_d: vec![0.0; reduced_len],
        })
    }

    /// Collective. After this call the plan must not be solved again.
    pub fn destroy(self) {}

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn p(&self) -> usize {
        self.p
    }

    pub fn gather_rank(&self) -> usize {
        self.gather_rank
    }

    pub fn is_gather_rank(&self) -> bool {
        self.rank == self.gather_rank
    }

    pub(crate) fn reduced_scratch_mut(
        &mut self,
    ) -> (&mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>) {
        (
            &mut self.reduced_a,
            &mut self.reduced_b,
            &mut self.reduced_c,
            &mut self.reduced_d,
        )
    }
}

/// Plan for a batch of `n_sys` independent tridiagonal systems, each split `(n_row,)` per rank
/// along the (rank-local) solving axis. Every rank holds the full `n_sys` batch but only its
/// own row-slice; the block transpose reassigns per-system *ownership* of the reduced rows to
/// ranks via [`tdma_util::partition`], not the row-slice itself.
pub struct PlanMany<C: Communicator> {
    comm: C,
    rank: usize,
    p: usize,
    n_sys: usize,
    n_row: usize,
    /// How many reduced systems each rank owns post-transpose; `n_sys_rt[rank]` is this
    /// rank's own share.
    n_sys_rt: Vec<usize>,
    /// First owned-system index for each rank, i.e. the exclusive prefix sum of `n_sys_rt`.
    offsets: Vec<usize>,
    send_descriptors: Vec<Descriptor>,
    recv_descriptors: Vec<Descriptor>,
    // Local (n_sys, 2) boundary scratch, one stream per coefficient.
    local_a: Vec<f64>,
    local_b: Vec<f64>,
    local_c: Vec<f64>,
    local_d: Vec<f64>,
    // Transposed (n_sys_rt_own, 2*P) reduced-system scratch.
    transposed_a: Vec<f64>,
    transposed_b: Vec<f64>,
    transposed_c: Vec<f64>,
    transposed_d: Vec<f64>,
}

impl<C: Communicator> PlanMany<C> {
    pub fn create(comm: C, n_sys: usize, n_row: usize) -> TdmaResult<Self> {
        let rank = comm.rank();
        let p = comm.size();
        if n_row < 3 {
            return Err(TdmaError::Configuration(format!(
                "many-system plan requires n_row >= 3, got {n_row}"
            )));
        }

        let gathered_n_sys = comm.all_gather_usize(n_sys)?;
        if gathered_n_sys.iter().any(|&v| v != n_sys) {
            return Err(TdmaError::Configuration(format!(
                "ranks disagree on n_sys: {gathered_n_sys:?}"
            )));
        }

        let n_sys_rt: Vec<usize> = if p == 1 {
            vec![n_sys]
        } else {
            (0..p)
                .map(|r| partition(n_sys, p, r).map(|range| range.len()))
                .collect::<Result<_, _>>()?
        };
        let mut offsets = vec![0usize; p];
        for r in 1..p {
            offsets[r] = offsets[r - 1] + n_sys_rt[r - 1];
        }

        let my_n_sys_rt = n_sys_rt[rank];

        let mut send_descriptors = Vec::with_capacity(p);
        for k in 0..p {
            send_descriptors.push(Descriptor::new(offsets[k] * 2, n_sys_rt[k], 2, 2));
        }
        let mut recv_descriptors = Vec::with_capacity(p);
        for src in 0..p {
            recv_descriptors.push(Descriptor::new(2 * src, my_n_sys_rt, 2, 2 * p));
        }

        let local_len = n_sys * 2;
        let transposed_len = my_n_sys_rt * 2 * p;

        Ok(PlanMany {
            comm,
            rank,
            p,
            n_sys,
            n_row,
            n_sys_rt,
            offsets,
            send_descriptors,
            recv_descriptors,
            local_a: vec![0.0; local_len],
            local_b: vec![0.0; local_len],
            local_c: vec![0.0; local_len],
            local_d: vec![0.0; local_len],
            transposed_a: vec![0.0; transposed_len],
            transposed_b: vec![0.0; transposed_len],
            transposed_c: vec![0.0; transposed_len],
            transposed_d: vec![0.0; transposed_len],
        })
    }

    /// Collective. After this call the plan must not be solved again.
    pub fn destroy(self) {}

    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn p(&self) -> usize {
        self.p
    }

    pub fn n_sys(&self) -> usize {
        self.n_sys
    }

    pub fn n_row(&self) -> usize {
        self.n_row
    }

    pub fn my_n_sys_rt(&self) -> usize {
        self.n_sys_rt[self.rank]
    }

    pub fn send_descriptors(&self) -> &[Descriptor] {
        &self.send_descriptors
    }

    pub fn recv_descriptors(&self) -> &[Descriptor] {
        &self.recv_descriptors
    }

    pub(crate) fn local_scratch_mut(
        &mut self,
    ) -> (&mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>) {
        (&mut self.local_a, &mut self.local_b, &mut self.local_c, &mut self.local_d)
    }

    pub(crate) fn transposed_scratch_mut(
        &mut self,
    ) -> (&mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>) {
        (
            &mut self.transposed_a,
            &mut self.transposed_b,
            &mut self.transposed_c,
            &mut self.transposed_d,
        )
    }

    /// Splits the communicator and the local-boundary scratch out of the same `&mut self`
    /// borrow, so a solve can issue a collective that reads/writes scratch without two
    /// separate whole-plan borrows fighting each other.
    pub(crate) fn comm_and_local_mut(
        &mut self,
    ) -> (&C, &mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>) {
        (&self.comm, &mut self.local_a, &mut self.local_b, &mut self.local_c, &mut self.local_d)
    }

    /// Same idea as [`PlanMany::comm_and_local_mut`], for the transposed reduced-system
    /// scratch.
    pub(crate) fn comm_and_transposed_mut(
        &mut self,
    ) -> (&C, &mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>, &mut Vec<f64>) {
        (
            &self.comm,
            &mut self.transposed_a,
            &mut self.transposed_b,
            &mut self.transposed_c,
            &mut self.transposed_d,
        )
    }
}
