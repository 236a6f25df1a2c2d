//! Communicator abstraction for `pascal-tdma`.
//!
//! The solver's only boundary with the outside world is a message-passing substrate: a
//! non-blocking gather/scatter for single-system solves, and a non-blocking all-to-all driven
//! by typed [`Descriptor`]s for many-systems solves, plus an all-gather of one integer during
//! plan creation. This crate names that boundary as the [`Communicator`] trait so the rest of
//! `pascal-tdma` never depends on a concrete transport.
//!
//! Two backends are provided:
//! - [`loopback::LoopbackComm`], always available, simulates an SPMD group with OS threads and
//!   shared memory. It is enough to exercise every code path (including ranks > 1) from a
//!   single test binary.
//! - [`mpi_backend::MpiComm`], behind the `mpi-transport` feature, wraps a real MPI
//!   installation via the `mpi` crate for actual distributed-memory runs.
//!
//! Both backends execute every collective eagerly: the `Request` objects they return are
//! already complete by the time `wait` is called. The two-phase "issue four, wait once"
//! shape from the design is preserved at the API level (see [`join4`]) as a structural model
//! of the protocol; true overlap between the four per-stream exchanges is an optimization the
//! design explicitly does not require for correctness, and this port does not attempt it.

mod descriptor;
mod error;
pub mod loopback;
#[cfg(feature = "mpi-transport")]
pub mod mpi_backend;

pub use descriptor::{copy_tile, pack, unpack, Descriptor};
pub use error::TransportError;

/// A completed or in-flight result of a non-blocking collective.
///
/// `T` is a plain type parameter rather than an associated type so that `Box<dyn
/// Request<T>>` is object-safe and [`Communicator`] can be stored behind a trait object too.
pub trait Request<T> {
    fn wait(self: Box<Self>) -> Result<T, TransportError>;
}

/// A [`Request`] that is already resolved. Both backends in this crate execute collectives
/// eagerly, so every `Request` they hand back is one of these.
pub struct Completed<T>(T);

impl<T> Completed<T> {
    pub fn new(value: T) -> Self {
        Completed(value)
    }
}

impl<T> Request<T> for Completed<T> {
    fn wait(self: Box<Self>) -> Result<T, TransportError> {
        Ok(self.0)
    }
}

/// The message-passing substrate a plan is bound to.
///
/// Implementors must treat every method as a collective: all member ranks must call it, in
/// the same order, or the group deadlocks (per the design's concurrency model, recovering
/// from a partial collective is out of scope).
pub trait Communicator: Send + Sync {
    fn rank(&self) -> usize;
    fn size(&self) -> usize;

    /// All-gathers one `usize` per rank. Used once, at many-systems plan creation, to learn
    /// every peer's transposed system count.
    fn all_gather_usize(&self, value: usize) -> Result<Vec<usize>, TransportError>;

    /// Gathers `send` from every rank into rank-major order at `root`. Non-root ranks get
    /// back `None`.
    fn igather_f64(&self, root: usize, send: &[f64]) -> Box<dyn Request<Option<Vec<f64>>>>;

    /// Inverse of [`Communicator::igather_f64`]: `root` supplies the full rank-major buffer
    /// (ignored on non-root ranks, which should pass `None`), every rank gets back its
    /// `recv_count`-sized share.
    fn iscatter_f64(
        &self,
        root: usize,
        send: Option<&[f64]>,
        recv_count: usize,
    ) -> Box<dyn Request<Vec<f64>>>;

    /// All-to-all exchange driven by typed descriptors. `send_descriptors[k]` names the tile
    /// of `local` destined for peer `k`; `recv_descriptors[k]` names where peer `k`'s
    /// contribution lands in the returned buffer of length `recv_len`.
    fn ialltoall_descriptors_f64(
        &self,
        local: &[f64],
        send_descriptors: &[Descriptor],
        recv_len: usize,
        recv_descriptors: &[Descriptor],
    ) -> Box<dyn Request<Vec<f64>>>;
}

/// Joins four non-blocking handles with a single wait, matching the design's "four streams
/// issued concurrently, joined by one wait" shape for the `A`, `B`, `C`, `D` coefficient
/// exchanges. No partial-completion state is exposed: either all four resolve or the first
/// error encountered is returned.
pub fn join4<A, B, C, D>(
    a: Box<dyn Request<A>>,
    b: Box<dyn Request<B>>,
    c: Box<dyn Request<C>>,
    d: Box<dyn Request<D>>,
) -> Result<(A, B, C, D), TransportError> {
    Ok((a.wait()?, b.wait()?, c.wait()?, d.wait()?))
}
