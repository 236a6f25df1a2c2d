//! Distributed-memory tridiagonal solver: a modified-Thomas parallel reduction plus a small
//! reduced-system exchange, instead of a full parallel elimination.
//!
//! Each rank holds a contiguous row-slice of one or more independent tridiagonal systems. A
//! [`plan::PlanSingle`] or [`plan::PlanMany`] is created once against a
//! [`tdma_transport::Communicator`] and reused across solves:
//!
//! 1. [`reduce::modified_thomas_reduce`] eliminates every local row except the first and last,
//!    leaving each in terms of the rank's own two boundary unknowns.
//! 2. The boundary rows of every rank are assembled into one small reduced tridiagonal system
//!    -- gathered to one rank for a single system, or block-transposed so each rank owns a
//!    contiguous share of the reduced systems for a batch ([`solve`]).
//! 3. The reduced system is solved directly ([`thomas`]).
//! 4. The reduced solution is distributed back and [`reduce::back_substitute`] recovers every
//!    local interior unknown.
//!
//! `P == 1` bypasses all of this and calls the serial kernels directly, so a single-rank run
//! matches the non-distributed solver bit-for-bit (see the `degenerate_single_rank_is_bit_exact`
//! test in `tests/`).

pub mod error;
pub mod plan;
pub mod reduce;
pub mod solve;
pub mod thomas;

pub use error::{TdmaError, TdmaResult};
pub use plan::{PlanMany, PlanSingle};
pub use reduce::{back_substitute, back_substitute_batch, boundary_rows, modified_thomas_reduce, modified_thomas_reduce_batch, BoundaryRow};
pub use solve::{solve_many, solve_many_cyclic, solve_single, solve_single_cyclic};
pub use thomas::{cyclic_thomas, cyclic_thomas_batch, thomas, thomas_batch, DEFAULT_PIVOT_EPSILON};

pub use tdma_transport::{loopback::LoopbackComm, Communicator};
#[cfg(feature = "mpi-transport")]
pub use tdma_transport::mpi_backend::MpiComm;
pub use tdma_util::{partition, PartitionError};
