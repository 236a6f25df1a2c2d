use thiserror::Error;

/// Failures that can be reported by the message-passing substrate.
///
/// Per the design's error model, a `Transport` error is surfaced immediately and poisons
/// the owning plan: the plan must be destroyed and re-created rather than reused.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("underlying collective failed: {0}")]
    Collective(String),

    #[cfg(feature = "mpi-transport")]
    #[error("MPI error: {0}")]
    Mpi(String),
}
