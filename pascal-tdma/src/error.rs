use thiserror::Error;

use tdma_transport::TransportError;
use tdma_util::PartitionError;

/// Everything that can go wrong with a plan or a solve.
///
/// This mirrors the error kinds the design calls out: configuration problems are caught
/// before any communication is issued, numerical breakdown is reported but does not abort
/// the computation (the caller decides whether to trust the result), and transport failures
/// poison the plan -- it must be recreated, not reused, after one of those.
#[derive(Error, Debug)]
pub enum TdmaError {
    /// Bad partition, `n_row < 3`, or a shape mismatch between a solve call and the plan it
    /// was handed. Detected at plan creation or solve entry, before any communication.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A pivot magnitude fell below the numerical-breakdown threshold. The offending pivot
    /// was clamped to the threshold and computation continued; the caller may reject the
    /// result.
    #[error("numerical breakdown: pivot magnitude {magnitude:e} at row {row} is below the breakdown threshold {threshold:e}")]
    NumericalBreakdown { row: usize, magnitude: f64, threshold: f64 },

    /// The underlying collective reported a failure. The plan is poisoned and must be
    /// destroyed.
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

impl From<PartitionError> for TdmaError {
    fn from(e: PartitionError) -> Self {
        TdmaError::Configuration(e.to_string())
    }
}

pub type TdmaResult<T> = Result<T, TdmaError>;
