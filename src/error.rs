//! Error taxonomy for lineup optimization.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, OptimizeError>;

/// Failures surfaced to callers of the optimizer.
///
/// Sparse or missing history is never an error; it is absorbed by baseline
/// fallback while the scoring matrix is built.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptimizeError {
    /// Wrong cardinality, duplicate identifiers, unknown format or an
    /// inverted season range. Never retried.
    #[error("Invalid input: {0}")]
    ContractViolation(String),

    /// The stats resolver itself failed (as opposed to reporting no data).
    #[error("Stats resolver failed: {0}")]
    UpstreamDataFailure(String),
}

impl OptimizeError {
    pub fn upstream(err: anyhow::Error) -> Self {
        OptimizeError::UpstreamDataFailure(format!("{err:#}"))
    }

    pub fn is_contract_violation(&self) -> bool {
        matches!(self, OptimizeError::ContractViolation(_))
    }
}
