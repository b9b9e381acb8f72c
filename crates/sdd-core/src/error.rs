//! Error types for SDD Core
//!
//! Synchronous request/response calls return [`SddError`] directly. Failures
//! inside a running workflow never cross the async boundary as errors; they
//! arrive as `runFailed` / `runCanceled` events instead.

use sdd_ledger::LedgerError;

/// Result alias used across the crate
pub type SddResult<T> = Result<T, SddError>;

/// Main SDD error type
#[derive(Debug, thiserror::Error)]
pub enum SddError {
    /// Malformed event or request, rejected before any ledger write
    #[error("validation failed: {0}")]
    Validation(String),

    /// A second active run or workflow run was requested
    #[error("conflict: {0}")]
    Conflict(String),

    /// Unknown run id, path or feature
    #[error("not found: {0}")]
    NotFound(String),

    /// Ledger I/O failure or safe mode; the triggering action was not recorded
    #[error("ledger storage failure: {0}")]
    Storage(#[source] LedgerError),

    /// Step executor failed
    #[error("executor failed: {0}")]
    Executor(String),

    /// Operation was interrupted
    #[error("operation cancelled")]
    Cancelled,

    /// Operation is not valid in the run's current state
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// Configuration could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl SddError {
    /// Check if error is retryable
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Executor(_) | Self::Cancelled)
    }

    /// Storage failures disable further ledger writes
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Storage(_))
    }
}

impl From<LedgerError> for SddError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Validation(msg) => Self::Validation(msg),
            other => Self::Storage(other),
        }
    }
}
