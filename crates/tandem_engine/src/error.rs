//! Error types for the reconciliation engine.

use tandem_core::{DiffError, PersistError, Side};
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur during a reconciliation round.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A snapshot source failed.
    #[error("{side} snapshot source failed: {message}")]
    Source {
        /// Side whose source failed.
        side: Side,
        /// Error message.
        message: String,
    },

    /// Diffing, batching or resolution failed.
    #[error("diff error: {0}")]
    Diff(#[from] DiffError),

    /// The state sink rejected a write.
    #[error(transparent)]
    Persist(#[from] PersistError),

    /// The round was cancelled.
    #[error("round cancelled")]
    Cancelled,

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl EngineError {
    /// Creates a source error.
    pub fn source(side: Side, message: impl Into<String>) -> Self {
        Self::Source {
            side,
            message: message.into(),
        }
    }

    /// Returns true if running the round again may succeed.
    ///
    /// Diff errors come from the snapshots themselves and repeat until the
    /// inputs change.
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Source { .. } | EngineError::Persist(_))
    }
}
