//! Adapter error types.

use thiserror::Error;

/// Errors surfaced by an exchange adapter.
#[derive(Debug, Clone, Error)]
pub enum AdapterError {
    /// The call did not complete within its bounded timeout.
    #[error("Adapter call timed out")]
    Timeout,

    /// The venue rejected the request (terminal for this attempt).
    #[error("Exchange rejected request: {0}")]
    Rejected(String),

    /// Transport-level failure; retryable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The instrument is not known to the venue.
    #[error("Unknown instrument: {0}")]
    UnknownSymbol(String),
}

impl AdapterError {
    /// Whether a bounded local retry is worthwhile.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout | Self::Transport(_))
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;
