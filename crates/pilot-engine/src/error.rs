//! Engine error types.

use pilot_core::Symbol;
use pilot_exchange::AdapterError;
use pilot_store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Invalid signal: {0}")]
    InvalidSignal(String),

    #[error("Position already exists for {0}")]
    PositionExists(Symbol),

    #[error("No open position for {0}")]
    NoSuchPosition(Symbol),

    #[error("{0} is reconciling with the exchange")]
    Reconciling(Symbol),

    #[error("Order size {computed} below minimum {min}")]
    SizeTooSmall { computed: i64, min: i64 },

    #[error("No usable price for {0}")]
    PriceUnavailable(Symbol),

    #[error("Adapter call timed out")]
    AdapterTimeout,

    #[error("Adapter error: {0}")]
    Adapter(AdapterError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl From<AdapterError> for EngineError {
    fn from(e: AdapterError) -> Self {
        match e {
            AdapterError::Timeout => Self::AdapterTimeout,
            other => Self::Adapter(other),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
