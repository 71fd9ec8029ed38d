//! Application error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Engine error: {0}")]
    Engine(#[from] pilot_engine::EngineError),

    #[error("Store error: {0}")]
    Store(#[from] pilot_store::StoreError),

    #[error("Telemetry error: {0}")]
    Telemetry(#[from] pilot_telemetry::TelemetryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type AppResult<T> = Result<T, AppError>;
