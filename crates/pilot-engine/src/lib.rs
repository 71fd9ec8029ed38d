//! Position lifecycle engine.
//!
//! The position manager is the state machine at the heart of the
//! executor: it opens, modifies, partially closes, and closes positions,
//! serializes all mutations per symbol, keeps the durable store and the
//! in-memory map in lock-step, and reconciles with the venue after
//! timeouts and restarts. The monitor loop drives exit rules from the
//! price cache on a fixed interval.

pub mod config;
pub mod error;
pub mod manager;
pub mod monitor;
pub mod sizer;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
pub use manager::{CloseOutcome, PositionManager, SymbolState};
pub use monitor::MonitorLoop;
pub use sizer::size_order;
