//! Core domain types for the pilot trading executor.
//!
//! This crate provides the fundamental types used throughout the system:
//! - `Symbol`: instrument identifier (e.g. "BTC-USDT-SWAP")
//! - `Price`: precision-safe decimal price
//! - `ContractSpec`: per-instrument contract attributes
//! - `TradeSignal`: the canonical signal produced by strategy adapters
//! - `Position`: the position entity with its frozen rule snapshot

pub mod decimal;
pub mod error;
pub mod position;
pub mod signal;
pub mod symbol;

pub use decimal::Price;
pub use error::{CoreError, Result};
pub use position::{ExitReason, LadderRules, Position, PositionStatus, RuleSnapshot};
pub use signal::{
    Direction, LadderConfig, RequestId, RuleOverrides, SignalAction, TradeSignal, UnitType,
};
pub use symbol::{ContractSpec, Symbol};
