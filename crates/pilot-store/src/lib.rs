//! Durable position store.
//!
//! Two logical tables back the position lifecycle:
//! - `positions_open`: current rows, keyed by symbol
//! - `positions_history`: append-only, keyed by `(symbol, position_id)`
//!
//! Writes commit before the in-memory transition is considered final
//! (commit-then-ack). A single-file SQLite database is sufficient.

pub mod error;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use store::{ClosedPosition, DailyRollup, HistoryQuery, PositionStore};
