//! Reporting.
//!
//! Read-only views over the position manager, the price cache, and the
//! store: open positions with live PnL, history windows, and daily
//! realized PnL with win rate. No mutation.

pub mod report;

pub use report::{DailyPnlReport, HistoryEntry, OpenPositionView, Reporter, StatusReport};
