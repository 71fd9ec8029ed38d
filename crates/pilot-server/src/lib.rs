//! HTTP API surface.
//!
//! Exposes the signal router and the reporter over axum:
//! - `POST /api/trigger`: canonical `TradeSignal`
//! - `POST /api/close_all`: close every open position
//! - `GET /api/status`: open positions with live PnL
//! - `GET /api/position_history`: ISO-date history window
//! - `GET /api/daily_pnl`: today's realized PnL and win rate

pub mod server;

pub use server::{create_router, run_server, AppState, ServerConfig};
