//! HTTP server implementation using axum.

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use chrono::NaiveDate;
use pilot_core::{Symbol, TradeSignal};
use pilot_report::Reporter;
use pilot_router::{SignalResponse, SignalRouter};
use pilot_store::HistoryQuery;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
        }
    }
}

/// Shared application state for axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub router: Arc<SignalRouter>,
    pub reporter: Arc<Reporter>,
}

/// Create the axum router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/api/trigger", post(trigger))
        .route("/api/close_all", post(close_all))
        .route("/api/status", get(status))
        .route("/api/position_history", get(position_history))
        .route("/api/daily_pnl", get(daily_pnl))
        .with_state(state)
}

async fn trigger(
    State(state): State<AppState>,
    Json(signal): Json<TradeSignal>,
) -> Json<SignalResponse> {
    Json(state.router.dispatch(signal).await)
}

async fn close_all(State(state): State<AppState>) -> Json<SignalResponse> {
    Json(state.router.close_all().await)
}

async fn status(State(state): State<AppState>) -> Json<SignalResponse> {
    let report = state.reporter.status().await;
    let count = report.position_count;
    Json(SignalResponse::ok_with(
        format!("{count} open positions"),
        serde_json::json!(report),
    ))
}

/// History window query parameters, ISO dates.
#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub symbol: Option<String>,
    pub limit: Option<u32>,
}

impl HistoryParams {
    /// Convert to a store query; the end date is inclusive.
    fn to_query(&self) -> HistoryQuery {
        let day_start_ms = |d: NaiveDate| {
            d.and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis())
        };
        HistoryQuery {
            symbol: self.symbol.clone().map(Symbol::new),
            start_ms: self.start_date.and_then(day_start_ms),
            end_ms: self
                .end_date
                .and_then(|d| d.succ_opt())
                .and_then(day_start_ms),
            limit: self.limit,
        }
    }
}

async fn position_history(
    State(state): State<AppState>,
    Query(params): Query<HistoryParams>,
) -> (StatusCode, Json<SignalResponse>) {
    match state.reporter.history(&params.to_query()).await {
        Ok(entries) => (
            StatusCode::OK,
            Json(SignalResponse::ok_with(
                format!("{} closed positions", entries.len()),
                serde_json::json!(entries),
            )),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SignalResponse::fail(format!("history query failed: {e}"))),
        ),
    }
}

async fn daily_pnl(State(state): State<AppState>) -> (StatusCode, Json<SignalResponse>) {
    match state.reporter.today_pnl().await {
        Ok(report) => (
            StatusCode::OK,
            Json(SignalResponse::ok_with(
                format!("realized {} over {} closes", report.realized_pnl, report.closed_count),
                serde_json::json!(report),
            )),
        ),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(SignalResponse::fail(format!("daily pnl failed: {e}"))),
        ),
    }
}

/// Bind and serve until the task is cancelled.
pub async fn run_server(state: AppState, config: ServerConfig) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(port = config.port, "Starting HTTP API server");

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await
}
