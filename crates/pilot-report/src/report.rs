//! Report assembly.

use chrono::{NaiveDate, Utc};
use pilot_core::{Direction, ExitReason, Position, Price, RuleSnapshot, Symbol};
use pilot_engine::PositionManager;
use pilot_feed::PriceCache;
use pilot_store::{HistoryQuery, PositionStore, StoreResult};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// One open position with its live mark and PnL.
#[derive(Debug, Clone, Serialize)]
pub struct OpenPositionView {
    pub symbol: Symbol,
    pub position_id: String,
    pub direction: Direction,
    pub entry_price: Price,
    pub quantity: i64,
    pub leverage: u32,
    pub entry_ts: i64,
    pub rules: RuleSnapshot,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mark_price: Option<Price>,
    /// Quote-unit PnL at the mark.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unrealized_pnl: Option<Decimal>,
    /// Unleveraged PnL fraction at the mark.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pnl_pct: Option<Decimal>,
    /// PnL fraction on posted margin (`pnl_pct * leverage`).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leveraged_pnl_pct: Option<Decimal>,
}

/// Snapshot for `/api/status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub position_count: usize,
    pub positions: Vec<OpenPositionView>,
}

/// One closed row for `/api/position_history`.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub symbol: Symbol,
    pub position_id: String,
    pub direction: Direction,
    pub entry_price: Price,
    pub exit_price: Option<Price>,
    pub quantity: i64,
    pub leverage: u32,
    pub entry_ts: i64,
    pub exit_ts: Option<i64>,
    pub realized_pnl: Option<Decimal>,
    pub pnl_pct: Option<Decimal>,
    pub exit_reason: ExitReason,
}

/// Aggregate for `/api/daily_pnl`.
#[derive(Debug, Clone, Serialize)]
pub struct DailyPnlReport {
    pub date: NaiveDate,
    pub realized_pnl: Decimal,
    pub closed_count: u32,
    pub wins: u32,
    pub losses: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub win_rate: Option<Decimal>,
}

/// Pure view over the store, the price cache, and the manager.
pub struct Reporter {
    manager: Arc<PositionManager>,
    store: PositionStore,
    prices: Arc<PriceCache>,
}

impl Reporter {
    pub fn new(
        manager: Arc<PositionManager>,
        store: PositionStore,
        prices: Arc<PriceCache>,
    ) -> Self {
        Self {
            manager,
            store,
            prices,
        }
    }

    fn view_of(&self, position: &Position, contract_size: Option<Decimal>) -> OpenPositionView {
        let mark = self.prices.get(&position.symbol).map(|t| t.price);
        let pnl_pct = mark.and_then(|m| position.unleveraged_pnl_pct(m));
        let unrealized = match (mark, contract_size) {
            (Some(m), Some(cs)) => {
                Some(position.realized_pnl_for(m, position.contracts(), cs))
            }
            _ => None,
        };

        OpenPositionView {
            symbol: position.symbol.clone(),
            position_id: position.position_id.clone(),
            direction: position.direction,
            entry_price: position.entry_price,
            quantity: position.quantity,
            leverage: position.leverage,
            entry_ts: position.entry_ts,
            rules: position.rules.clone(),
            mark_price: mark,
            unrealized_pnl: unrealized,
            pnl_pct,
            leveraged_pnl_pct: pnl_pct.map(|p| p * Decimal::from(position.leverage)),
        }
    }

    /// Open positions with live marks.
    pub async fn status(&self) -> StatusReport {
        let positions = self.manager.snapshot().await;
        let mut views = Vec::with_capacity(positions.len());
        for position in &positions {
            let contract_size = match self.manager.contract_spec(&position.symbol).await {
                Ok(spec) => Some(spec.contract_size),
                Err(e) => {
                    debug!(symbol = %position.symbol, error = %e, "No contract spec for view");
                    None
                }
            };
            views.push(self.view_of(position, contract_size));
        }
        StatusReport {
            position_count: views.len(),
            positions: views,
        }
    }

    /// Closed positions in a window, reverse-chronological.
    pub async fn history(&self, query: &HistoryQuery) -> StoreResult<Vec<HistoryEntry>> {
        let rows = self.store.query_history(query).await?;
        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                symbol: row.position.symbol,
                position_id: row.position.position_id,
                direction: row.position.direction,
                entry_price: row.position.entry_price,
                exit_price: row.position.exit_price,
                quantity: row.position.quantity,
                leverage: row.position.leverage,
                entry_ts: row.position.entry_ts,
                exit_ts: row.position.exit_ts,
                realized_pnl: row.position.realized_pnl,
                pnl_pct: row.position.pnl_pct,
                exit_reason: row.exit_reason,
            })
            .collect())
    }

    /// Realized PnL and win rate for one UTC day.
    pub async fn daily_pnl(&self, date: NaiveDate) -> StoreResult<DailyPnlReport> {
        let rollup = self.store.daily_rollup(date).await?;
        Ok(DailyPnlReport {
            date,
            realized_pnl: rollup.realized_pnl,
            closed_count: rollup.closed_count,
            wins: rollup.wins,
            losses: rollup.losses,
            win_rate: rollup.win_rate(),
        })
    }

    /// Today's PnL, UTC.
    pub async fn today_pnl(&self) -> StoreResult<DailyPnlReport> {
        self.daily_pnl(Utc::now().date_naive()).await
    }
}
