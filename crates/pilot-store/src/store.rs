//! SQLite-backed position store.
//!
//! Decimals are stored as TEXT to stay exact; timestamps as unix
//! milliseconds. Writers to the same key are serialized by SQLite;
//! every mutation commits before the caller proceeds.

use crate::error::{StoreError, StoreResult};
use chrono::NaiveDate;
use pilot_core::{
    Direction, ExitReason, LadderRules, Position, PositionStatus, Price, RuleSnapshot, Symbol,
};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

/// A closed position together with why it was closed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClosedPosition {
    pub position: Position,
    pub exit_reason: ExitReason,
}

/// History query window.
#[derive(Debug, Clone, Default)]
pub struct HistoryQuery {
    pub symbol: Option<Symbol>,
    /// Inclusive lower bound on exit_ts, unix ms.
    pub start_ms: Option<i64>,
    /// Exclusive upper bound on exit_ts, unix ms.
    pub end_ms: Option<i64>,
    pub limit: Option<u32>,
}

/// Aggregate over the closed rows of one UTC day.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DailyRollup {
    pub realized_pnl: Decimal,
    pub closed_count: u32,
    pub wins: u32,
    pub losses: u32,
}

impl DailyRollup {
    /// Fraction of closed positions with positive realized PnL.
    pub fn win_rate(&self) -> Option<Decimal> {
        if self.closed_count == 0 {
            return None;
        }
        Some(Decimal::from(self.wins) / Decimal::from(self.closed_count))
    }
}

/// Durable store over a single SQLite file.
#[derive(Clone)]
pub struct PositionStore {
    pool: SqlitePool,
}

impl PositionStore {
    /// Connect and run migrations.
    ///
    /// `database_url` is e.g. `sqlite://data/pilot.db` or `sqlite::memory:`.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        info!(url = %database_url, "Initializing position store");

        if let Some(db_path) = database_url.strip_prefix("sqlite://") {
            if let Some(parent) = Path::new(db_path).parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StoreError::Corrupt(format!("cannot create data dir: {e}")))?;
            }
        }

        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        // An in-memory database is per-connection; a second pooled
        // connection would see no tables.
        let max_connections = if database_url.contains(":memory:") { 1 } else { 5 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.run_migrations().await?;
        Ok(store)
    }

    async fn run_migrations(&self) -> StoreResult<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions_open (
                symbol TEXT PRIMARY KEY,
                position_id TEXT NOT NULL,
                direction TEXT NOT NULL CHECK(direction IN ('long', 'short')),
                entry_price TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                leverage INTEGER NOT NULL,
                entry_ts INTEGER NOT NULL,
                tp_pct TEXT NOT NULL,
                sl_pct TEXT NOT NULL,
                trailing_enabled INTEGER NOT NULL,
                trailing_distance TEXT NOT NULL,
                ladder_step_pct TEXT,
                ladder_close_pct TEXT,
                max_hold_secs INTEGER,
                high_watermark TEXT NOT NULL,
                low_watermark TEXT NOT NULL,
                ladder_tier_hit INTEGER NOT NULL,
                ladder_closed_fraction TEXT NOT NULL,
                status TEXT NOT NULL CHECK(status IN ('open', 'reconciling'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS positions_history (
                symbol TEXT NOT NULL,
                position_id TEXT NOT NULL,
                direction TEXT NOT NULL,
                entry_price TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                leverage INTEGER NOT NULL,
                entry_ts INTEGER NOT NULL,
                tp_pct TEXT NOT NULL,
                sl_pct TEXT NOT NULL,
                trailing_enabled INTEGER NOT NULL,
                trailing_distance TEXT NOT NULL,
                ladder_step_pct TEXT,
                ladder_close_pct TEXT,
                max_hold_secs INTEGER,
                high_watermark TEXT NOT NULL,
                low_watermark TEXT NOT NULL,
                ladder_tier_hit INTEGER NOT NULL,
                ladder_closed_fraction TEXT NOT NULL,
                exit_price TEXT NOT NULL,
                exit_ts INTEGER NOT NULL,
                realized_pnl TEXT NOT NULL,
                pnl_pct TEXT,
                exit_reason TEXT NOT NULL,
                PRIMARY KEY (symbol, position_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_history_exit_ts ON positions_history (exit_ts DESC)",
        )
        .execute(&self.pool)
        .await?;

        debug!("Store migrations complete");
        Ok(())
    }

    /// Atomically write the full open-position record.
    ///
    /// Must be durable before the position manager acknowledges the signal.
    pub async fn upsert(&self, position: &Position) -> StoreResult<()> {
        let (ladder_step, ladder_close) = ladder_columns(&position.rules);
        sqlx::query(
            r#"
            REPLACE INTO positions_open (
                symbol, position_id, direction, entry_price, quantity, leverage,
                entry_ts, tp_pct, sl_pct, trailing_enabled, trailing_distance,
                ladder_step_pct, ladder_close_pct, max_hold_secs,
                high_watermark, low_watermark, ladder_tier_hit,
                ladder_closed_fraction, status
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19)
            "#,
        )
        .bind(position.symbol.as_str())
        .bind(&position.position_id)
        .bind(position.direction.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.quantity)
        .bind(position.leverage as i64)
        .bind(position.entry_ts)
        .bind(position.rules.tp_pct.to_string())
        .bind(position.rules.sl_pct.to_string())
        .bind(position.rules.trailing_enabled as i64)
        .bind(position.rules.trailing_distance.to_string())
        .bind(ladder_step)
        .bind(ladder_close)
        .bind(position.rules.max_hold_secs)
        .bind(position.high_watermark.to_string())
        .bind(position.low_watermark.to_string())
        .bind(position.ladder_tier_hit as i64)
        .bind(position.ladder_closed_fraction.to_string())
        .bind(position.status.to_string())
        .execute(&self.pool)
        .await?;

        debug!(symbol = %position.symbol, position_id = %position.position_id, "Upserted position");
        Ok(())
    }

    /// Load every open row. Called at boot to hydrate the position manager.
    pub async fn load_open(&self) -> StoreResult<Vec<Position>> {
        let rows = sqlx::query("SELECT * FROM positions_open")
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(open_row_to_position).collect()
    }

    /// Finalize a position: append the history row and drop the open row
    /// in one transaction.
    ///
    /// `position` must already carry its terminal fields (exit price,
    /// exit timestamp, realized PnL).
    pub async fn record_close(
        &self,
        position: &Position,
        exit_reason: ExitReason,
    ) -> StoreResult<()> {
        let exit_price = position
            .exit_price
            .ok_or_else(|| StoreError::Corrupt("record_close without exit_price".to_string()))?;
        let exit_ts = position
            .exit_ts
            .ok_or_else(|| StoreError::Corrupt("record_close without exit_ts".to_string()))?;
        let realized_pnl = position
            .realized_pnl
            .ok_or_else(|| StoreError::Corrupt("record_close without realized_pnl".to_string()))?;

        let (ladder_step, ladder_close) = ladder_columns(&position.rules);
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            REPLACE INTO positions_history (
                symbol, position_id, direction, entry_price, quantity, leverage,
                entry_ts, tp_pct, sl_pct, trailing_enabled, trailing_distance,
                ladder_step_pct, ladder_close_pct, max_hold_secs,
                high_watermark, low_watermark, ladder_tier_hit,
                ladder_closed_fraction, exit_price, exit_ts, realized_pnl,
                pnl_pct, exit_reason
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14,
                    ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23)
            "#,
        )
        .bind(position.symbol.as_str())
        .bind(&position.position_id)
        .bind(position.direction.to_string())
        .bind(position.entry_price.to_string())
        .bind(position.quantity)
        .bind(position.leverage as i64)
        .bind(position.entry_ts)
        .bind(position.rules.tp_pct.to_string())
        .bind(position.rules.sl_pct.to_string())
        .bind(position.rules.trailing_enabled as i64)
        .bind(position.rules.trailing_distance.to_string())
        .bind(ladder_step)
        .bind(ladder_close)
        .bind(position.rules.max_hold_secs)
        .bind(position.high_watermark.to_string())
        .bind(position.low_watermark.to_string())
        .bind(position.ladder_tier_hit as i64)
        .bind(position.ladder_closed_fraction.to_string())
        .bind(exit_price.to_string())
        .bind(exit_ts)
        .bind(realized_pnl.to_string())
        .bind(position.pnl_pct.map(|p| p.to_string()))
        .bind(exit_reason.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM positions_open WHERE symbol = ?1")
            .bind(position.symbol.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        debug!(
            symbol = %position.symbol,
            reason = %exit_reason,
            realized_pnl = %realized_pnl,
            "Recorded close"
        );
        Ok(())
    }

    /// Closed rows, reverse-chronological by exit timestamp.
    pub async fn query_history(&self, query: &HistoryQuery) -> StoreResult<Vec<ClosedPosition>> {
        let mut sql = String::from("SELECT * FROM positions_history WHERE 1=1");
        if query.symbol.is_some() {
            sql.push_str(" AND symbol = ?");
        }
        if query.start_ms.is_some() {
            sql.push_str(" AND exit_ts >= ?");
        }
        if query.end_ms.is_some() {
            sql.push_str(" AND exit_ts < ?");
        }
        sql.push_str(" ORDER BY exit_ts DESC LIMIT ?");

        let mut q = sqlx::query(&sql);
        if let Some(symbol) = &query.symbol {
            q = q.bind(symbol.as_str());
        }
        if let Some(start) = query.start_ms {
            q = q.bind(start);
        }
        if let Some(end) = query.end_ms {
            q = q.bind(end);
        }
        q = q.bind(query.limit.unwrap_or(100) as i64);

        let rows = q.fetch_all(&self.pool).await?;
        rows.iter().map(history_row_to_closed).collect()
    }

    /// Aggregate realized PnL over rows whose `exit_ts` falls in the UTC day.
    ///
    /// Monotone once the day closes: history is append-only.
    pub async fn daily_rollup(&self, date: NaiveDate) -> StoreResult<DailyRollup> {
        let start_ms = date
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp_millis())
            .ok_or_else(|| StoreError::Corrupt("invalid rollup date".to_string()))?;
        let end_ms = start_ms + 24 * 3600 * 1000;

        let rows = sqlx::query(
            "SELECT realized_pnl FROM positions_history WHERE exit_ts >= ?1 AND exit_ts < ?2",
        )
        .bind(start_ms)
        .bind(end_ms)
        .fetch_all(&self.pool)
        .await?;

        let mut rollup = DailyRollup::default();
        for row in rows {
            let pnl = parse_decimal(row.get::<String, _>("realized_pnl").as_str())?;
            rollup.realized_pnl += pnl;
            rollup.closed_count += 1;
            if pnl > Decimal::ZERO {
                rollup.wins += 1;
            } else if pnl < Decimal::ZERO {
                rollup.losses += 1;
            }
        }
        Ok(rollup)
    }
}

fn ladder_columns(rules: &RuleSnapshot) -> (Option<String>, Option<String>) {
    match &rules.ladder {
        Some(l) => (Some(l.step_pct.to_string()), Some(l.close_pct.to_string())),
        None => (None, None),
    }
}

fn parse_decimal(s: &str) -> StoreResult<Decimal> {
    Decimal::from_str(s).map_err(|e| StoreError::Corrupt(format!("bad decimal '{s}': {e}")))
}

fn parse_direction(s: &str) -> StoreResult<Direction> {
    match s {
        "long" => Ok(Direction::Long),
        "short" => Ok(Direction::Short),
        other => Err(StoreError::Corrupt(format!("bad direction '{other}'"))),
    }
}

fn parse_status(s: &str) -> StoreResult<PositionStatus> {
    match s {
        "open" => Ok(PositionStatus::Open),
        "reconciling" => Ok(PositionStatus::Reconciling),
        other => Err(StoreError::Corrupt(format!("bad status '{other}'"))),
    }
}

fn parse_exit_reason(s: &str) -> StoreResult<ExitReason> {
    match s {
        "take_profit" => Ok(ExitReason::TakeProfit),
        "stop_loss" => Ok(ExitReason::StopLoss),
        "trailing_stop" => Ok(ExitReason::TrailingStop),
        "ladder_tp" => Ok(ExitReason::LadderTp),
        "manual" => Ok(ExitReason::Manual),
        "forced" => Ok(ExitReason::Forced),
        "expired" => Ok(ExitReason::Expired),
        other => Err(StoreError::Corrupt(format!("bad exit reason '{other}'"))),
    }
}

fn rules_from_row(row: &SqliteRow) -> StoreResult<RuleSnapshot> {
    let ladder_step: Option<String> = row.get("ladder_step_pct");
    let ladder_close: Option<String> = row.get("ladder_close_pct");
    let ladder = match (ladder_step, ladder_close) {
        (Some(step), Some(close)) => Some(LadderRules {
            step_pct: parse_decimal(&step)?,
            close_pct: parse_decimal(&close)?,
        }),
        _ => None,
    };

    Ok(RuleSnapshot {
        tp_pct: parse_decimal(row.get::<String, _>("tp_pct").as_str())?,
        sl_pct: parse_decimal(row.get::<String, _>("sl_pct").as_str())?,
        trailing_enabled: row.get::<i64, _>("trailing_enabled") != 0,
        trailing_distance: parse_decimal(row.get::<String, _>("trailing_distance").as_str())?,
        ladder,
        max_hold_secs: row.get("max_hold_secs"),
    })
}

fn base_from_row(row: &SqliteRow) -> StoreResult<Position> {
    Ok(Position {
        symbol: Symbol::new(row.get::<String, _>("symbol")),
        position_id: row.get("position_id"),
        direction: parse_direction(row.get::<String, _>("direction").as_str())?,
        entry_price: Price::new(parse_decimal(row.get::<String, _>("entry_price").as_str())?),
        quantity: row.get("quantity"),
        leverage: row.get::<i64, _>("leverage") as u32,
        entry_ts: row.get("entry_ts"),
        rules: rules_from_row(row)?,
        high_watermark: Price::new(parse_decimal(
            row.get::<String, _>("high_watermark").as_str(),
        )?),
        low_watermark: Price::new(parse_decimal(
            row.get::<String, _>("low_watermark").as_str(),
        )?),
        ladder_tier_hit: row.get::<i64, _>("ladder_tier_hit") as u32,
        ladder_closed_fraction: parse_decimal(
            row.get::<String, _>("ladder_closed_fraction").as_str(),
        )?,
        status: PositionStatus::Open,
        exit_price: None,
        exit_ts: None,
        realized_pnl: None,
        pnl_pct: None,
    })
}

fn open_row_to_position(row: &SqliteRow) -> StoreResult<Position> {
    let mut position = base_from_row(row)?;
    position.status = parse_status(row.get::<String, _>("status").as_str())?;
    Ok(position)
}

fn history_row_to_closed(row: &SqliteRow) -> StoreResult<ClosedPosition> {
    let mut position = base_from_row(row)?;
    position.status = PositionStatus::Closed;
    position.exit_price = Some(Price::new(parse_decimal(
        row.get::<String, _>("exit_price").as_str(),
    )?));
    position.exit_ts = Some(row.get("exit_ts"));
    position.realized_pnl = Some(parse_decimal(
        row.get::<String, _>("realized_pnl").as_str(),
    )?);
    position.pnl_pct = row
        .get::<Option<String>, _>("pnl_pct")
        .map(|s| parse_decimal(&s))
        .transpose()?;

    let exit_reason = parse_exit_reason(row.get::<String, _>("exit_reason").as_str())?;
    Ok(ClosedPosition {
        position,
        exit_reason,
    })
}
