//! Open gates.
//!
//! Stateful checks consulted by the signal router before an `open`
//! reaches the position manager. All counters roll over at UTC
//! midnight. The manager reports realized PnL back through
//! `record_realized` so the daily loss cap sees monitor-initiated
//! closes too.

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use pilot_core::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskGateConfig {
    #[serde(default = "default_true")]
    pub enable_cooling_period: bool,
    /// Minimum minutes between opens on the same symbol.
    #[serde(default = "default_cooling_minutes")]
    pub cooling_period_minutes: i64,
    #[serde(default = "default_true")]
    pub enable_daily_limit: bool,
    #[serde(default = "default_max_daily_trades")]
    pub max_daily_trades: u32,
    #[serde(default = "default_true")]
    pub enable_loss_limit: bool,
    /// Daily realized loss (quote units) beyond which opens are blocked.
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_positions: u32,
}

fn default_true() -> bool {
    true
}

fn default_cooling_minutes() -> i64 {
    30
}

fn default_max_daily_trades() -> u32 {
    50
}

fn default_max_daily_loss() -> Decimal {
    Decimal::from(500)
}

fn default_max_concurrent() -> u32 {
    10
}

impl Default for RiskGateConfig {
    fn default() -> Self {
        Self {
            enable_cooling_period: true,
            cooling_period_minutes: default_cooling_minutes(),
            enable_daily_limit: true,
            max_daily_trades: default_max_daily_trades(),
            enable_loss_limit: true,
            max_daily_loss: default_max_daily_loss(),
            max_concurrent_positions: default_max_concurrent(),
        }
    }
}

/// Result of a gate check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateResult {
    Pass,
    Block(String),
}

impl GateResult {
    pub fn is_pass(&self) -> bool {
        matches!(self, Self::Pass)
    }
}

#[derive(Debug, Default)]
struct GateState {
    day: Option<NaiveDate>,
    trades_today: u32,
    realized_pnl_today: Decimal,
    last_open: HashMap<Symbol, DateTime<Utc>>,
}

impl GateState {
    /// Reset daily counters when the UTC day changes. Cooling state
    /// survives the rollover.
    fn roll_to(&mut self, today: NaiveDate) {
        if self.day != Some(today) {
            if self.day.is_some() {
                info!(%today, "Risk gate daily counters reset");
            }
            self.day = Some(today);
            self.trades_today = 0;
            self.realized_pnl_today = Decimal::ZERO;
        }
    }
}

/// Shared gate state. One instance per process, injected into the router
/// (checks) and the position manager (realized PnL reporting).
pub struct RiskGates {
    config: RiskGateConfig,
    state: Mutex<GateState>,
}

impl RiskGates {
    pub fn new(config: RiskGateConfig) -> Self {
        Self {
            config,
            state: Mutex::new(GateState::default()),
        }
    }

    pub fn config(&self) -> &RiskGateConfig {
        &self.config
    }

    /// Check every gate for an `open` on `symbol`.
    ///
    /// `open_positions` is the current number of non-closed positions.
    pub fn check_open(&self, symbol: &Symbol, open_positions: usize, now: DateTime<Utc>) -> GateResult {
        let mut state = self.state.lock();
        state.roll_to(now.date_naive());

        if self.config.enable_cooling_period {
            if let Some(last) = state.last_open.get(symbol) {
                let elapsed = now - *last;
                let cooling = chrono::Duration::minutes(self.config.cooling_period_minutes);
                if elapsed < cooling {
                    let remaining = (cooling - elapsed).num_seconds();
                    return GateResult::Block(format!(
                        "cooling period on {symbol}: {remaining}s remaining"
                    ));
                }
            }
        }

        if self.config.enable_daily_limit && state.trades_today >= self.config.max_daily_trades {
            return GateResult::Block(format!(
                "daily trade cap reached: {}",
                self.config.max_daily_trades
            ));
        }

        if self.config.enable_loss_limit
            && state.realized_pnl_today <= -self.config.max_daily_loss
        {
            return GateResult::Block(format!(
                "daily loss cap reached: {} (realized {})",
                self.config.max_daily_loss, state.realized_pnl_today
            ));
        }

        if open_positions >= self.config.max_concurrent_positions as usize {
            return GateResult::Block(format!(
                "max concurrent positions reached: {}",
                self.config.max_concurrent_positions
            ));
        }

        GateResult::Pass
    }

    /// Record a successful open for cooling and daily counting.
    pub fn record_open(&self, symbol: &Symbol, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.roll_to(now.date_naive());
        state.last_open.insert(symbol.clone(), now);
        state.trades_today += 1;
        debug!(%symbol, trades_today = state.trades_today, "Recorded open");
    }

    /// Fold a realized PnL into today's total.
    pub fn record_realized(&self, pnl: Decimal, now: DateTime<Utc>) {
        let mut state = self.state.lock();
        state.roll_to(now.date_naive());
        state.realized_pnl_today += pnl;
        debug!(%pnl, total = %state.realized_pnl_today, "Recorded realized PnL");
    }

    /// Today's realized PnL as the gates see it.
    pub fn realized_today(&self, now: DateTime<Utc>) -> Decimal {
        let mut state = self.state.lock();
        state.roll_to(now.date_naive());
        state.realized_pnl_today
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::new("BTC-USDT-SWAP")
    }

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, h, m, 0).unwrap()
    }

    #[test]
    fn test_cooling_period_blocks_second_open() {
        let gates = RiskGates::new(RiskGateConfig {
            cooling_period_minutes: 30,
            ..Default::default()
        });

        assert!(gates.check_open(&btc(), 0, at(10, 0)).is_pass());
        gates.record_open(&btc(), at(10, 0));

        assert!(!gates.check_open(&btc(), 0, at(10, 15)).is_pass());
        assert!(gates.check_open(&btc(), 0, at(10, 30)).is_pass());

        // Other symbols are unaffected.
        assert!(gates
            .check_open(&Symbol::new("ETH-USDT-SWAP"), 0, at(10, 15))
            .is_pass());
    }

    #[test]
    fn test_daily_trade_cap() {
        let gates = RiskGates::new(RiskGateConfig {
            enable_cooling_period: false,
            max_daily_trades: 2,
            ..Default::default()
        });

        gates.record_open(&btc(), at(9, 0));
        gates.record_open(&btc(), at(9, 5));
        assert!(!gates.check_open(&btc(), 0, at(9, 10)).is_pass());
    }

    #[test]
    fn test_daily_loss_cap_blocks_and_resets_next_day() {
        let gates = RiskGates::new(RiskGateConfig {
            enable_cooling_period: false,
            max_daily_loss: dec!(100),
            ..Default::default()
        });

        gates.record_realized(dec!(-150), at(9, 0));
        assert!(!gates.check_open(&btc(), 0, at(9, 10)).is_pass());

        // Next UTC day: counters reset.
        let next_day = Utc.with_ymd_and_hms(2024, 5, 2, 0, 5, 0).unwrap();
        assert!(gates.check_open(&btc(), 0, next_day).is_pass());
        assert_eq!(gates.realized_today(next_day), Decimal::ZERO);
    }

    #[test]
    fn test_profit_offsets_losses() {
        let gates = RiskGates::new(RiskGateConfig {
            enable_cooling_period: false,
            max_daily_loss: dec!(100),
            ..Default::default()
        });

        gates.record_realized(dec!(-80), at(9, 0));
        gates.record_realized(dec!(50), at(9, 5));
        assert!(gates.check_open(&btc(), 0, at(9, 10)).is_pass());
    }

    #[test]
    fn test_max_concurrent_positions() {
        let gates = RiskGates::new(RiskGateConfig {
            enable_cooling_period: false,
            max_concurrent_positions: 3,
            ..Default::default()
        });

        assert!(gates.check_open(&btc(), 2, at(9, 0)).is_pass());
        assert!(!gates.check_open(&btc(), 3, at(9, 0)).is_pass());
    }
}
