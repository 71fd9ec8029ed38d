//! Position entity and lifecycle fields.
//!
//! A position is uniquely keyed by `(symbol, position_id)` where
//! `position_id` is the adapter's fill identifier. The rule snapshot is
//! frozen at open so later configuration changes do not retroactively
//! alter live positions; an explicit `modify` signal is the only way in.

use crate::signal::{Direction, LadderConfig, RuleOverrides};
use crate::symbol::Symbol;
use crate::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    /// Not closed, quantity > 0 after any ladder closures.
    Open,
    /// Fully flat.
    Closed,
    /// Process believes open but the adapter may disagree.
    Reconciling,
}

impl fmt::Display for PositionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closed => write!(f, "closed"),
            Self::Reconciling => write!(f, "reconciling"),
        }
    }
}

/// Why a position was (or is being) closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TrailingStop,
    LadderTp,
    Manual,
    Forced,
    Expired,
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TakeProfit => write!(f, "take_profit"),
            Self::StopLoss => write!(f, "stop_loss"),
            Self::TrailingStop => write!(f, "trailing_stop"),
            Self::LadderTp => write!(f, "ladder_tp"),
            Self::Manual => write!(f, "manual"),
            Self::Forced => write!(f, "forced"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

/// Ladder take-profit rules frozen on a position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderRules {
    /// Tier size as an unleveraged fraction.
    pub step_pct: Decimal,
    /// Fraction of the remaining quantity closed per tier.
    pub close_pct: Decimal,
}

/// Per-position risk rules, captured at open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSnapshot {
    /// Take-profit threshold; zero disables.
    pub tp_pct: Decimal,
    /// Stop-loss threshold; zero disables.
    pub sl_pct: Decimal,
    pub trailing_enabled: bool,
    pub trailing_distance: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ladder: Option<LadderRules>,
    /// Maximum holding time in seconds; None disables expiry.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_hold_secs: Option<i64>,
}

impl RuleSnapshot {
    /// Apply an explicit modify on a live position.
    pub fn apply(&mut self, overrides: &RuleOverrides) {
        if let Some(tp) = overrides.take_profit_pct {
            self.tp_pct = tp;
        }
        if let Some(sl) = overrides.stop_loss_pct {
            self.sl_pct = sl;
        }
        if let Some(t) = overrides.trailing_stop {
            self.trailing_enabled = t;
        }
        if let Some(d) = overrides.trailing_distance {
            self.trailing_distance = d;
        }
        if let Some(l) = overrides.ladder_tp {
            self.ladder = l.enabled.then_some(LadderRules {
                step_pct: l.step_pct,
                close_pct: l.close_pct,
            });
        }
    }
}

/// An open or historical position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: Symbol,
    /// Adapter-issued fill identifier; part of the store key.
    pub position_id: String,
    pub direction: Direction,
    pub entry_price: Price,
    /// Signed contract count: positive = long, negative = short.
    /// Magnitude never increases after open.
    pub quantity: i64,
    pub leverage: u32,
    /// Entry timestamp, unix milliseconds.
    pub entry_ts: i64,
    pub rules: RuleSnapshot,
    /// Highest price observed while the position was live.
    pub high_watermark: Price,
    /// Lowest price observed while the position was live.
    pub low_watermark: Price,
    /// Highest ladder tier already acted on.
    pub ladder_tier_hit: u32,
    /// Cumulative fraction of the position closed by ladder tiers, in [0, 1].
    pub ladder_closed_fraction: Decimal,
    pub status: PositionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_price: Option<Price>,
    /// Exit timestamp, unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub realized_pnl: Option<Decimal>,
    /// Unleveraged PnL fraction at exit.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pnl_pct: Option<Decimal>,
}

impl Position {
    /// Create a freshly opened position. Watermarks start at entry.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        symbol: Symbol,
        position_id: String,
        direction: Direction,
        entry_price: Price,
        contracts: i64,
        leverage: u32,
        entry_ts: i64,
        rules: RuleSnapshot,
    ) -> Self {
        let quantity = match direction {
            Direction::Long => contracts,
            Direction::Short => -contracts,
        };
        Self {
            symbol,
            position_id,
            direction,
            entry_price,
            quantity,
            leverage,
            entry_ts,
            rules,
            high_watermark: entry_price,
            low_watermark: entry_price,
            ladder_tier_hit: 0,
            ladder_closed_fraction: Decimal::ZERO,
            status: PositionStatus::Open,
            exit_price: None,
            exit_ts: None,
            realized_pnl: None,
            pnl_pct: None,
        }
    }

    /// Absolute contract count.
    pub fn contracts(&self) -> i64 {
        self.quantity.abs()
    }

    pub fn is_long(&self) -> bool {
        self.direction == Direction::Long
    }

    /// Unleveraged PnL fraction at the given price:
    /// `sign * (price - entry) / entry`.
    ///
    /// Returns None if entry price is zero.
    pub fn unleveraged_pnl_pct(&self, price: Price) -> Option<Decimal> {
        let raw = price.pct_from(self.entry_price)?;
        Some(self.direction.sign() * raw)
    }

    /// Realized PnL in quote units for closing `contracts` at `exit_price`:
    /// `sign * (exit - entry) * contracts * contract_size`.
    pub fn realized_pnl_for(
        &self,
        exit_price: Price,
        contracts: i64,
        contract_size: Decimal,
    ) -> Decimal {
        self.direction.sign()
            * (exit_price.inner() - self.entry_price.inner())
            * Decimal::from(contracts)
            * contract_size
    }

    /// Fold a fresh observed price into the watermarks.
    pub fn observe_price(&mut self, price: Price) {
        self.high_watermark = self.high_watermark.max(price);
        self.low_watermark = self.low_watermark.min(price);
    }

    /// Age of the position at `now_ms`.
    pub fn holding_secs(&self, now_ms: i64) -> i64 {
        (now_ms - self.entry_ts) / 1000
    }

    /// Record a ladder partial close of `closed` contracts.
    pub fn apply_partial_close(&mut self, closed: i64, new_tier: u32, closed_fraction: Decimal) {
        let sign = if self.quantity >= 0 { 1 } else { -1 };
        self.quantity -= sign * closed;
        self.ladder_tier_hit = new_tier;
        self.ladder_closed_fraction =
            (self.ladder_closed_fraction + closed_fraction).min(Decimal::ONE);
    }

    /// Finalize the position on close.
    ///
    /// `quantity` is left as the size that was closed so the history
    /// row retains it; the live map drops the record entirely.
    pub fn mark_closed(&mut self, exit_price: Price, exit_ts: i64, realized_pnl: Decimal) {
        self.pnl_pct = self.unleveraged_pnl_pct(exit_price);
        self.status = PositionStatus::Closed;
        self.exit_price = Some(exit_price);
        self.exit_ts = Some(exit_ts);
        self.realized_pnl = Some(realized_pnl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_rules() -> RuleSnapshot {
        RuleSnapshot {
            tp_pct: dec!(0.05),
            sl_pct: dec!(0.03),
            trailing_enabled: false,
            trailing_distance: dec!(0.02),
            ladder: None,
            max_hold_secs: None,
        }
    }

    fn long_btc() -> Position {
        Position::open(
            Symbol::new("BTC-USDT-SWAP"),
            "ord-1".to_string(),
            Direction::Long,
            Price::new(dec!(50000)),
            1,
            3,
            1_700_000_000_000,
            sample_rules(),
        )
    }

    #[test]
    fn test_open_sets_signed_quantity_and_watermarks() {
        let long = long_btc();
        assert_eq!(long.quantity, 1);
        assert_eq!(long.high_watermark, long.entry_price);
        assert_eq!(long.low_watermark, long.entry_price);

        let short = Position::open(
            Symbol::new("ETH-USDT-SWAP"),
            "ord-2".to_string(),
            Direction::Short,
            Price::new(dec!(2000)),
            5,
            2,
            1_700_000_000_000,
            sample_rules(),
        );
        assert_eq!(short.quantity, -5);
        assert_eq!(short.contracts(), 5);
    }

    #[test]
    fn test_unleveraged_pnl_pct() {
        let long = long_btc();
        assert_eq!(
            long.unleveraged_pnl_pct(Price::new(dec!(52500))).unwrap(),
            dec!(0.05)
        );
        assert_eq!(
            long.unleveraged_pnl_pct(Price::new(dec!(48500))).unwrap(),
            dec!(-0.03)
        );

        let short = Position::open(
            Symbol::new("ETH-USDT-SWAP"),
            "ord-2".to_string(),
            Direction::Short,
            Price::new(dec!(2000)),
            1,
            1,
            0,
            sample_rules(),
        );
        assert_eq!(
            short.unleveraged_pnl_pct(Price::new(dec!(1950))).unwrap(),
            dec!(0.025)
        );
    }

    #[test]
    fn test_realized_pnl_matches_spec_scenario() {
        // Long BTC entry=50000, exit=52500, 1 contract, contract_size=0.01
        // => +25.00 quote units.
        let long = long_btc();
        let pnl = long.realized_pnl_for(Price::new(dec!(52500)), 1, dec!(0.01));
        assert_eq!(pnl, dec!(25.00));
    }

    #[test]
    fn test_observe_price_watermarks() {
        let mut p = long_btc();
        p.observe_price(Price::new(dec!(51000)));
        p.observe_price(Price::new(dec!(49500)));
        p.observe_price(Price::new(dec!(50500)));
        assert_eq!(p.high_watermark.inner(), dec!(51000));
        assert_eq!(p.low_watermark.inner(), dec!(49500));
    }

    #[test]
    fn test_partial_close_reduces_magnitude() {
        let mut p = Position::open(
            Symbol::new("SOL-USDT-SWAP"),
            "ord-3".to_string(),
            Direction::Short,
            Price::new(dec!(100)),
            4,
            1,
            0,
            sample_rules(),
        );
        p.apply_partial_close(1, 1, dec!(0.25));
        assert_eq!(p.quantity, -3);
        assert_eq!(p.ladder_tier_hit, 1);
        assert_eq!(p.ladder_closed_fraction, dec!(0.25));
    }

    #[test]
    fn test_mark_closed() {
        let mut p = long_btc();
        p.mark_closed(Price::new(dec!(52500)), 1_700_000_100_000, dec!(25));
        assert_eq!(p.status, PositionStatus::Closed);
        assert_eq!(p.pnl_pct.unwrap(), dec!(0.05));
        // The closed size survives for the history row.
        assert_eq!(p.quantity, 1);
        assert_eq!(p.exit_price.unwrap().inner(), dec!(52500));
    }

    #[test]
    fn test_rule_snapshot_apply() {
        let mut rules = sample_rules();
        rules.apply(&RuleOverrides {
            take_profit_pct: Some(dec!(0.08)),
            trailing_stop: Some(true),
            ..Default::default()
        });
        assert_eq!(rules.tp_pct, dec!(0.08));
        assert!(rules.trailing_enabled);
        assert_eq!(rules.sl_pct, dec!(0.03));
    }
}
