//! Engine configuration.

use pilot_core::LadderConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Defaults applied to positions whose signal omits the field, plus the
/// engine's operational limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Leverage when the signal does not override it.
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
    /// Margin per position in quote units for signals without a quantity.
    /// Sized as `per_position_quote * leverage` of notional.
    #[serde(default = "default_per_position_quote")]
    pub per_position_quote: Decimal,
    #[serde(default = "default_tp_pct")]
    pub default_tp_pct: Decimal,
    #[serde(default = "default_sl_pct")]
    pub default_sl_pct: Decimal,
    #[serde(default)]
    pub default_trailing_stop: bool,
    #[serde(default = "default_trailing_distance")]
    pub default_trailing_distance: Decimal,
    /// Ladder take-profit default; signals may override per position.
    #[serde(default)]
    pub default_ladder: Option<LadderConfig>,
    /// Expire positions held longer than this. None disables.
    #[serde(default)]
    pub max_hold_secs: Option<i64>,
    /// Bounded timeout for every adapter call, in milliseconds.
    #[serde(default = "default_order_timeout_ms")]
    pub order_timeout_ms: u64,
    /// Prices older than this are rejected by the evaluator, in milliseconds.
    #[serde(default = "default_max_price_age_ms")]
    pub max_price_age_ms: u64,
    /// Round undersized orders up to the venue minimum instead of failing.
    #[serde(default)]
    pub round_up_to_min: bool,
    /// Treat `entry_price` on market opens as a limit cap.
    #[serde(default = "default_true")]
    pub entry_cap_enabled: bool,
}

fn default_leverage() -> u32 {
    3
}

fn default_per_position_quote() -> Decimal {
    Decimal::from(100)
}

fn default_tp_pct() -> Decimal {
    Decimal::new(5, 2) // 0.05
}

fn default_sl_pct() -> Decimal {
    Decimal::new(3, 2) // 0.03
}

fn default_trailing_distance() -> Decimal {
    Decimal::new(2, 2) // 0.02
}

fn default_order_timeout_ms() -> u64 {
    10_000
}

fn default_max_price_age_ms() -> u64 {
    30_000
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_leverage: default_leverage(),
            per_position_quote: default_per_position_quote(),
            default_tp_pct: default_tp_pct(),
            default_sl_pct: default_sl_pct(),
            default_trailing_stop: false,
            default_trailing_distance: default_trailing_distance(),
            default_ladder: None,
            max_hold_secs: None,
            order_timeout_ms: default_order_timeout_ms(),
            max_price_age_ms: default_max_price_age_ms(),
            round_up_to_min: false,
            entry_cap_enabled: default_true(),
        }
    }
}

impl EngineConfig {
    pub fn order_timeout(&self) -> Duration {
        Duration::from_millis(self.order_timeout_ms)
    }

    pub fn max_price_age(&self) -> Duration {
        Duration::from_millis(self.max_price_age_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.default_leverage, 3);
        assert_eq!(config.default_tp_pct, dec!(0.05));
        assert_eq!(config.default_sl_pct, dec!(0.03));
        assert_eq!(config.order_timeout(), Duration::from_secs(10));
        assert_eq!(config.max_price_age(), Duration::from_secs(30));
        assert!(config.entry_cap_enabled);
        assert!(!config.round_up_to_min);
    }
}
