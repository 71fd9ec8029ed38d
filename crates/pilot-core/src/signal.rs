//! Canonical trade signal.
//!
//! Strategy adapters (webhook parsers, operator calls) translate their
//! native payloads into `TradeSignal`. Unknown wire fields are accepted
//! and ignored; required fields per action are enforced by the router.

use crate::symbol::Symbol;
use crate::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Signal action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignalAction {
    Open,
    Close,
    Modify,
    /// Shorthand modify: update only the take-profit percentage.
    Tp,
    /// Shorthand modify: update only the stop-loss percentage.
    Sl,
    Status,
}

impl fmt::Display for SignalAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Close => write!(f, "close"),
            Self::Modify => write!(f, "modify"),
            Self::Tp => write!(f, "tp"),
            Self::Sl => write!(f, "sl"),
            Self::Status => write!(f, "status"),
        }
    }
}

/// Position direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// Returns +1 for long, -1 for short (for PnL arithmetic).
    pub fn sign(&self) -> Decimal {
        match self {
            Self::Long => Decimal::ONE,
            Self::Short => Decimal::NEGATIVE_ONE,
        }
    }

    pub fn opposite(&self) -> Self {
        match self {
            Self::Long => Self::Short,
            Self::Short => Self::Long,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Long => write!(f, "long"),
            Self::Short => write!(f, "short"),
        }
    }
}

/// Unit of a requested order size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitType {
    /// Quote currency notional (e.g. USDT).
    #[default]
    Quote,
    /// Base currency amount (e.g. BTC).
    Base,
    /// Contract count.
    Contract,
}

/// Ladder take-profit configuration carried on a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LadderConfig {
    pub enabled: bool,
    /// Price tier size as an unleveraged fraction (0.01 = 1% move per tier).
    pub step_pct: Decimal,
    /// Fraction of the remaining quantity closed per tier.
    pub close_pct: Decimal,
}

/// Client-generated request id for idempotent mutating operations.
///
/// CRITICAL: replays with the same id after a crash must not double-order.
/// The exchange adapter is assumed to honor client order ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(String);

impl RequestId {
    /// Create a new unique request id.
    ///
    /// Format: `pilot_{timestamp_ms}_{uuid_short}`
    pub fn new() -> Self {
        let ts = chrono::Utc::now().timestamp_millis();
        let uuid_short = &Uuid::new_v4().to_string()[..8];
        Self(format!("pilot_{ts}_{uuid_short}"))
    }

    pub fn from_string(s: String) -> Self {
        Self(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical trade signal.
///
/// All percentages are decimal fractions on the unleveraged price move
/// (0.05 means "price moved 5% against entry"), deliberately decoupling
/// risk rules from the leverage used.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeSignal {
    pub action: SignalAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<Symbol>,
    /// Multi-symbol fan-out; mutually exclusive with `symbol`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbols: Option<Vec<Symbol>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,
    /// Requested size in `unit_type` units; missing means the configured
    /// per-position size is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_type: Option<UnitType>,
    /// Missing means market order.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entry_price: Option<Price>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub leverage: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub take_profit_pct: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_loss_pct: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_stop: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trailing_distance: Option<Decimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ladder_tp: Option<LadderConfig>,
    /// Bypass the symbol whitelist for this signal.
    #[serde(default)]
    pub override_symbol_pool: bool,
    /// Client-generated request id; generated if absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<RequestId>,
    /// Opaque strategy-specific payload, passed through untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<serde_json::Value>,
}

impl TradeSignal {
    /// Minimal signal for a single symbol.
    pub fn new(action: SignalAction, symbol: Symbol) -> Self {
        Self {
            action,
            symbol: Some(symbol),
            symbols: None,
            direction: None,
            quantity: None,
            unit_type: None,
            entry_price: None,
            leverage: None,
            take_profit_pct: None,
            stop_loss_pct: None,
            trailing_stop: None,
            trailing_distance: None,
            ladder_tp: None,
            override_symbol_pool: false,
            request_id: None,
            extra: None,
        }
    }

    /// Rule overrides carried by this signal, for modify handling.
    pub fn rule_overrides(&self) -> RuleOverrides {
        RuleOverrides {
            take_profit_pct: self.take_profit_pct,
            stop_loss_pct: self.stop_loss_pct,
            trailing_stop: self.trailing_stop,
            trailing_distance: self.trailing_distance,
            ladder_tp: self.ladder_tp,
        }
    }
}

/// Subset of rule fields an explicit `modify` may change on a live position.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RuleOverrides {
    pub take_profit_pct: Option<Decimal>,
    pub stop_loss_pct: Option<Decimal>,
    pub trailing_stop: Option<bool>,
    pub trailing_distance: Option<Decimal>,
    pub ladder_tp: Option<LadderConfig>,
}

impl RuleOverrides {
    pub fn is_empty(&self) -> bool {
        self.take_profit_pct.is_none()
            && self.stop_loss_pct.is_none()
            && self.trailing_stop.is_none()
            && self.trailing_distance.is_none()
            && self.ladder_tp.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_direction_sign() {
        assert_eq!(Direction::Long.sign(), Decimal::ONE);
        assert_eq!(Direction::Short.sign(), Decimal::NEGATIVE_ONE);
        assert_eq!(Direction::Long.opposite(), Direction::Short);
    }

    #[test]
    fn test_request_id_unique() {
        assert_ne!(RequestId::new(), RequestId::new());
        assert!(RequestId::new().as_str().starts_with("pilot_"));
    }

    #[test]
    fn test_signal_wire_format_ignores_unknown_fields() {
        let json = r#"{
            "action": "open",
            "symbol": "BTC-USDT-SWAP",
            "direction": "long",
            "quantity": "0.01",
            "unit_type": "base",
            "leverage": 3,
            "take_profit_pct": "0.05",
            "some_vendor_field": {"nested": true}
        }"#;
        let signal: TradeSignal = serde_json::from_str(json).unwrap();
        assert_eq!(signal.action, SignalAction::Open);
        assert_eq!(signal.direction, Some(Direction::Long));
        assert_eq!(signal.quantity, Some(dec!(0.01)));
        assert_eq!(signal.unit_type, Some(UnitType::Base));
        assert_eq!(signal.take_profit_pct, Some(dec!(0.05)));
        assert!(!signal.override_symbol_pool);
    }

    #[test]
    fn test_multi_symbol_signal() {
        let json = r#"{"action": "close", "symbols": ["BTC-USDT-SWAP", "ETH-USDT-SWAP"]}"#;
        let signal: TradeSignal = serde_json::from_str(json).unwrap();
        assert!(signal.symbol.is_none());
        assert_eq!(signal.symbols.as_ref().unwrap().len(), 2);
    }

    #[test]
    fn test_rule_overrides_empty() {
        let signal = TradeSignal::new(SignalAction::Modify, Symbol::new("BTC-USDT-SWAP"));
        assert!(signal.rule_overrides().is_empty());
    }
}
