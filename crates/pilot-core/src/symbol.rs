//! Instrument identification and contract specification.

use crate::Price;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Instrument identifier (e.g. "BTC-USDT-SWAP").
///
/// The exchange's textual id is the primary key for positions,
/// subscriptions, and store rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Symbol {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Immutable contract attributes for an instrument.
///
/// Fetched once per instrument via the exchange adapter and cached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractSpec {
    /// Base units represented by one contract.
    pub contract_size: Decimal,
    /// Decimal places of the quoted price.
    pub price_precision: u32,
    /// Decimal places of order sizes.
    pub size_precision: u32,
    /// Minimum order size in contracts.
    pub min_size: i64,
}

impl ContractSpec {
    /// Quote value of one contract at the given price.
    pub fn contract_value(&self, price: Price) -> Decimal {
        self.contract_size * price.inner()
    }

    /// Round a price down to the instrument's precision.
    pub fn clamp_price(&self, price: Price) -> Price {
        price.truncate_dp(self.price_precision)
    }
}

impl Default for ContractSpec {
    fn default() -> Self {
        Self {
            contract_size: Decimal::ONE,
            price_precision: 2,
            size_precision: 0,
            min_size: 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_contract_value() {
        let spec = ContractSpec {
            contract_size: dec!(0.01),
            ..Default::default()
        };
        assert_eq!(spec.contract_value(Price::new(dec!(50000))), dec!(500.00));
    }

    #[test]
    fn test_clamp_price() {
        let spec = ContractSpec {
            price_precision: 1,
            ..Default::default()
        };
        assert_eq!(
            spec.clamp_price(Price::new(dec!(1989.55))).inner(),
            dec!(1989.5)
        );
    }

    #[test]
    fn test_symbol_display() {
        let s = Symbol::new("ETH-USDT-SWAP");
        assert_eq!(s.to_string(), "ETH-USDT-SWAP");
    }
}
