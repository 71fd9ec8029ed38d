//! Order sizing.
//!
//! Converts a requested size in quote, base, or contract units into an
//! exchange-accepted integer contract count. Rounding is always toward
//! zero so the operator's intended margin is never exceeded.

use crate::error::{EngineError, EngineResult};
use pilot_core::{ContractSpec, Price, UnitType};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

/// Compute the contract count for a requested size.
///
/// - `quote`: `floor(requested / (reference_price * contract_size))`
/// - `base`: `floor(requested / contract_size)`
/// - `contract`: `floor(requested)`
///
/// Undersized results either fail with `SizeTooSmall` or round up to
/// the venue minimum when `round_up_to_min` is set.
pub fn size_order(
    spec: &ContractSpec,
    requested: Decimal,
    unit: UnitType,
    reference_price: Price,
    round_up_to_min: bool,
) -> EngineResult<i64> {
    if requested <= Decimal::ZERO {
        return Err(EngineError::InvalidSignal(format!(
            "non-positive quantity {requested}"
        )));
    }
    if spec.contract_size <= Decimal::ZERO {
        return Err(EngineError::InvalidSignal(format!(
            "non-positive contract size {}",
            spec.contract_size
        )));
    }

    let raw = match unit {
        UnitType::Quote => {
            if !reference_price.is_positive() {
                return Err(EngineError::InvalidSignal(
                    "quote sizing requires a positive reference price".to_string(),
                ));
            }
            requested / (reference_price.inner() * spec.contract_size)
        }
        UnitType::Base => requested / spec.contract_size,
        UnitType::Contract => requested,
    };

    let contracts = raw
        .floor()
        .to_i64()
        .ok_or_else(|| EngineError::InvalidSignal(format!("size overflow: {raw}")))?;

    if contracts < spec.min_size {
        if round_up_to_min {
            return Ok(spec.min_size);
        }
        return Err(EngineError::SizeTooSmall {
            computed: contracts,
            min: spec.min_size,
        });
    }

    Ok(contracts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec() -> ContractSpec {
        ContractSpec {
            contract_size: dec!(0.01),
            price_precision: 1,
            size_precision: 0,
            min_size: 1,
        }
    }

    #[test]
    fn test_quote_sizing() {
        // 1000 USDT at 50000, contract_size 0.01 => 1000 / 500 = 2 contracts.
        let contracts = size_order(
            &spec(),
            dec!(1000),
            UnitType::Quote,
            Price::new(dec!(50000)),
            false,
        )
        .unwrap();
        assert_eq!(contracts, 2);
    }

    #[test]
    fn test_quote_sizing_truncates_toward_zero() {
        // 999 / 500 = 1.998 => 1 contract, never 2.
        let contracts = size_order(
            &spec(),
            dec!(999),
            UnitType::Quote,
            Price::new(dec!(50000)),
            false,
        )
        .unwrap();
        assert_eq!(contracts, 1);
    }

    #[test]
    fn test_base_sizing_spec_scenario() {
        // 0.01 base over 0.01 contract_size => 1 contract.
        let contracts = size_order(
            &spec(),
            dec!(0.01),
            UnitType::Base,
            Price::new(dec!(50000)),
            false,
        )
        .unwrap();
        assert_eq!(contracts, 1);
    }

    #[test]
    fn test_contract_sizing_floors() {
        let contracts = size_order(
            &spec(),
            dec!(3.9),
            UnitType::Contract,
            Price::new(dec!(50000)),
            false,
        )
        .unwrap();
        assert_eq!(contracts, 3);
    }

    #[test]
    fn test_below_minimum_fails() {
        let mut s = spec();
        s.min_size = 10;
        let err = size_order(&s, dec!(5), UnitType::Contract, Price::new(dec!(1)), false)
            .unwrap_err();
        assert!(matches!(
            err,
            EngineError::SizeTooSmall { computed: 5, min: 10 }
        ));
    }

    #[test]
    fn test_below_minimum_rounds_up_when_configured() {
        let mut s = spec();
        s.min_size = 10;
        let contracts =
            size_order(&s, dec!(5), UnitType::Contract, Price::new(dec!(1)), true).unwrap();
        assert_eq!(contracts, 10);
    }

    #[test]
    fn test_rejects_non_positive_inputs() {
        assert!(size_order(
            &spec(),
            dec!(0),
            UnitType::Quote,
            Price::new(dec!(50000)),
            false
        )
        .is_err());
        assert!(size_order(
            &spec(),
            dec!(100),
            UnitType::Quote,
            Price::ZERO,
            false
        )
        .is_err());
    }
}
