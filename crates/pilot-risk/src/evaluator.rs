//! Pure exit-rule evaluator.
//!
//! Given a position, a fresh price sample, and the wall clock, decide
//! hold / close / partial-close. All thresholds work on the unleveraged
//! PnL fraction `u = sign * (price - entry) / entry`.
//!
//! Tie-breaks: stop-loss precedes all profit exits; fixed take-profit
//! precedes trailing; ladder precedes trailing. Expiry beats `Hold` but
//! loses to every rule exit. The evaluator reads watermarks but never
//! writes them; watermark maintenance belongs to the position manager.

use pilot_core::{ExitReason, Position};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::time::Duration;
use tracing::warn;

/// Decision for one (position, price, now) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitDecision {
    Hold,
    Close(ExitReason),
    /// Close `fraction` of the remaining quantity and advance to `tier`.
    PartialClose { fraction: Decimal, tier: u32 },
}

/// A price observation with its age.
#[derive(Debug, Clone, Copy)]
pub struct PriceSample {
    pub price: pilot_core::Price,
    pub age: Duration,
}

/// Evaluator tuning.
#[derive(Debug, Clone)]
pub struct EvaluatorConfig {
    /// Samples older than this are rejected (decision: hold).
    pub max_price_age: Duration,
    /// Unleveraged move beyond which a sample is treated as absurd.
    pub max_abs_move: Decimal,
    /// Trailing arms once `u` has exceeded this; None means the
    /// position's own trailing distance is the arm threshold.
    pub trailing_arm_pct: Option<Decimal>,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            max_price_age: Duration::from_secs(30),
            max_abs_move: Decimal::ONE,
            trailing_arm_pct: None,
        }
    }
}

/// Evaluate exit rules for a position. Deterministic and side-effect free.
pub fn evaluate(
    config: &EvaluatorConfig,
    position: &Position,
    sample: PriceSample,
    now_ms: i64,
) -> ExitDecision {
    let price = sample.price;

    // Price sanity: zero/negative, stale, or an absurd jump all hold.
    if !price.is_positive() {
        warn!(symbol = %position.symbol, %price, "Rejecting non-positive price");
        return ExitDecision::Hold;
    }
    if sample.age > config.max_price_age {
        warn!(
            symbol = %position.symbol,
            age_ms = sample.age.as_millis() as u64,
            "Rejecting stale price"
        );
        return ExitDecision::Hold;
    }
    let u = match position.unleveraged_pnl_pct(price) {
        Some(u) => u,
        None => {
            warn!(symbol = %position.symbol, "Position has zero entry price");
            return ExitDecision::Hold;
        }
    };
    if u.abs() > config.max_abs_move {
        warn!(symbol = %position.symbol, %u, "Rejecting absurd price move");
        return ExitDecision::Hold;
    }

    let rules = &position.rules;

    // Stop-loss precedes everything. Inclusive at the boundary.
    if rules.sl_pct > Decimal::ZERO && u <= -rules.sl_pct {
        return ExitDecision::Close(ExitReason::StopLoss);
    }

    // Fixed take-profit, only when laddering is off. Inclusive.
    if rules.ladder.is_none() && rules.tp_pct > Decimal::ZERO && u >= rules.tp_pct {
        return ExitDecision::Close(ExitReason::TakeProfit);
    }

    // Ladder take-profit.
    if let Some(ladder) = &rules.ladder {
        if ladder.step_pct > Decimal::ZERO && u > Decimal::ZERO {
            let tier = (u / ladder.step_pct).floor().to_u32().unwrap_or(0);
            if tier >= 1 && tier > position.ladder_tier_hit {
                let prospective = position.ladder_closed_fraction + ladder.close_pct;
                if prospective >= Decimal::ONE {
                    return ExitDecision::Close(ExitReason::TakeProfit);
                }
                return ExitDecision::PartialClose {
                    fraction: ladder.close_pct,
                    tier,
                };
            }
        }
    }

    // Trailing stop, armed only once the move has exceeded the arm
    // threshold (default: the trailing distance itself).
    if rules.trailing_enabled && rules.trailing_distance > Decimal::ZERO {
        let arm = config.trailing_arm_pct.unwrap_or(rules.trailing_distance);
        if position.is_long() {
            let peak_move = position
                .high_watermark
                .pct_from(position.entry_price)
                .unwrap_or(Decimal::ZERO);
            if peak_move >= arm {
                let floor =
                    position.high_watermark.inner() * (Decimal::ONE - rules.trailing_distance);
                if price.inner() <= floor {
                    return ExitDecision::Close(ExitReason::TrailingStop);
                }
            }
        } else {
            let trough_move = -position
                .low_watermark
                .pct_from(position.entry_price)
                .unwrap_or(Decimal::ZERO);
            if trough_move >= arm {
                let ceiling =
                    position.low_watermark.inner() * (Decimal::ONE + rules.trailing_distance);
                if price.inner() >= ceiling {
                    return ExitDecision::Close(ExitReason::TrailingStop);
                }
            }
        }
    }

    // Expiry beats Hold only.
    if let Some(max_hold) = rules.max_hold_secs {
        if position.holding_secs(now_ms) > max_hold {
            return ExitDecision::Close(ExitReason::Expired);
        }
    }

    ExitDecision::Hold
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::{Direction, LadderRules, Price, RuleSnapshot, Symbol};
    use rust_decimal_macros::dec;

    fn config() -> EvaluatorConfig {
        EvaluatorConfig::default()
    }

    fn fresh(price: Decimal) -> PriceSample {
        PriceSample {
            price: Price::new(price),
            age: Duration::from_secs(1),
        }
    }

    fn rules() -> RuleSnapshot {
        RuleSnapshot {
            tp_pct: dec!(0.05),
            sl_pct: dec!(0.03),
            trailing_enabled: false,
            trailing_distance: dec!(0.02),
            ladder: None,
            max_hold_secs: None,
        }
    }

    fn long(entry: Decimal, rules: RuleSnapshot) -> Position {
        Position::open(
            Symbol::new("BTC-USDT-SWAP"),
            "ord-1".to_string(),
            Direction::Long,
            Price::new(entry),
            4,
            3,
            0,
            rules,
        )
    }

    fn short(entry: Decimal, rules: RuleSnapshot) -> Position {
        Position::open(
            Symbol::new("ETH-USDT-SWAP"),
            "ord-2".to_string(),
            Direction::Short,
            Price::new(entry),
            4,
            3,
            0,
            rules,
        )
    }

    #[test]
    fn test_price_sanity_holds() {
        let p = long(dec!(50000), rules());

        assert_eq!(evaluate(&config(), &p, fresh(dec!(0)), 0), ExitDecision::Hold);

        let stale = PriceSample {
            price: Price::new(dec!(52500)),
            age: Duration::from_secs(31),
        };
        assert_eq!(evaluate(&config(), &p, stale, 0), ExitDecision::Hold);

        // |u| > 1.0 absurd jump guard.
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(110000)), 0),
            ExitDecision::Hold
        );
    }

    #[test]
    fn test_take_profit_inclusive_boundary() {
        let p = long(dec!(50000), rules());
        // u == tp_pct exactly: fires.
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(52500)), 0),
            ExitDecision::Close(ExitReason::TakeProfit)
        );
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(52499)), 0),
            ExitDecision::Hold
        );
    }

    #[test]
    fn test_stop_loss_inclusive_boundary() {
        let p = long(dec!(50000), rules());
        // u == -sl_pct exactly: fires.
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(48500)), 0),
            ExitDecision::Close(ExitReason::StopLoss)
        );
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(48501)), 0),
            ExitDecision::Hold
        );
    }

    #[test]
    fn test_stop_loss_precedes_profit_exits() {
        // Degenerate rules where both would fire: SL wins.
        let mut r = rules();
        r.tp_pct = dec!(0.000001);
        r.sl_pct = dec!(0.000001);
        let p = short(dec!(2000), r);

        // Price above entry: a loss for the short.
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(2100)), 0),
            ExitDecision::Close(ExitReason::StopLoss)
        );
    }

    #[test]
    fn test_trailing_stop_short_spec_scenario() {
        // Short ETH entry=2000, trailing_distance=0.02.
        // Prices: 1990, 1950 (low watermark), then 1989.5 >= 1950 * 1.02.
        let mut r = rules();
        r.tp_pct = Decimal::ZERO;
        r.sl_pct = Decimal::ZERO;
        r.trailing_enabled = true;
        let mut p = short(dec!(2000), r);

        p.observe_price(Price::new(dec!(1990)));
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(1990)), 0),
            ExitDecision::Hold
        );

        p.observe_price(Price::new(dec!(1950)));
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(1950)), 0),
            ExitDecision::Hold
        );

        p.observe_price(Price::new(dec!(1989.5)));
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(1989.5)), 0),
            ExitDecision::Close(ExitReason::TrailingStop)
        );
    }

    #[test]
    fn test_trailing_not_armed_before_threshold() {
        // Long that never moved more than the arm threshold into profit:
        // a retrace does not trip the trailing stop.
        let mut r = rules();
        r.tp_pct = Decimal::ZERO;
        r.sl_pct = Decimal::ZERO;
        r.trailing_enabled = true;
        let mut p = long(dec!(100), r);

        p.observe_price(Price::new(dec!(100.5))); // +0.5%, arm needs 2%
        p.observe_price(Price::new(dec!(98)));
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(98)), 0),
            ExitDecision::Hold
        );
    }

    #[test]
    fn test_ladder_progression_spec_scenario() {
        // Ladder {step 0.01, close 0.25}, entry=100, 4 contracts.
        let mut r = rules();
        r.tp_pct = Decimal::ZERO;
        r.sl_pct = Decimal::ZERO;
        r.ladder = Some(LadderRules {
            step_pct: dec!(0.01),
            close_pct: dec!(0.25),
        });
        let mut p = long(dec!(100), r);

        // 101 -> tier 1
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(101)), 0),
            ExitDecision::PartialClose {
                fraction: dec!(0.25),
                tier: 1
            }
        );
        p.apply_partial_close(1, 1, dec!(0.25));
        assert_eq!(p.quantity, 3);

        // 102 -> tier 2
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(102)), 0),
            ExitDecision::PartialClose {
                fraction: dec!(0.25),
                tier: 2
            }
        );
        p.apply_partial_close(1, 2, dec!(0.25));
        assert_eq!(p.quantity, 2);

        // 103 -> tier 3
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(103)), 0),
            ExitDecision::PartialClose {
                fraction: dec!(0.25),
                tier: 3
            }
        );
        p.apply_partial_close(1, 3, dec!(0.25));
        assert_eq!(p.quantity, 1);

        // 104 -> tier 4, cumulative would reach 1.0: full close.
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(104)), 0),
            ExitDecision::Close(ExitReason::TakeProfit)
        );
    }

    #[test]
    fn test_ladder_same_tier_does_not_refire() {
        let mut r = rules();
        r.tp_pct = Decimal::ZERO;
        r.sl_pct = Decimal::ZERO;
        r.ladder = Some(LadderRules {
            step_pct: dec!(0.01),
            close_pct: dec!(0.25),
        });
        let mut p = long(dec!(100), r);
        p.apply_partial_close(1, 1, dec!(0.25));

        // Still in tier 1: no action.
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(101.5)), 0),
            ExitDecision::Hold
        );
    }

    #[test]
    fn test_expiry_beats_hold_but_not_stop_loss() {
        let mut r = rules();
        r.max_hold_secs = Some(60);
        let p = long(dec!(50000), r);

        // Held for 61s, flat price: expired.
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(50000)), 61_000),
            ExitDecision::Close(ExitReason::Expired)
        );

        // Held for 61s, at the stop: stop-loss wins.
        assert_eq!(
            evaluate(&config(), &p, fresh(dec!(48500)), 61_000),
            ExitDecision::Close(ExitReason::StopLoss)
        );
    }

    #[test]
    fn test_deterministic() {
        let p = long(dec!(50000), rules());
        let a = evaluate(&config(), &p, fresh(dec!(51000)), 1000);
        let b = evaluate(&config(), &p, fresh(dec!(51000)), 1000);
        assert_eq!(a, b);
    }
}
