//! Prometheus metrics for the pilot trading executor.
//!
//! # Panics
//!
//! Metric registration uses `unwrap()` intentionally. A registration
//! failure indicates a fatal configuration error (duplicate metric
//! names) that should crash at startup, never at runtime.

use once_cell::sync::Lazy;
use prometheus::{
    register_counter_vec, register_histogram, register_int_gauge, CounterVec, Histogram, IntGauge,
};

/// Total signals received, by action and outcome.
pub static SIGNALS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pilot_signals_total",
        "Total trade signals received",
        &["action", "outcome"]
    )
    .unwrap()
});

/// Total positions opened, by symbol.
pub static OPENS_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pilot_positions_opened_total",
        "Total positions opened",
        &["symbol"]
    )
    .unwrap()
});

/// Total positions closed, by symbol and exit reason.
pub static CLOSES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pilot_positions_closed_total",
        "Total positions closed",
        &["symbol", "reason"]
    )
    .unwrap()
});

/// Total ladder partial closes, by symbol.
pub static PARTIAL_CLOSES_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pilot_partial_closes_total",
        "Total ladder partial closes",
        &["symbol"]
    )
    .unwrap()
});

/// Total open-gate blocks, by symbol.
pub static GATE_BLOCKED_TOTAL: Lazy<CounterVec> = Lazy::new(|| {
    register_counter_vec!(
        "pilot_gate_blocked_total",
        "Total risk gate blocks",
        &["symbol"]
    )
    .unwrap()
});

/// Current number of open positions.
pub static OPEN_POSITIONS: Lazy<IntGauge> = Lazy::new(|| {
    register_int_gauge!("pilot_open_positions", "Current open position count").unwrap()
});

/// Monitor tick duration in seconds.
pub static MONITOR_TICK_SECONDS: Lazy<Histogram> = Lazy::new(|| {
    register_histogram!(
        "pilot_monitor_tick_seconds",
        "Monitor loop tick duration in seconds",
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0]
    )
    .unwrap()
});

/// Convenience facade over the metric statics.
pub struct Metrics;

impl Metrics {
    pub fn signal(action: &str, outcome: &str) {
        SIGNALS_TOTAL.with_label_values(&[action, outcome]).inc();
    }

    pub fn position_opened(symbol: &str) {
        OPENS_TOTAL.with_label_values(&[symbol]).inc();
        OPEN_POSITIONS.inc();
    }

    pub fn position_closed(symbol: &str, reason: &str) {
        CLOSES_TOTAL.with_label_values(&[symbol, reason]).inc();
        OPEN_POSITIONS.dec();
    }

    pub fn partial_close(symbol: &str) {
        PARTIAL_CLOSES_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn gate_blocked(symbol: &str) {
        GATE_BLOCKED_TOTAL.with_label_values(&[symbol]).inc();
    }

    pub fn monitor_tick(seconds: f64) {
        MONITOR_TICK_SECONDS.observe(seconds);
    }

    pub fn set_open_positions(count: i64) {
        OPEN_POSITIONS.set(count);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_register_and_increment() {
        Metrics::signal("open", "ok");
        Metrics::position_opened("BTC-USDT-SWAP");
        Metrics::position_closed("BTC-USDT-SWAP", "take_profit");
        Metrics::partial_close("BTC-USDT-SWAP");
        Metrics::gate_blocked("BTC-USDT-SWAP");
        Metrics::monitor_tick(0.002);

        assert!(
            SIGNALS_TOTAL
                .with_label_values(&["open", "ok"])
                .get()
                >= 1.0
        );
    }
}
