//! Signal validation and dispatch.

use chrono::Utc;
use pilot_core::{ExitReason, RuleOverrides, SignalAction, Symbol, TradeSignal};
use pilot_engine::{CloseOutcome, EngineError, PositionManager};
use pilot_risk::{GateResult, RiskGates};
use pilot_telemetry::Metrics;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

/// Router configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    /// When enabled, `open` signals must name a whitelisted symbol.
    #[serde(default = "default_true")]
    pub enable_symbol_pool: bool,
    /// The whitelist.
    #[serde(default)]
    pub allowed_symbols: Vec<String>,
}

fn default_true() -> bool {
    true
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            enable_symbol_pool: true,
            allowed_symbols: Vec::new(),
        }
    }
}

/// The answer handed back to HTTP callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalResponse {
    pub success: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl SignalResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn ok_with(message: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

pub struct SignalRouter {
    manager: Arc<PositionManager>,
    gates: Arc<RiskGates>,
    allowed: HashSet<Symbol>,
    enable_symbol_pool: bool,
}

impl SignalRouter {
    pub fn new(
        manager: Arc<PositionManager>,
        gates: Arc<RiskGates>,
        config: RouterConfig,
    ) -> Self {
        let allowed = config
            .allowed_symbols
            .iter()
            .map(|s| Symbol::new(s.clone()))
            .collect();
        Self {
            manager,
            gates,
            allowed,
            enable_symbol_pool: config.enable_symbol_pool,
        }
    }

    /// Validate and dispatch one canonical signal.
    pub async fn dispatch(&self, signal: TradeSignal) -> SignalResponse {
        let action = signal.action;
        let response = self.dispatch_inner(signal).await;
        let outcome = if response.success { "ok" } else { "rejected" };
        Metrics::signal(&action.to_string(), outcome);
        response
    }

    async fn dispatch_inner(&self, signal: TradeSignal) -> SignalResponse {
        if signal.action == SignalAction::Status {
            return self.status().await;
        }

        // Multi-symbol fan-out: one independent per-symbol signal each.
        if let Some(symbols) = &signal.symbols {
            if signal.symbol.is_some() {
                return SignalResponse::fail("signal carries both symbol and symbols");
            }
            if symbols.is_empty() {
                return SignalResponse::fail("symbols list is empty");
            }
            let mut results = Vec::with_capacity(symbols.len());
            let mut failures = 0usize;
            for symbol in symbols.clone() {
                let mut expanded = signal.clone();
                expanded.symbols = None;
                expanded.symbol = Some(symbol.clone());
                // A request id can cover only one order; expansion gets
                // fresh ids per symbol.
                expanded.request_id = None;
                let result = Box::pin(self.dispatch_inner(expanded)).await;
                if !result.success {
                    failures += 1;
                }
                results.push(serde_json::json!({
                    "symbol": symbol,
                    "success": result.success,
                    "message": result.message,
                }));
            }
            let total = results.len();
            return SignalResponse {
                success: failures == 0,
                message: format!("{}/{} symbols succeeded", total - failures, total),
                data: Some(serde_json::Value::Array(results)),
            };
        }

        let Some(symbol) = signal.symbol.clone() else {
            return SignalResponse::fail("missing required field: symbol");
        };

        match signal.action {
            SignalAction::Open => self.handle_open(symbol, signal).await,
            SignalAction::Close => self.handle_close(symbol, signal).await,
            SignalAction::Modify => {
                let overrides = signal.rule_overrides();
                if overrides.is_empty() {
                    return SignalResponse::fail("modify signal carries no rule fields");
                }
                self.handle_modify(symbol, overrides).await
            }
            SignalAction::Tp => {
                let Some(tp) = signal.take_profit_pct else {
                    return SignalResponse::fail("tp signal requires take_profit_pct");
                };
                self.handle_modify(
                    symbol,
                    RuleOverrides {
                        take_profit_pct: Some(tp),
                        ..Default::default()
                    },
                )
                .await
            }
            SignalAction::Sl => {
                let Some(sl) = signal.stop_loss_pct else {
                    return SignalResponse::fail("sl signal requires stop_loss_pct");
                };
                self.handle_modify(
                    symbol,
                    RuleOverrides {
                        stop_loss_pct: Some(sl),
                        ..Default::default()
                    },
                )
                .await
            }
            SignalAction::Status => unreachable!("status handled above"),
        }
    }

    fn symbol_allowed(&self, symbol: &Symbol, override_pool: bool) -> bool {
        !self.enable_symbol_pool || override_pool || self.allowed.contains(symbol)
    }

    async fn handle_open(&self, symbol: Symbol, signal: TradeSignal) -> SignalResponse {
        if signal.direction.is_none() {
            return SignalResponse::fail("open requires a direction");
        }
        if !self.symbol_allowed(&symbol, signal.override_symbol_pool) {
            warn!(%symbol, "Symbol not in allowed pool");
            return SignalResponse::fail(format!("symbol {symbol} not allowed"));
        }

        let open_positions = self.manager.position_count().await;
        match self.gates.check_open(&symbol, open_positions, Utc::now()) {
            GateResult::Pass => {}
            GateResult::Block(reason) => {
                Metrics::gate_blocked(symbol.as_str());
                warn!(%symbol, %reason, "Open blocked by risk gate");
                return SignalResponse::fail(format!("risk gate: {reason}"));
            }
        }

        match self.manager.open(&signal).await {
            Ok(position) => {
                self.gates.record_open(&symbol, Utc::now());
                info!(%symbol, "Open dispatched");
                SignalResponse::ok_with(
                    format!(
                        "opened {} {} @ {}",
                        symbol, position.direction, position.entry_price
                    ),
                    serde_json::json!({
                        "position_id": position.position_id,
                        "entry_price": position.entry_price,
                        "contracts": position.contracts(),
                        "leverage": position.leverage,
                    }),
                )
            }
            Err(e) => engine_failure(&symbol, e),
        }
    }

    async fn handle_close(&self, symbol: Symbol, signal: TradeSignal) -> SignalResponse {
        match self
            .manager
            .close(&symbol, ExitReason::Manual, signal.request_id.clone())
            .await
        {
            Ok(CloseOutcome::Closed { position, .. }) => SignalResponse::ok_with(
                format!(
                    "closed {} @ {}",
                    symbol,
                    position.exit_price.unwrap_or(pilot_core::Price::ZERO)
                ),
                serde_json::json!({
                    "exit_price": position.exit_price,
                    "realized_pnl": position.realized_pnl,
                    "pnl_pct": position.pnl_pct,
                }),
            ),
            // Closing an already-closed symbol is a no-op success:
            // the other side of a close race landed first.
            Ok(CloseOutcome::AlreadyFlat) => {
                SignalResponse::ok(format!("no open position for {symbol} (already closed)"))
            }
            Err(e) => engine_failure(&symbol, e),
        }
    }

    async fn handle_modify(&self, symbol: Symbol, overrides: RuleOverrides) -> SignalResponse {
        match self.manager.modify(&symbol, &overrides).await {
            Ok(position) => SignalResponse::ok_with(
                format!("modified rules for {symbol}"),
                serde_json::json!({ "rules": position.rules }),
            ),
            Err(e) => engine_failure(&symbol, e),
        }
    }

    async fn status(&self) -> SignalResponse {
        let positions = self.manager.snapshot().await;
        let count = positions.len();
        let views: Vec<serde_json::Value> = positions
            .iter()
            .map(|p| {
                serde_json::json!({
                    "symbol": p.symbol,
                    "direction": p.direction,
                    "entry_price": p.entry_price,
                    "quantity": p.quantity,
                    "leverage": p.leverage,
                    "entry_ts": p.entry_ts,
                    "position_id": p.position_id,
                    "rules": p.rules,
                })
            })
            .collect();
        SignalResponse::ok_with(
            format!("{count} open positions"),
            serde_json::json!({ "position_count": count, "positions": views }),
        )
    }

    /// Close every open position; per-symbol outcomes, no abort.
    pub async fn close_all(&self) -> SignalResponse {
        let outcomes = self.manager.close_all(ExitReason::Manual).await;
        if outcomes.is_empty() {
            return SignalResponse::ok("no open positions to close");
        }

        let mut failures = 0usize;
        let results: Vec<serde_json::Value> = outcomes
            .iter()
            .map(|(symbol, result)| match result {
                Ok(CloseOutcome::Closed { position, .. }) => serde_json::json!({
                    "symbol": symbol,
                    "success": true,
                    "realized_pnl": position.realized_pnl,
                }),
                Ok(CloseOutcome::AlreadyFlat) => serde_json::json!({
                    "symbol": symbol,
                    "success": true,
                    "message": "already flat",
                }),
                Err(e) => {
                    failures += 1;
                    serde_json::json!({
                        "symbol": symbol,
                        "success": false,
                        "message": e.to_string(),
                    })
                }
            })
            .collect();

        let total = results.len();
        SignalResponse {
            success: failures == 0,
            message: format!("closed {}/{} positions", total - failures, total),
            data: Some(serde_json::Value::Array(results)),
        }
    }
}

fn engine_failure(symbol: &Symbol, error: EngineError) -> SignalResponse {
    warn!(%symbol, %error, "Engine operation failed");
    SignalResponse::fail(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::{ContractSpec, Direction, Price, UnitType};
    use pilot_engine::EngineConfig;
    use pilot_exchange::PaperExchange;
    use pilot_feed::PriceCache;
    use pilot_risk::RiskGateConfig;
    use pilot_store::PositionStore;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::new("BTC-USDT-SWAP")
    }

    async fn router_with(
        gate_config: RiskGateConfig,
        router_config: RouterConfig,
    ) -> (SignalRouter, Arc<PaperExchange>, Arc<PriceCache>) {
        let (price_tx, _rx) = tokio::sync::mpsc::channel(64);
        let exchange = Arc::new(PaperExchange::new(price_tx));
        exchange.set_spec(
            btc(),
            ContractSpec {
                contract_size: dec!(0.01),
                price_precision: 1,
                size_precision: 0,
                min_size: 1,
            },
        );
        exchange.set_mark_price(btc(), Price::new(dec!(50000))).await;

        let cache = Arc::new(PriceCache::new());
        let store = PositionStore::connect("sqlite::memory:").await.unwrap();
        let gates = Arc::new(RiskGates::new(gate_config));
        let manager = Arc::new(PositionManager::new(
            exchange.clone(),
            store,
            cache.clone(),
            gates.clone(),
            EngineConfig::default(),
        ));
        (
            SignalRouter::new(manager, gates, router_config),
            exchange,
            cache,
        )
    }

    fn open_signal(symbol: Symbol) -> TradeSignal {
        let mut signal = TradeSignal::new(SignalAction::Open, symbol);
        signal.direction = Some(Direction::Long);
        signal.quantity = Some(dec!(1));
        signal.unit_type = Some(UnitType::Contract);
        signal
    }

    #[tokio::test]
    async fn test_whitelist_rejects_unlisted_symbol() {
        let (router, _ex, _cache) = router_with(
            RiskGateConfig::default(),
            RouterConfig {
                enable_symbol_pool: true,
                allowed_symbols: vec!["ETH-USDT-SWAP".to_string()],
            },
        )
        .await;

        let response = router.dispatch(open_signal(btc())).await;
        assert!(!response.success);
        assert!(response.message.contains("not allowed"));
    }

    #[tokio::test]
    async fn test_whitelist_override() {
        let (router, _ex, _cache) = router_with(
            RiskGateConfig::default(),
            RouterConfig {
                enable_symbol_pool: true,
                allowed_symbols: vec![],
            },
        )
        .await;

        let mut signal = open_signal(btc());
        signal.override_symbol_pool = true;
        let response = router.dispatch(signal).await;
        assert!(response.success, "{}", response.message);
    }

    #[tokio::test]
    async fn test_open_requires_direction() {
        let (router, _ex, _cache) =
            router_with(RiskGateConfig::default(), RouterConfig::default()).await;

        let mut signal = open_signal(btc());
        signal.direction = None;
        signal.override_symbol_pool = true;
        let response = router.dispatch(signal).await;
        assert!(!response.success);
        assert!(response.message.contains("direction"));
    }

    #[tokio::test]
    async fn test_cooling_period_gate_blocks_reopen() {
        let (router, _ex, _cache) = router_with(
            RiskGateConfig {
                cooling_period_minutes: 30,
                ..Default::default()
            },
            RouterConfig {
                enable_symbol_pool: false,
                allowed_symbols: vec![],
            },
        )
        .await;

        assert!(router.dispatch(open_signal(btc())).await.success);

        // Close, then immediately reopen: cooling period blocks.
        let close = TradeSignal::new(SignalAction::Close, btc());
        assert!(router.dispatch(close).await.success);

        let response = router.dispatch(open_signal(btc())).await;
        assert!(!response.success);
        assert!(response.message.contains("risk gate"));
    }

    #[tokio::test]
    async fn test_close_when_flat_is_noop_success() {
        let (router, _ex, _cache) =
            router_with(RiskGateConfig::default(), RouterConfig::default()).await;

        let response = router.dispatch(TradeSignal::new(SignalAction::Close, btc())).await;
        assert!(response.success);
        assert!(response.message.contains("no open position"));
    }

    #[tokio::test]
    async fn test_modify_on_unopened_symbol_fails() {
        let (router, _ex, _cache) =
            router_with(RiskGateConfig::default(), RouterConfig::default()).await;

        let mut signal = TradeSignal::new(SignalAction::Modify, btc());
        signal.take_profit_pct = Some(dec!(0.1));
        let response = router.dispatch(signal).await;
        assert!(!response.success);
        assert!(response.message.contains("No open position"));
    }

    #[tokio::test]
    async fn test_tp_shorthand_modifies_rules() {
        let (router, _ex, _cache) = router_with(
            RiskGateConfig::default(),
            RouterConfig {
                enable_symbol_pool: false,
                allowed_symbols: vec![],
            },
        )
        .await;

        router.dispatch(open_signal(btc())).await;

        let mut signal = TradeSignal::new(SignalAction::Tp, btc());
        signal.take_profit_pct = Some(dec!(0.12));
        let response = router.dispatch(signal).await;
        assert!(response.success, "{}", response.message);
    }

    #[tokio::test]
    async fn test_multi_symbol_fan_out_aggregates() {
        let (router, exchange, _cache) = router_with(
            RiskGateConfig::default(),
            RouterConfig {
                enable_symbol_pool: false,
                allowed_symbols: vec![],
            },
        )
        .await;

        let eth = Symbol::new("ETH-USDT-SWAP");
        exchange.set_spec(
            eth.clone(),
            ContractSpec {
                contract_size: dec!(0.1),
                price_precision: 2,
                size_precision: 0,
                min_size: 1,
            },
        );
        exchange.set_mark_price(eth.clone(), Price::new(dec!(2000))).await;

        let mut signal = open_signal(btc());
        signal.symbol = None;
        signal.symbols = Some(vec![btc(), eth]);
        let response = router.dispatch(signal).await;

        assert!(response.success, "{}", response.message);
        assert_eq!(response.message, "2/2 symbols succeeded");
        let data = response.data.unwrap();
        assert_eq!(data.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_status_reports_positions() {
        let (router, _ex, _cache) = router_with(
            RiskGateConfig::default(),
            RouterConfig {
                enable_symbol_pool: false,
                allowed_symbols: vec![],
            },
        )
        .await;

        router.dispatch(open_signal(btc())).await;
        let response = router.dispatch(TradeSignal::new(SignalAction::Status, btc())).await;
        assert!(response.success);
        let data = response.data.unwrap();
        assert_eq!(data["position_count"], 1);
    }

    #[tokio::test]
    async fn test_close_all() {
        let (router, _ex, _cache) = router_with(
            RiskGateConfig::default(),
            RouterConfig {
                enable_symbol_pool: false,
                allowed_symbols: vec![],
            },
        )
        .await;

        router.dispatch(open_signal(btc())).await;
        let response = router.close_all().await;
        assert!(response.success);
        assert_eq!(response.message, "closed 1/1 positions");
    }
}
