//! Position manager: the per-symbol state machine.
//!
//! Maintains a concurrent map `symbol -> slot`, where each slot holds
//! the symbol's state and (possibly) its open position behind an async
//! mutex. Every mutating operation for a symbol runs under that mutex,
//! so operations on the same symbol are totally ordered while different
//! symbols proceed in parallel. Adapter calls happen while the lock is
//! held: order placement is the critical section that defines the
//! position's state.
//!
//! Store writes commit before the in-memory transition is considered
//! final. A timeout on the slow path parks the symbol in `Reconciling`,
//! from which the order (or the venue's position list) is polled before
//! the slot returns to `Idle` or `Open`.

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::sizer::size_order;
use chrono::Utc;
use dashmap::DashMap;
use pilot_core::{
    ContractSpec, Direction, ExitReason, Position, PositionStatus, RequestId, RuleSnapshot,
    Symbol, TradeSignal, UnitType,
};
use pilot_core::LadderRules;
use pilot_exchange::{
    retry_with_backoff, AdapterError, AdapterResult, ExchangeAdapter, OrderRequest, OrderResult,
    OrderSide, OrderStatus,
};
use pilot_feed::PriceCache;
use pilot_risk::{evaluate, EvaluatorConfig, ExitDecision, PriceSample, RiskGates};
use pilot_store::PositionStore;
use pilot_telemetry::Metrics;
use rust_decimal::Decimal;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Per-symbol lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SymbolState {
    /// No position.
    Idle,
    /// Order placed, fill not yet acknowledged.
    Opening,
    /// Confirmed position.
    Open,
    /// Rule-field update in flight.
    Modifying,
    /// Close order placed.
    Closing,
    /// Local belief and venue state possibly divergent.
    Reconciling,
}

#[derive(Debug)]
struct Slot {
    state: SymbolState,
    position: Option<Position>,
}

impl Slot {
    fn idle() -> Self {
        Self {
            state: SymbolState::Idle,
            position: None,
        }
    }
}

/// Result of a close operation.
#[derive(Debug, Clone)]
pub enum CloseOutcome {
    Closed {
        position: Position,
        reason: ExitReason,
    },
    /// The symbol had no open position; closing twice is a no-op.
    AlreadyFlat,
}

/// Remembered outcome for request-id replays.
#[derive(Debug, Clone)]
enum OpOutcome {
    Open(Position),
    Close(CloseOutcome),
}

/// Bound on the replay-outcome map before it is cleared wholesale.
const OUTCOME_CAP: usize = 1024;

/// How long a monitor pass may spend on one symbol.
pub const PER_SYMBOL_TICK_TIMEOUT: Duration = Duration::from_secs(30);

pub struct PositionManager {
    adapter: Arc<dyn ExchangeAdapter>,
    store: PositionStore,
    prices: Arc<PriceCache>,
    gates: Arc<RiskGates>,
    config: EngineConfig,
    eval_config: EvaluatorConfig,
    specs: DashMap<Symbol, ContractSpec>,
    slots: DashMap<Symbol, Arc<Mutex<Slot>>>,
    outcomes: DashMap<RequestId, OpOutcome>,
}

impl PositionManager {
    pub fn new(
        adapter: Arc<dyn ExchangeAdapter>,
        store: PositionStore,
        prices: Arc<PriceCache>,
        gates: Arc<RiskGates>,
        config: EngineConfig,
    ) -> Self {
        let eval_config = EvaluatorConfig {
            max_price_age: config.max_price_age(),
            ..EvaluatorConfig::default()
        };
        Self {
            adapter,
            store,
            prices,
            gates,
            config,
            eval_config,
            specs: DashMap::new(),
            slots: DashMap::new(),
            outcomes: DashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn slot(&self, symbol: &Symbol) -> Arc<Mutex<Slot>> {
        self.slots
            .entry(symbol.clone())
            .or_insert_with(|| Arc::new(Mutex::new(Slot::idle())))
            .clone()
    }

    fn remember(&self, id: RequestId, outcome: OpOutcome) {
        if self.outcomes.len() > OUTCOME_CAP {
            self.outcomes.clear();
        }
        self.outcomes.insert(id, outcome);
    }

    /// Run an adapter call with a per-attempt timeout and bounded retry.
    async fn call_adapter<T, F, Fut>(&self, label: &str, mut f: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = AdapterResult<T>>,
    {
        let timeout = self.config.order_timeout();
        retry_with_backoff(label, || {
            let fut = f();
            async move {
                match tokio::time::timeout(timeout, fut).await {
                    Ok(result) => result,
                    Err(_) => Err(AdapterError::Timeout),
                }
            }
        })
        .await
        .map_err(EngineError::from)
    }

    /// Cached contract spec, fetched once per instrument.
    pub async fn contract_spec(&self, symbol: &Symbol) -> EngineResult<ContractSpec> {
        if let Some(spec) = self.specs.get(symbol) {
            return Ok(spec.clone());
        }
        let spec = self
            .call_adapter("get_contract_spec", || {
                self.adapter.get_contract_spec(symbol)
            })
            .await?;
        self.specs.insert(symbol.clone(), spec.clone());
        Ok(spec)
    }

    /// Resolve the rule snapshot for a new position: signal overrides
    /// win over configured defaults, frozen at open.
    fn resolve_rules(&self, signal: &TradeSignal) -> RuleSnapshot {
        let ladder = match signal.ladder_tp {
            Some(l) if l.enabled => Some(LadderRules {
                step_pct: l.step_pct,
                close_pct: l.close_pct,
            }),
            Some(_) => None,
            None => self.config.default_ladder.and_then(|l| {
                l.enabled.then_some(LadderRules {
                    step_pct: l.step_pct,
                    close_pct: l.close_pct,
                })
            }),
        };
        RuleSnapshot {
            tp_pct: signal.take_profit_pct.unwrap_or(self.config.default_tp_pct),
            sl_pct: signal.stop_loss_pct.unwrap_or(self.config.default_sl_pct),
            trailing_enabled: signal
                .trailing_stop
                .unwrap_or(self.config.default_trailing_stop),
            trailing_distance: signal
                .trailing_distance
                .unwrap_or(self.config.default_trailing_distance),
            ladder,
            max_hold_secs: self.config.max_hold_secs,
        }
    }

    /// Poll a placed order until it reaches a terminal state, on the
    /// retry backoff schedule. `None` means the venue never saw it.
    async fn poll_order(
        &self,
        symbol: &Symbol,
        request_id: &RequestId,
    ) -> Option<OrderResult> {
        for delay in pilot_exchange::retry::BACKOFF_SCHEDULE {
            tokio::time::sleep(delay).await;
            match self
                .call_adapter("get_order", || self.adapter.get_order(symbol, request_id))
                .await
            {
                Ok(Some(result)) if result.status.is_terminal() => return Some(result),
                Ok(_) => continue,
                Err(e) => {
                    warn!(%symbol, error = %e, "Order poll failed");
                    continue;
                }
            }
        }
        None
    }

    /// Open a position. Requires no existing position on the symbol.
    ///
    /// On failure no partial record is persisted and the slot returns
    /// to `Idle`; a lost order response parks the slot in `Reconciling`
    /// until the order's terminal state is known.
    pub async fn open(&self, signal: &TradeSignal) -> EngineResult<Position> {
        let symbol = signal
            .symbol
            .clone()
            .ok_or_else(|| EngineError::InvalidSignal("open requires a symbol".to_string()))?;
        let direction = signal
            .direction
            .ok_or_else(|| EngineError::InvalidSignal("open requires a direction".to_string()))?;
        let request_id = signal.request_id.clone().unwrap_or_default();

        if let Some(outcome) = self.outcomes.get(&request_id) {
            if let OpOutcome::Open(position) = outcome.value() {
                info!(%symbol, %request_id, "Replayed open, returning original position");
                return Ok(position.clone());
            }
        }

        let slot = self.slot(&symbol);
        let mut guard = slot.lock().await;

        if guard.state == SymbolState::Reconciling {
            return Err(EngineError::Reconciling(symbol));
        }
        if guard.position.is_some() {
            return Err(EngineError::PositionExists(symbol));
        }

        let spec = self.contract_spec(&symbol).await?;
        let leverage = signal.leverage.unwrap_or(self.config.default_leverage);
        self.call_adapter("set_leverage", || {
            self.adapter.set_leverage(&symbol, leverage)
        })
        .await?;

        let mark = match self.prices.get_fresh(&symbol, self.config.max_price_age()) {
            Some(tick) => tick.price,
            None => {
                self.call_adapter("get_mark_price", || self.adapter.get_mark_price(&symbol))
                    .await?
            }
        };

        // The optional entry price acts as a limit cap: reject when the
        // current mark is already worse than the cap for this direction.
        let mut limit_price = None;
        if let Some(cap) = signal.entry_price {
            if self.config.entry_cap_enabled {
                let mark_is_worse = match direction {
                    Direction::Long => mark > cap,
                    Direction::Short => mark < cap,
                };
                if mark_is_worse {
                    return Err(EngineError::InvalidSignal(format!(
                        "mark {mark} beyond entry cap {cap} for {direction}"
                    )));
                }
                limit_price = Some(spec.clamp_price(cap));
            }
        }

        let (requested, unit) = match signal.quantity {
            Some(q) => (q, signal.unit_type.unwrap_or_default()),
            None => (
                self.config.per_position_quote * Decimal::from(leverage),
                UnitType::Quote,
            ),
        };
        let contracts = size_order(&spec, requested, unit, mark, self.config.round_up_to_min)?;

        guard.state = SymbolState::Opening;
        let request = OrderRequest {
            symbol: symbol.clone(),
            side: OrderSide::opening(direction),
            pos_side: direction,
            size_contracts: contracts,
            price: limit_price,
            client_order_id: request_id.clone(),
            reduce_only: false,
        };

        let result = match self
            .call_adapter("place_order", || self.adapter.place_order(request.clone()))
            .await
        {
            Ok(result) if result.status == OrderStatus::Filled => result,
            Ok(result) if result.status == OrderStatus::Pending => {
                guard.state = SymbolState::Reconciling;
                match self.poll_order(&symbol, &request_id).await {
                    Some(r) if r.status == OrderStatus::Filled => r,
                    _ => {
                        guard.state = SymbolState::Idle;
                        warn!(%symbol, %request_id, "Open abandoned: order never filled");
                        return Err(EngineError::AdapterTimeout);
                    }
                }
            }
            Ok(_) => {
                guard.state = SymbolState::Idle;
                return Err(EngineError::Adapter(AdapterError::Rejected(
                    "order cancelled".to_string(),
                )));
            }
            Err(EngineError::AdapterTimeout) => {
                // The order may or may not exist at the venue.
                guard.state = SymbolState::Reconciling;
                match self.poll_order(&symbol, &request_id).await {
                    Some(r) if r.status == OrderStatus::Filled => r,
                    _ => {
                        guard.state = SymbolState::Idle;
                        warn!(%symbol, %request_id, "Open abandoned after timeout");
                        return Err(EngineError::AdapterTimeout);
                    }
                }
            }
            Err(e) => {
                guard.state = SymbolState::Idle;
                return Err(e);
            }
        };

        if result.filled_size <= 0 {
            guard.state = SymbolState::Idle;
            return Err(EngineError::Adapter(AdapterError::Rejected(
                "zero fill".to_string(),
            )));
        }

        // Subscribe before arming monitoring. A failed subscription is
        // not fatal: the position exists at the venue, and the monitor
        // skips symbols without prices.
        if let Err(e) = self
            .call_adapter("subscribe_mark_price", || {
                self.adapter.subscribe_mark_price(std::slice::from_ref(&symbol))
            })
            .await
        {
            error!(%symbol, error = %e, "Price subscription failed after fill");
        }

        let position = Position::open(
            symbol.clone(),
            result.order_id.clone(),
            direction,
            result.avg_fill_price,
            result.filled_size,
            leverage,
            Utc::now().timestamp_millis(),
            self.resolve_rules(signal),
        );

        if let Err(e) = self.store.upsert(&position).await {
            // The venue holds a position we failed to record; park the
            // symbol until reconciliation resolves it.
            error!(%symbol, error = %e, "Store write failed after fill");
            guard.state = SymbolState::Reconciling;
            guard.position = Some(position);
            return Err(e.into());
        }

        guard.position = Some(position.clone());
        guard.state = SymbolState::Open;
        drop(guard);

        self.remember(request_id.clone(), OpOutcome::Open(position.clone()));
        Metrics::position_opened(symbol.as_str());
        info!(
            %symbol,
            %direction,
            entry_price = %position.entry_price,
            contracts = position.contracts(),
            leverage,
            position_id = %position.position_id,
            "Position opened"
        );
        Ok(position)
    }

    /// Submit a reduce-only order under the slot lock, with the
    /// timeout-to-reconciling discipline shared by close and
    /// partial-close.
    async fn submit_reduce(
        &self,
        guard: &mut Slot,
        symbol: &Symbol,
        position: &Position,
        contracts: i64,
        request_id: &RequestId,
    ) -> EngineResult<OrderResult> {
        guard.state = SymbolState::Closing;
        let request = OrderRequest {
            symbol: symbol.clone(),
            side: OrderSide::reducing(position.direction),
            pos_side: position.direction,
            size_contracts: contracts,
            price: None,
            client_order_id: request_id.clone(),
            reduce_only: true,
        };

        match self
            .call_adapter("place_order", || self.adapter.place_order(request.clone()))
            .await
        {
            Ok(result) if result.status == OrderStatus::Filled => Ok(result),
            Ok(result) if result.status == OrderStatus::Pending => {
                guard.state = SymbolState::Reconciling;
                match self.poll_order(symbol, request_id).await {
                    Some(r) if r.status == OrderStatus::Filled => Ok(r),
                    Some(_) => {
                        // Terminal but not filled: the position survives.
                        guard.state = SymbolState::Open;
                        Err(EngineError::AdapterTimeout)
                    }
                    None => Err(EngineError::AdapterTimeout),
                }
            }
            Ok(_) => {
                guard.state = SymbolState::Open;
                Err(EngineError::Adapter(AdapterError::Rejected(
                    "reduce order cancelled".to_string(),
                )))
            }
            Err(EngineError::AdapterTimeout) => {
                // Not marked closed until the venue confirms the reduce.
                guard.state = SymbolState::Reconciling;
                match self.poll_order(symbol, request_id).await {
                    Some(r) if r.status == OrderStatus::Filled => Ok(r),
                    Some(_) => {
                        guard.state = SymbolState::Open;
                        Err(EngineError::AdapterTimeout)
                    }
                    None => Err(EngineError::AdapterTimeout),
                }
            }
            Err(e) => {
                guard.state = SymbolState::Open;
                Err(e)
            }
        }
    }

    /// Persist the reconciling status when a reduce ended inconclusive,
    /// so a restart resumes reconciliation instead of trusting the row.
    async fn park_if_reconciling(&self, guard: &mut Slot, symbol: &Symbol, position: &Position) {
        if guard.state != SymbolState::Reconciling {
            return;
        }
        let mut parked = position.clone();
        parked.status = PositionStatus::Reconciling;
        if let Err(e) = self.store.upsert(&parked).await {
            error!(%symbol, error = %e, "Failed to persist reconciling status");
        }
        guard.position = Some(parked);
    }

    /// Close the full position on a symbol.
    ///
    /// Closing a symbol with no open position is a no-op success: a
    /// monitor-initiated close and a manual close race on the lock, and
    /// the loser observes the empty slot.
    pub async fn close(
        &self,
        symbol: &Symbol,
        reason: ExitReason,
        request_id: Option<RequestId>,
    ) -> EngineResult<CloseOutcome> {
        let request_id = request_id.unwrap_or_default();

        if let Some(outcome) = self.outcomes.get(&request_id) {
            if let OpOutcome::Close(close) = outcome.value() {
                info!(%symbol, %request_id, "Replayed close, returning original outcome");
                return Ok(close.clone());
            }
        }

        let slot = self.slot(symbol);
        let mut guard = slot.lock().await;

        if guard.state == SymbolState::Reconciling {
            return Err(EngineError::Reconciling(symbol.clone()));
        }
        let position = match &guard.position {
            Some(p) => p.clone(),
            None => {
                debug!(%symbol, "Close on flat symbol, no-op");
                return Ok(CloseOutcome::AlreadyFlat);
            }
        };

        let spec = self.contract_spec(symbol).await?;
        let result = match self
            .submit_reduce(&mut guard, symbol, &position, position.contracts(), &request_id)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.park_if_reconciling(&mut guard, symbol, &position).await;
                return Err(e);
            }
        };

        let mut closed = position.clone();
        let realized =
            closed.realized_pnl_for(result.avg_fill_price, closed.contracts(), spec.contract_size);
        closed.mark_closed(
            result.avg_fill_price,
            Utc::now().timestamp_millis(),
            realized,
        );

        if let Err(e) = self.store.record_close(&closed, reason).await {
            error!(%symbol, error = %e, "Store write failed after reduce fill");
            guard.state = SymbolState::Reconciling;
            return Err(e.into());
        }

        self.gates.record_realized(realized, Utc::now());

        // Release the price stream; positions are the only subscribers,
        // one per symbol, so nobody else needs it.
        if let Err(e) = self.adapter.unsubscribe_mark_price(symbol).await {
            warn!(%symbol, error = %e, "Unsubscribe failed");
        }
        self.prices.evict(symbol);

        guard.position = None;
        guard.state = SymbolState::Idle;
        drop(guard);

        let outcome = CloseOutcome::Closed {
            position: closed.clone(),
            reason,
        };
        self.remember(request_id, OpOutcome::Close(outcome.clone()));
        Metrics::position_closed(symbol.as_str(), &reason.to_string());
        info!(
            %symbol,
            %reason,
            exit_price = %closed.exit_price.unwrap_or(pilot_core::Price::ZERO),
            realized_pnl = %realized,
            "Position closed"
        );
        Ok(outcome)
    }

    /// Ladder partial close: reduce by `floor(remaining * fraction)`
    /// contracts, at least one. Returns the number of contracts closed.
    pub async fn partial_close(
        &self,
        symbol: &Symbol,
        fraction: Decimal,
        new_tier: u32,
    ) -> EngineResult<i64> {
        use rust_decimal::prelude::ToPrimitive;

        let slot = self.slot(symbol);
        let mut guard = slot.lock().await;

        if guard.state == SymbolState::Reconciling {
            return Err(EngineError::Reconciling(symbol.clone()));
        }
        let position = match &guard.position {
            Some(p) => p.clone(),
            None => return Err(EngineError::NoSuchPosition(symbol.clone())),
        };

        let remaining = position.contracts();
        let closed_contracts = (Decimal::from(remaining) * fraction)
            .floor()
            .to_i64()
            .unwrap_or(0)
            .max(1);

        if closed_contracts >= remaining {
            drop(guard);
            self.close(symbol, ExitReason::TakeProfit, None).await?;
            return Ok(remaining);
        }

        let request_id = RequestId::new();
        let result = match self
            .submit_reduce(&mut guard, symbol, &position, closed_contracts, &request_id)
            .await
        {
            Ok(result) => result,
            Err(e) => {
                self.park_if_reconciling(&mut guard, symbol, &position).await;
                return Err(e);
            }
        };

        let mut updated = position;
        updated.apply_partial_close(result.filled_size, new_tier, fraction);

        if let Err(e) = self.store.upsert(&updated).await {
            error!(%symbol, error = %e, "Store write failed after partial close");
            guard.state = SymbolState::Reconciling;
            guard.position = Some(updated);
            return Err(e.into());
        }

        guard.position = Some(updated.clone());
        guard.state = SymbolState::Open;
        drop(guard);

        Metrics::partial_close(symbol.as_str());
        info!(
            %symbol,
            tier = new_tier,
            closed = result.filled_size,
            remaining = updated.contracts(),
            closed_fraction = %updated.ladder_closed_fraction,
            "Ladder partial close"
        );
        Ok(result.filled_size)
    }

    /// Update the rule snapshot of a live position atomically.
    pub async fn modify(
        &self,
        symbol: &Symbol,
        overrides: &pilot_core::RuleOverrides,
    ) -> EngineResult<Position> {
        let slot = self.slot(symbol);
        let mut guard = slot.lock().await;

        if guard.state == SymbolState::Reconciling {
            return Err(EngineError::Reconciling(symbol.clone()));
        }
        let mut position = match &guard.position {
            Some(p) => p.clone(),
            None => return Err(EngineError::NoSuchPosition(symbol.clone())),
        };

        guard.state = SymbolState::Modifying;
        position.rules.apply(overrides);

        if let Err(e) = self.store.upsert(&position).await {
            guard.state = SymbolState::Open;
            return Err(e.into());
        }

        guard.position = Some(position.clone());
        guard.state = SymbolState::Open;
        info!(%symbol, rules = ?position.rules, "Position rules modified");
        Ok(position)
    }

    /// Close every open position, gathering per-symbol outcomes.
    /// Individual failures do not abort the sweep.
    pub async fn close_all(
        &self,
        reason: ExitReason,
    ) -> Vec<(Symbol, EngineResult<CloseOutcome>)> {
        let symbols = self.open_symbols().await;
        let mut outcomes = Vec::with_capacity(symbols.len());
        for symbol in symbols {
            let result = self.close(&symbol, reason, None).await;
            if let Err(e) = &result {
                warn!(%symbol, error = %e, "close_all: symbol failed");
            }
            outcomes.push((symbol, result));
        }
        outcomes
    }

    /// One monitor pass over a symbol: update watermarks under the lock
    /// and evaluate exit rules. Returns the decision to dispatch, or
    /// None when there is nothing to do (no position, no price).
    pub async fn tick_symbol(&self, symbol: &Symbol) -> Option<ExitDecision> {
        let tick = match self.prices.get(symbol) {
            Some(t) => t,
            None => {
                debug!(%symbol, "Monitor: no price yet, skipping");
                return None;
            }
        };
        if !tick.is_fresh(self.config.max_price_age()) {
            warn!(%symbol, age_ms = tick.age().as_millis() as u64, "Monitor: stale price, skipping");
            return None;
        }

        let slot = self.slot(symbol);
        let mut guard = slot.lock().await;
        if guard.state != SymbolState::Open {
            return None;
        }
        let position = guard.position.as_mut()?;

        position.observe_price(tick.price);
        let decision = evaluate(
            &self.eval_config,
            position,
            PriceSample {
                price: tick.price,
                age: tick.age(),
            },
            Utc::now().timestamp_millis(),
        );
        match decision {
            ExitDecision::Hold => None,
            other => Some(other),
        }
    }

    /// Hydrate from the store at boot and resubscribe price streams.
    /// Returns the number of positions restored.
    pub async fn hydrate(&self) -> EngineResult<usize> {
        let positions = self.store.load_open().await?;
        let count = positions.len();
        let mut symbols = Vec::with_capacity(count);

        for position in positions {
            let state = match position.status {
                PositionStatus::Reconciling => SymbolState::Reconciling,
                _ => SymbolState::Open,
            };
            symbols.push(position.symbol.clone());
            self.slots.insert(
                position.symbol.clone(),
                Arc::new(Mutex::new(Slot {
                    state,
                    position: Some(position),
                })),
            );
        }

        if !symbols.is_empty() {
            if let Err(e) = self
                .call_adapter("subscribe_mark_price", || {
                    self.adapter.subscribe_mark_price(&symbols)
                })
                .await
            {
                error!(error = %e, "Boot resubscription failed");
            }
        }

        Metrics::set_open_positions(count as i64);
        info!(count, "Hydrated positions from store");
        Ok(count)
    }

    /// Resolve every reconciling symbol against the venue's position
    /// list: a matching venue position returns the slot to `Open`; a
    /// flat venue closes the local record at the last known price.
    pub async fn reconcile_all(&self) -> EngineResult<()> {
        let reconciling: Vec<Symbol> = {
            let mut out = Vec::new();
            for entry in self.slots.iter() {
                if let Ok(guard) = entry.value().try_lock() {
                    if guard.state == SymbolState::Reconciling {
                        out.push(entry.key().clone());
                    }
                }
            }
            out
        };
        if reconciling.is_empty() {
            return Ok(());
        }

        let venue_positions = self
            .call_adapter("get_positions", || self.adapter.get_positions())
            .await?;

        for symbol in reconciling {
            let slot = self.slot(&symbol);
            let mut guard = slot.lock().await;
            if guard.state != SymbolState::Reconciling {
                continue;
            }
            let Some(position) = guard.position.clone() else {
                guard.state = SymbolState::Idle;
                continue;
            };

            let venue = venue_positions
                .iter()
                .find(|p| p.symbol == symbol && p.quantity != 0);

            match venue {
                Some(venue) => {
                    let mut restored = position;
                    restored.quantity = venue.quantity;
                    restored.status = PositionStatus::Open;
                    self.store.upsert(&restored).await?;
                    guard.position = Some(restored);
                    guard.state = SymbolState::Open;
                    info!(%symbol, "Reconciled: venue confirms position");
                }
                None => {
                    // Venue is flat: finalize with the best price we have.
                    let exit_price = self
                        .prices
                        .get(&symbol)
                        .map(|t| t.price)
                        .unwrap_or(position.entry_price);
                    let spec = self.contract_spec(&symbol).await?;
                    let mut closed = position.clone();
                    let realized = closed.realized_pnl_for(
                        exit_price,
                        closed.contracts(),
                        spec.contract_size,
                    );
                    closed.mark_closed(exit_price, Utc::now().timestamp_millis(), realized);
                    self.store.record_close(&closed, ExitReason::Forced).await?;
                    self.gates.record_realized(realized, Utc::now());
                    if let Err(e) = self.adapter.unsubscribe_mark_price(&symbol).await {
                        warn!(%symbol, error = %e, "Unsubscribe failed");
                    }
                    self.prices.evict(&symbol);
                    guard.position = None;
                    guard.state = SymbolState::Idle;
                    Metrics::position_closed(symbol.as_str(), "forced");
                    warn!(%symbol, "Reconciled: venue flat, local position force-closed");
                }
            }
        }
        Ok(())
    }

    /// Symbols with a live position.
    pub async fn open_symbols(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        let slots: Vec<(Symbol, Arc<Mutex<Slot>>)> = self
            .slots
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        for (symbol, slot) in slots {
            let guard = slot.lock().await;
            if guard.position.is_some() {
                out.push(symbol);
            }
        }
        out
    }

    /// Consistent snapshot of every live position.
    pub async fn snapshot(&self) -> Vec<Position> {
        let slots: Vec<Arc<Mutex<Slot>>> =
            self.slots.iter().map(|e| e.value().clone()).collect();
        let mut out = Vec::new();
        for slot in slots {
            let guard = slot.lock().await;
            if let Some(position) = &guard.position {
                out.push(position.clone());
            }
        }
        out
    }

    /// Current state of a symbol's slot.
    pub async fn symbol_state(&self, symbol: &Symbol) -> SymbolState {
        let slot = match self.slots.get(symbol) {
            Some(entry) => entry.value().clone(),
            None => return SymbolState::Idle,
        };
        let guard = slot.lock().await;
        guard.state
    }

    /// Number of live positions.
    pub async fn position_count(&self) -> usize {
        self.open_symbols().await.len()
    }
}
