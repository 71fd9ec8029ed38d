//! In-process simulated exchange.
//!
//! `PaperExchange` implements the full adapter contract against local
//! state: orders fill immediately at the current mark (or the limit
//! price when no mark is set), client order ids are deduplicated, and
//! mark-price updates are pushed through the subscription channel.
//!
//! Used by the binary's dry-run mode and by integration tests. Failure
//! injection knobs simulate the venue losing the response after
//! accepting an order, which exercises the reconciliation path.

use crate::adapter::{
    ExchangeAdapter, ExchangePosition, OrderRequest, OrderResult, OrderSide, OrderStatus,
    PriceUpdate,
};
use crate::error::{AdapterError, AdapterResult};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use pilot_core::{ContractSpec, Price, RequestId, Symbol};
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// Simulated venue state.
pub struct PaperExchange {
    specs: DashMap<Symbol, ContractSpec>,
    marks: DashMap<Symbol, Price>,
    leverage: DashMap<Symbol, u32>,
    positions: DashMap<Symbol, ExchangePosition>,
    /// Completed orders by client order id, for idempotent replays and polling.
    orders: DashMap<RequestId, OrderResult>,
    subscriptions: parking_lot::Mutex<HashSet<Symbol>>,
    price_tx: mpsc::Sender<PriceUpdate>,
    order_seq: AtomicU64,
    /// While positive, `place_order` fills internally (first call per
    /// order id) but returns `Timeout`, as if the response was lost on
    /// the wire. Decremented per call.
    drop_responses: AtomicU64,
    /// While positive, `place_order` times out without the venue ever
    /// seeing the order. Decremented per call.
    lost_orders: AtomicU64,
}

impl PaperExchange {
    /// Create a paper exchange pushing price ticks into `price_tx`.
    pub fn new(price_tx: mpsc::Sender<PriceUpdate>) -> Self {
        Self {
            specs: DashMap::new(),
            marks: DashMap::new(),
            leverage: DashMap::new(),
            positions: DashMap::new(),
            orders: DashMap::new(),
            subscriptions: parking_lot::Mutex::new(HashSet::new()),
            price_tx,
            order_seq: AtomicU64::new(1),
            drop_responses: AtomicU64::new(0),
            lost_orders: AtomicU64::new(0),
        }
    }

    /// Register a contract spec for an instrument.
    pub fn set_spec(&self, symbol: Symbol, spec: ContractSpec) {
        self.specs.insert(symbol, spec);
    }

    /// Set the mark price; pushes a tick when the instrument is subscribed.
    pub async fn set_mark_price(&self, symbol: Symbol, price: Price) {
        self.marks.insert(symbol.clone(), price);
        let subscribed = self.subscriptions.lock().contains(&symbol);
        if subscribed {
            let _ = self
                .price_tx
                .send(PriceUpdate {
                    symbol,
                    price,
                    ts: Utc::now(),
                })
                .await;
        }
    }

    /// Arm the lost-response simulation for the next `count` calls:
    /// orders fill but their responses are lost.
    pub fn drop_order_responses(&self, count: u64) {
        self.drop_responses.store(count, Ordering::SeqCst);
    }

    /// Arm the lost-order simulation for the next `count` calls: orders
    /// time out and the venue never sees them.
    pub fn lose_orders(&self, count: u64) {
        self.lost_orders.store(count, Ordering::SeqCst);
    }

    /// Current leverage setting for an instrument, if configured.
    pub fn leverage_of(&self, symbol: &Symbol) -> Option<u32> {
        self.leverage.get(symbol).map(|r| *r)
    }

    fn next_order_id(&self) -> String {
        format!("paper-{}", self.order_seq.fetch_add(1, Ordering::SeqCst))
    }

    fn apply_fill(&self, request: &OrderRequest, fill_price: Price) {
        let delta = match request.side {
            OrderSide::Buy => request.size_contracts,
            OrderSide::Sell => -request.size_contracts,
        };

        let mut entry = self
            .positions
            .entry(request.symbol.clone())
            .or_insert_with(|| ExchangePosition {
                symbol: request.symbol.clone(),
                quantity: 0,
                avg_price: fill_price,
                leverage: self.leverage.get(&request.symbol).map(|r| *r).unwrap_or(1),
            });

        let pos = entry.value_mut();
        if pos.quantity == 0 || pos.quantity.signum() == delta.signum() {
            pos.avg_price = fill_price;
        }
        pos.quantity += delta;
        if pos.quantity == 0 {
            drop(entry);
            self.positions.remove(&request.symbol);
        }
    }
}

#[async_trait]
impl ExchangeAdapter for PaperExchange {
    async fn get_contract_spec(&self, symbol: &Symbol) -> AdapterResult<ContractSpec> {
        self.specs
            .get(symbol)
            .map(|r| r.clone())
            .ok_or_else(|| AdapterError::UnknownSymbol(symbol.to_string()))
    }

    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> AdapterResult<()> {
        self.leverage.insert(symbol.clone(), leverage);
        Ok(())
    }

    async fn place_order(&self, request: OrderRequest) -> AdapterResult<OrderResult> {
        if self.lost_orders.load(Ordering::SeqCst) > 0 {
            self.lost_orders.fetch_sub(1, Ordering::SeqCst);
            debug!(cloid = %request.client_order_id, "Simulating lost order");
            return Err(AdapterError::Timeout);
        }

        let drop_response = if self.drop_responses.load(Ordering::SeqCst) > 0 {
            self.drop_responses.fetch_sub(1, Ordering::SeqCst);
            true
        } else {
            false
        };

        // Idempotent replay: the venue honors client order ids.
        if let Some(existing) = self.orders.get(&request.client_order_id) {
            if drop_response {
                return Err(AdapterError::Timeout);
            }
            debug!(cloid = %request.client_order_id, "Replayed order, returning original result");
            return Ok(existing.clone());
        }

        if request.size_contracts <= 0 {
            return Err(AdapterError::Rejected("non-positive size".to_string()));
        }

        let fill_price = match self.marks.get(&request.symbol).map(|r| *r).or(request.price) {
            Some(p) => p,
            None => {
                return Err(AdapterError::Rejected(format!(
                    "no price for {}",
                    request.symbol
                )))
            }
        };

        self.apply_fill(&request, fill_price);

        let result = OrderResult {
            order_id: self.next_order_id(),
            filled_size: request.size_contracts,
            avg_fill_price: fill_price,
            status: OrderStatus::Filled,
        };
        self.orders
            .insert(request.client_order_id.clone(), result.clone());

        if drop_response {
            debug!(cloid = %request.client_order_id, "Simulating lost order response");
            return Err(AdapterError::Timeout);
        }

        Ok(result)
    }

    async fn get_order(
        &self,
        _symbol: &Symbol,
        client_order_id: &RequestId,
    ) -> AdapterResult<Option<OrderResult>> {
        Ok(self.orders.get(client_order_id).map(|r| r.clone()))
    }

    async fn get_mark_price(&self, symbol: &Symbol) -> AdapterResult<Price> {
        self.marks
            .get(symbol)
            .map(|r| *r)
            .ok_or_else(|| AdapterError::UnknownSymbol(symbol.to_string()))
    }

    async fn subscribe_mark_price(&self, symbols: &[Symbol]) -> AdapterResult<()> {
        let mut subs = self.subscriptions.lock();
        for symbol in symbols {
            subs.insert(symbol.clone());
        }
        Ok(())
    }

    async fn unsubscribe_mark_price(&self, symbol: &Symbol) -> AdapterResult<()> {
        self.subscriptions.lock().remove(symbol);
        Ok(())
    }

    async fn get_positions(&self) -> AdapterResult<Vec<ExchangePosition>> {
        Ok(self.positions.iter().map(|r| r.value().clone()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pilot_core::Direction;
    use rust_decimal_macros::dec;

    fn btc() -> Symbol {
        Symbol::new("BTC-USDT-SWAP")
    }

    fn paper() -> (PaperExchange, mpsc::Receiver<PriceUpdate>) {
        let (tx, rx) = mpsc::channel(16);
        let ex = PaperExchange::new(tx);
        ex.set_spec(
            btc(),
            ContractSpec {
                contract_size: dec!(0.01),
                price_precision: 1,
                size_precision: 0,
                min_size: 1,
            },
        );
        (ex, rx)
    }

    fn open_request(cloid: RequestId) -> OrderRequest {
        OrderRequest {
            symbol: btc(),
            side: OrderSide::Buy,
            pos_side: Direction::Long,
            size_contracts: 2,
            price: None,
            client_order_id: cloid,
            reduce_only: false,
        }
    }

    #[tokio::test]
    async fn test_fill_at_mark_and_position_tracking() {
        let (ex, _rx) = paper();
        ex.set_mark_price(btc(), Price::new(dec!(50000))).await;

        let result = ex.place_order(open_request(RequestId::new())).await.unwrap();
        assert_eq!(result.status, OrderStatus::Filled);
        assert_eq!(result.avg_fill_price, Price::new(dec!(50000)));

        let positions = ex.get_positions().await.unwrap();
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_duplicate_client_order_id_is_idempotent() {
        let (ex, _rx) = paper();
        ex.set_mark_price(btc(), Price::new(dec!(50000))).await;

        let cloid = RequestId::new();
        let first = ex.place_order(open_request(cloid.clone())).await.unwrap();
        let second = ex.place_order(open_request(cloid)).await.unwrap();

        assert_eq!(first, second);
        // Only one fill applied.
        assert_eq!(ex.get_positions().await.unwrap()[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_lost_response_still_fills() {
        let (ex, _rx) = paper();
        ex.set_mark_price(btc(), Price::new(dec!(50000))).await;
        ex.drop_order_responses(1);

        let cloid = RequestId::new();
        let err = ex.place_order(open_request(cloid.clone())).await.unwrap_err();
        assert!(matches!(err, AdapterError::Timeout));

        // The order went through: poll sees it, position exists.
        let polled = ex.get_order(&btc(), &cloid).await.unwrap().unwrap();
        assert_eq!(polled.status, OrderStatus::Filled);
        assert_eq!(ex.get_positions().await.unwrap()[0].quantity, 2);
    }

    #[tokio::test]
    async fn test_subscription_pushes_ticks() {
        let (ex, mut rx) = paper();
        ex.subscribe_mark_price(&[btc()]).await.unwrap();
        ex.set_mark_price(btc(), Price::new(dec!(51000))).await;

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.symbol, btc());
        assert_eq!(tick.price, Price::new(dec!(51000)));

        ex.unsubscribe_mark_price(&btc()).await.unwrap();
        ex.set_mark_price(btc(), Price::new(dec!(52000))).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_reducing_fill_closes_position() {
        let (ex, _rx) = paper();
        ex.set_mark_price(btc(), Price::new(dec!(50000))).await;
        ex.place_order(open_request(RequestId::new())).await.unwrap();

        let close = OrderRequest {
            symbol: btc(),
            side: OrderSide::Sell,
            pos_side: Direction::Long,
            size_contracts: 2,
            price: None,
            client_order_id: RequestId::new(),
            reduce_only: true,
        };
        ex.place_order(close).await.unwrap();

        assert!(ex.get_positions().await.unwrap().is_empty());
    }
}
