//! The exchange adapter contract.
//!
//! Everything the core needs from a venue: contract specs, leverage
//! configuration, order placement with client-order-id idempotency, mark
//! price snapshots and subscriptions, and position listing for
//! reconciliation.

use crate::error::AdapterResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use pilot_core::{ContractSpec, Direction, Price, RequestId, Symbol};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Order side on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    /// The side that opens a position in `direction`.
    pub fn opening(direction: Direction) -> Self {
        match direction {
            Direction::Long => Self::Buy,
            Direction::Short => Self::Sell,
        }
    }

    /// The side that reduces a position in `direction`.
    pub fn reducing(direction: Direction) -> Self {
        match direction {
            Direction::Long => Self::Sell,
            Direction::Short => Self::Buy,
        }
    }
}

impl fmt::Display for OrderSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Terminal or in-flight order state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Accepted but not yet terminal; poll by order id.
    Pending,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// An order submitted to the venue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub symbol: Symbol,
    pub side: OrderSide,
    /// Position side on hedged venues (long/short leg).
    pub pos_side: Direction,
    /// Positive contract count.
    pub size_contracts: i64,
    /// Limit price; None means market.
    pub price: Option<Price>,
    /// Client order id; the venue must honor it for idempotency.
    pub client_order_id: RequestId,
    /// Reduce-only orders never increase exposure.
    pub reduce_only: bool,
}

/// The venue's answer to an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub order_id: String,
    pub filled_size: i64,
    pub avg_fill_price: Price,
    pub status: OrderStatus,
}

/// A position as the venue sees it, for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangePosition {
    pub symbol: Symbol,
    /// Signed contract count: positive = long.
    pub quantity: i64,
    pub avg_price: Price,
    pub leverage: u32,
}

/// One tick of the mark-price subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceUpdate {
    pub symbol: Symbol,
    pub price: Price,
    pub ts: DateTime<Utc>,
}

/// The venue contract.
///
/// Mark-price updates are delivered out-of-band: concrete adapters are
/// constructed with an `mpsc::Sender<PriceUpdate>` and push a tick per
/// update for every subscribed instrument. The price cache is the only
/// consumer of that channel.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Fetch immutable contract attributes for an instrument.
    async fn get_contract_spec(&self, symbol: &Symbol) -> AdapterResult<ContractSpec>;

    /// Configure leverage for an instrument. Idempotent.
    async fn set_leverage(&self, symbol: &Symbol, leverage: u32) -> AdapterResult<()>;

    /// Place an order. Either returns a terminal fill/cancel or a
    /// `Pending` result that can be polled via `get_order`.
    async fn place_order(&self, request: OrderRequest) -> AdapterResult<OrderResult>;

    /// Poll an order by client order id. `None` means the venue has
    /// never seen the id (the order was lost before acceptance).
    async fn get_order(
        &self,
        symbol: &Symbol,
        client_order_id: &RequestId,
    ) -> AdapterResult<Option<OrderResult>>;

    /// Snapshot the current mark price.
    async fn get_mark_price(&self, symbol: &Symbol) -> AdapterResult<Price>;

    /// Start streaming mark prices for the given instruments.
    async fn subscribe_mark_price(&self, symbols: &[Symbol]) -> AdapterResult<()>;

    /// Stop streaming mark prices for an instrument.
    async fn unsubscribe_mark_price(&self, symbol: &Symbol) -> AdapterResult<()>;

    /// List positions held at the venue, for reconciliation.
    async fn get_positions(&self) -> AdapterResult<Vec<ExchangePosition>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_side_for_direction() {
        assert_eq!(OrderSide::opening(Direction::Long), OrderSide::Buy);
        assert_eq!(OrderSide::opening(Direction::Short), OrderSide::Sell);
        assert_eq!(OrderSide::reducing(Direction::Long), OrderSide::Sell);
        assert_eq!(OrderSide::reducing(Direction::Short), OrderSide::Buy);
    }

    #[test]
    fn test_order_status_terminal() {
        assert!(!OrderStatus::Pending.is_terminal());
        assert!(OrderStatus::Filled.is_terminal());
        assert!(OrderStatus::Cancelled.is_terminal());
    }
}
