//! Latest-value price cache with monotonic age tracking.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use pilot_core::{Price, Symbol};
use pilot_exchange::PriceUpdate;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Latest observed mark price for an instrument.
#[derive(Debug, Clone, Copy)]
pub struct PriceTick {
    pub price: Price,
    /// Exchange timestamp of the tick.
    pub ts: DateTime<Utc>,
    /// Monotonic receive time, for staleness checks immune to clock skew.
    pub recv_mono: Instant,
}

impl PriceTick {
    /// Age since the tick was received.
    pub fn age(&self) -> Duration {
        self.recv_mono.elapsed()
    }

    /// Whether the tick is younger than `max_age`.
    pub fn is_fresh(&self, max_age: Duration) -> bool {
        self.age() < max_age
    }
}

/// Mapping from instrument to its latest mark price.
///
/// Written by exactly one task (the feed reader); read by many.
#[derive(Default)]
pub struct PriceCache {
    ticks: DashMap<Symbol, PriceTick>,
}

impl PriceCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a tick. Called only from the feed task.
    pub fn update(&self, symbol: Symbol, price: Price, ts: DateTime<Utc>) {
        trace!(%symbol, %price, "Price update");
        self.ticks.insert(
            symbol,
            PriceTick {
                price,
                ts,
                recv_mono: Instant::now(),
            },
        );
    }

    /// Latest tick for an instrument, if any has arrived.
    pub fn get(&self, symbol: &Symbol) -> Option<PriceTick> {
        self.ticks.get(symbol).map(|r| *r.value())
    }

    /// Latest tick only if younger than `max_age`.
    pub fn get_fresh(&self, symbol: &Symbol, max_age: Duration) -> Option<PriceTick> {
        self.get(symbol).filter(|t| t.is_fresh(max_age))
    }

    /// Drop the cached tick for an instrument (on unsubscribe).
    pub fn evict(&self, symbol: &Symbol) {
        self.ticks.remove(symbol);
    }

    pub fn len(&self) -> usize {
        self.ticks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ticks.is_empty()
    }
}

/// Drain the adapter's subscription channel into the cache.
///
/// Runs until the channel closes. This task is the cache's only writer.
pub async fn run_price_feed(mut rx: mpsc::Receiver<PriceUpdate>, cache: std::sync::Arc<PriceCache>) {
    debug!("Price feed task started");
    while let Some(update) = rx.recv().await {
        cache.update(update.symbol, update.price, update.ts);
    }
    debug!("Price feed channel closed, feed task terminating");
}
