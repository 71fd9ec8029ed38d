//! Monitor loop.
//!
//! A single cooperative task that, every `interval`, snapshots the open
//! symbols, reads the price cache, updates watermarks, evaluates exit
//! rules, and dispatches closes back through the position manager.
//!
//! Ticks are single-flight: a tick completes (with a bounded per-symbol
//! timeout) before the next one begins, so evaluations never overlap.
//! Per-symbol work runs concurrently; each symbol's lock discipline is
//! respected by the manager.

use crate::manager::{PositionManager, PER_SYMBOL_TICK_TIMEOUT};
use futures_util::future::join_all;
use pilot_core::Symbol;
use pilot_risk::ExitDecision;
use pilot_telemetry::Metrics;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Default tick interval.
pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(5);

pub struct MonitorLoop {
    manager: Arc<PositionManager>,
    interval: Duration,
}

impl MonitorLoop {
    pub fn new(manager: Arc<PositionManager>, interval: Duration) -> Self {
        Self { manager, interval }
    }

    /// Run until `shutdown` flips to true. Cancelled first on global
    /// shutdown so no new exits are dispatched while draining.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = self.interval.as_millis() as u64, "Monitor loop started");
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let started = Instant::now();
                    self.tick().await;
                    Metrics::monitor_tick(started.elapsed().as_secs_f64());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("Monitor loop stopped");
    }

    /// One full pass over the open symbols.
    pub async fn tick(&self) {
        // Retry any symbols parked in reconciliation before evaluating.
        if let Err(e) = self.manager.reconcile_all().await {
            warn!(error = %e, "Reconciliation pass failed");
        }

        let symbols = self.manager.open_symbols().await;
        if symbols.is_empty() {
            return;
        }
        debug!(count = symbols.len(), "Monitor tick");

        let passes = symbols.into_iter().map(|symbol| {
            let manager = self.manager.clone();
            async move {
                match tokio::time::timeout(
                    PER_SYMBOL_TICK_TIMEOUT,
                    Self::process_symbol(manager, &symbol),
                )
                .await
                {
                    Ok(()) => {}
                    Err(_) => warn!(%symbol, "Monitor pass timed out"),
                }
            }
        });
        join_all(passes).await;
    }

    async fn process_symbol(manager: Arc<PositionManager>, symbol: &Symbol) {
        let decision = match manager.tick_symbol(symbol).await {
            Some(d) => d,
            None => return,
        };

        match decision {
            ExitDecision::Close(reason) => {
                info!(%symbol, %reason, "Monitor dispatching close");
                if let Err(e) = manager.close(symbol, reason, None).await {
                    warn!(%symbol, error = %e, "Monitor close failed");
                }
            }
            ExitDecision::PartialClose { fraction, tier } => {
                info!(%symbol, %fraction, tier, "Monitor dispatching partial close");
                if let Err(e) = manager.partial_close(symbol, fraction, tier).await {
                    warn!(%symbol, error = %e, "Monitor partial close failed");
                }
            }
            ExitDecision::Hold => {}
        }
    }
}
