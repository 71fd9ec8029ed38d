//! Main application orchestration.
//!
//! Wires the store, price cache, gates, position manager, router,
//! reporter, monitor loop, and HTTP server together, then runs until
//! shutdown. The monitor stops first so no new exits are dispatched,
//! in-flight work drains inside a bounded grace window, then the
//! server and the feed stop.

use crate::config::AppConfig;
use crate::error::AppResult;
use pilot_engine::{MonitorLoop, PositionManager};
use pilot_exchange::{ExchangeAdapter, PriceUpdate};
use pilot_feed::{run_price_feed, PriceCache};
use pilot_report::Reporter;
use pilot_risk::RiskGates;
use pilot_router::SignalRouter;
use pilot_server::{run_server, AppState};
use pilot_store::PositionStore;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{error, info, warn};

/// Grace window for draining in-flight operations at shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

pub struct Application {
    config: AppConfig,
}

impl Application {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Run the executor against the given adapter until Ctrl-C.
    ///
    /// `price_rx` is the adapter's mark-price subscription channel; the
    /// feed task spawned here is the price cache's only writer.
    pub async fn run(
        self,
        adapter: Arc<dyn ExchangeAdapter>,
        price_rx: mpsc::Receiver<PriceUpdate>,
    ) -> AppResult<()> {
        let store = PositionStore::connect(&self.config.store.url).await?;
        let cache = Arc::new(PriceCache::new());
        let gates = Arc::new(RiskGates::new(self.config.risk.clone()));
        let manager = Arc::new(PositionManager::new(
            adapter,
            store.clone(),
            cache.clone(),
            gates.clone(),
            self.config.engine.clone(),
        ));

        let feed_handle = tokio::spawn(run_price_feed(price_rx, cache.clone()));

        // Restore positions and resolve any divergence from the last run.
        let restored = manager.hydrate().await?;
        if restored > 0 {
            if let Err(e) = manager.reconcile_all().await {
                warn!(error = %e, "Boot reconciliation incomplete, will retry on demand");
            }
        }

        let router = Arc::new(SignalRouter::new(
            manager.clone(),
            gates,
            self.config.router.clone(),
        ));
        let reporter = Arc::new(Reporter::new(manager.clone(), store, cache));
        let state = AppState { router, reporter };

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let monitor = MonitorLoop::new(
            manager.clone(),
            Duration::from_secs(self.config.monitor_interval_secs),
        );
        let monitor_handle = tokio::spawn(monitor.run(shutdown_rx));

        let server_config = self.config.server.clone();
        let server_handle = tokio::spawn(async move {
            if let Err(e) = run_server(state, server_config).await {
                error!(error = %e, "HTTP server terminated");
            }
        });

        info!("Pilot executor running");
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(e) => error!(error = %e, "Failed to install Ctrl-C handler"),
        }

        // Monitor first, then drain, then the outer surfaces.
        let _ = shutdown_tx.send(true);
        if tokio::time::timeout(SHUTDOWN_GRACE, monitor_handle)
            .await
            .is_err()
        {
            warn!("Monitor did not drain within the grace window");
        }
        server_handle.abort();
        feed_handle.abort();

        info!("Shutdown complete");
        Ok(())
    }
}
