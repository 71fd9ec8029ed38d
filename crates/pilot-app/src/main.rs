//! Pilot trading executor - entry point.
//!
//! Runs the core against the built-in paper exchange (dry run). Live
//! venue adapters implement the same `ExchangeAdapter` contract and are
//! wired in deployment builds.

use anyhow::Result;
use clap::Parser;
use pilot_core::{ContractSpec, Price, Symbol};
use pilot_exchange::PaperExchange;
use std::sync::Arc;
use tracing::info;

/// Signal-driven perpetual-swap trading executor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via PILOT_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    pilot_telemetry::init_logging()?;
    info!("Starting pilot v{}", env!("CARGO_PKG_VERSION"));

    let config = match args.config {
        Some(path) => pilot_app::AppConfig::from_file(&path)?,
        None => pilot_app::AppConfig::load()?,
    };

    // Dry-run venue: immediate fills at the configured marks.
    let (price_tx, price_rx) = tokio::sync::mpsc::channel(1024);
    let exchange = Arc::new(PaperExchange::new(price_tx));
    for instrument in &config.paper.instruments {
        let symbol = Symbol::new(instrument.symbol.clone());
        exchange.set_spec(
            symbol.clone(),
            ContractSpec {
                contract_size: instrument.contract_size,
                price_precision: instrument.price_precision,
                size_precision: instrument.size_precision,
                min_size: instrument.min_size,
            },
        );
        exchange
            .set_mark_price(symbol, Price::new(instrument.mark_price))
            .await;
    }
    info!(
        instruments = config.paper.instruments.len(),
        port = config.server.port,
        "Running against the built-in paper exchange (dry run)"
    );

    let app = pilot_app::Application::new(config);
    app.run(exchange, price_rx).await?;

    Ok(())
}
