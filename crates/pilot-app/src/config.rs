//! Application configuration.

use crate::error::{AppError, AppResult};
use pilot_engine::EngineConfig;
use pilot_risk::RiskGateConfig;
use pilot_router::RouterConfig;
use pilot_server::ServerConfig;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database URL.
    #[serde(default = "default_store_url")]
    pub url: String,
}

fn default_store_url() -> String {
    "sqlite://data/pilot.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

/// An instrument preloaded into the dry-run paper exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperInstrument {
    pub symbol: String,
    pub contract_size: Decimal,
    pub price_precision: u32,
    pub size_precision: u32,
    pub min_size: i64,
    pub mark_price: Decimal,
}

/// Dry-run configuration for the built-in paper exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_paper_instruments")]
    pub instruments: Vec<PaperInstrument>,
}

fn default_paper_instruments() -> Vec<PaperInstrument> {
    vec![
        PaperInstrument {
            symbol: "BTC-USDT-SWAP".to_string(),
            contract_size: Decimal::new(1, 2), // 0.01
            price_precision: 1,
            size_precision: 0,
            min_size: 1,
            mark_price: Decimal::from(50000),
        },
        PaperInstrument {
            symbol: "ETH-USDT-SWAP".to_string(),
            contract_size: Decimal::new(1, 1), // 0.1
            price_precision: 2,
            size_precision: 0,
            min_size: 1,
            mark_price: Decimal::from(2000),
        },
    ]
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            instruments: default_paper_instruments(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub risk: RiskGateConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Monitor loop interval in seconds.
    #[serde(default = "default_monitor_interval_secs")]
    pub monitor_interval_secs: u64,
    #[serde(default)]
    pub paper: PaperConfig,
}

fn default_monitor_interval_secs() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            engine: EngineConfig::default(),
            risk: RiskGateConfig::default(),
            router: RouterConfig::default(),
            server: ServerConfig::default(),
            monitor_interval_secs: default_monitor_interval_secs(),
            paper: PaperConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from `PILOT_CONFIG` or the default path,
    /// falling back to defaults when no file exists.
    pub fn load() -> AppResult<Self> {
        let config_path =
            std::env::var("PILOT_CONFIG").unwrap_or_else(|_| "config/default.toml".to_string());

        if Path::new(&config_path).exists() {
            Self::from_file(&config_path)
        } else {
            tracing::warn!(path = %config_path, "Config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Load from a specific file.
    pub fn from_file(path: &str) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::Config(format!("Failed to read config: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AppError::Config(format!("Failed to parse config: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.monitor_interval_secs, 5);
        assert_eq!(config.store.url, "sqlite://data/pilot.db");
        assert_eq!(config.paper.instruments.len(), 2);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml_str = r#"
            monitor_interval_secs = 10

            [store]
            url = "sqlite://tmp/test.db"

            [engine]
            default_leverage = 5
            per_position_quote = "250"

            [risk]
            cooling_period_minutes = 10

            [router]
            enable_symbol_pool = true
            allowed_symbols = ["BTC-USDT-SWAP"]
        "#;
        let config: AppConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.monitor_interval_secs, 10);
        assert_eq!(config.engine.default_leverage, 5);
        assert_eq!(config.engine.per_position_quote, dec!(250));
        // Unspecified sections take defaults.
        assert_eq!(config.engine.default_tp_pct, dec!(0.05));
        assert_eq!(config.risk.cooling_period_minutes, 10);
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.router.allowed_symbols.len(), 1);
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = AppConfig::default();
        let serialized = toml::to_string(&config).unwrap();
        let parsed: AppConfig = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.monitor_interval_secs, config.monitor_interval_secs);
        assert_eq!(parsed.server.port, config.server.port);
    }
}
