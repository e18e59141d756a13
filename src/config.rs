//! Configuration loading from TOML.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Engine tunables have defaults so a minimal file only needs the
//! `[[exchanges]]` list.

use anyhow::{bail, Context, Result};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::fs;
use std::time::Duration;

use crate::engine::cache::CacheConfig;
use crate::engine::catalog::CatalogConfig;
use crate::engine::detector::{DetectorConfig, SampleStrategy};
use crate::engine::EngineConfig;
use crate::exchanges::canonical_id;
use crate::types::{ExchangeId, ScanPreferences};

/// Default config path, overridable with `ARBHUNTER_CONFIG`.
pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub engine: EngineSettings,
    /// Exchanges in priority order (first wins price ties).
    pub exchanges: Vec<ExchangeConfig>,
    /// Default scan parameters for the periodic scan.
    #[serde(default)]
    pub preferences: ScanPreferences,
    #[serde(default)]
    pub dashboard: DashboardConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineSettings {
    /// Maximum age of a cached price before it is refetched.
    pub freshness_secs: u64,
    /// How long an expired quote may still be served when its refetch fails.
    pub stale_grace_secs: u64,
    /// Per-request timeout, including the wait for a rate-limit slot.
    pub fetch_timeout_secs: u64,
    /// Global cap on simultaneous exchange calls.
    pub max_concurrent_fetches: usize,
    /// Round-trip trading + withdrawal fee estimate, in percent.
    pub fee_pct: Decimal,
    pub max_symbols_per_scan: usize,
    pub sample_strategy: SampleStrategy,
    pub top_k: usize,
    /// Minimum number of listing exchanges for a symbol to be comparable.
    pub min_exchanges: usize,
    pub scan_interval_secs: u64,
    pub catalog_refresh_secs: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            freshness_secs: 30,
            stale_grace_secs: 60,
            fetch_timeout_secs: 15,
            max_concurrent_fetches: 8,
            fee_pct: dec!(0.4),
            max_symbols_per_scan: 30,
            sample_strategy: SampleStrategy::Deterministic,
            top_k: 3,
            min_exchanges: 2,
            scan_interval_secs: 30,
            catalog_refresh_secs: 3600,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ExchangeConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Override the venue's public REST base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Keep at most this many listed symbols.
    #[serde(default)]
    pub max_symbols: Option<usize>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
        }
    }
}

fn default_true() -> bool {
    true
}

impl AppConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config = Self::from_toml(&contents)
            .with_context(|| format!("Invalid config file: {path}"))?;
        Ok(config)
    }

    /// Parse and validate configuration from a TOML string.
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents).context("Failed to parse config TOML")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with.
    pub fn validate(&self) -> Result<()> {
        let e = &self.engine;
        if e.freshness_secs == 0 {
            bail!("engine.freshness_secs must be positive");
        }
        if e.fetch_timeout_secs == 0 {
            bail!("engine.fetch_timeout_secs must be positive");
        }
        if e.max_concurrent_fetches == 0 {
            bail!("engine.max_concurrent_fetches must be positive");
        }
        if e.fee_pct < Decimal::ZERO || e.fee_pct >= dec!(100) {
            bail!("engine.fee_pct must be in [0, 100), got {}", e.fee_pct);
        }
        if e.min_exchanges < 2 {
            bail!("engine.min_exchanges must be at least 2");
        }
        if e.top_k == 0 || e.max_symbols_per_scan == 0 {
            bail!("engine.top_k and engine.max_symbols_per_scan must be positive");
        }
        if !self.exchanges.iter().any(|x| x.enabled) {
            bail!("at least one exchange must be enabled");
        }
        Ok(())
    }

    /// Enabled exchanges in priority order.
    pub fn exchange_priority(&self) -> Vec<ExchangeId> {
        self.exchanges
            .iter()
            .filter(|x| x.enabled)
            .map(|x| canonical_id(&x.name))
            .collect()
    }

    /// Map the raw settings onto the engine's component configs.
    pub fn engine_config(&self) -> EngineConfig {
        let e = &self.engine;
        EngineConfig {
            cache: CacheConfig {
                freshness: Duration::from_secs(e.freshness_secs),
                stale_grace: Duration::from_secs(e.stale_grace_secs),
                fetch_timeout: Duration::from_secs(e.fetch_timeout_secs),
                max_concurrent_fetches: e.max_concurrent_fetches,
            },
            catalog: CatalogConfig {
                min_exchanges: e.min_exchanges,
                list_timeout: Duration::from_secs(e.fetch_timeout_secs),
            },
            detector: DetectorConfig {
                fee_pct: e.fee_pct,
                max_symbols: e.max_symbols_per_scan,
                sample_strategy: e.sample_strategy,
                top_k: e.top_k,
            },
            priority: self.exchange_priority(),
        }
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.fetch_timeout_secs)
    }
}
