//! Exchange integrations.
//!
//! Defines the `ExchangeAdapter` trait and provides one implementation per
//! supported spot venue:
//! - KuCoin
//! - Bybit (spot category)
//! - OKX
//! - Gate.io
//! - HTX (formerly Huobi)
//!
//! Adapters are chosen by name from configuration in [`build_adapters`].

pub mod bybit;
pub mod gateio;
pub mod htx;
pub mod http;
pub mod kucoin;
pub mod okx;

use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::ExchangeConfig;
use crate::types::{ArbError, ExchangeId, PriceQuote, Symbol};

/// Names accepted in the `[[exchanges]]` configuration list.
pub const SUPPORTED_EXCHANGES: &[&str] = &["kucoin", "bybit", "okx", "gateio", "htx"];

/// Abstraction over a single exchange's spot market data.
///
/// Implementors normalise the venue's listing and ticker endpoints into
/// canonical [`Symbol`]s and [`PriceQuote`]s. Failures are reported per
/// call and never affect other adapters.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Stable identifier of this exchange.
    fn id(&self) -> &ExchangeId;

    /// All spot symbols currently tradeable against the reference currency.
    async fn list_spot_symbols(&self) -> Result<HashSet<Symbol>, ArbError>;

    /// Current last-traded price for `symbol`.
    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceQuote, ArbError>;
}

/// Canonical identifier for a configured exchange name ("huobi" is HTX).
pub fn canonical_id(name: &str) -> ExchangeId {
    let id = ExchangeId::new(name);
    match id.as_str() {
        "huobi" => ExchangeId::new("htx"),
        _ => id,
    }
}

/// Instantiate the enabled adapters, preserving configuration order
/// (which is also the tie-break priority order).
pub fn build_adapters(
    configs: &[ExchangeConfig],
    timeout: Duration,
) -> Result<Vec<Arc<dyn ExchangeAdapter>>> {
    let mut adapters: Vec<Arc<dyn ExchangeAdapter>> = Vec::new();

    for cfg in configs.iter().filter(|c| c.enabled) {
        let base_url = cfg.base_url.as_deref();
        let adapter: Arc<dyn ExchangeAdapter> = match canonical_id(&cfg.name).as_str() {
            "kucoin" => Arc::new(kucoin::KucoinClient::new(base_url, timeout, cfg.max_symbols)?),
            "bybit" => Arc::new(bybit::BybitClient::new(base_url, timeout, cfg.max_symbols)?),
            "okx" => Arc::new(okx::OkxClient::new(base_url, timeout, cfg.max_symbols)?),
            "gateio" => Arc::new(gateio::GateioClient::new(base_url, timeout, cfg.max_symbols)?),
            "htx" => Arc::new(htx::HtxClient::new(base_url, timeout, cfg.max_symbols)?),
            other => {
                warn!(exchange = other, supported = ?SUPPORTED_EXCHANGES, "Unknown exchange in config, skipping");
                continue;
            }
        };
        adapters.push(adapter);
    }

    info!(
        count = adapters.len(),
        exchanges = ?adapters.iter().map(|a| a.id().to_string()).collect::<Vec<_>>(),
        "Exchange adapters initialised"
    );

    Ok(adapters)
}

/// Keep at most `max` symbols from a listing, in canonical order so the
/// cut is stable across reloads.
pub(crate) fn cap_symbols(symbols: HashSet<Symbol>, max: Option<usize>) -> HashSet<Symbol> {
    match max {
        Some(max) if symbols.len() > max => {
            let mut sorted: Vec<Symbol> = symbols.into_iter().collect();
            sorted.sort();
            sorted.truncate(max);
            sorted.into_iter().collect()
        }
        _ => symbols,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
