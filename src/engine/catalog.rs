//! Cross-exchange market catalog.
//!
//! Loads each adapter's spot listing and derives the set of symbols listed
//! on enough exchanges to be worth comparing. When no live listing yields
//! a comparable symbol, a fixed set of high-liquidity majors is used and
//! the catalog reports `used_fallback`.

use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::exchanges::ExchangeAdapter;
use crate::types::{ArbError, CatalogStatus, ExchangeId, Symbol};

/// Major pairs used when the live catalog is empty.
pub const FALLBACK_BASES: &[&str] = &["BTC", "ETH", "SOL", "BNB", "XRP"];

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    /// Minimum listing exchanges for a symbol to be comparable.
    pub min_exchanges: usize,
    /// Bound on one adapter's listing call.
    pub list_timeout: Duration,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            min_exchanges: 2,
            list_timeout: Duration::from_secs(15),
        }
    }
}

/// Snapshot of every exchange's spot listing at build time.
#[derive(Debug, Clone)]
pub struct MarketCatalog {
    /// All configured exchanges, in priority order.
    configured: Vec<ExchangeId>,
    listings: BTreeMap<ExchangeId, BTreeSet<Symbol>>,
    failed: Vec<ExchangeId>,
    comparable: BTreeSet<Symbol>,
    used_fallback: bool,
    built_at: DateTime<Utc>,
}

impl MarketCatalog {
    /// Query every adapter's listing concurrently. An adapter that fails or
    /// times out is logged and left out of this build.
    pub async fn build(adapters: &[Arc<dyn ExchangeAdapter>], config: &CatalogConfig) -> Self {
        let configured: Vec<ExchangeId> = adapters.iter().map(|a| a.id().clone()).collect();

        let results = futures::future::join_all(adapters.iter().map(|adapter| async move {
            let id = adapter.id().clone();
            let result = match tokio::time::timeout(config.list_timeout, adapter.list_spot_symbols()).await {
                Ok(result) => result,
                Err(_) => Err(ArbError::connectivity(
                    &id,
                    format!("listing timed out after {}ms", config.list_timeout.as_millis()),
                )),
            };
            (id, result)
        }))
        .await;

        let mut listings = Vec::new();
        let mut failed = Vec::new();
        for (id, result) in results {
            match result {
                Ok(symbols) => {
                    info!(exchange = %id, pairs = symbols.len(), "Spot listing loaded");
                    listings.push((id, symbols));
                }
                Err(e) => {
                    warn!(exchange = %id, error = %e, "Spot listing failed, excluding exchange from catalog");
                    failed.push(id);
                }
            }
        }

        Self::from_listings(configured, listings, failed, config.min_exchanges)
    }

    /// Assemble a catalog from already-fetched listings.
    pub fn from_listings(
        configured: Vec<ExchangeId>,
        listings: Vec<(ExchangeId, HashSet<Symbol>)>,
        failed: Vec<ExchangeId>,
        min_exchanges: usize,
    ) -> Self {
        let listings: BTreeMap<ExchangeId, BTreeSet<Symbol>> = listings
            .into_iter()
            .map(|(id, symbols)| (id, symbols.into_iter().collect()))
            .collect();

        let mut catalog = Self {
            configured,
            listings,
            failed,
            comparable: BTreeSet::new(),
            used_fallback: false,
            built_at: Utc::now(),
        };

        let live = catalog.live_common(min_exchanges);
        if live.is_empty() {
            warn!(
                loaded = catalog.listings.len(),
                error = %ArbError::EmptyCatalog,
                "Using fallback symbol set"
            );
            catalog.comparable = fallback_symbols();
            catalog.used_fallback = true;
        } else {
            catalog.comparable = live;
        }

        info!(
            loaded = catalog.listings.len(),
            failed = catalog.failed.len(),
            comparable = catalog.comparable.len(),
            fallback = catalog.used_fallback,
            "Market catalog built"
        );

        catalog
    }

    /// Catalog used before the first successful build.
    pub fn empty(configured: Vec<ExchangeId>, min_exchanges: usize) -> Self {
        Self::from_listings(configured, Vec::new(), Vec::new(), min_exchanges)
    }

    /// Symbols listed on at least `min_exchanges` loaded exchanges, or the
    /// fallback set if there are none.
    pub fn common_symbols(&self, min_exchanges: usize) -> BTreeSet<Symbol> {
        let live = self.live_common(min_exchanges);
        if live.is_empty() {
            fallback_symbols()
        } else {
            live
        }
    }

    /// Comparable symbols at the catalog's configured minimum.
    pub fn comparable_symbols(&self) -> &BTreeSet<Symbol> {
        &self.comparable
    }

    /// Exchanges to query for `symbol`, in priority order.
    ///
    /// On the fallback set every configured exchange is a candidate, since
    /// the listings that would say otherwise are missing or unusable.
    pub fn exchanges_for(&self, symbol: &Symbol) -> Vec<ExchangeId> {
        if self.used_fallback {
            return self.configured.clone();
        }
        self.configured
            .iter()
            .filter(|id| self.listings.get(*id).is_some_and(|s| s.contains(symbol)))
            .cloned()
            .collect()
    }

    /// Number of loaded exchanges listing `symbol`.
    pub fn listing_count(&self, symbol: &Symbol) -> usize {
        self.listings.values().filter(|s| s.contains(symbol)).count()
    }

    pub fn used_fallback(&self) -> bool {
        self.used_fallback
    }

    pub fn status(&self) -> CatalogStatus {
        CatalogStatus {
            exchanges_loaded: self
                .configured
                .iter()
                .filter(|id| self.listings.contains_key(*id))
                .cloned()
                .collect(),
            exchanges_failed: self.failed.clone(),
            common_symbol_count: self.comparable.len(),
            used_fallback: self.used_fallback,
            built_at: self.built_at,
        }
    }

    fn live_common(&self, min_exchanges: usize) -> BTreeSet<Symbol> {
        let mut counts: HashMap<&Symbol, usize> = HashMap::new();
        for symbols in self.listings.values() {
            for symbol in symbols {
                *counts.entry(symbol).or_insert(0) += 1;
            }
        }
        counts
            .into_iter()
            .filter(|(_, n)| *n >= min_exchanges.max(1))
            .map(|(s, _)| s.clone())
            .collect()
    }
}

pub fn fallback_symbols() -> BTreeSet<Symbol> {
    FALLBACK_BASES.iter().map(|b| Symbol::new(b)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
