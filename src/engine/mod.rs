//! Arbitrage engine: catalog → cached prices → ranked opportunities.
//!
//! [`ArbitrageEngine`] is the facade callers use. It owns the adapters, the
//! shared [`PriceCache`](cache::PriceCache) and the current
//! [`MarketCatalog`](catalog::MarketCatalog) snapshot, and turns one set of
//! [`ScanPreferences`] into a [`ScanReport`].

pub mod cache;
pub mod catalog;
pub mod detector;
pub mod fallback;

#[cfg(test)]
pub(crate) mod testing;

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::exchanges::{canonical_id, ExchangeAdapter};
use crate::types::{ArbError, CatalogStatus, ExchangeId, Opportunity, ScanPreferences, ScanReport};
use cache::{CacheConfig, PriceCache};
use catalog::{CatalogConfig, MarketCatalog};
use detector::{DetectorConfig, OpportunityDetector};
use fallback::FallbackGenerator;

/// Component settings for one engine instance.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub cache: CacheConfig,
    pub catalog: CatalogConfig,
    pub detector: DetectorConfig,
    /// Exchange priority for tie-breaks. Empty means adapter order.
    pub priority: Vec<ExchangeId>,
}

pub struct ArbitrageEngine {
    adapters: Vec<Arc<dyn ExchangeAdapter>>,
    config: EngineConfig,
    cache: PriceCache,
    detector: OpportunityDetector,
    fallback: FallbackGenerator,
    catalog: RwLock<Option<Arc<MarketCatalog>>>,
    last_report: RwLock<Option<ScanReport>>,
}

impl ArbitrageEngine {
    pub fn new(adapters: Vec<Arc<dyn ExchangeAdapter>>, config: EngineConfig) -> Self {
        let priority = if config.priority.is_empty() {
            adapters.iter().map(|a| a.id().clone()).collect()
        } else {
            config.priority.clone()
        };
        Self {
            cache: PriceCache::new(config.cache.clone()),
            detector: OpportunityDetector::new(config.detector.clone(), priority),
            fallback: FallbackGenerator::new(),
            catalog: RwLock::new(None),
            last_report: RwLock::new(None),
            adapters,
            config,
        }
    }

    /// Replace the synthetic generator (seeded generators in tests).
    pub fn with_fallback(mut self, fallback: FallbackGenerator) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn exchanges(&self) -> Vec<ExchangeId> {
        self.adapters.iter().map(|a| a.id().clone()).collect()
    }

    pub fn cache(&self) -> &PriceCache {
        &self.cache
    }

    /// (Re)build the market catalog from every adapter and swap it in.
    /// Scans already running keep the snapshot they started with.
    pub async fn build_catalog(&self) -> CatalogStatus {
        let catalog = MarketCatalog::build(&self.adapters, &self.config.catalog).await;
        let status = catalog.status();
        *self.catalog.write().await = Some(Arc::new(catalog));
        info!(%status, "Catalog ready");
        status
    }

    /// Status of the last catalog build, if any.
    pub async fn catalog_status(&self) -> Option<CatalogStatus> {
        self.catalog.read().await.as_ref().map(|c| c.status())
    }

    /// Most recent completed scan.
    pub async fn last_report(&self) -> Option<ScanReport> {
        self.last_report.read().await.clone()
    }

    /// Run one scan and return only the ranked opportunities.
    pub async fn scan(&self, prefs: &ScanPreferences) -> Vec<Opportunity> {
        match self.scan_report(prefs, &CancellationToken::new()).await {
            Ok(report) => report.opportunities,
            Err(e) => {
                warn!(error = %e, "Scan produced no result");
                Vec::new()
            }
        }
    }

    /// Run one scan. Cancelling `cancel` drops every in-flight fetch and
    /// returns [`ArbError::Cancelled`] without surfacing partial results.
    pub async fn scan_report(
        &self,
        prefs: &ScanPreferences,
        cancel: &CancellationToken,
    ) -> Result<ScanReport, ArbError> {
        let scan_id = Uuid::new_v4();
        let started_at = Utc::now();
        let clock = std::time::Instant::now();
        info!(%scan_id, min_volume = %prefs.min_volume, min_profit_pct = %prefs.min_profit_pct, "Scan started");

        let catalog = self.current_catalog().await;

        let detection = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                warn!(%scan_id, "Scan cancelled");
                return Err(ArbError::Cancelled);
            }
            detection = self.detector.detect(&catalog, &self.cache, &self.adapters, prefs) => detection,
        };

        let (opportunities, synthetic) = if detection.opportunities.is_empty() && prefs.allow_fallback {
            let venues = self.fallback_venues(prefs);
            let generated = self.fallback.generate(&venues, prefs, self.config.detector.fee_pct);
            warn!(%scan_id, count = generated.len(), "No live opportunities, returning synthetic examples");
            (generated, true)
        } else {
            (detection.opportunities, false)
        };

        let purged = self.cache.purge_expired();

        let report = ScanReport {
            scan_id,
            started_at,
            duration_ms: clock.elapsed().as_millis() as u64,
            symbols_sampled: detection.symbols_sampled,
            symbols_compared: detection.symbols_compared,
            symbols_insufficient: detection.symbols_insufficient,
            exchanges_skipped: detection.exchanges_skipped,
            catalog_fallback: catalog.used_fallback(),
            synthetic,
            opportunities,
        };

        info!(
            %scan_id,
            found = report.opportunities.len(),
            synthetic,
            purged,
            duration_ms = report.duration_ms,
            "Scan complete"
        );

        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    // -- Internal helpers ------------------------------------------------

    /// Current catalog snapshot, building it first if nothing has yet.
    async fn current_catalog(&self) -> Arc<MarketCatalog> {
        if let Some(catalog) = self.catalog.read().await.as_ref() {
            return catalog.clone();
        }
        self.build_catalog().await;
        match self.catalog.read().await.as_ref() {
            Some(catalog) => catalog.clone(),
            None => Arc::new(MarketCatalog::empty(self.exchanges(), self.config.catalog.min_exchanges)),
        }
    }

    /// Venues for synthetic examples: the caller's selection if it names at
    /// least two configured exchanges, otherwise every configured one.
    fn fallback_venues(&self, prefs: &ScanPreferences) -> Vec<ExchangeId> {
        let configured = self.exchanges();
        let selected: Vec<ExchangeId> = prefs
            .exchanges
            .iter()
            .map(|n| canonical_id(n))
            .filter(|id| configured.contains(id))
            .collect();
        if selected.len() < 2 {
            return configured;
        }
        selected
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
