//! Time-bounded price cache.
//!
//! Holds the last-known quote per (exchange, symbol) and is the only path
//! through which the engine calls `ExchangeAdapter::fetch_price`, so it
//! also owns the outbound rate limits: one in-flight request per exchange
//! and a global cap on simultaneous exchange calls.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use rust_decimal::Decimal;
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::exchanges::ExchangeAdapter;
use crate::types::{ArbError, ExchangeId, PriceQuote, Symbol};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// A quote younger than this is served without a fetch.
    pub freshness: Duration,
    /// Extra age past `freshness` during which an expired quote is served
    /// if its refetch fails with a connectivity error.
    pub stale_grace: Duration,
    /// Bound on one fetch, including the wait for rate-limit permits.
    pub fetch_timeout: Duration,
    pub max_concurrent_fetches: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            freshness: Duration::from_secs(30),
            stale_grace: Duration::from_secs(60),
            fetch_timeout: Duration::from_secs(15),
            max_concurrent_fetches: 8,
        }
    }
}

type CacheKey = (ExchangeId, Symbol);

#[derive(Debug, Clone)]
struct CacheEntry {
    quote: PriceQuote,
    fetched_at: Instant,
}

// ---------------------------------------------------------------------------
// Cache
// ---------------------------------------------------------------------------

pub struct PriceCache {
    config: CacheConfig,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    global_gate: Semaphore,
    exchange_gates: Mutex<HashMap<ExchangeId, Arc<Semaphore>>>,
    fetches: AtomicU64,
}

impl PriceCache {
    pub fn new(config: CacheConfig) -> Self {
        let permits = config.max_concurrent_fetches.max(1);
        Self {
            config,
            entries: RwLock::new(HashMap::new()),
            global_gate: Semaphore::new(permits),
            exchange_gates: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    /// Return a fresh quote for `symbol` on `adapter`'s exchange, fetching
    /// it if the cached one is missing or older than the freshness window.
    ///
    /// A failed fetch never evicts or overwrites the cached entry. On a
    /// connectivity failure an expired entry still inside the stale grace
    /// period is returned instead of the error.
    pub async fn get(&self, adapter: &dyn ExchangeAdapter, symbol: &Symbol) -> Result<PriceQuote, ArbError> {
        self.get_unless(adapter, symbol, &|_| false).await
    }

    /// Like [`get`](Self::get), but gives up with a connectivity error and
    /// no stale fallback if `skip` holds for the exchange once its permit is
    /// acquired. Queued fetches for an exchange that failed meanwhile never
    /// reach the adapter.
    pub async fn get_unless(
        &self,
        adapter: &dyn ExchangeAdapter,
        symbol: &Symbol,
        skip: &(dyn Fn(&ExchangeId) -> bool + Sync),
    ) -> Result<PriceQuote, ArbError> {
        let key: CacheKey = (adapter.id().clone(), symbol.clone());

        if let Some(quote) = self.lookup(&key, self.config.freshness) {
            debug!(exchange = %key.0, symbol = %key.1, "Cache hit");
            return Ok(quote);
        }

        let result = match tokio::time::timeout(self.config.fetch_timeout, self.fetch_gated(adapter, &key, skip)).await {
            Ok(result) => result,
            Err(_) => Err(ArbError::connectivity(
                &key.0,
                format!("timed out after {}ms", self.config.fetch_timeout.as_millis()),
            )),
        };

        match result {
            Ok(quote) => Ok(quote),
            Err(e) if e.is_connectivity() && !skip(&key.0) => {
                match self.lookup(&key, self.config.freshness + self.config.stale_grace) {
                    Some(stale) => {
                        warn!(exchange = %key.0, symbol = %key.1, error = %e, "Fetch failed, serving stale quote");
                        Ok(stale)
                    }
                    None => Err(e),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Last cached quote regardless of age.
    pub fn peek(&self, exchange: &ExchangeId, symbol: &Symbol) -> Option<PriceQuote> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries
            .get(&(exchange.clone(), symbol.clone()))
            .map(|e| e.quote.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|p| p.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total adapter fetches issued since construction.
    pub fn fetch_count(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }

    /// Drop entries too old to be served even as stale. Returns the number removed.
    pub fn purge_expired(&self) -> usize {
        let max_age = self.config.freshness + self.config.stale_grace;
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.fetched_at.elapsed() < max_age);
        before - entries.len()
    }

    // -- Internal helpers ------------------------------------------------

    fn lookup(&self, key: &CacheKey, max_age: Duration) -> Option<PriceQuote> {
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries
            .get(key)
            .filter(|e| e.fetched_at.elapsed() < max_age)
            .map(|e| e.quote.clone())
    }

    fn exchange_gate(&self, exchange: &ExchangeId) -> Arc<Semaphore> {
        let mut gates = self.exchange_gates.lock().unwrap_or_else(|p| p.into_inner());
        gates
            .entry(exchange.clone())
            .or_insert_with(|| Arc::new(Semaphore::new(1)))
            .clone()
    }

    async fn fetch_gated(
        &self,
        adapter: &dyn ExchangeAdapter,
        key: &CacheKey,
        skip: &(dyn Fn(&ExchangeId) -> bool + Sync),
    ) -> Result<PriceQuote, ArbError> {
        let gate = self.exchange_gate(&key.0);
        let _exchange_permit = gate
            .acquire()
            .await
            .map_err(|_| ArbError::connectivity(&key.0, "rate limiter closed"))?;
        if skip(&key.0) {
            return Err(ArbError::connectivity(&key.0, "skipped after an earlier failure"));
        }
        let _global_permit = self
            .global_gate
            .acquire()
            .await
            .map_err(|_| ArbError::connectivity(&key.0, "rate limiter closed"))?;

        // Another worker may have refreshed this entry while we queued.
        if let Some(quote) = self.lookup(key, self.config.freshness) {
            return Ok(quote);
        }

        self.fetches.fetch_add(1, Ordering::Relaxed);
        let quote = adapter.fetch_price(&key.1).await?;

        if quote.price <= Decimal::ZERO {
            return Err(ArbError::invalid_quote(&key.0, &key.1, format!("non-positive price {}", quote.price)));
        }

        self.store(key, quote.clone());
        Ok(quote)
    }

    /// Replace the entry unless it already holds a newer observation.
    fn store(&self, key: &CacheKey, quote: PriceQuote) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        let entry = CacheEntry {
            quote,
            fetched_at: Instant::now(),
        };
        match entries.get_mut(key) {
            Some(existing) if existing.quote.observed_at > entry.quote.observed_at => {}
            Some(existing) => *existing = entry,
            None => {
                entries.insert(key.clone(), entry);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{d, frozen_time, StubExchange};
    use crate::exchanges::MockExchangeAdapter;
    use std::sync::atomic::AtomicUsize;

    fn cache_with(freshness: Duration) -> PriceCache {
        PriceCache::new(CacheConfig {
            freshness,
            stale_grace: Duration::from_secs(60),
            fetch_timeout: Duration::from_millis(200),
            max_concurrent_fetches: 4,
        })
    }

    fn mock_adapter(name: &'static str) -> MockExchangeAdapter {
        let mut mock = MockExchangeAdapter::new();
        mock.expect_id().return_const(ExchangeId::new(name));
        mock
    }

    #[tokio::test]
    async fn test_two_gets_within_window_fetch_once() {
        let mut mock = mock_adapter("kucoin");
        mock.expect_fetch_price()
            .times(1)
            .returning(|s| PriceQuote::new(ExchangeId::new("kucoin"), s.clone(), d("100")));

        let cache = cache_with(Duration::from_secs(30));
        let sym = Symbol::new("BTC");
        let a = cache.get(&mock, &sym).await.unwrap();
        let b = cache.get(&mock, &sym).await.unwrap();

        assert_eq!(a, b);
        assert_eq!(cache.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_expired_entry_is_refetched() {
        let mut mock = mock_adapter("okx");
        mock.expect_fetch_price()
            .times(2)
            .returning(|s| PriceQuote::new(ExchangeId::new("okx"), s.clone(), d("100")));

        let cache = cache_with(Duration::ZERO);
        let sym = Symbol::new("ETH");
        cache.get(&mock, &sym).await.unwrap();
        cache.get(&mock, &sym).await.unwrap();
        assert_eq!(cache.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_failed_refetch_serves_stale_and_keeps_entry() {
        let calls = AtomicUsize::new(0);
        let mut mock = mock_adapter("bybit");
        mock.expect_fetch_price().times(2).returning(move |s| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                PriceQuote::new(ExchangeId::new("bybit"), s.clone(), d("42"))
            } else {
                Err(ArbError::connectivity(&ExchangeId::new("bybit"), "HTTP 502"))
            }
        });

        let cache = cache_with(Duration::ZERO);
        let sym = Symbol::new("SOL");
        cache.get(&mock, &sym).await.unwrap();
        let stale = cache.get(&mock, &sym).await.unwrap();

        assert_eq!(stale.price, d("42"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_not_masked_by_stale_entry() {
        let calls = AtomicUsize::new(0);
        let mut mock = mock_adapter("htx");
        mock.expect_fetch_price().times(2).returning(move |s| {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                PriceQuote::new(ExchangeId::new("htx"), s.clone(), d("5"))
            } else {
                Err(ArbError::not_found(&ExchangeId::new("htx"), s))
            }
        });

        let cache = cache_with(Duration::ZERO);
        let sym = Symbol::new("LUNA");
        cache.get(&mock, &sym).await.unwrap();
        let err = cache.get(&mock, &sym).await.unwrap_err();
        assert!(matches!(err, ArbError::NotFound { .. }));
        // Entry survives the failure.
        assert!(cache.peek(&ExchangeId::new("htx"), &sym).is_some());
    }

    #[tokio::test]
    async fn test_invalid_quote_is_never_cached() {
        let mut mock = mock_adapter("gateio");
        mock.expect_fetch_price()
            .returning(|s| Err(ArbError::invalid_quote(&ExchangeId::new("gateio"), s, "price 0")));

        let cache = cache_with(Duration::from_secs(30));
        let err = cache.get(&mock, &Symbol::new("XRP")).await.unwrap_err();
        assert!(matches!(err, ArbError::InvalidQuote { .. }));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_slow_exchange_times_out() {
        let slow = StubExchange::new("kucoin")
            .with_price("BTC", "100")
            .with_delay(Duration::from_secs(5));

        let cache = cache_with(Duration::from_secs(30));
        let started = Instant::now();
        let err = cache.get(&slow, &Symbol::new("BTC")).await.unwrap_err();

        assert!(err.is_connectivity());
        assert!(started.elapsed() < Duration::from_secs(2));
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_gets_share_one_fetch() {
        let stub = StubExchange::new("okx")
            .with_price("BTC", "100")
            .with_delay(Duration::from_millis(20));
        let cache = cache_with(Duration::from_secs(30));
        let sym = Symbol::new("BTC");

        let results = futures::future::join_all((0..5).map(|_| cache.get(&stub, &sym))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(stub.fetch_count(), 1);
    }

    #[tokio::test]
    async fn test_skipped_exchange_is_not_fetched_after_permit() {
        let stub = StubExchange::new("okx").with_price("BTC", "100");
        let cache = cache_with(Duration::from_secs(30));

        let err = cache
            .get_unless(&stub, &Symbol::new("BTC"), &|id| id.as_str() == "okx")
            .await
            .unwrap_err();

        assert!(err.is_connectivity());
        assert_eq!(stub.fetch_count(), 0);
        assert_eq!(cache.fetch_count(), 0);
    }

    #[tokio::test]
    async fn test_skipped_exchange_gets_no_stale_quote() {
        let mut mock = mock_adapter("bybit");
        mock.expect_fetch_price()
            .times(1)
            .returning(|s| PriceQuote::new(ExchangeId::new("bybit"), s.clone(), d("42")));

        let cache = cache_with(Duration::ZERO);
        let sym = Symbol::new("SOL");
        cache.get(&mock, &sym).await.unwrap();

        let err = cache.get_unless(&mock, &sym, &|_| true).await.unwrap_err();
        assert!(err.is_connectivity());
    }

    #[test]
    fn test_store_keeps_newer_observation() {
        let cache = cache_with(Duration::from_secs(30));
        let ex = ExchangeId::new("okx");
        let sym = Symbol::new("BTC");
        let key = (ex.clone(), sym.clone());

        let newer = PriceQuote::observed(ex.clone(), sym.clone(), d("101"), frozen_time()).unwrap();
        let older = PriceQuote::observed(
            ex.clone(),
            sym.clone(),
            d("99"),
            frozen_time() - chrono::Duration::seconds(10),
        )
        .unwrap();

        cache.store(&key, newer);
        cache.store(&key, older);
        assert_eq!(cache.peek(&ex, &sym).unwrap().price, d("101"));
    }

    #[test]
    fn test_purge_expired() {
        let cache = PriceCache::new(CacheConfig {
            freshness: Duration::ZERO,
            stale_grace: Duration::ZERO,
            ..CacheConfig::default()
        });
        let ex = ExchangeId::new("okx");
        let sym = Symbol::new("BTC");
        let q = PriceQuote::observed(ex.clone(), sym.clone(), d("1"), frozen_time()).unwrap();
        cache.store(&(ex, sym), q);

        assert_eq!(cache.purge_expired(), 1);
        assert!(cache.is_empty());
    }
}
