//! Mock exchange for integration testing.
//!
//! Provides a deterministic `ExchangeAdapter` implementation whose listing,
//! prices and failure mode are fully controllable from test code. Every
//! quote is stamped with the same fixed time so scan output is repeatable.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use arbhunter::exchanges::ExchangeAdapter;
use arbhunter::types::{ArbError, ExchangeId, PriceQuote, Symbol};

pub fn observed_at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 30, 0).unwrap()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Failure {
    None,
    /// Every call returns a connectivity error at once.
    Refused,
    /// Every call sleeps well past any test timeout.
    Hang,
}

pub struct MockExchange {
    id: ExchangeId,
    listing: Mutex<HashSet<Symbol>>,
    prices: Mutex<HashMap<Symbol, Decimal>>,
    failure: Arc<Mutex<Failure>>,
    fetches: AtomicUsize,
}

impl MockExchange {
    pub fn new(name: &str) -> Self {
        Self {
            id: ExchangeId::new(name),
            listing: Mutex::new(HashSet::new()),
            prices: Mutex::new(HashMap::new()),
            failure: Arc::new(Mutex::new(Failure::None)),
            fetches: AtomicUsize::new(0),
        }
    }

    /// List and quote `base/USDT`.
    pub fn quote(self, base: &str, price: &str) -> Self {
        let symbol = Symbol::new(base);
        self.listing.lock().unwrap().insert(symbol.clone());
        self.prices
            .lock()
            .unwrap()
            .insert(symbol, Decimal::from_str(price).unwrap());
        self
    }

    /// Quote `base/USDT` without listing it.
    pub fn unlisted_quote(self, base: &str, price: &str) -> Self {
        self.prices
            .lock()
            .unwrap()
            .insert(Symbol::new(base), Decimal::from_str(price).unwrap());
        self
    }

    /// List `base/USDT` without a price (fetches answer NotFound).
    pub fn list(self, base: &str) -> Self {
        self.listing.lock().unwrap().insert(Symbol::new(base));
        self
    }

    pub fn failing(self, failure: Failure) -> Self {
        self.set_failure(failure);
        self
    }

    pub fn set_failure(&self, failure: Failure) {
        *self.failure.lock().unwrap() = failure;
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    async fn check(&self) -> Result<(), ArbError> {
        let failure = *self.failure.lock().unwrap();
        match failure {
            Failure::None => Ok(()),
            Failure::Refused => Err(ArbError::connectivity(&self.id, "connection refused")),
            Failure::Hang => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                Err(ArbError::connectivity(&self.id, "hung"))
            }
        }
    }
}

#[async_trait]
impl ExchangeAdapter for MockExchange {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn list_spot_symbols(&self) -> Result<HashSet<Symbol>, ArbError> {
        self.check().await?;
        Ok(self.listing.lock().unwrap().clone())
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceQuote, ArbError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        self.check().await?;
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| ArbError::not_found(&self.id, symbol))?;
        PriceQuote::observed(self.id.clone(), symbol.clone(), price, observed_at())
    }
}
