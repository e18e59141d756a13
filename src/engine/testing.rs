//! In-memory exchange stub shared by the engine unit tests.

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::exchanges::ExchangeAdapter;
use crate::types::{ArbError, ExchangeId, PriceQuote, Symbol};

/// Fixed observation time so repeated detections compare byte-for-byte.
pub fn frozen_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 1, 1, 12, 0, 0).unwrap()
}

pub fn d(s: &str) -> Decimal {
    Decimal::from_str(s).unwrap()
}

pub struct StubExchange {
    id: ExchangeId,
    listing: Result<HashSet<Symbol>, ArbError>,
    prices: Mutex<HashMap<Symbol, Decimal>>,
    delay: Duration,
    unreachable: bool,
    fetches: AtomicUsize,
}

impl StubExchange {
    pub fn new(name: &str) -> Self {
        Self {
            id: ExchangeId::new(name),
            listing: Ok(HashSet::new()),
            prices: Mutex::new(HashMap::new()),
            delay: Duration::ZERO,
            unreachable: false,
            fetches: AtomicUsize::new(0),
        }
    }

    /// Quote `base/USDT` at `price`; also adds it to the listing.
    pub fn with_price(mut self, base: &str, price: &str) -> Self {
        let symbol = Symbol::new(base);
        if let Ok(listing) = self.listing.as_mut() {
            listing.insert(symbol.clone());
        }
        self.prices.lock().unwrap().insert(symbol, d(price));
        self
    }

    /// List `base/USDT` without quoting it (fetches return NotFound).
    pub fn listing_only(mut self, base: &str) -> Self {
        if let Ok(listing) = self.listing.as_mut() {
            listing.insert(Symbol::new(base));
        }
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Every call fails with a connectivity error.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self.listing = Err(ArbError::connectivity(&self.id, "connection refused"));
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ExchangeAdapter for StubExchange {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn list_spot_symbols(&self) -> Result<HashSet<Symbol>, ArbError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.listing.clone()
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceQuote, ArbError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.unreachable {
            return Err(ArbError::connectivity(&self.id, "connection refused"));
        }
        let price = self
            .prices
            .lock()
            .unwrap()
            .get(symbol)
            .copied()
            .ok_or_else(|| ArbError::not_found(&self.id, symbol))?;
        PriceQuote::observed(self.id.clone(), symbol.clone(), price, frozen_time())
    }
}
