//! Opportunity detection.
//!
//! For each sampled symbol, gathers one quote per candidate exchange
//! through the price cache, picks the cheapest and dearest legs, and keeps
//! the pair if the fee-adjusted profit clears the caller's thresholds.

use rand::seq::SliceRandom;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::cache::PriceCache;
use super::catalog::MarketCatalog;
use crate::exchanges::{canonical_id, ExchangeAdapter};
use crate::types::{ArbError, ExchangeId, Opportunity, PriceQuote, ScanPreferences, Symbol};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How symbols are picked when the universe exceeds `max_symbols`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleStrategy {
    /// Most widely listed first, then alphabetical.
    Deterministic,
    /// Uniform random sample.
    Random,
}

#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Round-trip fee estimate in percent.
    pub fee_pct: Decimal,
    pub max_symbols: usize,
    pub sample_strategy: SampleStrategy,
    pub top_k: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            fee_pct: dec!(0.4),
            max_symbols: 30,
            sample_strategy: SampleStrategy::Deterministic,
            top_k: 3,
        }
    }
}

/// Outcome of one detection pass.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    /// Ranked and truncated to the effective top-k.
    pub opportunities: Vec<Opportunity>,
    pub symbols_sampled: usize,
    pub symbols_compared: usize,
    pub symbols_insufficient: usize,
    /// Exchanges dropped mid-pass after a connectivity failure, in priority order.
    pub exchanges_skipped: Vec<ExchangeId>,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

pub struct OpportunityDetector {
    config: DetectorConfig,
    /// Tie-break order; earlier wins.
    priority: Vec<ExchangeId>,
}

impl OpportunityDetector {
    pub fn new(config: DetectorConfig, priority: Vec<ExchangeId>) -> Self {
        Self { config, priority }
    }

    /// Compare every sampled symbol across the caller's exchanges.
    pub async fn detect(
        &self,
        catalog: &MarketCatalog,
        cache: &PriceCache,
        adapters: &[Arc<dyn ExchangeAdapter>],
        prefs: &ScanPreferences,
    ) -> Detection {
        let selected = self.selected_exchanges(adapters, prefs);
        let symbols = self.sample(catalog, &selected);
        let skipped: Mutex<HashSet<ExchangeId>> = Mutex::new(HashSet::new());

        debug!(symbols = symbols.len(), exchanges = selected.len(), "Detection pass starting");

        let outcomes = futures::future::join_all(symbols.iter().map(|symbol| {
            let candidates: Vec<&dyn ExchangeAdapter> = catalog
                .exchanges_for(symbol)
                .iter()
                .filter(|id| selected.contains(*id))
                .filter_map(|id| adapters.iter().find(|a| a.id() == id).map(|a| &**a))
                .collect();
            self.compare_symbol(symbol, candidates, cache, &skipped, prefs)
        }))
        .await;

        let mut detection = Detection {
            symbols_sampled: symbols.len(),
            ..Detection::default()
        };
        let mut found = Vec::new();
        for outcome in outcomes {
            match outcome {
                Ok(opportunity) => {
                    detection.symbols_compared += 1;
                    found.extend(opportunity);
                }
                Err(ArbError::InsufficientData { symbol, quotes }) => {
                    debug!(symbol = %symbol, quotes, "Skipping symbol, not enough prices");
                    detection.symbols_insufficient += 1;
                }
                Err(e) => warn!(error = %e, "Symbol comparison failed"),
            }
        }

        let skipped = skipped.into_inner().unwrap_or_else(|p| p.into_inner());
        detection.exchanges_skipped = self.in_priority_order(skipped);
        detection.opportunities = self.rank(found, prefs.top_k.unwrap_or(self.config.top_k));

        info!(
            sampled = detection.symbols_sampled,
            compared = detection.symbols_compared,
            insufficient = detection.symbols_insufficient,
            skipped = detection.exchanges_skipped.len(),
            found = detection.opportunities.len(),
            "Detection pass complete"
        );
        detection
    }

    /// Evaluate one symbol's quotes against the thresholds.
    ///
    /// Returns `InsufficientData` with fewer than two distinct exchanges
    /// holding a positive price, and `Ok(None)` when the best pair does not
    /// qualify.
    pub fn evaluate(
        &self,
        symbol: &Symbol,
        quotes: &[PriceQuote],
        prefs: &ScanPreferences,
    ) -> Result<Option<Opportunity>, ArbError> {
        let mut usable: Vec<&PriceQuote> = Vec::with_capacity(quotes.len());
        for quote in quotes {
            if quote.price > Decimal::ZERO && !usable.iter().any(|q| q.exchange == quote.exchange) {
                usable.push(quote);
            }
        }
        if usable.len() < 2 {
            return Err(ArbError::InsufficientData {
                symbol: symbol.to_string(),
                quotes: usable.len(),
            });
        }

        // Stable sort: on equal prices the higher-priority exchange comes first.
        usable.sort_by_key(|q| self.rank_of(&q.exchange));
        let mut buy = usable[0];
        let mut sell = usable[0];
        for &quote in &usable[1..] {
            if quote.price < buy.price {
                buy = quote;
            }
            if quote.price > sell.price {
                sell = quote;
            }
        }

        if sell.price <= buy.price {
            return Ok(None);
        }

        let Some((gross_spread_pct, estimated_profit_amount)) =
            self.spread_and_profit(buy.price, sell.price, prefs.min_volume)
        else {
            debug!(symbol = %symbol, volume = %prefs.min_volume, "Profit figures overflow, skipping");
            return Ok(None);
        };
        let fee_adjusted_profit_pct = gross_spread_pct - self.config.fee_pct;

        if fee_adjusted_profit_pct < prefs.min_profit_pct || estimated_profit_amount < prefs.min_profit {
            debug!(
                symbol = %symbol,
                net_pct = %fee_adjusted_profit_pct.round_dp(4),
                profit = %estimated_profit_amount.round_dp(4),
                "Below thresholds"
            );
            return Ok(None);
        }

        Ok(Some(Opportunity {
            symbol: symbol.clone(),
            buy_exchange: buy.exchange.clone(),
            buy_price: buy.price,
            sell_exchange: sell.exchange.clone(),
            sell_price: sell.price,
            gross_spread_pct,
            fee_adjusted_profit_pct,
            estimated_profit_amount,
            trade_volume: prefs.min_volume,
            timestamp: buy.observed_at.max(sell.observed_at),
            is_synthetic: false,
        }))
    }

    /// Sort by net percentage, then profit amount, then symbol, and keep `top_k`.
    pub fn rank(&self, mut opportunities: Vec<Opportunity>, top_k: usize) -> Vec<Opportunity> {
        opportunities.sort_by(|a, b| {
            b.fee_adjusted_profit_pct
                .cmp(&a.fee_adjusted_profit_pct)
                .then_with(|| b.estimated_profit_amount.cmp(&a.estimated_profit_amount))
                .then_with(|| a.symbol.cmp(&b.symbol))
        });
        opportunities.truncate(top_k);
        opportunities
    }

    /// Symbols to compare this pass: comparable ones with at least two
    /// candidate exchanges in `selected`, capped at `max_symbols`.
    pub fn sample(&self, catalog: &MarketCatalog, selected: &BTreeSet<ExchangeId>) -> Vec<Symbol> {
        let mut universe: Vec<(usize, Symbol)> = catalog
            .comparable_symbols()
            .iter()
            .filter_map(|symbol| {
                let n = catalog
                    .exchanges_for(symbol)
                    .iter()
                    .filter(|id| selected.contains(*id))
                    .count();
                (n >= 2).then(|| (catalog.listing_count(symbol), symbol.clone()))
            })
            .collect();

        if universe.len() > self.config.max_symbols {
            match self.config.sample_strategy {
                SampleStrategy::Deterministic => {
                    universe.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.cmp(&b.1)));
                    universe.truncate(self.config.max_symbols);
                }
                SampleStrategy::Random => {
                    let mut rng = rand::thread_rng();
                    universe.shuffle(&mut rng);
                    universe.truncate(self.config.max_symbols);
                }
            }
        }

        let mut symbols: Vec<Symbol> = universe.into_iter().map(|(_, s)| s).collect();
        symbols.sort();
        symbols
    }

    // -- Internal helpers ------------------------------------------------

    /// Gross spread in percent and fee-adjusted profit for `volume`, or
    /// `None` if either overflows.
    fn spread_and_profit(&self, buy: Decimal, sell: Decimal, volume: Decimal) -> Option<(Decimal, Decimal)> {
        let diff = sell.checked_sub(buy)?;
        let gross = diff.checked_div(buy)?.checked_mul(dec!(100))?;
        let keep = Decimal::ONE - self.config.fee_pct / dec!(100);
        let profit = volume.checked_div(buy)?.checked_mul(diff)?.checked_mul(keep)?;
        Some((gross, profit))
    }

    /// Caller's exchange subset, restricted to configured adapters.
    fn selected_exchanges(
        &self,
        adapters: &[Arc<dyn ExchangeAdapter>],
        prefs: &ScanPreferences,
    ) -> BTreeSet<ExchangeId> {
        let configured = adapters.iter().map(|a| a.id().clone());
        if prefs.exchanges.is_empty() {
            return configured.collect();
        }
        let wanted: HashSet<ExchangeId> = prefs.exchanges.iter().map(|n| canonical_id(n)).collect();
        configured.filter(|id| wanted.contains(id)).collect()
    }

    async fn compare_symbol(
        &self,
        symbol: &Symbol,
        candidates: Vec<&dyn ExchangeAdapter>,
        cache: &PriceCache,
        skipped: &Mutex<HashSet<ExchangeId>>,
        prefs: &ScanPreferences,
    ) -> Result<Option<Opportunity>, ArbError> {
        let live: Vec<&dyn ExchangeAdapter> = {
            let skipped = skipped.lock().unwrap_or_else(|p| p.into_inner());
            candidates.into_iter().filter(|a| !skipped.contains(a.id())).collect()
        };

        let is_skipped = |id: &ExchangeId| skipped.lock().unwrap_or_else(|p| p.into_inner()).contains(id);
        let skip: &(dyn Fn(&ExchangeId) -> bool + Sync) = &is_skipped;

        // Each fetch marks its exchange the moment it fails, so fetches for
        // other symbols still queued on that exchange give up at once.
        let results = futures::future::join_all(live.iter().map(|adapter| async move {
            let result = cache.get_unless(*adapter, symbol, skip).await;
            if let Err(e) = &result {
                if e.is_connectivity() {
                    let newly = skipped
                        .lock()
                        .unwrap_or_else(|p| p.into_inner())
                        .insert(adapter.id().clone());
                    if newly {
                        warn!(exchange = %adapter.id(), error = %e, "Exchange unreachable, skipping for this scan");
                    }
                }
            }
            result
        }))
        .await;

        let mut quotes = Vec::with_capacity(results.len());
        for (adapter, result) in live.iter().zip(results) {
            match result {
                Ok(quote) => quotes.push(quote),
                Err(e) if e.is_connectivity() => {}
                Err(e @ ArbError::InvalidQuote { .. }) => {
                    warn!(exchange = %adapter.id(), symbol = %symbol, error = %e, "Discarding quote");
                }
                Err(e) => debug!(exchange = %adapter.id(), symbol = %symbol, error = %e, "No quote"),
            }
        }

        self.evaluate(symbol, &quotes, prefs)
    }

    fn rank_of(&self, id: &ExchangeId) -> usize {
        self.priority
            .iter()
            .position(|p| p == id)
            .unwrap_or(self.priority.len())
    }

    fn in_priority_order(&self, ids: HashSet<ExchangeId>) -> Vec<ExchangeId> {
        let mut ids: Vec<ExchangeId> = ids.into_iter().collect();
        ids.sort_by(|a, b| self.rank_of(a).cmp(&self.rank_of(b)).then_with(|| a.cmp(b)));
        ids
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
