//! Synthetic placeholder opportunities.
//!
//! Used only when a scan finds nothing and the caller opted in, so the
//! feature stays demonstrable while exchanges are degraded. Every record
//! produced here carries `is_synthetic = true`.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Mutex;
use tracing::debug;

use crate::types::{ExchangeId, Opportunity, ScanPreferences, Symbol};

/// Approximate reference prices in USDT.
const BASE_PRICES: &[(&str, Decimal)] = &[
    ("BTC", dec!(67000)),
    ("ETH", dec!(3500)),
    ("SOL", dec!(150)),
    ("BNB", dec!(550)),
    ("XRP", dec!(0.55)),
    ("DOGE", dec!(0.12)),
    ("ADA", dec!(0.45)),
];

/// Gross spread band in basis points.
const SPREAD_BPS: std::ops::RangeInclusive<i64> = 80..=250;

pub struct FallbackGenerator {
    rng: Mutex<StdRng>,
}

impl FallbackGenerator {
    pub fn new() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Reproducible output for tests and demos.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Produce one to three synthetic opportunities between `exchanges`,
    /// sized at the caller's trade volume. Thresholds are not applied.
    /// Returns nothing with fewer than two distinct exchanges.
    pub fn generate(&self, exchanges: &[ExchangeId], prefs: &ScanPreferences, fee_pct: Decimal) -> Vec<Opportunity> {
        let mut venues: Vec<ExchangeId> = exchanges.to_vec();
        venues.sort();
        venues.dedup();
        if venues.len() < 2 {
            debug!(venues = venues.len(), "Not enough exchanges for a synthetic pair");
            return Vec::new();
        }

        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        let count = rng.gen_range(1..=3);
        let assets: Vec<&(&str, Decimal)> = BASE_PRICES.choose_multiple(&mut *rng, count).collect();

        let now = Utc::now();
        let keep = Decimal::ONE - fee_pct / dec!(100);
        let volume = if prefs.min_volume > Decimal::ZERO { prefs.min_volume } else { dec!(100) };

        let mut out: Vec<Opportunity> = assets
            .into_iter()
            .filter_map(|(base, reference)| {
                let pair: Vec<&ExchangeId> = venues.choose_multiple(&mut *rng, 2).collect();
                // ±0.5% around the reference price
                let jitter = Decimal::new(rng.gen_range(-50..=50), 4);
                let buy_price = (reference * (Decimal::ONE + jitter)).round_dp(8);
                let gross_spread_pct = Decimal::new(rng.gen_range(SPREAD_BPS), 2);
                let sell_price = (buy_price * (Decimal::ONE + gross_spread_pct / dec!(100))).round_dp(8);
                let estimated_profit_amount = volume
                    .checked_div(buy_price)?
                    .checked_mul(sell_price - buy_price)?
                    .checked_mul(keep)?;

                Some(Opportunity {
                    symbol: Symbol::new(base),
                    buy_exchange: pair[0].clone(),
                    buy_price,
                    sell_exchange: pair[1].clone(),
                    sell_price,
                    gross_spread_pct,
                    fee_adjusted_profit_pct: gross_spread_pct - fee_pct,
                    estimated_profit_amount,
                    trade_volume: volume,
                    timestamp: now,
                    is_synthetic: true,
                })
            })
            .collect();

        out.sort_by(|a, b| b.fee_adjusted_profit_pct.cmp(&a.fee_adjusted_profit_pct));
        out
    }
}

impl Default for FallbackGenerator {
    fn default() -> Self {
        Self::new()
    }
}
