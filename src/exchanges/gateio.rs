//! Gate.io spot market data (API v4).
//!
//! API docs: https://www.gate.io/docs/developers/apiv4/#spot
//! Base URL: https://api.gateio.ws
//! Auth: not required for public endpoints.
//! Native symbol format: `BTC_USDT`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::http::{build_client, endpoint, get_json, get_raw, parse_json, parse_price};
use super::{cap_symbols, ExchangeAdapter};
use crate::types::{ArbError, ExchangeId, PriceQuote, Symbol};

const BASE_URL: &str = "https://api.gateio.ws";
const EXCHANGE_NAME: &str = "gateio";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct GateCurrencyPair {
    base: String,
    quote: String,
    #[serde(default)]
    trade_status: String,
}

#[derive(Debug, Deserialize)]
struct GateTicker {
    currency_pair: String,
    last: String,
}

/// Error body: `{ "label": "INVALID_CURRENCY_PAIR", "message": "..." }`.
#[derive(Debug, Deserialize)]
struct GateError {
    label: String,
    #[serde(default)]
    message: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct GateioClient {
    id: ExchangeId,
    http: Client,
    base_url: String,
    max_symbols: Option<usize>,
}

impl GateioClient {
    pub fn new(base_url: Option<&str>, timeout: Duration, max_symbols: Option<usize>) -> Result<Self> {
        Ok(Self {
            id: ExchangeId::new(EXCHANGE_NAME),
            http: build_client(EXCHANGE_NAME, timeout)?,
            base_url: base_url.unwrap_or(BASE_URL).to_string(),
            max_symbols,
        })
    }

    fn native_symbol(symbol: &Symbol) -> String {
        format!("{}_USDT", symbol.base())
    }
}

#[async_trait]
impl ExchangeAdapter for GateioClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn list_spot_symbols(&self) -> Result<HashSet<Symbol>, ArbError> {
        let url = endpoint(&self.base_url, "/api/v4/spot/currency_pairs");
        let pairs: Vec<GateCurrencyPair> = get_json(&self.http, &self.id, &url, &[]).await?;

        let symbols: HashSet<Symbol> = pairs
            .into_iter()
            .filter(|p| p.trade_status == "tradable")
            .filter_map(|p| Symbol::from_pair(&p.base, &p.quote))
            .collect();

        debug!(exchange = EXCHANGE_NAME, count = symbols.len(), "Spot symbols listed");
        Ok(cap_symbols(symbols, self.max_symbols))
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceQuote, ArbError> {
        let url = endpoint(&self.base_url, "/api/v4/spot/tickers");
        let native = Self::native_symbol(symbol);
        let raw = get_raw(&self.http, &self.id, &url, &[("currency_pair", native.as_str())]).await?;

        if !raw.status.is_success() {
            return match parse_json::<GateError>(&self.id, &raw.body) {
                Ok(e) if e.label == "INVALID_CURRENCY_PAIR" => Err(ArbError::not_found(&self.id, symbol)),
                Ok(e) => Err(ArbError::connectivity(&self.id, format!("{}: {}", e.label, e.message))),
                Err(_) => Err(ArbError::connectivity(&self.id, format!("HTTP {}", raw.status))),
            };
        }

        let tickers: Vec<GateTicker> = parse_json(&self.id, &raw.body)?;
        let ticker = tickers
            .into_iter()
            .find(|t| t.currency_pair == native)
            .ok_or_else(|| ArbError::not_found(&self.id, symbol))?;

        let price = parse_price(&self.id, symbol, &ticker.last)?;
        PriceQuote::new(self.id.clone(), symbol.clone(), price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
