//! HTX (formerly Huobi) spot market data.
//!
//! API docs: https://www.htx.com/en-us/opend/newApiPages/
//! Base URL: https://api.huobi.pro
//! Auth: not required for market data.
//! Native symbol format: `btcusdt` (lowercase, no separator).

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::http::{build_client, endpoint, get_json, price_from_f64};
use super::{cap_symbols, ExchangeAdapter};
use crate::types::{ArbError, ExchangeId, PriceQuote, Symbol};

const BASE_URL: &str = "https://api.huobi.pro";
const EXCHANGE_NAME: &str = "htx";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Listing envelope: `{ "status": "ok", "data": [...] }`.
#[derive(Debug, Deserialize)]
struct SymbolsResponse {
    status: String,
    #[serde(default)]
    data: Vec<HtxSymbol>,
    #[serde(default, rename = "err-msg")]
    err_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HtxSymbol {
    #[serde(rename = "base-currency")]
    base_currency: String,
    #[serde(rename = "quote-currency")]
    quote_currency: String,
    #[serde(default)]
    state: String,
}

/// Ticker envelope: `{ "status": "ok", "tick": { "close": 67000.1, ... } }`.
#[derive(Debug, Deserialize)]
struct MergedResponse {
    status: String,
    #[serde(default)]
    tick: Option<HtxTick>,
    #[serde(default, rename = "err-code")]
    err_code: Option<String>,
    #[serde(default, rename = "err-msg")]
    err_msg: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HtxTick {
    /// Last traded price (numeric, not a string like other venues).
    close: f64,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct HtxClient {
    id: ExchangeId,
    http: Client,
    base_url: String,
    max_symbols: Option<usize>,
}

impl HtxClient {
    pub fn new(base_url: Option<&str>, timeout: Duration, max_symbols: Option<usize>) -> Result<Self> {
        Ok(Self {
            id: ExchangeId::new(EXCHANGE_NAME),
            http: build_client(EXCHANGE_NAME, timeout)?,
            base_url: base_url.unwrap_or(BASE_URL).to_string(),
            max_symbols,
        })
    }

    fn native_symbol(symbol: &Symbol) -> String {
        format!("{}usdt", symbol.base().to_lowercase())
    }
}

#[async_trait]
impl ExchangeAdapter for HtxClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn list_spot_symbols(&self) -> Result<HashSet<Symbol>, ArbError> {
        let url = endpoint(&self.base_url, "/v1/common/symbols");
        let resp: SymbolsResponse = get_json(&self.http, &self.id, &url, &[]).await?;

        if resp.status != "ok" {
            return Err(ArbError::connectivity(
                &self.id,
                resp.err_msg.unwrap_or_else(|| format!("status {}", resp.status)),
            ));
        }

        let symbols: HashSet<Symbol> = resp
            .data
            .into_iter()
            .filter(|s| s.state == "online")
            .filter_map(|s| Symbol::from_pair(&s.base_currency, &s.quote_currency))
            .collect();

        debug!(exchange = EXCHANGE_NAME, count = symbols.len(), "Spot symbols listed");
        Ok(cap_symbols(symbols, self.max_symbols))
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceQuote, ArbError> {
        let url = endpoint(&self.base_url, "/market/detail/merged");
        let native = Self::native_symbol(symbol);
        let resp: MergedResponse =
            get_json(&self.http, &self.id, &url, &[("symbol", native.as_str())]).await?;

        if resp.status != "ok" {
            // HTX answers unknown symbols with HTTP 200 + "invalid-parameter".
            return match resp.err_code.as_deref() {
                Some("invalid-parameter") | Some("bad-request") => Err(ArbError::not_found(&self.id, symbol)),
                _ => Err(ArbError::connectivity(
                    &self.id,
                    resp.err_msg.unwrap_or_else(|| format!("status {}", resp.status)),
                )),
            };
        }

        let tick = resp.tick.ok_or_else(|| ArbError::not_found(&self.id, symbol))?;
        let price = price_from_f64(&self.id, symbol, tick.close)?;
        PriceQuote::new(self.id.clone(), symbol.clone(), price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
