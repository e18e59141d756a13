//! KuCoin spot market data.
//!
//! API docs: https://www.kucoin.com/docs/rest/spot-trading/market-data
//! Base URL: https://api.kucoin.com
//! Auth: not required for market data.
//! Native symbol format: `BTC-USDT`.

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::debug;

use super::http::{build_client, endpoint, get_json, parse_price};
use super::{cap_symbols, ExchangeAdapter};
use crate::types::{ArbError, ExchangeId, PriceQuote, Symbol};

const BASE_URL: &str = "https://api.kucoin.com";
const EXCHANGE_NAME: &str = "kucoin";
const SUCCESS_CODE: &str = "200000";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Every KuCoin REST response: `{ "code": "200000", "data": ... }`.
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KucoinSymbol {
    base_currency: String,
    quote_currency: String,
    #[serde(default)]
    enable_trading: bool,
}

/// `/api/v1/market/orderbook/level1` payload. `price` is the last trade.
#[derive(Debug, Deserialize)]
struct KucoinLevel1 {
    #[serde(default)]
    price: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct KucoinClient {
    id: ExchangeId,
    http: Client,
    base_url: String,
    max_symbols: Option<usize>,
}

impl KucoinClient {
    pub fn new(base_url: Option<&str>, timeout: Duration, max_symbols: Option<usize>) -> Result<Self> {
        Ok(Self {
            id: ExchangeId::new(EXCHANGE_NAME),
            http: build_client(EXCHANGE_NAME, timeout)?,
            base_url: base_url.unwrap_or(BASE_URL).to_string(),
            max_symbols,
        })
    }

    fn native_symbol(symbol: &Symbol) -> String {
        format!("{}-USDT", symbol.base())
    }

    fn check_code<T>(&self, envelope: &Envelope<T>) -> Result<(), ArbError> {
        if envelope.code != SUCCESS_CODE {
            return Err(ArbError::connectivity(
                &self.id,
                format!(
                    "API code {}: {}",
                    envelope.code,
                    envelope.msg.as_deref().unwrap_or("no message")
                ),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl ExchangeAdapter for KucoinClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn list_spot_symbols(&self) -> Result<HashSet<Symbol>, ArbError> {
        let url = endpoint(&self.base_url, "/api/v2/symbols");
        let envelope: Envelope<Vec<KucoinSymbol>> = get_json(&self.http, &self.id, &url, &[]).await?;
        self.check_code(&envelope)?;

        let symbols: HashSet<Symbol> = envelope
            .data
            .unwrap_or_default()
            .into_iter()
            .filter(|s| s.enable_trading)
            .filter_map(|s| Symbol::from_pair(&s.base_currency, &s.quote_currency))
            .collect();

        debug!(exchange = EXCHANGE_NAME, count = symbols.len(), "Spot symbols listed");
        Ok(cap_symbols(symbols, self.max_symbols))
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceQuote, ArbError> {
        let url = endpoint(&self.base_url, "/api/v1/market/orderbook/level1");
        let native = Self::native_symbol(symbol);
        let envelope: Envelope<KucoinLevel1> =
            get_json(&self.http, &self.id, &url, &[("symbol", native.as_str())]).await?;
        self.check_code(&envelope)?;

        // Unknown symbols come back as `"data": null` with a success code.
        let raw = envelope
            .data
            .and_then(|d| d.price)
            .ok_or_else(|| ArbError::not_found(&self.id, symbol))?;

        let price = parse_price(&self.id, symbol, &raw)?;
        PriceQuote::new(self.id.clone(), symbol.clone(), price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
