//! Bybit spot market data (V5 unified API).
//!
//! API docs: https://bybit-exchange.github.io/docs/v5/market/tickers
//! Base URL: https://api.bybit.com
//! Auth: not required for market data.
//! Native symbol format: `BTCUSDT`.

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

const BASE_URL: &str = "https://api.bybit.com";
const EXCHANGE_NAME: &str = "bybit";

/// `retCode` for "Not supported symbols" / "params error: symbol invalid".
const INVALID_SYMBOL_CODE: i64 = 10001;

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope<T> {
    ret_code: i64,
    #[serde(default)]
    ret_msg: String,
    result: Option<ListResult<T>>,
}

#[derive(Debug, Deserialize)]
struct ListResult<T> {
    #[serde(default = "Vec::new")]
    list: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitInstrument {
    base_coin: String,
    quote_coin: String,
    #[serde(default)]
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BybitTicker {
    symbol: String,
    last_price: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct BybitClient {
    id: ExchangeId,
    http: Client,
    base_url: String,
    max_symbols: Option<usize>,
}

impl BybitClient {
    pub fn new(base_url: Option<&str>, timeout: Duration, max_symbols: Option<usize>) -> Result<Self> {
        Ok(Self {
            id: ExchangeId::new(EXCHANGE_NAME),
            http: build_client(EXCHANGE_NAME, timeout)?,
            base_url: base_url.unwrap_or(BASE_URL).to_string(),
            max_symbols,
        })
    }

    fn native_symbol(symbol: &Symbol) -> String {
        format!("{}USDT", symbol.base())
    }
}

#[async_trait]
impl ExchangeAdapter for BybitClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn list_spot_symbols(&self) -> Result<HashSet<Symbol>, ArbError> {
        let url = endpoint(&self.base_url, "/v5/market/instruments-info");
        let envelope: Envelope<BybitInstrument> =
            get_json(&self.http, &self.id, &url, &[("category", "spot")]).await?;

        if envelope.ret_code != 0 {
            return Err(ArbError::connectivity(
                &self.id,
                format!("retCode {}: {}", envelope.ret_code, envelope.ret_msg),
            ));
        }

        let symbols: HashSet<Symbol> = envelope
            .result
            .map(|r| r.list)
            .unwrap_or_default()
            .into_iter()
            .filter(|i| i.status == "Trading")
            .filter_map(|i| Symbol::from_pair(&i.base_coin, &i.quote_coin))
            .collect();

        debug!(exchange = EXCHANGE_NAME, count = symbols.len(), "Spot symbols listed");
        Ok(cap_symbols(symbols, self.max_symbols))
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceQuote, ArbError> {
        let url = endpoint(&self.base_url, "/v5/market/tickers");
        let native = Self::native_symbol(symbol);
        let envelope: Envelope<BybitTicker> = get_json(
            &self.http,
            &self.id,
            &url,
            &[("category", "spot"), ("symbol", native.as_str())],
        )
        .await?;

        match envelope.ret_code {
            0 => {}
            INVALID_SYMBOL_CODE => return Err(ArbError::not_found(&self.id, symbol)),
            code => {
                return Err(ArbError::connectivity(
                    &self.id,
                    format!("retCode {code}: {}", envelope.ret_msg),
                ))
            }
        }

        let ticker = envelope
            .result
            .and_then(|r| r.list.into_iter().find(|t| t.symbol == native))
            .ok_or_else(|| ArbError::not_found(&self.id, symbol))?;

        let price = parse_price(&self.id, symbol, &ticker.last_price)?;
        PriceQuote::new(self.id.clone(), symbol.clone(), price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
