//! OKX spot market data (API v5).
//!
//! API docs: https://www.okx.com/docs-v5/en/#public-data-rest-api
//! Base URL: https://www.okx.com
//! Auth: not required for public market data.
//! Native symbol format (instId): `BTC-USDT`.

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

const BASE_URL: &str = "https://www.okx.com";
const EXCHANGE_NAME: &str = "okx";

/// "Instrument ID does not exist" and "Instrument ID ... doesn't exist".
const UNKNOWN_INSTRUMENT_CODES: &[&str] = &["51001", "51014"];

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxInstrument {
    base_ccy: String,
    quote_ccy: String,
    #[serde(default)]
    state: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OkxTicker {
    inst_id: String,
    last: String,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

pub struct OkxClient {
    id: ExchangeId,
    http: Client,
    base_url: String,
    max_symbols: Option<usize>,
}

impl OkxClient {
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
}

#[async_trait]
impl ExchangeAdapter for OkxClient {
    fn id(&self) -> &ExchangeId {
        &self.id
    }

    async fn list_spot_symbols(&self) -> Result<HashSet<Symbol>, ArbError> {
        let url = endpoint(&self.base_url, "/api/v5/public/instruments");
        let envelope: Envelope<OkxInstrument> =
            get_json(&self.http, &self.id, &url, &[("instType", "SPOT")]).await?;

        if envelope.code != "0" {
            return Err(ArbError::connectivity(
                &self.id,
                format!("API code {}: {}", envelope.code, envelope.msg),
            ));
        }

        let symbols: HashSet<Symbol> = envelope
            .data
            .into_iter()
            .filter(|i| i.state == "live")
            .filter_map(|i| Symbol::from_pair(&i.base_ccy, &i.quote_ccy))
            .collect();

        debug!(exchange = EXCHANGE_NAME, count = symbols.len(), "Spot symbols listed");
        Ok(cap_symbols(symbols, self.max_symbols))
    }

    async fn fetch_price(&self, symbol: &Symbol) -> Result<PriceQuote, ArbError> {
        let url = endpoint(&self.base_url, "/api/v5/market/ticker");
        let native = Self::native_symbol(symbol);

        // OKX reports unknown instruments in the JSON body, sometimes with
        // a 4xx status, so read the body before judging the status.
        let raw = get_raw(&self.http, &self.id, &url, &[("instId", native.as_str())]).await?;
        let envelope: Envelope<OkxTicker> = match parse_json(&self.id, &raw.body) {
            Ok(env) => env,
            Err(_) if !raw.status.is_success() => {
                return Err(ArbError::connectivity(&self.id, format!("HTTP {}", raw.status)))
            }
            Err(e) => return Err(e),
        };

        if UNKNOWN_INSTRUMENT_CODES.contains(&envelope.code.as_str()) {
            return Err(ArbError::not_found(&self.id, symbol));
        }
        if envelope.code != "0" {
            return Err(ArbError::connectivity(
                &self.id,
                format!("API code {}: {}", envelope.code, envelope.msg),
            ));
        }

        let ticker = envelope
            .data
            .into_iter()
            .find(|t| t.inst_id == native)
            .ok_or_else(|| ArbError::not_found(&self.id, symbol))?;

        let price = parse_price(&self.id, symbol, &ticker.last)?;
        PriceQuote::new(self.id.clone(), symbol.clone(), price)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
