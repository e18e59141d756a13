//! HTTP plumbing shared by the exchange adapters.

use anyhow::{Context, Result};
use reqwest::{Client, StatusCode};
use rust_decimal::prelude::*;
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::types::{ArbError, ExchangeId, Symbol};

const USER_AGENT: &str = "ARBHUNTER/0.1.0 (spot-arbitrage-scanner)";

/// Build the per-adapter HTTP client.
pub fn build_client(exchange: &str, timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .with_context(|| format!("Failed to build HTTP client for {exchange}"))
}

/// Join a base URL and path without doubling the slash.
pub fn endpoint(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}

/// Raw response of a GET: status plus body text.
pub struct RawResponse {
    pub status: StatusCode,
    pub body: String,
}

/// Issue a GET and return status + body. Transport failures (DNS,
/// connect, timeout) become `Connectivity` errors; HTTP error statuses
/// are left to the caller, since several venues encode "unknown symbol"
/// as a 4xx with a JSON body.
pub async fn get_raw(
    http: &Client,
    exchange: &ExchangeId,
    url: &str,
    query: &[(&str, &str)],
) -> Result<RawResponse, ArbError> {
    debug!(exchange = %exchange, url = %url, "GET");

    let resp = http
        .get(url)
        .query(query)
        .send()
        .await
        .map_err(|e| ArbError::connectivity(exchange, format!("request failed: {e}")))?;

    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| ArbError::connectivity(exchange, format!("failed to read body: {e}")))?;

    Ok(RawResponse { status, body })
}

/// GET a JSON document, treating any non-2xx status as a connectivity failure.
pub async fn get_json<T: DeserializeOwned>(
    http: &Client,
    exchange: &ExchangeId,
    url: &str,
    query: &[(&str, &str)],
) -> Result<T, ArbError> {
    let raw = get_raw(http, exchange, url, query).await?;
    if !raw.status.is_success() {
        return Err(ArbError::connectivity(
            exchange,
            format!("HTTP {}: {}", raw.status, truncate(&raw.body, 200)),
        ));
    }
    parse_json(exchange, &raw.body)
}

/// Deserialize a response body, mapping parse failures to `Connectivity`
/// (an unreadable envelope means the venue is misbehaving, not the symbol).
pub fn parse_json<T: DeserializeOwned>(exchange: &ExchangeId, body: &str) -> Result<T, ArbError> {
    serde_json::from_str(body)
        .map_err(|e| ArbError::connectivity(exchange, format!("unexpected response shape: {e}")))
}

/// Parse a textual price into a strictly positive decimal.
pub fn parse_price(exchange: &ExchangeId, symbol: &Symbol, raw: &str) -> Result<Decimal, ArbError> {
    let raw = raw.trim();
    let price = Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .map_err(|_| ArbError::invalid_quote(exchange, symbol, format!("unparsable price {raw:?}")))?;
    ensure_positive(exchange, symbol, price)
}

/// Convert a numeric JSON price into a strictly positive decimal.
pub fn price_from_f64(exchange: &ExchangeId, symbol: &Symbol, raw: f64) -> Result<Decimal, ArbError> {
    let price = Decimal::from_f64(raw)
        .ok_or_else(|| ArbError::invalid_quote(exchange, symbol, format!("non-finite price {raw}")))?;
    ensure_positive(exchange, symbol, price)
}

fn ensure_positive(exchange: &ExchangeId, symbol: &Symbol, price: Decimal) -> Result<Decimal, ArbError> {
    if price <= Decimal::ZERO {
        return Err(ArbError::invalid_quote(exchange, symbol, format!("non-positive price {price}")));
    }
    Ok(price)
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
