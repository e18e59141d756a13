//! Shared types for the ARBHUNTER engine.
//!
//! These types form the data model used across all modules: exchange and
//! symbol identifiers, price quotes, detected opportunities, scan
//! preferences and reports, and the engine error taxonomy.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// The stable reference currency every comparable symbol is quoted in.
pub const REFERENCE_QUOTE: &str = "USDT";

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// Stable identifier for one exchange (lowercase name, e.g. `"kucoin"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExchangeId(String);

impl ExchangeId {
    pub fn new(name: &str) -> Self {
        Self(name.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Display name with the first letter capitalised ("kucoin" → "Kucoin").
    pub fn display_name(&self) -> String {
        let mut chars = self.0.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ExchangeId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// A canonical spot pair against [`REFERENCE_QUOTE`], stored as `BASE/USDT`.
///
/// Two symbols are equal iff their canonical strings are byte-equal, so
/// every exchange-native spelling must go through [`Symbol::new`] or
/// [`Symbol::from_pair`] before comparison.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(String);

impl Symbol {
    /// Build the canonical symbol for a base asset.
    pub fn new(base: &str) -> Self {
        Self(format!("{}/{REFERENCE_QUOTE}", base.trim().to_uppercase()))
    }

    /// Build a symbol from an exchange's (base, quote) pair.
    ///
    /// Returns `None` unless the quote is the reference currency and the
    /// base is a plain alphanumeric ticker.
    pub fn from_pair(base: &str, quote: &str) -> Option<Self> {
        let base = base.trim();
        if !quote.trim().eq_ignore_ascii_case(REFERENCE_QUOTE) {
            return None;
        }
        if base.is_empty() || !base.chars().all(|c| c.is_ascii_alphanumeric()) {
            return None;
        }
        Some(Self::new(base))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The base asset ("BTC" for `BTC/USDT`).
    pub fn base(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Parse common spellings: `BTC/USDT`, `btc-usdt`, `BTC_USDT`, `BTCUSDT`, `BTC`.
impl std::str::FromStr for Symbol {
    type Err = ArbError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let invalid = || ArbError::Config(format!("Invalid symbol: {s}"));

        if let Some((base, quote)) = upper.split_once(['/', '-', '_']) {
            return Symbol::from_pair(base, quote).ok_or_else(invalid);
        }
        let base = upper.strip_suffix(REFERENCE_QUOTE).unwrap_or(&upper);
        Symbol::from_pair(base, REFERENCE_QUOTE).ok_or_else(invalid)
    }
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

/// Last-known price of one symbol on one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub exchange: ExchangeId,
    pub symbol: Symbol,
    /// Always strictly positive.
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Build a quote observed now, rejecting non-positive prices.
    pub fn new(exchange: ExchangeId, symbol: Symbol, price: Decimal) -> Result<Self, ArbError> {
        Self::observed(exchange, symbol, price, Utc::now())
    }

    /// Build a quote with an explicit observation time.
    pub fn observed(
        exchange: ExchangeId,
        symbol: Symbol,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, ArbError> {
        if price <= Decimal::ZERO {
            return Err(ArbError::InvalidQuote {
                exchange: exchange.to_string(),
                symbol: symbol.to_string(),
                reason: format!("non-positive price {price}"),
            });
        }
        Ok(Self {
            exchange,
            symbol,
            price,
            observed_at,
        })
    }
}

// ---------------------------------------------------------------------------
// Opportunity
// ---------------------------------------------------------------------------

/// A fee-adjusted cross-exchange price gap for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Opportunity {
    pub symbol: Symbol,
    pub buy_exchange: ExchangeId,
    pub buy_price: Decimal,
    pub sell_exchange: ExchangeId,
    pub sell_price: Decimal,
    /// (sell − buy) / buy × 100
    pub gross_spread_pct: Decimal,
    /// Gross spread minus the configured round-trip fee percentage.
    pub fee_adjusted_profit_pct: Decimal,
    /// Reference-currency profit for `trade_volume` after fees.
    pub estimated_profit_amount: Decimal,
    /// Trade size in reference currency the amount was computed for.
    pub trade_volume: Decimal,
    pub timestamp: DateTime<Utc>,
    /// `true` for generated placeholder data, never for live quotes.
    pub is_synthetic: bool,
}

impl Opportunity {
    /// Number of base-asset coins bought with `trade_volume`.
    pub fn coin_amount(&self) -> Decimal {
        self.trade_volume.checked_div(self.buy_price).unwrap_or(Decimal::ZERO)
    }
}

impl fmt::Display for Opportunity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} buy {} @ {} → sell {} @ {} | gross {:.2}% | net {:.2}% | ~{:.2} {REFERENCE_QUOTE} on {}",
            if self.is_synthetic { "[DEMO] " } else { "" },
            self.symbol,
            self.buy_exchange,
            self.buy_price.normalize(),
            self.sell_exchange,
            self.sell_price.normalize(),
            self.gross_spread_pct,
            self.fee_adjusted_profit_pct,
            self.estimated_profit_amount,
            self.trade_volume.normalize(),
        )
    }
}

// ---------------------------------------------------------------------------
// Scan preferences and reports
// ---------------------------------------------------------------------------

/// Per-caller scan parameters (normally sourced from a user preference store).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPreferences {
    /// Trade size in reference currency.
    pub min_volume: Decimal,
    /// Minimum absolute profit in reference currency.
    pub min_profit: Decimal,
    /// Minimum fee-adjusted profit percentage.
    pub min_profit_pct: Decimal,
    /// Exchange subset to compare. Empty means every configured exchange.
    pub exchanges: Vec<String>,
    /// Transfer networks the caller can use (presentation only).
    pub networks: Vec<String>,
    /// Replace an empty live result with flagged synthetic examples.
    pub allow_fallback: bool,
    /// Overrides the engine's default result count.
    pub top_k: Option<usize>,
}

impl Default for ScanPreferences {
    fn default() -> Self {
        Self {
            min_volume: dec!(100),
            min_profit: dec!(5),
            min_profit_pct: dec!(3.0),
            exchanges: Vec::new(),
            networks: vec!["BEP20".to_string(), "TRC20".to_string()],
            allow_fallback: true,
            top_k: None,
        }
    }
}

impl ScanPreferences {
    /// Primary transfer network, used when rendering signals.
    pub fn primary_network(&self) -> &str {
        self.networks.first().map(String::as_str).unwrap_or("BEP20")
    }
}

/// Result of a market catalog (re)build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogStatus {
    pub exchanges_loaded: Vec<ExchangeId>,
    pub exchanges_failed: Vec<ExchangeId>,
    pub common_symbol_count: usize,
    /// Set when no live listing produced a comparable symbol and the
    /// hardcoded major-pair set is in use.
    pub used_fallback: bool,
    pub built_at: DateTime<Utc>,
}

impl fmt::Display for CatalogStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Catalog: {} exchanges loaded, {} failed, {} comparable symbols{}",
            self.exchanges_loaded.len(),
            self.exchanges_failed.len(),
            self.common_symbol_count,
            if self.used_fallback { " (fallback set)" } else { "" },
        )
    }
}

/// Summary of one scan invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanReport {
    pub scan_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Symbols selected from the catalog for this scan (after sampling).
    pub symbols_sampled: usize,
    /// Symbols with at least two usable prices.
    pub symbols_compared: usize,
    /// Symbols skipped for fewer than two usable prices.
    pub symbols_insufficient: usize,
    /// Exchanges skipped mid-scan after a connectivity failure.
    pub exchanges_skipped: Vec<ExchangeId>,
    /// Whether the catalog was on its fallback symbol set.
    pub catalog_fallback: bool,
    /// Whether `opportunities` holds generated placeholders.
    pub synthetic: bool,
    pub opportunities: Vec<Opportunity>,
}

impl fmt::Display for ScanReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Scan {}: sampled={} compared={} insufficient={} found={}{} in {}ms",
            self.scan_id,
            self.symbols_sampled,
            self.symbols_compared,
            self.symbols_insufficient,
            self.opportunities.len(),
            if self.synthetic { " (synthetic)" } else { "" },
            self.duration_ms,
        )
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Engine error taxonomy. Every variant except `Config` is recovered
/// locally; none of them aborts a whole scan.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ArbError {
    #[error("Connectivity error ({exchange}): {message}")]
    Connectivity { exchange: String, message: String },

    #[error("Symbol {symbol} not quoted on {exchange}")]
    NotFound { exchange: String, symbol: String },

    #[error("Insufficient data for {symbol}: {quotes} usable price(s)")]
    InsufficientData { symbol: String, quotes: usize },

    #[error("No exchange produced any comparable symbols")]
    EmptyCatalog,

    #[error("Invalid quote for {symbol} on {exchange}: {reason}")]
    InvalidQuote {
        exchange: String,
        symbol: String,
        reason: String,
    },

    #[error("Scan cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ArbError {
    pub fn connectivity(exchange: &ExchangeId, message: impl Into<String>) -> Self {
        ArbError::Connectivity {
            exchange: exchange.to_string(),
            message: message.into(),
        }
    }

    pub fn not_found(exchange: &ExchangeId, symbol: &Symbol) -> Self {
        ArbError::NotFound {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
        }
    }

    pub fn invalid_quote(exchange: &ExchangeId, symbol: &Symbol, reason: impl Into<String>) -> Self {
        ArbError::InvalidQuote {
            exchange: exchange.to_string(),
            symbol: symbol.to_string(),
            reason: reason.into(),
        }
    }

    /// Whether the failure means the exchange itself is unreachable
    /// (as opposed to a per-symbol problem).
    pub fn is_connectivity(&self) -> bool {
        matches!(self, ArbError::Connectivity { .. })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
