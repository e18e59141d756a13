//! Dashboard API route handlers.
//!
//! All endpoints return JSON except `/health`. State is shared via
//! `Arc<DashboardState>`.

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use uuid::Uuid;

use crate::engine::ArbitrageEngine;
use crate::types::{ArbError, CatalogStatus, Opportunity, ScanPreferences, ScanReport};

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

/// Shared state accessible by all route handlers.
pub struct DashboardState {
    pub engine: Arc<ArbitrageEngine>,
    /// Preferences an API scan starts from before query overrides.
    pub defaults: ScanPreferences,
    pub started_at: DateTime<Utc>,
}

impl DashboardState {
    pub fn new(engine: Arc<ArbitrageEngine>, defaults: ScanPreferences) -> Self {
        Self {
            engine,
            defaults,
            started_at: Utc::now(),
        }
    }
}

pub type AppState = Arc<DashboardState>;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Largest trade volume an API scan accepts, in USDT.
const MAX_TRADE_VOLUME: Decimal = rust_decimal_macros::dec!(1000000000);

/// Query string for `GET /api/scan`. Every field overrides the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ScanQuery {
    pub min_volume: Option<String>,
    pub min_profit: Option<String>,
    pub min_profit_pct: Option<String>,
    /// Comma-separated exchange names.
    pub exchanges: Option<String>,
    pub fallback: Option<bool>,
    pub top_k: Option<usize>,
}

impl ScanQuery {
    /// Merge onto `defaults`, rejecting unparsable numbers.
    pub fn apply(&self, defaults: &ScanPreferences) -> Result<ScanPreferences, String> {
        let mut prefs = defaults.clone();
        if let Some(v) = parse_decimal("min_volume", self.min_volume.as_deref())? {
            if v <= Decimal::ZERO {
                return Err("min_volume must be positive".to_string());
            }
            if v > MAX_TRADE_VOLUME {
                return Err(format!("min_volume must not exceed {MAX_TRADE_VOLUME}"));
            }
            prefs.min_volume = v;
        }
        if let Some(v) = parse_decimal("min_profit", self.min_profit.as_deref())? {
            prefs.min_profit = v;
        }
        if let Some(v) = parse_decimal("min_profit_pct", self.min_profit_pct.as_deref())? {
            prefs.min_profit_pct = v;
        }
        if let Some(list) = &self.exchanges {
            prefs.exchanges = list
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_lowercase)
                .collect();
        }
        if let Some(fallback) = self.fallback {
            prefs.allow_fallback = fallback;
        }
        if let Some(k) = self.top_k {
            if k == 0 {
                return Err("top_k must be positive".to_string());
            }
            prefs.top_k = Some(k);
        }
        Ok(prefs)
    }
}

fn parse_decimal(field: &str, raw: Option<&str>) -> Result<Option<Decimal>, String> {
    match raw {
        None => Ok(None),
        Some(s) => Decimal::from_str(s.trim())
            .map(Some)
            .map_err(|_| format!("{field}: not a number: {s}")),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: message.into() }))
}

#[derive(Debug, Clone, Serialize)]
pub struct OpportunitiesResponse {
    pub scan_id: Option<Uuid>,
    pub scanned_at: Option<DateTime<Utc>>,
    pub synthetic: bool,
    pub opportunities: Vec<Opportunity>,
}

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /health
pub async fn health() -> &'static str {
    "ok"
}

/// GET /api/catalog
pub async fn get_catalog(State(state): State<AppState>) -> Result<Json<CatalogStatus>, ApiError> {
    state
        .engine
        .catalog_status()
        .await
        .map(Json)
        .ok_or_else(|| api_error(StatusCode::SERVICE_UNAVAILABLE, "catalog not built yet"))
}

/// POST /api/catalog/refresh
pub async fn refresh_catalog(State(state): State<AppState>) -> Json<CatalogStatus> {
    Json(state.engine.build_catalog().await)
}

/// GET /api/scan
pub async fn run_scan(
    State(state): State<AppState>,
    Query(query): Query<ScanQuery>,
) -> Result<Json<ScanReport>, ApiError> {
    let prefs = query
        .apply(&state.defaults)
        .map_err(|e| api_error(StatusCode::BAD_REQUEST, e))?;

    // Dropping this handler (client gone) drops the scan future with it.
    match state.engine.scan_report(&prefs, &CancellationToken::new()).await {
        Ok(report) => Ok(Json(report)),
        Err(e @ ArbError::Cancelled) => Err(api_error(StatusCode::SERVICE_UNAVAILABLE, e.to_string())),
        Err(e) => {
            warn!(error = %e, "API scan failed");
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}

/// GET /api/opportunities
pub async fn get_opportunities(State(state): State<AppState>) -> Json<OpportunitiesResponse> {
    let report = state.engine.last_report().await;
    Json(match report {
        Some(r) => OpportunitiesResponse {
            scan_id: Some(r.scan_id),
            scanned_at: Some(r.started_at),
            synthetic: r.synthetic,
            opportunities: r.opportunities,
        },
        None => OpportunitiesResponse {
            scan_id: None,
            scanned_at: None,
            synthetic: false,
            opportunities: Vec::new(),
        },
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
