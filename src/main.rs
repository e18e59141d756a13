//! ARBHUNTER: cross-exchange spot arbitrage detection engine
//!
//! Entry point. Loads configuration, initialises structured logging,
//! builds the market catalog, and runs the periodic scan loop with
//! graceful shutdown. Signals go to the log as rendered text.

use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use arbhunter::config::{self, AppConfig};
use arbhunter::dashboard::{self, routes::DashboardState};
use arbhunter::engine::ArbitrageEngine;
use arbhunter::exchanges;
use arbhunter::presenter;
use arbhunter::types::{ArbError, ScanPreferences};

const BANNER: &str = r#"
    _    ____  ____  _   _ _   _ _   _ _____ _____ ____
   / \  |  _ \| __ )| | | | | | | \ | |_   _| ____|  _ \
  / _ \ | |_) |  _ \| |_| | | | |  \| | | | |  _| | |_) |
 / ___ \|  _ <| |_) |  _  | |_| | |\  | | | | |___|  _ <
/_/   \_\_| \_\____/|_| |_|\___/|_| \_| |_| |_____|_| \_\

  Cross-exchange spot arbitrage scanner
  v0.1.0 (detection only, never trades)
"#;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (non-fatal if missing)
    let _ = dotenv::dotenv();

    let config_path =
        std::env::var("ARBHUNTER_CONFIG").unwrap_or_else(|_| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = AppConfig::load(&config_path)?;

    init_logging();

    println!("{BANNER}");
    info!(
        config = %config_path,
        exchanges = cfg.exchange_priority().len(),
        scan_interval_secs = cfg.engine.scan_interval_secs,
        fee_pct = %cfg.engine.fee_pct,
        "ARBHUNTER starting up"
    );

    // -- Initialise components -------------------------------------------

    let adapters = exchanges::build_adapters(&cfg.exchanges, cfg.fetch_timeout())
        .context("Failed to initialise exchange adapters")?;
    if adapters.is_empty() {
        anyhow::bail!("No usable exchanges configured");
    }

    let engine = Arc::new(ArbitrageEngine::new(adapters, cfg.engine_config()));

    let status = engine.build_catalog().await;
    if status.used_fallback {
        warn!(failed = ?status.exchanges_failed, "No live catalog, scanning the fallback symbol set");
    }

    if cfg.dashboard.enabled {
        let state = Arc::new(DashboardState::new(engine.clone(), cfg.preferences.clone()));
        dashboard::spawn_dashboard(state, cfg.dashboard.port).await?;
    }

    // -- Main loop -------------------------------------------------------

    let mut scan_interval = tokio::time::interval(Duration::from_secs(cfg.engine.scan_interval_secs.max(1)));
    let catalog_period = Duration::from_secs(cfg.engine.catalog_refresh_secs.max(60));
    let mut catalog_interval = tokio::time::interval_at(tokio::time::Instant::now() + catalog_period, catalog_period);
    let shutdown = CancellationToken::new();

    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received.");
            }
            shutdown.cancel();
        });
    }

    info!(
        interval_secs = cfg.engine.scan_interval_secs,
        "Entering main loop. Press Ctrl+C to stop."
    );

    let mut scans: u64 = 0;
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = catalog_interval.tick() => {
                let status = engine.build_catalog().await;
                info!(%status, "Catalog refreshed");
            }
            _ = scan_interval.tick() => {
                scans += 1;
                match run_scan(&engine, &cfg.preferences, &shutdown).await {
                    Ok(()) => {}
                    Err(ArbError::Cancelled) => break,
                    Err(e) => error!(error = %e, "Scan failed, continuing to next"),
                }
            }
        }
    }

    info!(scans, fetches = engine.cache().fetch_count(), "ARBHUNTER shut down cleanly.");
    Ok(())
}

/// Run one timer scan and publish its signals.
async fn run_scan(
    engine: &ArbitrageEngine,
    prefs: &ScanPreferences,
    shutdown: &CancellationToken,
) -> Result<(), ArbError> {
    let report = engine.scan_report(prefs, shutdown).await?;
    info!(%report, "Scan finished");

    if report.opportunities.is_empty() {
        info!("{}", presenter::render_summary(&report.opportunities));
        return Ok(());
    }

    info!("\n{}", presenter::render_summary(&report.opportunities));
    for opportunity in &report.opportunities {
        info!(
            symbol = %opportunity.symbol,
            synthetic = opportunity.is_synthetic,
            "\n{}",
            presenter::render_signal(opportunity, prefs.primary_network())
        );
    }
    Ok(())
}

/// Initialise the `tracing` subscriber.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("arbhunter=info"));

    let json_logging = std::env::var("ARBHUNTER_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_thread_ids(true)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    }
}
