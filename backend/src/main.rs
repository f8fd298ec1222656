// =============================================================================
// Signal Relay — Main Entry Point
// =============================================================================
//
// Two long-running loops share one candle store:
//   - the collector backfills history, then polls latest prices;
//   - the dispatcher analyzes subscribed symbols and delivers signals.
// A read-only status API runs alongside.
// Ctrl+C stops the loops between cycles.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod analysis;
mod api;
mod app_state;
mod binance;
mod dispatch;
mod indicators;
mod interfaces;
mod market_data;
mod render;
mod runtime_config;
mod shutdown;
mod store;
mod telegram;
mod types;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::analysis::Analyzer;
use crate::app_state::AppState;
use crate::binance::{BinanceClient, RateLimitTracker};
use crate::dispatch::{DispatchGuard, Dispatcher, DispatcherSettings};
use crate::interfaces::Notifier;
use crate::market_data::collector::{Collector, CollectorSettings};
use crate::market_data::{CandleStore, PriceCache};
use crate::runtime_config::RelayConfig;
use crate::store::JsonStore;
use crate::telegram::{LogOnlyNotifier, TelegramNotifier};

const DEFAULT_CONFIG_PATH: &str = "relay_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Signal Relay — Starting Up                        ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = std::env::var("RELAY_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = RelayConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        let defaults = RelayConfig::default();
        if !Path::new(&config_path).exists() {
            if let Err(e) = defaults.save(&config_path) {
                warn!(error = %e, "Failed to write default config");
            }
        }
        defaults
    });
    config.apply_overrides(|key| std::env::var(key).ok());

    info!(
        symbols = ?config.default_symbols,
        reference = %config.reference_symbol,
        min_confidence = config.min_confidence,
        cooldown_secs = config.cooldown_secs,
        "Relay configured"
    );

    // ── 2. Collaborators ─────────────────────────────────────────────────
    let store = Arc::new(JsonStore::open(&config.store_path)?);

    let rate_limit = Arc::new(RateLimitTracker::new());
    let binance_client = Arc::new(BinanceClient::new(rate_limit.clone())?);

    let notifier: Arc<dyn Notifier> = match std::env::var("TELEGRAM_BOT_TOKEN") {
        Ok(token) if !token.trim().is_empty() => Arc::new(TelegramNotifier::new(token.trim())?),
        _ => {
            warn!("TELEGRAM_BOT_TOKEN not set — signals will only be logged");
            Arc::new(LogOnlyNotifier)
        }
    };

    // ── 3. Shared state ──────────────────────────────────────────────────
    let candles = Arc::new(CandleStore::new(config.series_capacity));
    let prices = Arc::new(PriceCache::new(Duration::from_secs(config.price_cache_ttl_secs)));
    let guard = Arc::new(DispatchGuard::new(config.cooldown_secs, config.max_signals_per_day));
    guard.restore(&store.signals(), chrono::Utc::now().timestamp());

    let collector = Arc::new(Collector::new(
        binance_client.clone(),
        store.clone(),
        candles.clone(),
        prices.clone(),
        CollectorSettings::from_config(&config),
    ));

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        store.clone(),
        notifier,
        candles.clone(),
        guard.clone(),
        Analyzer::new(config.analyzer_config()),
        DispatcherSettings::from_config(&config),
    ));

    let bind_addr = config.bind_addr.clone();
    let state = Arc::new(AppState {
        config,
        candles,
        prices,
        guard,
        store,
        collector: collector.clone(),
        dispatcher: dispatcher.clone(),
        rate_limit,
        start_time: std::time::Instant::now(),
    });

    let (shutdown_tx, shutdown_rx) = shutdown::channel();

    // ── 4. Collector & dispatcher loops ──────────────────────────────────
    let collector_handle = tokio::spawn(collector.run(shutdown_rx.clone()));
    let dispatcher_handle = tokio::spawn(dispatcher.run(shutdown_rx));

    // ── 5. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr, error = %e, "Failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    let _ = shutdown_tx.send(true);
    for (name, handle) in [("collector", collector_handle), ("dispatcher", dispatcher_handle)] {
        if let Err(e) = handle.await {
            error!(task = name, error = %e, "loop task ended abnormally");
        }
    }

    info!("Signal Relay shut down complete.");
    Ok(())
}
