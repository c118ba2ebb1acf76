//! CloudCode Relay - headless daemon.
//!
//! Wires the core components once — config, account pool, traffic
//! shaper, throttled fetch, telemetry loop — and serves the two chat
//! dialects plus a status API.

use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

mod api;
mod router;
mod state;

use relay_core::pool::OAuthConfig;
use relay_core::signature::SIGNATURE_CACHE_CAPACITY;
use relay_core::{
    AccountPool, RelayConfig, SignatureCache, TelemetryLoop, ThrottledFetch, TrafficShaper,
    UsageStats,
};
use state::{AppState, AppStateInner};

const DEFAULT_PORT: u16 = 8318;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!("CloudCode Relay starting...");

    let config = RelayConfig::load().context("loading config")?;
    let data_dir = RelayConfig::data_dir().context("resolving data dir")?;

    let pool = Arc::new(
        AccountPool::load(data_dir.join("accounts.json"), OAuthConfig::default())
            .await
            .context("loading account pool")?,
    );
    if pool.is_empty().await {
        tracing::warn!("Account pool is empty; add accounts before sending traffic");
    }

    let transport: Arc<dyn relay_core::fetch::Transport> =
        Arc::new(ThrottledFetch::new(config.fetch.clone()).context("building HTTP client")?);
    let shaper = TrafficShaper::new(config.shaper);
    let usage = Arc::new(UsageStats::with_file(data_dir.join("usage-history.json")));
    let signatures = Arc::new(SignatureCache::new(SIGNATURE_CACHE_CAPACITY));
    let upstream_urls = RelayConfig::upstream_urls();

    let telemetry = Arc::new(TelemetryLoop::new(
        Arc::clone(&pool),
        Arc::clone(&transport),
        config.telemetry,
        upstream_urls[0].clone(),
    ));
    pool.attach_activity(telemetry.activity());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let telemetry_handle = Arc::clone(&telemetry).spawn(shutdown_rx);

    let app = router::build_router(AppState::new(AppStateInner {
        config,
        pool,
        shaper,
        transport,
        telemetry,
        usage: Arc::clone(&usage),
        signatures,
        upstream_urls,
    }));

    let port = std::env::var("RELAY_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    tracing::info!("Listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await.context("binding listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown requested");
        })
        .await
        .context("serving")?;

    // Stop the telemetry loop after the current iteration and flush usage.
    let _ = shutdown_tx.send(true);
    let _ = telemetry_handle.await;
    if let Err(e) = usage.save() {
        tracing::warn!("Failed to persist usage history: {e}");
    }

    tracing::info!("CloudCode Relay stopped");
    Ok(())
}
