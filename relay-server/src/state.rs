//! Shared application state.
//!
//! Every core component is constructed exactly once in `main` and shared
//! here by reference — no process-global singletons.

use std::sync::Arc;

use relay_core::fetch::Transport;
use relay_core::{AccountPool, RelayConfig, SignatureCache, TelemetryLoop, TrafficShaper, UsageStats};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub inner: Arc<AppStateInner>,
}

pub struct AppStateInner {
    pub config: RelayConfig,
    pub pool: Arc<AccountPool>,
    pub shaper: TrafficShaper,
    pub transport: Arc<dyn Transport>,
    pub telemetry: Arc<TelemetryLoop>,
    pub usage: Arc<UsageStats>,
    pub signatures: Arc<SignatureCache>,
    /// Upstream base URLs in fallback order.
    pub upstream_urls: Vec<String>,
}

impl AppState {
    pub fn new(inner: AppStateInner) -> Self {
        Self { inner: Arc::new(inner) }
    }
}
