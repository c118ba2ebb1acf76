//! Relay configuration: on-disk knobs and upstream endpoints.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use relay_types::error::ConfigError;

/// Primary upstream base URL.
pub const UPSTREAM_BASE_URL: &str = "https://daily-cloudcode-pa.googleapis.com";
/// Fallback upstream base URL, tried when the primary fails at transport level.
pub const UPSTREAM_FALLBACK_URL: &str = "https://cloudcode-pa.googleapis.com";
/// Internal API version prefix shared by all upstream calls.
pub const V1_INTERNAL: &str = "v1internal";

/// Environment variable overriding the upstream base URL (single URL, no fallback).
const UPSTREAM_URL_ENV: &str = "RELAY_UPSTREAM_URL";

const CONFIG_DIR: &str = "cloudcode-relay";
const CONFIG_FILE: &str = "config.json";

/// Pacing knobs for the throttled fetch layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct FetchConfig {
    /// Whether the pre-call gaussian delay is applied at all
    pub request_throttling_enabled: bool,
    /// Base pre-call delay in milliseconds
    pub request_delay_ms: u64,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { request_throttling_enabled: true, request_delay_ms: 200 }
    }
}

/// Pacing knobs for the traffic shaper.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct ShaperConfig {
    /// Minimum delay between task starts in milliseconds
    pub min_delay_ms: u64,
    /// Uniform jitter added on top of the minimum delay
    pub jitter_ms: u64,
}

impl Default for ShaperConfig {
    fn default() -> Self {
        Self { min_delay_ms: 3000, jitter_ms: 2000 }
    }
}

/// Timing knobs for the telemetry heartbeat loop.
///
/// All of these are injectable so tests can run the loop in milliseconds
/// instead of minutes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct TelemetryConfig {
    /// Delay before the first iteration after startup
    pub initial_delay_ms: u64,
    /// Center of the inter-iteration sleep band
    pub interval_ms: u64,
    /// Uniform jitter around the interval (± this value)
    pub interval_jitter_ms: u64,
    /// Floor for the inter-iteration sleep
    pub min_sleep_ms: u64,
    /// Sleep after an uncaught iteration error
    pub error_backoff_ms: u64,
    /// Window after the last real request during which accounts heartbeat
    pub active_session_window_ms: u64,
    /// Random gap between accounts within one iteration (bounds)
    pub account_gap_min_ms: u64,
    pub account_gap_max_ms: u64,
    /// Random gap between endpoint calls within one account (bounds)
    pub endpoint_gap_min_ms: u64,
    pub endpoint_gap_max_ms: u64,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: 5_000,
            interval_ms: 45_000,
            interval_jitter_ms: 15_000,
            min_sleep_ms: 5_000,
            error_backoff_ms: 60_000,
            active_session_window_ms: 600_000,
            account_gap_min_ms: 2_000,
            account_gap_max_ms: 5_000,
            endpoint_gap_min_ms: 500,
            endpoint_gap_max_ms: 2_000,
        }
    }
}

/// Full relay configuration, persisted as JSON.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct RelayConfig {
    pub fetch: FetchConfig,
    pub shaper: ShaperConfig,
    pub telemetry: TelemetryConfig,
}

impl RelayConfig {
    /// The relay's config directory (`~/.config/cloudcode-relay`).
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        let base = dirs::config_dir()
            .ok_or_else(|| ConfigError::Io { message: "cannot resolve config dir".to_string() })?;
        let dir = base.join(CONFIG_DIR);
        if !dir.exists() {
            std::fs::create_dir_all(&dir)
                .map_err(|e| ConfigError::Io { message: e.to_string() })?;
        }
        Ok(dir)
    }

    /// Load the config file, falling back to defaults when absent.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::data_dir()?.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&path).map_err(|e| ConfigError::Io { message: e.to_string() })?;
        serde_json::from_str(&content).map_err(|e| ConfigError::Parse { message: e.to_string() })
    }

    /// Persist the config atomically (temp file + rename).
    pub fn save(&self) -> Result<(), ConfigError> {
        let dir = Self::data_dir()?;
        let path = dir.join(CONFIG_FILE);
        let tmp = dir.join(format!("{CONFIG_FILE}.tmp"));
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::Parse { message: e.to_string() })?;
        std::fs::write(&tmp, content).map_err(|e| ConfigError::Io { message: e.to_string() })?;
        std::fs::rename(&tmp, &path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            ConfigError::Io { message: e.to_string() }
        })
    }

    /// Resolve the upstream base URLs in fallback order.
    ///
    /// An explicit `RELAY_UPSTREAM_URL` replaces both defaults when it
    /// parses as a URL; a malformed value is ignored with a warning.
    pub fn upstream_urls() -> Vec<String> {
        if let Ok(raw) = std::env::var(UPSTREAM_URL_ENV) {
            let candidate = raw.trim().trim_end_matches('/').to_string();
            if !candidate.is_empty() && url::Url::parse(&candidate).is_ok() {
                tracing::info!("Using custom upstream URL from {UPSTREAM_URL_ENV}");
                return vec![candidate];
            }
            tracing::warn!("{UPSTREAM_URL_ENV} is not a valid URL, using defaults");
        }
        vec![UPSTREAM_BASE_URL.to_string(), UPSTREAM_FALLBACK_URL.to_string()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_knobs() {
        let config = RelayConfig::default();
        assert!(config.fetch.request_throttling_enabled);
        assert_eq!(config.fetch.request_delay_ms, 200);
        assert_eq!(config.shaper.min_delay_ms, 3000);
        assert_eq!(config.shaper.jitter_ms, 2000);
        assert_eq!(config.telemetry.interval_ms, 45_000);
        assert_eq!(config.telemetry.active_session_window_ms, 600_000);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let config: RelayConfig =
            serde_json::from_str(r#"{"shaper": {"minDelayMs": 500}}"#).unwrap();
        assert_eq!(config.shaper.min_delay_ms, 500);
        assert_eq!(config.shaper.jitter_ms, 2000);
        assert!(config.fetch.request_throttling_enabled);
    }
}
