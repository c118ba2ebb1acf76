//! Hour-bucketed request counter.
//!
//! Tracks per-model request counts grouped by model family, keyed by the
//! hour the request arrived in. Counts persist to `usage-history.json`
//! next to the account registry.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use relay_types::error::ConfigError;

/// Buckets older than this are pruned on save.
const RETENTION_MS: i64 = 72 * 60 * 60 * 1000;

const HOUR_MS: i64 = 60 * 60 * 1000;

/// One hour of counts: family → short-name → count, plus the hour total.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct UsageBucket {
    #[serde(rename = "_total")]
    pub total: u64,
    #[serde(flatten)]
    pub families: HashMap<String, HashMap<String, u64>>,
}

/// Model family for usage grouping.
pub fn family(model: &str) -> &'static str {
    let lower = model.to_lowercase();
    if lower.starts_with("claude") {
        "claude"
    } else if lower.starts_with("gemini") {
        "gemini"
    } else {
        "other"
    }
}

/// Family-stripped model suffix; `other` models keep the full id.
pub fn short_name<'a>(model: &'a str, family: &str) -> &'a str {
    if family == "other" {
        return model;
    }
    model.strip_prefix(&format!("{family}-")).unwrap_or(model)
}

/// The hour-bucketed counter.
pub struct UsageStats {
    buckets: Mutex<HashMap<i64, UsageBucket>>,
    path: Option<PathBuf>,
}

impl UsageStats {
    /// In-memory counter (no persistence).
    pub fn new() -> Self {
        Self { buckets: Mutex::new(HashMap::new()), path: None }
    }

    /// Counter backed by `usage-history.json` at the given path; existing
    /// history is loaded when present.
    pub fn with_file(path: PathBuf) -> Self {
        let buckets = std::fs::read_to_string(&path)
            .ok()
            .and_then(|content| serde_json::from_str(&content).ok())
            .unwrap_or_default();
        Self { buckets: Mutex::new(buckets), path: Some(path) }
    }

    fn current_hour() -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        now - now.rem_euclid(HOUR_MS)
    }

    /// Count one request for `model` in the current hour.
    pub fn track(&self, model: &str) {
        let family = family(model);
        let short = short_name(model, family).to_string();

        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(Self::current_hour()).or_default();
        *bucket.families.entry(family.to_string()).or_default().entry(short).or_insert(0) += 1;
        bucket.total += 1;
    }

    /// Snapshot of the current hour's bucket.
    pub fn current_bucket(&self) -> UsageBucket {
        self.buckets.lock().get(&Self::current_hour()).cloned().unwrap_or_default()
    }

    /// Snapshot of all retained buckets.
    pub fn all_buckets(&self) -> HashMap<i64, UsageBucket> {
        self.buckets.lock().clone()
    }

    /// Persist the counter, pruning buckets past the retention horizon.
    ///
    /// No-op for in-memory counters.
    pub fn save(&self) -> Result<(), ConfigError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let snapshot = {
            let mut buckets = self.buckets.lock();
            let horizon = chrono::Utc::now().timestamp_millis() - RETENTION_MS;
            buckets.retain(|hour, _| *hour >= horizon);
            buckets.clone()
        };

        let content = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| ConfigError::Parse { message: e.to_string() })?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| ConfigError::Io { message: e.to_string() })?;
        std::fs::rename(&tmp, path).map_err(|e| {
            let _ = std::fs::remove_file(&tmp);
            ConfigError::Io { message: e.to_string() }
        })
    }
}

impl Default for UsageStats {
    fn default() -> Self {
        Self::new()
    }
}
