//! Subscription and quota data models.

use serde::{Deserialize, Serialize};

/// Subscription tier reported by the upstream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionTier {
    Ultra,
    Pro,
    Free,
}

/// Remaining quota for one model.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelQuota {
    /// Model name
    pub name: String,
    /// Remaining fraction of the quota window (0.0–1.0)
    pub remaining_fraction: f64,
    /// Time when quota resets (ISO 8601), empty when unknown
    #[serde(default)]
    pub reset_time: String,
}

/// Aggregated subscription state for an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Subscription {
    /// Subscription tier, absent until first observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tier: Option<SubscriptionTier>,
    /// Upstream tenant discovered alongside the subscription
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// Per-model quota information
    #[serde(default)]
    pub models: Vec<ModelQuota>,
    /// Last time quota was updated (epoch ms)
    #[serde(default)]
    pub last_updated: i64,
}

impl Subscription {
    /// Get quota for a specific model by case-insensitive substring match.
    pub fn model_quota(&self, model: &str) -> Option<&ModelQuota> {
        let needle = model.to_lowercase();
        self.models.iter().find(|m| m.name.to_lowercase().contains(&needle))
    }

    /// Record (or replace) a model's remaining quota fraction.
    pub fn set_model_quota(&mut self, name: &str, remaining_fraction: f64, reset_time: String) {
        if let Some(existing) = self.models.iter_mut().find(|m| m.name == name) {
            existing.remaining_fraction = remaining_fraction;
            existing.reset_time = reset_time;
        } else {
            self.models.push(ModelQuota {
                name: name.to_string(),
                remaining_fraction,
                reset_time,
            });
        }
        self.last_updated = chrono::Utc::now().timestamp_millis();
    }

    /// Minimum remaining fraction across all models.
    pub fn min_remaining(&self) -> Option<f64> {
        self.models
            .iter()
            .map(|m| m.remaining_fraction)
            .min_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal))
    }
}
