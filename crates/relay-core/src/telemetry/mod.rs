//! Telemetry heartbeat loop.
//!
//! For each active account the loop periodically emits a randomized
//! subset of upstream analytics calls that imitate IDE behavior, so
//! accounts look in-use even between real requests. Heartbeats are
//! strictly best-effort: every failure is debug-logged and swallowed, a
//! failing account never blocks the others, and a telemetry 429 is never
//! counted against the account's quota.

mod events;

#[cfg(test)]
mod tests;

use dashmap::DashMap;
use rand::Rng;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;

use relay_types::models::Account;

use crate::config::TelemetryConfig;
use crate::fetch::{FetchRequest, Transport};
use crate::fingerprint;
use crate::jitter::sleep_range;
use crate::pool::AccountPool;

/// Model id reported in heartbeat metrics, kept fixed for fidelity with
/// real clients in the field.
const HEARTBEAT_MODEL_ID: &str = "gemini-1.5-pro-002";

/// Heartbeat endpoints with their independent emission probabilities.
const FETCH_USER_INFO_P: f64 = 0.9;
const LIST_EXPERIMENTS_P: f64 = 0.5;
const TRAJECTORY_ANALYTICS_P: f64 = 0.3;
const CODE_ASSIST_METRICS_P: f64 = 0.2;

/// Timestamp of the last real request, shared between the pool (writer)
/// and the loop (reader).
pub struct ActivityTracker {
    last_activity_ms: AtomicI64,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self { last_activity_ms: AtomicI64::new(0) }
    }

    /// Record activity now.
    pub fn touch(&self) {
        self.last_activity_ms
            .store(chrono::Utc::now().timestamp_millis(), Ordering::Relaxed);
    }

    /// Last recorded activity, `None` before the first touch.
    pub fn last(&self) -> Option<i64> {
        match self.last_activity_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(ms),
        }
    }
}

impl Default for ActivityTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// The background heartbeat scheduler.
pub struct TelemetryLoop {
    pool: Arc<AccountPool>,
    transport: Arc<dyn Transport>,
    config: TelemetryConfig,
    base_url: String,
    activity: Arc<ActivityTracker>,
    sessions: DashMap<String, String>,
}

impl TelemetryLoop {
    pub fn new(
        pool: Arc<AccountPool>,
        transport: Arc<dyn Transport>,
        config: TelemetryConfig,
        base_url: String,
    ) -> Self {
        Self {
            pool,
            transport,
            config,
            base_url,
            activity: Arc::new(ActivityTracker::new()),
            sessions: DashMap::new(),
        }
    }

    /// The shared activity tracker (hand this to the pool).
    pub fn activity(&self) -> Arc<ActivityTracker> {
        Arc::clone(&self.activity)
    }

    /// Record proxy activity now.
    pub fn notify_activity(&self) {
        self.activity.touch();
    }

    /// Start the loop. It runs until `shutdown` flips to true, finishing
    /// the in-flight iteration first.
    pub fn spawn(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!("Telemetry loop started");
            if self.sleep_or_shutdown(self.config.initial_delay_ms, &mut shutdown).await {
                return;
            }

            loop {
                if let Err(e) = self.run_iteration().await {
                    tracing::warn!("Telemetry iteration failed: {e}; backing off");
                    if self.sleep_or_shutdown(self.config.error_backoff_ms, &mut shutdown).await {
                        break;
                    }
                    continue;
                }

                let jitter = self.config.interval_jitter_ms as i64;
                let offset = rand::thread_rng().gen_range(-jitter..=jitter);
                let sleep_ms = (self.config.interval_ms as i64 + offset)
                    .max(self.config.min_sleep_ms as i64) as u64;
                if self.sleep_or_shutdown(sleep_ms, &mut shutdown).await {
                    break;
                }
            }
            tracing::info!("Telemetry loop stopped");
        })
    }

    /// Sleep, returning true when shutdown was requested instead.
    async fn sleep_or_shutdown(&self, ms: u64, shutdown: &mut watch::Receiver<bool>) -> bool {
        if *shutdown.borrow() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(ms)) => false,
            // A dropped sender counts as shutdown too.
            changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
        }
    }

    async fn run_iteration(&self) -> Result<(), String> {
        let now = chrono::Utc::now().timestamp_millis();

        let Some(last_activity) = self.activity.last() else {
            return Ok(());
        };
        if now - last_activity >= self.config.active_session_window_ms as i64 {
            tracing::debug!("Proxy idle, skipping heartbeat iteration");
            return Ok(());
        }

        let accounts = self.pool.accounts_snapshot().await;
        let active: Vec<Account> = accounts
            .into_iter()
            .filter(|a| {
                a.enabled
                    && !a.is_invalid
                    && a.last_used.is_some_and(|used| {
                        now - used < self.config.active_session_window_ms as i64
                    })
            })
            .collect();

        tracing::debug!("Heartbeat iteration: {} active account(s)", active.len());

        for (index, account) in active.iter().enumerate() {
            if index > 0 {
                sleep_range(self.config.account_gap_min_ms, self.config.account_gap_max_ms).await;
            }
            self.emit_for_account(account, now - last_activity).await;
        }

        Ok(())
    }

    /// Emit this account's randomized heartbeat subset. All failures are
    /// debug-logged and dropped.
    async fn emit_for_account(&self, account: &Account, ms_since_activity: i64) {
        let Some(project) = account.effective_project_id() else {
            tracing::debug!("Account {} has no project id, skipping heartbeat", account.email);
            return;
        };
        let project = project.to_string();

        let session_id = self
            .sessions
            .entry(account.email.clone())
            .or_insert_with(|| Uuid::new_v4().to_string())
            .clone();

        let token = match self.pool.get_token_for_account(&account.email).await {
            Ok(token) => token,
            Err(e) => {
                tracing::debug!("Heartbeat token for {} unavailable: {e}", account.email);
                return;
            },
        };

        let mut headers = fingerprint::build_headers(account.fingerprint.as_ref());
        headers.insert("Authorization".to_string(), format!("Bearer {token}"));

        let mut calls: Vec<(&str, serde_json::Value)> = Vec::new();
        {
            let mut rng = rand::thread_rng();
            if rng.gen_bool(FETCH_USER_INFO_P) {
                calls.push(("fetchUserInfo", serde_json::json!({ "project": project })));
            }
            if rng.gen_bool(LIST_EXPERIMENTS_P) {
                calls.push((
                    "listExperiments",
                    serde_json::json!({
                        "project": project,
                        "parent": format!("projects/{project}"),
                    }),
                ));
            }
            if rng.gen_bool(TRAJECTORY_ANALYTICS_P) {
                calls.push((
                    "recordTrajectoryAnalytics",
                    serde_json::json!({
                        "project": project,
                        "session_id": session_id,
                        "trajectory_metrics": {
                            "interaction_events": events::interaction_events(ms_since_activity),
                            "latency_ms": events::plausible_latency_ms(),
                            "model_id": HEARTBEAT_MODEL_ID,
                        },
                    }),
                ));
            }
            if rng.gen_bool(CODE_ASSIST_METRICS_P) {
                calls.push((
                    "recordCodeAssistMetrics",
                    serde_json::json!({
                        "project": project,
                        "session_id": session_id,
                        "code_assist_metrics": events::code_assist_metrics(),
                    }),
                ));
            }
        }

        for (index, (endpoint, body)) in calls.into_iter().enumerate() {
            if index > 0 {
                sleep_range(self.config.endpoint_gap_min_ms, self.config.endpoint_gap_max_ms)
                    .await;
            }

            let url = format!("{}/v1internal:{endpoint}", self.base_url);
            let request = FetchRequest::post(url, body).with_headers(headers.clone());

            match self.transport.execute(request).await {
                Ok(response) if response.is_success() => {
                    tracing::debug!("Heartbeat {endpoint} ok for {}", account.email);
                },
                Ok(response) => {
                    // 429s included: telemetry never dents the account.
                    tracing::debug!(
                        "Heartbeat {endpoint} for {} returned {}",
                        account.email,
                        response.status
                    );
                },
                Err(e) => {
                    tracing::debug!("Heartbeat {endpoint} for {} failed: {e}", account.email);
                },
            }
        }
    }
}
