use async_trait::async_trait;
use std::sync::Arc;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

use relay_types::error::UpstreamError;
use relay_types::models::{Account, AccountSource};

use super::{ActivityTracker, TelemetryLoop};
use crate::config::TelemetryConfig;
use crate::fetch::{FetchRequest, FetchResponse, Transport};
use crate::pool::{AccountPool, OAuthConfig};

/// Captures every request instead of talking to the network.
struct RecordingTransport {
    requests: Mutex<Vec<FetchRequest>>,
}

impl RecordingTransport {
    fn new() -> Arc<Self> {
        Arc::new(Self { requests: Mutex::new(Vec::new()) })
    }

    fn recorded(&self) -> Vec<FetchRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn execute(&self, request: FetchRequest) -> Result<FetchResponse, UpstreamError> {
        self.requests.lock().unwrap().push(request);
        Ok(FetchResponse { status: 200, body: "{}".to_string() })
    }
}

fn fast_config() -> TelemetryConfig {
    TelemetryConfig {
        initial_delay_ms: 20,
        interval_ms: 150,
        interval_jitter_ms: 0,
        min_sleep_ms: 10,
        error_backoff_ms: 100,
        active_session_window_ms: 600_000,
        account_gap_min_ms: 0,
        account_gap_max_ms: 1,
        endpoint_gap_min_ms: 0,
        endpoint_gap_max_ms: 1,
    }
}

fn heartbeat_account(email: &str, project: &str, last_used: i64) -> Account {
    let mut account = Account::new(email.to_string(), AccountSource::Oauth);
    account.project_id = Some(project.to_string());
    account.api_key = Some("mock-token".to_string());
    account.last_used = Some(last_used);
    account
}

async fn test_pool(accounts: Vec<Account>) -> (Arc<AccountPool>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let pool = AccountPool::load(dir.path().join("accounts.json"), OAuthConfig::default())
        .await
        .unwrap();
    for account in accounts {
        pool.add_account(account).await.unwrap();
    }
    (Arc::new(pool), dir)
}

#[tokio::test(flavor = "multi_thread")]
async fn heartbeats_only_active_accounts() {
    let now = chrono::Utc::now().timestamp_millis();
    let (pool, _dir) = test_pool(vec![
        heartbeat_account("active@x.com", "project-active", now),
        heartbeat_account("stale@x.com", "project-stale", now - 24 * 60 * 60 * 1000),
    ])
    .await;

    let transport = RecordingTransport::new();
    let telemetry = Arc::new(TelemetryLoop::new(
        Arc::clone(&pool),
        transport.clone(),
        fast_config(),
        "https://upstream.test".to_string(),
    ));
    telemetry.notify_activity();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Arc::clone(&telemetry).spawn(shutdown_rx);

    // Several iterations at the fast cadence; emission probabilities make
    // at least one call for the active account overwhelmingly likely.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let requests = transport.recorded();
    assert!(!requests.is_empty(), "active account should have heartbeated");

    let mut active_hits = 0;
    for request in &requests {
        let body = request.body.as_ref().expect("heartbeats carry a body");
        assert_eq!(body["project"], "project-active", "stale account must stay silent");
        active_hits += 1;

        assert!(request.url.contains("/v1internal:"));
        assert!(request.headers["User-Agent"].contains("Mozilla"));
        assert_eq!(request.headers["Authorization"], "Bearer mock-token");
    }
    assert!(active_hits >= 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn idle_proxy_emits_nothing() {
    let now = chrono::Utc::now().timestamp_millis();
    let (pool, _dir) = test_pool(vec![heartbeat_account("a@x.com", "p", now)]).await;

    let transport = RecordingTransport::new();
    let telemetry = Arc::new(TelemetryLoop::new(
        Arc::clone(&pool),
        transport.clone(),
        fast_config(),
        "https://upstream.test".to_string(),
    ));
    // No notify_activity(): the loop has never seen the proxy do work.

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Arc::clone(&telemetry).spawn(shutdown_rx);
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(transport.recorded().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn accounts_without_project_are_skipped() {
    let now = chrono::Utc::now().timestamp_millis();
    let mut account = heartbeat_account("noproject@x.com", "unused", now);
    account.project_id = None;
    let (pool, _dir) = test_pool(vec![account]).await;

    let transport = RecordingTransport::new();
    let telemetry = Arc::new(TelemetryLoop::new(
        Arc::clone(&pool),
        transport.clone(),
        fast_config(),
        "https://upstream.test".to_string(),
    ));
    telemetry.notify_activity();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Arc::clone(&telemetry).spawn(shutdown_rx);
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    assert!(transport.recorded().is_empty());
}

#[tokio::test]
async fn session_id_is_stable_per_account() {
    let now = chrono::Utc::now().timestamp_millis();
    let (pool, _dir) = test_pool(vec![heartbeat_account("s@x.com", "p", now)]).await;

    let transport = RecordingTransport::new();
    let telemetry = TelemetryLoop::new(
        Arc::clone(&pool),
        transport.clone(),
        fast_config(),
        "https://upstream.test".to_string(),
    );

    let account = pool.get_account("s@x.com").await.unwrap();
    // Emit twice directly; any session_id observed must be identical.
    telemetry.emit_for_account(&account, 0).await;
    telemetry.emit_for_account(&account, 0).await;

    let session_ids: Vec<String> = transport
        .recorded()
        .iter()
        .filter_map(|r| r.body.as_ref()?.get("session_id")?.as_str().map(String::from))
        .collect();
    for pair in session_ids.windows(2) {
        assert_eq!(pair[0], pair[1]);
    }
}

#[test]
fn activity_tracker_starts_empty() {
    let tracker = ActivityTracker::new();
    assert!(tracker.last().is_none());
    tracker.touch();
    assert!(tracker.last().is_some());
}
