use std::path::PathBuf;
use std::sync::Arc;

use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use relay_types::models::{Account, AccountSource, AccountStatus};

use super::{AccountPool, OAuthConfig};

fn test_oauth(server: &MockServer) -> OAuthConfig {
    OAuthConfig {
        token_url: format!("{}/token", server.uri()),
        client_id: "test-client".to_string(),
        client_secret: "test-secret".to_string(),
    }
}

fn registry_path(dir: &tempfile::TempDir) -> PathBuf {
    dir.path().join("accounts.json")
}

fn oauth_account(email: &str) -> Account {
    let mut account = Account::new(email.to_string(), AccountSource::Oauth);
    account.oauth_refresh_token = Some(format!("1//refresh-{email}"));
    account.status = AccountStatus::Ok;
    account
}

async fn pool_with(dir: &tempfile::TempDir, oauth: OAuthConfig, accounts: Vec<Account>) -> AccountPool {
    let pool = AccountPool::load(registry_path(dir), oauth).await.unwrap();
    for account in accounts {
        pool.add_account(account).await.unwrap();
    }
    pool
}

#[tokio::test]
async fn load_synthesizes_missing_fingerprints() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    // Write the raw file directly (add_account would synthesize a
    // fingerprint) to exercise the load-time repair path.
    let bare = Account::new("bare@x.com".to_string(), AccountSource::Imported);
    let raw = serde_json::json!({"accounts": [bare], "settings": {}});
    std::fs::write(registry_path(&dir), serde_json::to_string(&raw).unwrap()).unwrap();

    let pool = AccountPool::load(registry_path(&dir), test_oauth(&server)).await.unwrap();
    let account = pool.get_account("bare@x.com").await.unwrap();
    let fp = account.fingerprint.expect("fingerprint synthesized on load");
    assert!(fp.user_agent.starts_with("Mozilla/5.0"));

    // The repair was persisted: a reload sees the same fingerprint.
    let reloaded = AccountPool::load(registry_path(&dir), test_oauth(&server)).await.unwrap();
    let again = reloaded.get_account("bare@x.com").await.unwrap();
    assert_eq!(again.fingerprint.unwrap().device_id, fp.device_id);
}

#[tokio::test]
async fn selection_updates_last_used_and_is_lru() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let pool = pool_with(
        &dir,
        test_oauth(&server),
        vec![oauth_account("first@x.com"), oauth_account("second@x.com")],
    )
    .await;

    let a = pool.select_account("gemini-1.5-pro").await.unwrap();
    let b = pool.select_account("gemini-1.5-pro").await.unwrap();
    let c = pool.select_account("gemini-1.5-pro").await.unwrap();

    // Round-robin through LRU: the two accounts alternate.
    assert_ne!(a.email, b.email);
    assert_eq!(a.email, c.email);
    assert!(pool.get_account(&a.email).await.unwrap().last_used.is_some());
}

#[tokio::test]
async fn exhausted_pool_fails_with_no_account_available() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let pool = pool_with(&dir, test_oauth(&server), vec![]).await;

    let err = pool.select_account("gemini-1.5-pro").await.unwrap_err();
    assert!(err.to_string().contains("No account available"), "got: {err}");
}

#[tokio::test]
async fn token_refresh_singleflight_coalesces_concurrent_callers() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_millis(200))
                .set_body_json(serde_json::json!({
                    "access_token": "ya29.fresh",
                    "expires_in": 3600,
                    "token_type": "Bearer"
                })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let pool =
        Arc::new(pool_with(&dir, test_oauth(&server), vec![oauth_account("solo@x.com")]).await);

    let callers = (0..5).map(|_| {
        let pool = Arc::clone(&pool);
        async move { pool.get_token_for_account("solo@x.com").await.unwrap() }
    });
    for token in futures::future::join_all(callers).await {
        assert_eq!(token, "ya29.fresh");
    }
    // wiremock verifies expect(1) on drop: exactly one network refresh.
}

#[tokio::test]
async fn cached_token_skips_the_network() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "ya29.once",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let pool = pool_with(&dir, test_oauth(&server), vec![oauth_account("solo@x.com")]).await;

    assert_eq!(pool.get_token_for_account("solo@x.com").await.unwrap(), "ya29.once");
    assert_eq!(pool.get_token_for_account("solo@x.com").await.unwrap(), "ya29.once");
}

#[tokio::test]
async fn api_key_accounts_skip_oauth_entirely() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    let mut account = Account::new("key@x.com".to_string(), AccountSource::Manual);
    account.api_key = Some("mock-token".to_string());

    let pool = pool_with(&dir, test_oauth(&server), vec![account]).await;
    assert_eq!(pool.get_token_for_account("key@x.com").await.unwrap(), "mock-token");
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn invalid_grant_terminally_invalidates_the_account() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_string(r#"{"error": "invalid_grant", "error_description": "revoked"}"#),
        )
        .mount(&server)
        .await;

    let pool = pool_with(&dir, test_oauth(&server), vec![oauth_account("dead@x.com")]).await;

    let err = pool.get_token_for_account("dead@x.com").await.unwrap_err();
    assert!(err.to_string().contains("invalid"), "got: {err}");

    let account = pool.get_account("dead@x.com").await.unwrap();
    assert!(account.is_invalid);

    // Invalid accounts never come back from selection.
    assert!(pool.select_account("gemini-1.5-pro").await.is_err());
}

#[tokio::test]
async fn rate_limit_marks_limited_but_never_invalidates() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let pool = pool_with(&dir, test_oauth(&server), vec![oauth_account("limited@x.com")]).await;

    pool.record_rate_limited("limited@x.com", "gemini-1.5-pro").await;

    let account = pool.get_account("limited@x.com").await.unwrap();
    assert_eq!(account.status, AccountStatus::Limited);
    assert!(!account.is_invalid);
    assert_eq!(
        account.subscription.model_quota("gemini-1.5-pro").unwrap().remaining_fraction,
        0.0
    );

    // A lone limited account is still the fallback of last resort.
    let selected = pool.select_account("gemini-1.5-pro").await.unwrap();
    assert_eq!(selected.email, "limited@x.com");
}

#[tokio::test]
async fn fingerprint_regenerate_then_restore_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let pool = pool_with(&dir, test_oauth(&server), vec![oauth_account("fp@x.com")]).await;

    let fp0 = pool.get_account("fp@x.com").await.unwrap().fingerprint.unwrap();
    let _fp1 = pool.regenerate_fingerprint("fp@x.com").await.unwrap();
    let fp2 = pool.regenerate_fingerprint("fp@x.com").await.unwrap();

    let account = pool.get_account("fp@x.com").await.unwrap();
    assert_eq!(account.fingerprint.as_ref().unwrap().device_id, fp2.device_id);
    assert_eq!(account.fingerprint_history.len(), 2);

    // History is [fp1, fp0]; restore index 1 brings fp0 back.
    let restored = pool.restore_fingerprint("fp@x.com", 1).await.unwrap();
    assert_eq!(restored.device_id, fp0.device_id);

    let account = pool.get_account("fp@x.com").await.unwrap();
    let history_ids: Vec<_> =
        account.fingerprint_history.iter().map(|r| r.fingerprint.device_id.clone()).collect();
    assert!(!history_ids.contains(&fp0.device_id), "restored fp left history");
    assert!(history_ids.contains(&fp2.device_id));

    // Out-of-range restore is an InvalidArgument error.
    let err = pool.restore_fingerprint("fp@x.com", 9).await.unwrap_err();
    assert!(err.to_string().contains("Invalid argument"), "got: {err}");
}

#[tokio::test]
async fn status_view_never_leaks_secrets() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let mut account = oauth_account("safe@x.com");
    account.api_key = Some("sk-secret".to_string());
    let pool = pool_with(&dir, test_oauth(&server), vec![account]).await;

    let views = pool.status_views().await;
    let json = serde_json::to_string(&views).unwrap();
    assert!(!json.contains("sk-secret"));
    assert!(!json.contains("refresh"));
    assert!(!json.contains("deviceId"));
    assert!(json.contains("\"hasFingerprint\":true"));
}

#[tokio::test]
async fn duplicate_email_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let server = MockServer::start().await;
    let pool = pool_with(&dir, test_oauth(&server), vec![oauth_account("dup@x.com")]).await;

    let err = pool.add_account(oauth_account("dup@x.com")).await.unwrap_err();
    assert!(err.to_string().contains("already exists"));
}
