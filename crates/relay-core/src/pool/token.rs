//! OAuth token refresh with per-account singleflight.

use serde::Deserialize;
use std::sync::Arc;

use relay_types::error::{AccountError, RelayError};
use relay_types::models::CachedToken;

use super::AccountPool;

/// Google OAuth token endpoint.
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Installed-app OAuth client the upstream IDE ships with.
const OAUTH_CLIENT_ID: &str =
    "681255809395-oo8ft2oprdrnp9e3aqf6av3hmdib135j.apps.googleusercontent.com";
const OAUTH_CLIENT_SECRET: &str = "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";

/// Token endpoint configuration; tests point this at a mock server.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
}

impl Default for OAuthConfig {
    fn default() -> Self {
        Self {
            token_url: GOOGLE_TOKEN_URL.to_string(),
            client_id: OAUTH_CLIENT_ID.to_string(),
            client_secret: OAUTH_CLIENT_SECRET.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

impl AccountPool {
    /// Return a valid access token for the account, refreshing if needed.
    ///
    /// Accounts with a static API key use it directly. Otherwise the
    /// cached token is returned while valid; expired tokens trigger one
    /// OAuth refresh-token grant. Concurrent refreshes for the same email
    /// coalesce into a single network call: callers serialize on a
    /// per-email mutex and re-check the cache once they hold it.
    pub async fn get_token_for_account(&self, email: &str) -> Result<String, RelayError> {
        if let Some(token) = self.token_cache.get(email) {
            if token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }

        let lock = self
            .refresh_locks
            .entry(email.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        if let Some(token) = self.token_cache.get(email) {
            if token.is_valid() {
                return Ok(token.access_token.clone());
            }
        }

        let (refresh_token, api_key) = {
            let accounts = self.accounts.read().await;
            let account = accounts
                .iter()
                .find(|a| a.email == email)
                .ok_or_else(|| AccountError::NotFound { email: email.to_string() })?;
            if account.is_invalid {
                return Err(AccountError::Invalidated { email: email.to_string() }.into());
            }
            (account.oauth_refresh_token.clone(), account.api_key.clone())
        };

        if let Some(key) = api_key {
            return Ok(key);
        }

        let refresh_token = refresh_token
            .ok_or_else(|| AccountError::MissingCredential { email: email.to_string() })?;

        let token = self.refresh_access_token(email, &refresh_token).await?;
        let access_token = token.access_token.clone();
        self.token_cache.insert(email.to_string(), token);
        Ok(access_token)
    }

    async fn refresh_access_token(
        &self,
        email: &str,
        refresh_token: &str,
    ) -> Result<CachedToken, RelayError> {
        let response = self
            .http
            .post(&self.oauth.token_url)
            .form(&[
                ("client_id", self.oauth.client_id.as_str()),
                ("client_secret", self.oauth.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AccountError::TokenRefreshFailed {
                email: email.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        // A revoked/expired refresh token is terminal for the account.
        if status.as_u16() == 401 || body.contains("invalid_grant") {
            tracing::error!(
                "Retiring account {}: refresh rejected ({}, invalid_grant)",
                email,
                status
            );
            self.invalidate_account(email).await;
            return Err(AccountError::Invalidated { email: email.to_string() }.into());
        }

        if !status.is_success() {
            return Err(AccountError::TokenRefreshFailed {
                email: email.to_string(),
                message: format!("token endpoint returned {status}: {body}"),
            }
            .into());
        }

        let parsed: TokenResponse =
            serde_json::from_str(&body).map_err(|e| AccountError::TokenRefreshFailed {
                email: email.to_string(),
                message: format!("bad token response: {e}"),
            })?;

        tracing::debug!("Refreshed access token for {}", email);
        Ok(CachedToken::new(parsed.access_token, parsed.expires_in))
    }
}
