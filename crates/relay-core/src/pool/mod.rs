//! Account pool and token manager.
//!
//! The pool owns the persistent account registry, selects an account per
//! outbound request, refreshes OAuth tokens on demand (singleflight per
//! account), tracks status from upstream signals, and manages per-account
//! fingerprint rotation. All mutations flow through this interface and
//! writes to disk are serialized, so a concurrent reader always sees a
//! complete file.

mod selection;
mod store;
mod token;

#[cfg(test)]
mod tests;

pub use selection::PoolStats;
pub use token::OAuthConfig;

use dashmap::DashMap;
use regex::Regex;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};
use tokio::sync::{Mutex, RwLock};

use relay_types::error::{AccountError, RelayError};
use relay_types::models::{
    Account, AccountStatus, CachedToken, DeviceFingerprint, FingerprintReason, SafeAccountView,
};

use crate::fingerprint;
use crate::telemetry::ActivityTracker;

use store::AccountsFile;

/// The account registry and token manager.
pub struct AccountPool {
    accounts: RwLock<Vec<Account>>,
    settings: RwLock<serde_json::Map<String, serde_json::Value>>,
    path: PathBuf,
    save_lock: Mutex<()>,
    token_cache: DashMap<String, CachedToken>,
    refresh_locks: DashMap<String, Arc<Mutex<()>>>,
    core_model: Regex,
    http: reqwest::Client,
    oauth: OAuthConfig,
    activity: OnceLock<Arc<ActivityTracker>>,
}

impl AccountPool {
    /// Load the registry from `path`, synthesizing missing fingerprints
    /// and upgrading legacy ones, then persist any repairs.
    pub async fn load(path: PathBuf, oauth: OAuthConfig) -> Result<Self, RelayError> {
        let file = store::load_file(&path)?;

        let mut repaired = false;
        let mut accounts = file.accounts;
        for account in &mut accounts {
            match account.fingerprint.take() {
                None => {
                    tracing::info!("Synthesizing fingerprint for {}", account.email);
                    account.fingerprint = Some(fingerprint::generate());
                    repaired = true;
                },
                Some(fp) => {
                    let upgraded = fingerprint::update_version(fp.clone());
                    if upgraded != fp {
                        tracing::info!("Upgraded legacy fingerprint for {}", account.email);
                        repaired = true;
                    }
                    account.fingerprint = Some(upgraded);
                },
            }
        }

        let pool = Self {
            accounts: RwLock::new(accounts),
            settings: RwLock::new(file.settings),
            path,
            save_lock: Mutex::new(()),
            token_cache: DashMap::new(),
            refresh_locks: DashMap::new(),
            core_model: Regex::new(selection::CORE_MODEL_PATTERN)
                .expect("core model pattern is valid"),
            http: reqwest::Client::new(),
            oauth,
            activity: OnceLock::new(),
        };

        if repaired {
            pool.save().await?;
        }

        let count = pool.accounts.read().await.len();
        tracing::info!("Account pool loaded: {} account(s)", count);
        Ok(pool)
    }

    /// Wire the telemetry activity tracker; selection bumps it.
    pub fn attach_activity(&self, tracker: Arc<ActivityTracker>) {
        let _ = self.activity.set(tracker);
    }

    /// Persist the registry (serialized, atomic).
    pub async fn save(&self) -> Result<(), RelayError> {
        let _guard = self.save_lock.lock().await;
        let file = AccountsFile {
            accounts: self.accounts.read().await.clone(),
            settings: self.settings.read().await.clone(),
        };
        store::save_file(&self.path, &file).await?;
        Ok(())
    }

    /// Pick the next account for `model` and mark it used.
    ///
    /// Fails with `NoAccountAvailable` instead of retrying silently.
    pub async fn select_account(&self, model: &str) -> Result<Account, RelayError> {
        let selected = {
            let mut accounts = self.accounts.write().await;
            let email = selection::pick(&accounts, model, &self.core_model).ok_or_else(|| {
                AccountError::NoAccountAvailable {
                    reason: "no enabled, valid account with quota headroom".to_string(),
                }
            })?;
            let account = accounts
                .iter_mut()
                .find(|a| a.email == email)
                .ok_or_else(|| AccountError::NotFound { email: email.clone() })?;
            account.touch();
            account.clone()
        };

        if let Some(tracker) = self.activity.get() {
            tracker.touch();
        }

        tracing::debug!("Selected account {} for {}", selected.email, model);
        self.save().await?;
        Ok(selected)
    }

    /// Run `mutate` against one account and persist the result.
    async fn with_account<T>(
        &self,
        email: &str,
        mutate: impl FnOnce(&mut Account) -> Result<T, RelayError>,
    ) -> Result<T, RelayError> {
        let result = {
            let mut accounts = self.accounts.write().await;
            let account = accounts
                .iter_mut()
                .find(|a| a.email == email)
                .ok_or_else(|| AccountError::NotFound { email: email.to_string() })?;
            mutate(account)?
        };
        self.save().await?;
        Ok(result)
    }

    /// Register a new account; rejects duplicate emails.
    pub async fn add_account(&self, mut account: Account) -> Result<(), RelayError> {
        {
            let mut accounts = self.accounts.write().await;
            if accounts.iter().any(|a| a.email == account.email) {
                return Err(AccountError::InvalidArgument {
                    message: format!("account {} already exists", account.email),
                }
                .into());
            }
            if account.fingerprint.is_none() {
                account.fingerprint = Some(fingerprint::generate());
            }
            accounts.push(account);
        }
        self.save().await
    }

    /// Remove an account entirely.
    pub async fn remove_account(&self, email: &str) -> Result<(), RelayError> {
        {
            let mut accounts = self.accounts.write().await;
            let before = accounts.len();
            accounts.retain(|a| a.email != email);
            if accounts.len() == before {
                return Err(AccountError::NotFound { email: email.to_string() }.into());
            }
        }
        self.token_cache.remove(email);
        self.save().await
    }

    // ===== Upstream signal bookkeeping =====

    /// Successful forward request: the account is healthy.
    pub async fn record_success(&self, email: &str) {
        let result = self
            .with_account(email, |account| {
                account.status = AccountStatus::Ok;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!("record_success({email}): {e}");
        }
    }

    /// 429 observed: mark limited and zero the limiting model's quota.
    /// Never invalidates the account.
    pub async fn record_rate_limited(&self, email: &str, model: &str) {
        let result = self
            .with_account(email, |account| {
                account.status = AccountStatus::Limited;
                account.subscription.set_model_quota(model, 0.0, String::new());
                Ok(())
            })
            .await;
        match result {
            Ok(()) => tracing::warn!("Account {} rate-limited on {}", email, model),
            Err(e) => tracing::warn!("record_rate_limited({email}): {e}"),
        }
    }

    /// 5xx survived the fetch layer's retries: transient error state.
    pub async fn record_server_error(&self, email: &str) {
        let result = self
            .with_account(email, |account| {
                account.status = AccountStatus::Error;
                Ok(())
            })
            .await;
        if let Err(e) = result {
            tracing::warn!("record_server_error({email}): {e}");
        }
    }

    /// 401 or terminal refresh failure: retire the account.
    pub(crate) async fn invalidate_account(&self, email: &str) {
        let result = self
            .with_account(email, |account| {
                account.mark_invalid();
                Ok(())
            })
            .await;
        match result {
            Ok(()) => tracing::error!("Account {} invalidated", email),
            Err(e) => tracing::warn!("invalidate_account({email}): {e}"),
        }
        self.token_cache.remove(email);
    }

    /// 401 from the upstream on a forward request.
    pub async fn record_unauthorized(&self, email: &str) {
        self.invalidate_account(email).await;
    }

    /// Apply quota observations (from quota probes or response metadata).
    pub async fn apply_quota(
        &self,
        email: &str,
        updates: impl IntoIterator<Item = (String, f64)>,
    ) -> Result<(), RelayError> {
        self.with_account(email, |account| {
            for (model, remaining) in updates {
                account.subscription.set_model_quota(&model, remaining, String::new());
            }
            Ok(())
        })
        .await
    }

    /// Record a discovered upstream tenant for the account.
    pub async fn set_project_id(&self, email: &str, project_id: &str) -> Result<(), RelayError> {
        self.with_account(email, |account| {
            account.project_id = Some(project_id.to_string());
            Ok(())
        })
        .await
    }

    // ===== Fingerprint rotation =====

    /// Replace the account's fingerprint with a fresh one; the old one
    /// moves to the history head.
    pub async fn regenerate_fingerprint(
        &self,
        email: &str,
    ) -> Result<DeviceFingerprint, RelayError> {
        self.with_account(email, |account| {
            let fresh = fingerprint::generate();
            account.rotate_fingerprint(fresh.clone(), FingerprintReason::Regenerated);
            Ok(fresh)
        })
        .await
    }

    /// Re-install a historical fingerprint as current.
    pub async fn restore_fingerprint(
        &self,
        email: &str,
        history_index: usize,
    ) -> Result<DeviceFingerprint, RelayError> {
        self.with_account(email, |account| {
            account.restore_fingerprint(history_index).map_err(RelayError::from)
        })
        .await
    }

    // ===== Views =====

    /// Redacted per-account status lines.
    pub async fn status_views(&self) -> Vec<SafeAccountView> {
        self.accounts.read().await.iter().map(Account::safe_view).collect()
    }

    /// Aggregate pool health.
    pub async fn stats(&self) -> PoolStats {
        selection::rollup(&self.accounts.read().await, &self.core_model)
    }

    /// Full account snapshot (crate-internal; telemetry iterates it).
    pub async fn accounts_snapshot(&self) -> Vec<Account> {
        self.accounts.read().await.clone()
    }

    /// Look up one account by email.
    pub async fn get_account(&self, email: &str) -> Option<Account> {
        self.accounts.read().await.iter().find(|a| a.email == email).cloned()
    }

    pub async fn len(&self) -> usize {
        self.accounts.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.accounts.read().await.is_empty()
    }
}
