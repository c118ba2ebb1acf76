//! Account model and related types.

use serde::{Deserialize, Serialize};

use super::fingerprint::{
    DeviceFingerprint, FingerprintReason, FingerprintRecord, MAX_FINGERPRINT_HISTORY,
};
use super::quota::Subscription;
use crate::error::AccountError;

/// Where an account's credential came from.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountSource {
    /// Added by hand through the CLI
    Manual,
    /// Captured via the OAuth flow
    Oauth,
    /// Bulk-imported from another install
    Imported,
}

/// Health of an account as derived from upstream signals.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    /// Recent traffic succeeded
    Ok,
    /// Upstream rate-limited the account
    Limited,
    /// Transient upstream failures after retries
    Error,
    /// No signal observed yet
    Unknown,
}

/// One upstream credential with its rotation state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    /// Email address, unique key within the pool
    pub email: String,
    pub source: AccountSource,
    /// Upstream tenant, absent until discovered
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_id: Option<String>,
    /// OAuth refresh token (secret, never exposed in status views)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub oauth_refresh_token: Option<String>,
    /// Static API key (secret, never exposed in status views)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub enabled: bool,
    /// Terminal flag: the credential is dead (revoked/401)
    #[serde(default)]
    pub is_invalid: bool,
    /// Last selection time (epoch ms), absent until first use
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
    #[serde(default = "default_status")]
    pub status: AccountStatus,
    #[serde(default)]
    pub subscription: Subscription,
    /// Current device identity; synthesized on first load when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<DeviceFingerprint>,
    /// Retired fingerprints, most recent first, capped
    #[serde(default)]
    pub fingerprint_history: Vec<FingerprintRecord>,
}

const fn default_status() -> AccountStatus {
    AccountStatus::Unknown
}

impl Account {
    /// Create a new account with the given email and source.
    pub fn new(email: String, source: AccountSource) -> Self {
        Self {
            email,
            source,
            project_id: None,
            oauth_refresh_token: None,
            api_key: None,
            enabled: true,
            is_invalid: false,
            last_used: None,
            status: AccountStatus::Unknown,
            subscription: Subscription::default(),
            fingerprint: None,
            fingerprint_history: Vec::new(),
        }
    }

    /// Whether the account may carry forward traffic at all.
    pub const fn is_selectable(&self) -> bool {
        self.enabled && !self.is_invalid
    }

    /// Update the last used timestamp to now.
    pub fn touch(&mut self) {
        self.last_used = Some(chrono::Utc::now().timestamp_millis());
    }

    /// Terminal invalidation (401 / revoked refresh token).
    pub fn mark_invalid(&mut self) {
        self.is_invalid = true;
    }

    /// The upstream project to report for this account.
    pub fn effective_project_id(&self) -> Option<&str> {
        self.subscription.project_id.as_deref().or(self.project_id.as_deref())
    }

    /// Retire the current fingerprint into history and install a new one.
    ///
    /// History keeps the most recent entry first and never exceeds
    /// [`MAX_FINGERPRINT_HISTORY`].
    pub fn rotate_fingerprint(&mut self, fresh: DeviceFingerprint, reason: FingerprintReason) {
        if let Some(old) = self.fingerprint.take() {
            self.fingerprint_history.insert(
                0,
                FingerprintRecord {
                    fingerprint: old,
                    reason,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            );
            self.fingerprint_history.truncate(MAX_FINGERPRINT_HISTORY);
        }
        self.fingerprint = Some(fresh);
    }

    /// Re-install the fingerprint at `history_index` as current.
    ///
    /// The previous current fingerprint moves to the history head; the
    /// restored entry is removed so it never appears in its own history.
    pub fn restore_fingerprint(
        &mut self,
        history_index: usize,
    ) -> Result<DeviceFingerprint, AccountError> {
        if history_index >= self.fingerprint_history.len() {
            return Err(AccountError::InvalidArgument {
                message: format!(
                    "fingerprint history index {} out of range ({} entries)",
                    history_index,
                    self.fingerprint_history.len()
                ),
            });
        }

        let had_current = self.fingerprint.is_some();
        if let Some(old) = self.fingerprint.take() {
            self.fingerprint_history.insert(
                0,
                FingerprintRecord {
                    fingerprint: old,
                    reason: FingerprintReason::Restored,
                    timestamp: chrono::Utc::now().timestamp_millis(),
                },
            );
        }

        // The requested entry shifted down by one when the old current
        // was pushed onto the head.
        let restored =
            self.fingerprint_history.remove(history_index + usize::from(had_current)).fingerprint;
        self.fingerprint_history.truncate(MAX_FINGERPRINT_HISTORY);
        self.fingerprint = Some(restored.clone());
        Ok(restored)
    }

    /// Redacted view for status APIs.
    pub fn safe_view(&self) -> SafeAccountView {
        SafeAccountView {
            email: self.email.clone(),
            source: self.source,
            enabled: self.enabled,
            is_invalid: self.is_invalid,
            status: self.status,
            subscription: self.subscription.clone(),
            last_used: self.last_used,
            has_fingerprint: self.fingerprint.is_some(),
        }
    }
}

/// Per-account status line with every secret stripped.
///
/// The full fingerprint, device id, session token, quota user, API key,
/// and refresh token are deliberately not representable here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SafeAccountView {
    pub email: String,
    pub source: AccountSource,
    pub enabled: bool,
    pub is_invalid: bool,
    pub status: AccountStatus,
    pub subscription: Subscription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_used: Option<i64>,
    pub has_fingerprint: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::fingerprint::{Arch, ClientMetadata, FingerprintPlatform};

    fn fp(tag: &str) -> DeviceFingerprint {
        DeviceFingerprint {
            device_id: format!("device-{tag}"),
            session_token: format!("token-{tag}"),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) Code/1.96.2".to_string(),
            api_client: "gl-node/20.11.0".to_string(),
            quota_user: format!("device-{tag}"),
            client_metadata: ClientMetadata {
                ide_type: "IDE_UNSPECIFIED".to_string(),
                platform: FingerprintPlatform::Linux,
                plugin_type: "CLOUD_CODE".to_string(),
                os_version: "6.5.0".to_string(),
                arch: Arch::X64,
                sqm_id: "{ABC}".to_string(),
            },
            created_at: 0,
        }
    }

    #[test]
    fn history_never_exceeds_cap() {
        let mut account = Account::new("a@example.com".to_string(), AccountSource::Manual);
        account.fingerprint = Some(fp("0"));
        for i in 1..10 {
            account.rotate_fingerprint(fp(&i.to_string()), FingerprintReason::Regenerated);
        }
        assert!(account.fingerprint_history.len() <= MAX_FINGERPRINT_HISTORY);
    }

    #[test]
    fn restore_removes_entry_from_history() {
        let mut account = Account::new("a@example.com".to_string(), AccountSource::Manual);
        account.fingerprint = Some(fp("0"));
        account.rotate_fingerprint(fp("1"), FingerprintReason::Regenerated);
        account.rotate_fingerprint(fp("2"), FingerprintReason::Regenerated);
        // history: [fp1, fp0], current fp2

        let restored = account.restore_fingerprint(1).unwrap();
        assert_eq!(restored.device_id, "device-0");
        assert_eq!(account.fingerprint.as_ref().unwrap().device_id, "device-0");

        let ids: Vec<_> =
            account.fingerprint_history.iter().map(|r| r.fingerprint.device_id.as_str()).collect();
        assert_eq!(ids, vec!["device-2", "device-1"]);
        assert!(!ids.contains(&"device-0"), "restored fingerprint must leave history");
    }

    #[test]
    fn restore_out_of_range_fails() {
        let mut account = Account::new("a@example.com".to_string(), AccountSource::Manual);
        account.fingerprint = Some(fp("0"));
        assert!(account.restore_fingerprint(0).is_err());
    }

    #[test]
    fn safe_view_has_no_secrets() {
        let mut account = Account::new("a@example.com".to_string(), AccountSource::Oauth);
        account.oauth_refresh_token = Some("1//refresh".to_string());
        account.fingerprint = Some(fp("0"));

        let json = serde_json::to_string(&account.safe_view()).unwrap();
        assert!(!json.contains("refresh"));
        assert!(!json.contains("device-0"));
        assert!(json.contains("hasFingerprint"));
    }
}
