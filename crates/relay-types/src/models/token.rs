//! Cached OAuth access token.

use serde::{Deserialize, Serialize};

/// Safety margin subtracted from the expiry when checking validity.
const EXPIRY_SKEW_MS: i64 = 60_000;

/// One cached access token for an account.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CachedToken {
    /// OAuth access token
    pub access_token: String,
    /// Absolute expiry (epoch ms)
    pub expires_at: i64,
}

impl CachedToken {
    /// Create a token expiring `expires_in` seconds from now.
    pub fn new(access_token: String, expires_in: i64) -> Self {
        let expires_at = chrono::Utc::now()
            .timestamp_millis()
            .saturating_add(expires_in.saturating_mul(1000));
        Self { access_token, expires_at }
    }

    /// Valid iff now is more than the skew window before expiry.
    pub fn is_valid(&self) -> bool {
        chrono::Utc::now().timestamp_millis() < self.expires_at - EXPIRY_SKEW_MS
    }
}
