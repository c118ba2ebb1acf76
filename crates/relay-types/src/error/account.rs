//! Account-related errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during account pool operations.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum AccountError {
    /// Account with the given email is not registered
    #[error("Account not found: {email}")]
    NotFound { email: String },

    /// Selection filter came up empty
    #[error("No account available: {reason}")]
    NoAccountAvailable { reason: String },

    /// Caller passed an out-of-range or malformed argument
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The credential is terminally dead (401 / revoked refresh token)
    #[error("Account {email} is invalid and was retired")]
    Invalidated { email: String },

    /// OAuth token refresh failed
    #[error("Failed to refresh token for {email}: {message}")]
    TokenRefreshFailed { email: String, message: String },

    /// Account has neither a refresh token nor an API key
    #[error("Account {email} has no usable credential")]
    MissingCredential { email: String },

    /// Registry file I/O or parse error
    #[error("Account storage error: {message}")]
    Storage { message: String },
}

impl AccountError {
    /// Whether this error should terminally invalidate the account.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Invalidated { .. })
    }
}
