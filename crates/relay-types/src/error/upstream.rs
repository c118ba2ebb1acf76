//! Upstream transport and protocol errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors surfaced by the throttled fetch layer and its callers.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum UpstreamError {
    /// Transient transport failure (connection reset, timeout, DNS)
    #[error("Network error: {message}")]
    Network { message: String },

    /// 5xx that survived the bounded retries
    #[error("Upstream returned {status} after retries")]
    RetriableServer { status: u16 },

    /// 429 — surfaced immediately so the pool can switch accounts
    #[error("Rate limited{}", model.as_deref().map(|m| format!(" on {m}")).unwrap_or_default())]
    RateLimited { model: Option<String> },

    /// 401 — the credential is dead
    #[error("Unauthorized by upstream")]
    Unauthorized,

    /// Any other 4xx passed through to the client
    #[error("Upstream returned {status}: {body}")]
    Status { status: u16, body: String },

    /// Bug-class failure inside the relay itself
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl UpstreamError {
    /// Map an HTTP status to the matching variant, if it is an error status.
    pub fn from_status(status: u16, body: String, model: Option<&str>) -> Option<Self> {
        match status {
            200..=399 => None,
            401 => Some(Self::Unauthorized),
            429 => Some(Self::RateLimited { model: model.map(str::to_string) }),
            500 | 502 | 503 | 504 => Some(Self::RetriableServer { status }),
            _ => Some(Self::Status { status, body }),
        }
    }

    /// Whether the fetch layer may retry this error locally.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::RetriableServer { .. })
    }
}
