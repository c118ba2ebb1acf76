//! Typed error definitions for CloudCode Relay.
//!
//! Structured error hierarchy split by domain. All errors are:
//!
//! - **Serializable** for API responses via serde
//! - **Displayable** for logging via Display
//! - **Matchable** for handling logic via enum variants
//! - **Composable** via thiserror derive macros

mod account;
mod config;
mod upstream;

pub use account::AccountError;
pub use config::ConfigError;
pub use upstream::UpstreamError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type wrapping all domain-specific errors.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "domain", content = "error")]
pub enum RelayError {
    /// Wraps an account-related error
    #[error("Account error: {0}")]
    Account(#[from] AccountError),

    /// Wraps an upstream transport/protocol error
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    /// Wraps a configuration error
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Standard Result type using RelayError.
pub type Result<T> = std::result::Result<T, RelayError>;
