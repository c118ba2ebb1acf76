//! # Relay Types
//!
//! Shared data models, protocol shapes, and error definitions for
//! CloudCode Relay. This crate performs no I/O: everything here is a
//! plain serde-able type consumed by `relay-core` and the server binary.

pub mod error;
pub mod models;
pub mod protocol;

pub use error::{AccountError, ConfigError, RelayError, Result, UpstreamError};
pub use models::{
    Account, AccountSource, AccountStatus, CachedToken, ClientMetadata, DeviceFingerprint,
    FingerprintRecord, FingerprintReason, ModelQuota, Subscription, SubscriptionTier,
};
