//! # Relay Core
//!
//! Core logic for CloudCode Relay: the account pool and token manager,
//! device fingerprint engine, traffic shaper, throttled fetch layer,
//! telemetry heartbeat loop, response converter, and usage stats.
//!
//! Every component here is explicitly constructed and passed by
//! reference; the server binary wires them once at startup. There are no
//! process-global singletons.

pub mod config;
pub mod convert;
pub mod emulation;
pub mod fetch;
pub mod fingerprint;
pub mod jitter;
pub mod pool;
pub mod shaper;
pub mod signature;
pub mod telemetry;
pub mod usage;

pub use config::RelayConfig;
pub use convert::convert_google_to_anthropic;
pub use fetch::{FetchRequest, FetchResponse, ThrottledFetch, Transport};
pub use pool::AccountPool;
pub use shaper::TrafficShaper;
pub use signature::SignatureCache;
pub use telemetry::TelemetryLoop;
pub use usage::UsageStats;
