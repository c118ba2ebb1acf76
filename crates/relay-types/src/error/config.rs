//! Configuration errors.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or persisting relay configuration.
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "details")]
pub enum ConfigError {
    /// Config file could not be read or written
    #[error("Config I/O error: {message}")]
    Io { message: String },

    /// Config file exists but does not parse
    #[error("Config parse error: {message}")]
    Parse { message: String },

    /// A knob holds a value outside its allowed range
    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}
