//! Anthropic Messages API response types.

use serde::{Deserialize, Serialize};

/// Message content block.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type")]
pub enum ContentBlock {
    /// Model reasoning emitted before the visible answer.
    #[serde(rename = "thinking")]
    Thinking {
        thinking: String,
        /// Opaque continuation signature from the upstream
        #[serde(skip_serializing_if = "Option::is_none")]
        signature: Option<String>,
    },
    /// Plain text content.
    #[serde(rename = "text")]
    Text { text: String },
    /// Tool invocation requested by the model.
    #[serde(rename = "tool_use")]
    ToolUse {
        id: String,
        name: String,
        input: serde_json::Value,
        /// Signature carried verbatim from the upstream part; clients
        /// ignore unknown keys.
        #[serde(rename = "thoughtSignature", skip_serializing_if = "Option::is_none")]
        thought_signature: Option<String>,
    },
    /// Inline image with base64 source.
    #[serde(rename = "image")]
    Image { source: ImageSource },
}

/// Base64 image source.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImageSource {
    /// Source type (always "base64" here)
    #[serde(rename = "type")]
    pub source_type: String,
    /// MIME type (e.g. "image/png")
    pub media_type: String,
    /// Base64-encoded payload
    pub data: String,
}

/// Why the model stopped generating.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    ToolUse,
}

/// Token accounting for one response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_input_tokens: u64,
}

/// Complete non-streaming message envelope.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MessageResponse {
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub role: String,
    pub model: String,
    pub content: Vec<ContentBlock>,
    pub stop_reason: StopReason,
    pub usage: Usage,
}
