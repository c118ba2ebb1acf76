//! Upstream → client response normalization.
//!
//! Maps the Google generate-content shape (thinking parts, tool calls,
//! inline images) onto the Anthropic-style message envelope. This
//! function is total: any input with a `candidates` array — including an
//! empty one — produces a well-formed message with at least one content
//! block.

use rand::Rng;

use relay_types::protocol::claude::{
    ContentBlock, ImageSource, MessageResponse, StopReason, Usage,
};
use relay_types::protocol::gemini::{GenerateContentResponse, Part};

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| format!("{:x}", rng.gen_range(0..16u8))).collect()
}

/// Generated tool-use id for upstream calls that arrive without one.
fn fallback_tool_id() -> String {
    format!("toolu_{}", random_hex(24))
}

fn convert_part(part: &Part, blocks: &mut Vec<ContentBlock>, has_tool_call: &mut bool) {
    if part.is_thought() {
        blocks.push(ContentBlock::Thinking {
            thinking: part.text.clone().unwrap_or_default(),
            signature: part.thought_signature.clone(),
        });
        return;
    }

    if let Some(call) = &part.function_call {
        *has_tool_call = true;
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone().unwrap_or_else(fallback_tool_id),
            name: call.name.clone(),
            input: call.args.clone().unwrap_or_else(|| serde_json::json!({})),
            thought_signature: part.thought_signature.clone(),
        });
        return;
    }

    if let Some(inline) = &part.inline_data {
        blocks.push(ContentBlock::Image {
            source: ImageSource {
                source_type: "base64".to_string(),
                media_type: inline.mime_type.clone(),
                data: inline.data.clone(),
            },
        });
        return;
    }

    if let Some(text) = &part.text {
        blocks.push(ContentBlock::Text { text: text.clone() });
    }
}

fn map_stop_reason(finish_reason: Option<&str>, has_tool_call: bool) -> StopReason {
    if has_tool_call {
        return StopReason::ToolUse;
    }
    match finish_reason {
        Some("MAX_TOKENS") => StopReason::MaxTokens,
        Some("TOOL_USE") => StopReason::ToolUse,
        _ => StopReason::EndTurn,
    }
}

/// Convert an upstream response (raw, or wrapped in `{"response": …}`)
/// into the Anthropic message envelope.
pub fn convert_google_to_anthropic(raw: &serde_json::Value, model_name: &str) -> MessageResponse {
    let unwrapped = raw.get("response").unwrap_or(raw);
    let response: GenerateContentResponse =
        serde_json::from_value(unwrapped.clone()).unwrap_or_default();

    let mut blocks = Vec::new();
    let mut has_tool_call = false;
    let mut finish_reason = None;

    if let Some(candidate) = response.candidates.first() {
        finish_reason = candidate.finish_reason.clone();
        if let Some(content) = &candidate.content {
            for part in &content.parts {
                convert_part(part, &mut blocks, &mut has_tool_call);
            }
        }
    }

    if blocks.is_empty() {
        blocks.push(ContentBlock::Text { text: String::new() });
    }

    let usage = response.usage_metadata.unwrap_or_default();
    let input_tokens =
        usage.prompt_token_count.saturating_sub(usage.cached_content_token_count);

    MessageResponse {
        id: format!("msg_{}", random_hex(24)),
        message_type: "message".to_string(),
        role: "assistant".to_string(),
        model: model_name.to_string(),
        content: blocks,
        stop_reason: map_stop_reason(finish_reason.as_deref(), has_tool_call),
        usage: Usage {
            input_tokens,
            output_tokens: usage.candidates_token_count,
            cache_read_input_tokens: usage.cached_content_token_count,
        },
    }
}
