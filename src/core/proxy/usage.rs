//! Family-specific token-usage extraction from upstream responses.
//!
//! Streamed responses are scanned as line-delimited `data:` frames; later
//! frames may refine earlier partial counts, and a zero or absent field
//! never overwrites a previously seen positive value. A parsing miss
//! degrades the cost record to zero rather than breaking the response.

use crate::core::types::{ProviderFamily, TokenUsage};
use serde_json::Value;

/// Extract usage from a complete (buffered) response body.
pub fn from_buffered(family: ProviderFamily, body: &[u8]) -> TokenUsage {
    let mut usage = TokenUsage::default();
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if let Some(found) = usage_from_value(family, &value) {
            usage.merge_from(&found);
        }
    }
    usage
}

/// Extract usage from accumulated event-stream text.
///
/// Scans `data:` frames, skipping the `[DONE]` sentinel and anything that
/// does not parse as JSON.
pub fn from_stream(family: ProviderFamily, raw: &str) -> TokenUsage {
    let mut usage = TokenUsage::default();
    for line in raw.lines() {
        let Some(data) = line.strip_prefix("data:") else {
            continue;
        };
        let data = data.trim();
        if data.is_empty() || data == "[DONE]" {
            continue;
        }
        let Ok(value) = serde_json::from_str::<Value>(data) else {
            continue;
        };
        if let Some(found) = usage_from_value(family, &value) {
            usage.merge_from(&found);
        }
    }
    usage
}

/// Best-effort read of the `model` field from a raw request body. Used only
/// for routing affinity and accounting; absence is tolerated.
pub fn model_from_body(body: &[u8]) -> Option<String> {
    serde_json::from_slice::<Value>(body)
        .ok()?
        .get("model")?
        .as_str()
        .map(str::to_owned)
}

fn usage_from_value(family: ProviderFamily, value: &Value) -> Option<TokenUsage> {
    match family {
        ProviderFamily::Anthropic => anthropic_usage(value),
        ProviderFamily::OpenAi => openai_usage(value),
    }
}

/// Anthropic envelopes carry `usage` either top-level (`message_delta`) or
/// nested under `message` (`message_start`).
fn anthropic_usage(value: &Value) -> Option<TokenUsage> {
    let usage = value
        .get("usage")
        .or_else(|| value.get("message").and_then(|m| m.get("usage")))?;

    let found = TokenUsage {
        input_tokens: count(usage, "input_tokens"),
        output_tokens: count(usage, "output_tokens"),
        cache_write_tokens: count(usage, "cache_creation_input_tokens"),
        cache_read_tokens: count(usage, "cache_read_input_tokens"),
        cached_prompt_tokens: 0,
    };
    if found.is_empty() { None } else { Some(found) }
}

/// OpenAI usage lives in the standard completion-usage fields, with the
/// cached count nested under `prompt_tokens_details` when present.
fn openai_usage(value: &Value) -> Option<TokenUsage> {
    let usage = value.get("usage")?;
    if usage.is_null() {
        return None;
    }

    let found = TokenUsage {
        input_tokens: count(usage, "prompt_tokens"),
        output_tokens: count(usage, "completion_tokens"),
        cache_write_tokens: 0,
        cache_read_tokens: 0,
        cached_prompt_tokens: usage
            .get("prompt_tokens_details")
            .and_then(|d| d.get("cached_tokens"))
            .and_then(Value::as_u64)
            .unwrap_or(0),
    };
    if found.is_empty() { None } else { Some(found) }
}

fn count(usage: &Value, field: &str) -> u64 {
    usage.get(field).and_then(Value::as_u64).unwrap_or(0)
}
