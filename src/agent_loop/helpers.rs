use crate::llm::{ChatResponse, ContentBlock};
use crate::types::{RetryConfig, TokenUsage};
use std::time::Duration;

/// One action-invocation request from a reasoning step.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionRequest {
    pub id: String,
    pub name: String,
    pub input: serde_json::Value,
}

/// Convert milliseconds (u128) to u64, capping at `u64::MAX`.
#[allow(clippy::cast_possible_truncation)]
pub(super) const fn millis_to_u64(millis: u128) -> u64 {
    if millis > u64::MAX as u128 {
        u64::MAX
    } else {
        millis as u64
    }
}

/// Exponential backoff with a small time-derived jitter, capped at
/// `max_delay_ms`.
pub(crate) fn calculate_backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    let base_delay = config
        .base_delay_ms
        .saturating_mul(1u64 << attempt.saturating_sub(1).min(32));

    let max_jitter = config.base_delay_ms.min(1000);
    let jitter = if max_jitter > 0 {
        u64::from(
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos(),
        ) % max_jitter
    } else {
        0
    };

    let delay_ms = base_delay.saturating_add(jitter).min(config.max_delay_ms);
    Duration::from_millis(delay_ms)
}

/// Action requests in the order the model issued them. A `null` input is
/// treated as an empty argument object.
pub(super) fn extract_requests(response: &ChatResponse) -> Vec<ActionRequest> {
    response
        .content
        .iter()
        .filter_map(|block| match block {
            ContentBlock::ToolUse { id, name, input } => Some(ActionRequest {
                id: id.clone(),
                name: name.clone(),
                input: if input.is_null() {
                    serde_json::json!({})
                } else {
                    input.clone()
                },
            }),
            _ => None,
        })
        .collect()
}

pub(super) const fn turn_usage(response: &ChatResponse) -> TokenUsage {
    TokenUsage {
        input_tokens: response.usage.input_tokens,
        output_tokens: response.usage.output_tokens,
    }
}
