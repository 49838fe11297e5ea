use tracing::warn;

use crate::aggregate::AggregatedMessage;
use crate::protocol::anthropic::stream::tool_call_is_emittable;
use crate::protocol::anthropic::{AnthropicContentBlock, AnthropicResponse, AnthropicUsage};
use crate::protocol::mapping::token_usage_to_anthropic;

/// Encode an aggregated message as a non-streaming Anthropic `message` object.
///
/// Tool-call arguments become native JSON `input`; arguments that do not
/// parse fall back to `{}`. Tool calls with truncated arguments are dropped,
/// as in the streaming form.
#[must_use]
pub fn encode_anthropic_response(
    msg: &AggregatedMessage,
    message_id: &str,
    model: &str,
) -> AnthropicResponse {
    let mut content = Vec::with_capacity(1 + msg.tool_calls.len());
    if !msg.text.is_empty() {
        content.push(AnthropicContentBlock::Text {
            text: msg.text.clone(),
        });
    }

    for call in &msg.tool_calls {
        if !tool_call_is_emittable(call) {
            warn!(
                tool = call.name.as_str(),
                args_len = call.arguments.len(),
                stop_reason = msg.stop_reason.as_str(),
                "dropping tool_use block with incomplete arguments"
            );
            continue;
        }
        let input = if call.arguments.trim().is_empty() {
            serde_json::json!({})
        } else {
            serde_json::from_str(&call.arguments).unwrap_or_else(|err| {
                warn!(
                    tool = call.name.as_str(),
                    error = %err,
                    "tool arguments are not valid JSON, using empty input"
                );
                serde_json::json!({})
            })
        };
        content.push(AnthropicContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input,
        });
    }

    AnthropicResponse {
        id: message_id.to_string(),
        type_: "message".to_string(),
        role: "assistant".to_string(),
        model: model.to_string(),
        content,
        stop_reason: Some(msg.stop_reason.as_str().to_string()),
        stop_sequence: None,
        usage: msg
            .usage
            .as_ref()
            .map_or_else(AnthropicUsage::default, token_usage_to_anthropic),
    }
}
