use tracing::warn;

use crate::aggregate::{AggregatedMessage, AggregatedToolCall};
use crate::json_scan::is_complete_json_value;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicDelta, AnthropicMessageDeltaBody, AnthropicResponse,
    AnthropicStreamEvent, AnthropicUsage,
};
use crate::protocol::mapping::token_usage_to_anthropic;
use crate::util::{
    ensure_prefixed, next_message_id, push_json_string_escaped, push_u64_decimal,
    push_usize_decimal, split_at_char_boundaries,
};

/// Anthropic message id for an upstream id: `msg_`-prefixed, or freshly
/// generated when the upstream sent none.
#[must_use]
pub fn anthropic_message_id(upstream_id: &str) -> String {
    if upstream_id.is_empty() {
        next_message_id()
    } else {
        ensure_prefixed(upstream_id, "msg_")
    }
}

/// True when a tool call may be shown to the client: its arguments are empty
/// or one syntactically complete JSON value.
#[must_use]
pub fn tool_call_is_emittable(call: &AggregatedToolCall) -> bool {
    let args = call.arguments.trim();
    args.is_empty() || is_complete_json_value(args)
}

/// Build the full Anthropic event sequence for one aggregated message.
///
/// Order: `message_start`, content blocks (text first, then tool calls, each
/// with its own index; `ping` right after the first block start),
/// `message_delta`, `message_stop`. Tool calls with truncated arguments are
/// dropped whole; the stop reason is reported unchanged.
#[must_use]
pub fn emit_message_events(
    msg: &AggregatedMessage,
    message_id: &str,
    model: &str,
    chunk_runes: usize,
) -> Vec<AnthropicStreamEvent> {
    let mut events = Vec::with_capacity(6 + msg.tool_calls.len() * 4);

    events.push(AnthropicStreamEvent::MessageStart {
        message: AnthropicResponse {
            id: message_id.to_string(),
            type_: "message".to_string(),
            role: "assistant".to_string(),
            model: model.to_string(),
            content: Vec::new(),
            stop_reason: None,
            stop_sequence: None,
            usage: AnthropicUsage {
                input_tokens: msg.usage.map_or(0, |u| u.prompt_tokens),
                output_tokens: 0,
            },
        },
    });

    let mut index = 0usize;
    let mut ping_sent = false;
    let mut block_started = |events: &mut Vec<AnthropicStreamEvent>| {
        if !ping_sent {
            events.push(AnthropicStreamEvent::Ping {});
            ping_sent = true;
        }
    };

    if !msg.text.is_empty() {
        events.push(AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicContentBlock::Text {
                text: String::new(),
            },
        });
        block_started(&mut events);
        events.push(AnthropicStreamEvent::ContentBlockDelta {
            index,
            delta: AnthropicDelta::TextDelta {
                text: msg.text.clone(),
            },
        });
        events.push(AnthropicStreamEvent::ContentBlockStop { index });
        index += 1;
    }

    for call in &msg.tool_calls {
        if !tool_call_is_emittable(call) {
            warn!(
                tool = call.name.as_str(),
                tool_call_id = call.id.as_str(),
                args_len = call.arguments.len(),
                stop_reason = msg.stop_reason.as_str(),
                "dropping tool_use block with incomplete arguments"
            );
            continue;
        }

        events.push(AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block: AnthropicContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: serde_json::Value::Object(serde_json::Map::new()),
            },
        });
        block_started(&mut events);
        for piece in split_at_char_boundaries(&call.arguments, chunk_runes) {
            events.push(AnthropicStreamEvent::ContentBlockDelta {
                index,
                delta: AnthropicDelta::InputJsonDelta {
                    partial_json: piece.to_string(),
                },
            });
        }
        events.push(AnthropicStreamEvent::ContentBlockStop { index });
        index += 1;
    }

    events.push(AnthropicStreamEvent::MessageDelta {
        delta: AnthropicMessageDeltaBody {
            stop_reason: Some(msg.stop_reason.as_str().to_string()),
            stop_sequence: None,
        },
        usage: msg.usage.as_ref().map(token_usage_to_anthropic),
    });
    events.push(AnthropicStreamEvent::MessageStop {});
    events
}

// ---------------------------------------------------------------------------
// JSON payload writers
// ---------------------------------------------------------------------------

/// Append the `data:` JSON payload of one event to `out`.
pub fn push_anthropic_event_json(out: &mut String, event: &AnthropicStreamEvent) {
    match event {
        AnthropicStreamEvent::MessageStart { message } => {
            out.push_str("{\"type\":\"message_start\",\"message\":");
            push_message_json(out, message);
            out.push('}');
        }
        AnthropicStreamEvent::ContentBlockStart {
            index,
            content_block,
        } => {
            out.push_str("{\"type\":\"content_block_start\",\"index\":");
            push_usize_decimal(out, *index);
            out.push_str(",\"content_block\":");
            push_content_block_json(out, content_block);
            out.push('}');
        }
        AnthropicStreamEvent::ContentBlockDelta { index, delta } => {
            out.push_str("{\"type\":\"content_block_delta\",\"index\":");
            push_usize_decimal(out, *index);
            match delta {
                AnthropicDelta::TextDelta { text } => {
                    out.push_str(",\"delta\":{\"type\":\"text_delta\",\"text\":");
                    push_json_string_escaped(out, text);
                }
                AnthropicDelta::InputJsonDelta { partial_json } => {
                    out.push_str(",\"delta\":{\"type\":\"input_json_delta\",\"partial_json\":");
                    push_json_string_escaped(out, partial_json);
                }
            }
            out.push_str("}}");
        }
        AnthropicStreamEvent::ContentBlockStop { index } => {
            out.push_str("{\"type\":\"content_block_stop\",\"index\":");
            push_usize_decimal(out, *index);
            out.push('}');
        }
        AnthropicStreamEvent::MessageDelta { delta, usage } => {
            out.push_str("{\"type\":\"message_delta\",\"delta\":{\"stop_reason\":");
            push_optional_string(out, delta.stop_reason.as_deref());
            out.push_str(",\"stop_sequence\":");
            push_optional_string(out, delta.stop_sequence.as_deref());
            out.push('}');
            if let Some(usage) = usage {
                out.push_str(",\"usage\":");
                push_usage_json(out, usage);
            }
            out.push('}');
        }
        AnthropicStreamEvent::MessageStop {} => out.push_str("{\"type\":\"message_stop\"}"),
        AnthropicStreamEvent::Ping {} => out.push_str("{\"type\":\"ping\"}"),
    }
}

fn push_message_json(out: &mut String, message: &AnthropicResponse) {
    out.push_str("{\"id\":");
    push_json_string_escaped(out, &message.id);
    out.push_str(",\"type\":");
    push_json_string_escaped(out, &message.type_);
    out.push_str(",\"role\":");
    push_json_string_escaped(out, &message.role);
    out.push_str(",\"model\":");
    push_json_string_escaped(out, &message.model);
    out.push_str(",\"content\":[");
    for (i, block) in message.content.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        push_content_block_json(out, block);
    }
    out.push_str("],\"stop_reason\":");
    push_optional_string(out, message.stop_reason.as_deref());
    out.push_str(",\"stop_sequence\":");
    push_optional_string(out, message.stop_sequence.as_deref());
    out.push_str(",\"usage\":");
    push_usage_json(out, &message.usage);
    out.push('}');
}

fn push_content_block_json(out: &mut String, block: &AnthropicContentBlock) {
    match block {
        AnthropicContentBlock::Text { text } => {
            out.push_str("{\"type\":\"text\",\"text\":");
            push_json_string_escaped(out, text);
            out.push('}');
        }
        AnthropicContentBlock::ToolUse { id, name, input } => {
            out.push_str("{\"type\":\"tool_use\",\"id\":");
            push_json_string_escaped(out, id);
            out.push_str(",\"name\":");
            push_json_string_escaped(out, name);
            out.push_str(",\"input\":");
            out.push_str(&input.to_string());
            out.push('}');
        }
        other => match serde_json::to_string(other) {
            Ok(json) => out.push_str(&json),
            Err(_) => out.push_str("{}"),
        },
    }
}

fn push_usage_json(out: &mut String, usage: &AnthropicUsage) {
    out.push_str("{\"input_tokens\":");
    push_u64_decimal(out, usage.input_tokens);
    out.push_str(",\"output_tokens\":");
    push_u64_decimal(out, usage.output_tokens);
    out.push('}');
}

fn push_optional_string(out: &mut String, value: Option<&str>) {
    match value {
        Some(value) => push_json_string_escaped(out, value),
        None => out.push_str("null"),
    }
}
