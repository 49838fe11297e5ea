use serde_json::error::Category;
use smallvec::SmallVec;
use tracing::debug;

use crate::error::ConversionError;
use crate::repair::JsonRepair;
use crate::stream::{ChoiceDelta, TokenUsage, ToolCallDelta, UpstreamChunk};

use super::{OpenAiChatResponse, OpenAiChoice};

/// Parse a non-streaming `OpenAI` chat completion body.
///
/// A body that is not valid JSON is retried once through the Python-literal
/// repair when it is enabled.
///
/// # Errors
///
/// Returns [`ConversionError::Parse`] when the body is not JSON even after
/// repair, or is JSON of the wrong shape.
pub fn decode_openai_chat_response(
    body: &[u8],
    repair: &JsonRepair,
) -> Result<OpenAiChatResponse, ConversionError> {
    let err = match serde_json::from_slice::<OpenAiChatResponse>(body) {
        Ok(response) => return Ok(response),
        Err(err) => err,
    };

    if matches!(err.classify(), Category::Syntax | Category::Eof) && repair.enabled() {
        if let Ok(text) = std::str::from_utf8(body) {
            let (fixed, was_fixed) = repair.fix(text);
            if was_fixed {
                if let Ok(response) = serde_json::from_str::<OpenAiChatResponse>(&fixed) {
                    debug!("parsed upstream response after Python-style repair");
                    return Ok(response);
                }
            }
        }
    }

    Err(ConversionError::Parse(format!(
        "upstream response is not a chat completion: {err}"
    )))
}

/// Recast a complete response as one chunk so it flows through the same
/// aggregation as a stream.
#[must_use]
pub fn response_to_chunk(response: OpenAiChatResponse) -> UpstreamChunk {
    UpstreamChunk {
        id: response.id,
        model: response.model,
        choices: response.choices.into_iter().map(choice_to_delta).collect(),
        usage: response.usage.map(TokenUsage::from),
    }
}

fn choice_to_delta(choice: OpenAiChoice) -> ChoiceDelta {
    let tool_calls: SmallVec<[ToolCallDelta; 2]> = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(position, call)| ToolCallDelta {
            index: u32::try_from(position).unwrap_or(u32::MAX),
            id: Some(call.id).filter(|id| !id.is_empty()),
            name: Some(call.function.name),
            arguments: Some(call.function.arguments),
        })
        .collect();
    ChoiceDelta {
        index: choice.index,
        text: choice.message.content.as_ref().and_then(|c| c.text()),
        tool_calls,
        finish_reason: choice.finish_reason,
    }
}
