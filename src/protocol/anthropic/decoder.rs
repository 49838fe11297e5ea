use serde_json::error::Category;

use crate::error::ConversionError;
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicMessageContent, AnthropicRequest, AnthropicSystem,
};

/// Parse an Anthropic Messages API request body.
///
/// # Errors
///
/// [`ConversionError::Parse`] for bytes that are not JSON,
/// [`ConversionError::InvalidRequest`] for JSON that is not a Messages request.
pub fn decode_anthropic_request(body: &[u8]) -> Result<AnthropicRequest, ConversionError> {
    let request: AnthropicRequest = serde_json::from_slice(body).map_err(|err| match err.classify() {
        Category::Syntax | Category::Eof | Category::Io => {
            ConversionError::Parse(format!("request body is not valid JSON: {err}"))
        }
        Category::Data => {
            ConversionError::InvalidRequest(format!("not an Anthropic Messages request: {err}"))
        }
    })?;

    if request.model.trim().is_empty() {
        return Err(ConversionError::InvalidRequest(
            "request model must not be empty".to_string(),
        ));
    }
    Ok(request)
}

/// Flatten `system` into one prompt string; block lists join their text with `\n`.
#[must_use]
pub fn system_prompt_text(system: &AnthropicSystem) -> Option<String> {
    match system {
        AnthropicSystem::Text(text) => Some(text.clone()),
        AnthropicSystem::Blocks(blocks) => {
            let texts: Vec<&str> = blocks
                .iter()
                .filter_map(|block| match block {
                    AnthropicContentBlock::Text { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect();
            if texts.is_empty() {
                None
            } else {
                Some(texts.join("\n"))
            }
        }
    }
}

/// Text of a `tool_result` payload: the string itself, or its text blocks
/// joined with `\n`.
#[must_use]
pub fn flatten_tool_result_content(content: Option<&AnthropicMessageContent>) -> String {
    match content {
        None => String::new(),
        Some(AnthropicMessageContent::Text(text)) => text.clone(),
        Some(AnthropicMessageContent::Blocks(blocks)) => blocks
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

/// Names of every tool the request offers, in declaration order.
#[must_use]
pub fn offered_tool_names(request: &AnthropicRequest) -> Vec<String> {
    request
        .tools
        .as_deref()
        .unwrap_or_default()
        .iter()
        .map(|tool| tool.name.clone())
        .collect()
}
