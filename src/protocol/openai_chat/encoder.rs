use crate::config::MaxTokensField;
use crate::protocol::anthropic::decoder::{flatten_tool_result_content, system_prompt_text};
use crate::protocol::anthropic::{
    AnthropicContentBlock, AnthropicImageSource, AnthropicMessage, AnthropicMessageContent,
    AnthropicRequest, AnthropicTool, AnthropicToolChoice,
};
use crate::protocol::mapping::anthropic_role_to_openai;

use super::{
    OpenAiChatRequest, OpenAiContent, OpenAiContentPart, OpenAiImageUrl, OpenAiMessage,
    OpenAiStop, OpenAiStreamOptions, OpenAiTool, OpenAiToolCall, OpenAiToolCallFunction,
    OpenAiToolChoice, OpenAiToolChoiceFunction, OpenAiToolChoiceFunctionCall, OpenAiToolFunction,
};

/// Translate an Anthropic Messages request into an `OpenAI` Chat Completions request.
///
/// The token limit lands in the field the target endpoint expects.
#[must_use]
pub fn encode_openai_chat_request(
    request: &AnthropicRequest,
    max_tokens_field: MaxTokensField,
) -> OpenAiChatRequest {
    let mut messages: Vec<OpenAiMessage> = Vec::with_capacity(request.messages.len() + 1);

    if let Some(system) = request.system.as_ref().and_then(system_prompt_text) {
        messages.push(text_message("system", system));
    }

    for msg in &request.messages {
        encode_message_into(msg, &mut messages);
    }

    let tools: Option<Vec<OpenAiTool>> = request
        .tools
        .as_ref()
        .filter(|tools| !tools.is_empty())
        .map(|tools| tools.iter().map(encode_tool).collect());

    let (tool_choice, parallel_tool_calls) = match (&tools, &request.tool_choice) {
        (Some(_), Some(choice)) => (
            Some(encode_tool_choice(choice)),
            choice.disables_parallel_tool_use().then_some(false),
        ),
        _ => (None, None),
    };

    let stop = request
        .stop_sequences
        .as_ref()
        .and_then(|stops| match stops.as_slice() {
            [] => None,
            [single] => Some(OpenAiStop::Single(single.clone())),
            many => Some(OpenAiStop::Multi(many.to_vec())),
        });

    let stream = request.stream.unwrap_or(false);
    let (max_tokens, max_completion_tokens) = match max_tokens_field {
        MaxTokensField::MaxTokens => (request.max_tokens, None),
        MaxTokensField::MaxCompletionTokens => (None, request.max_tokens),
    };

    OpenAiChatRequest {
        model: request.model.clone(),
        messages,
        tools,
        tool_choice,
        parallel_tool_calls,
        stream: stream.then_some(true),
        stream_options: stream.then_some(OpenAiStreamOptions {
            include_usage: Some(true),
        }),
        temperature: request.temperature,
        max_tokens,
        max_completion_tokens,
        top_p: request.top_p,
        stop,
        user: request
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.user_id.clone()),
    }
}

fn text_message(role: &str, text: String) -> OpenAiMessage {
    OpenAiMessage {
        role: role.to_string(),
        content: Some(OpenAiContent::Text(text)),
        tool_calls: None,
        tool_call_id: None,
    }
}

fn encode_message_into(msg: &AnthropicMessage, out: &mut Vec<OpenAiMessage>) {
    let role = anthropic_role_to_openai(&msg.role);
    let blocks = match &msg.content {
        AnthropicMessageContent::Text(text) => {
            out.push(text_message(role, text.clone()));
            return;
        }
        AnthropicMessageContent::Blocks(blocks) => blocks,
    };

    if role == "assistant" {
        out.push(encode_assistant_blocks(blocks));
    } else {
        encode_user_blocks_into(blocks, out);
    }
}

fn encode_assistant_blocks(blocks: &[AnthropicContentBlock]) -> OpenAiMessage {
    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for block in blocks {
        match block {
            AnthropicContentBlock::Text { text: part } => text.push_str(part),
            AnthropicContentBlock::ToolUse { id, name, input } => {
                tool_calls.push(OpenAiToolCall {
                    id: id.clone(),
                    type_: "function".to_string(),
                    function: OpenAiToolCallFunction {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                });
            }
            _ => {}
        }
    }

    let content = if text.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(OpenAiContent::Text(text))
    };
    OpenAiMessage {
        role: "assistant".to_string(),
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    }
}

/// Tool results become `role:tool` messages ahead of the remaining user content.
fn encode_user_blocks_into(blocks: &[AnthropicContentBlock], out: &mut Vec<OpenAiMessage>) {
    let mut parts: Vec<OpenAiContentPart> = Vec::new();
    let mut has_image = false;
    let mut has_tool_result = false;

    for block in blocks {
        match block {
            AnthropicContentBlock::ToolResult {
                tool_use_id,
                content,
                ..
            } => {
                has_tool_result = true;
                out.push(OpenAiMessage {
                    role: "tool".to_string(),
                    content: Some(OpenAiContent::Text(flatten_tool_result_content(
                        content.as_ref(),
                    ))),
                    tool_calls: None,
                    tool_call_id: Some(tool_use_id.clone()),
                });
            }
            AnthropicContentBlock::Text { text } => {
                parts.push(OpenAiContentPart::Text { text: text.clone() });
            }
            AnthropicContentBlock::Image { source } => {
                has_image = true;
                parts.push(OpenAiContentPart::ImageUrl {
                    image_url: OpenAiImageUrl {
                        url: image_url(source),
                    },
                });
            }
            _ => {}
        }
    }

    if parts.is_empty() && has_tool_result {
        return;
    }

    let content = if has_image {
        OpenAiContent::Parts(parts)
    } else {
        let mut text = String::new();
        for part in &parts {
            if let OpenAiContentPart::Text { text: t } = part {
                text.push_str(t);
            }
        }
        OpenAiContent::Text(text)
    };
    out.push(OpenAiMessage {
        role: "user".to_string(),
        content: Some(content),
        tool_calls: None,
        tool_call_id: None,
    });
}

fn image_url(source: &AnthropicImageSource) -> String {
    match source {
        AnthropicImageSource::Base64 { media_type, data } => {
            format!("data:{media_type};base64,{data}")
        }
        AnthropicImageSource::Url { url } => url.clone(),
    }
}

fn encode_tool(tool: &AnthropicTool) -> OpenAiTool {
    OpenAiTool {
        type_: "function".to_string(),
        function: OpenAiToolFunction {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: Some(tool.input_schema.clone()),
        },
    }
}

fn encode_tool_choice(choice: &AnthropicToolChoice) -> OpenAiToolChoice {
    match choice {
        AnthropicToolChoice::Auto { .. } => OpenAiToolChoice::Mode("auto".to_string()),
        AnthropicToolChoice::Any { .. } => OpenAiToolChoice::Mode("required".to_string()),
        AnthropicToolChoice::None {} => OpenAiToolChoice::Mode("none".to_string()),
        AnthropicToolChoice::Tool { name, .. } => {
            OpenAiToolChoice::Function(OpenAiToolChoiceFunctionCall {
                type_: "function".to_string(),
                function: OpenAiToolChoiceFunction { name: name.clone() },
            })
        }
    }
}
