use crate::protocol::anthropic::AnthropicUsage;
use crate::stream::TokenUsage;

// ---------------------------------------------------------------------------
// Stop reasons
// ---------------------------------------------------------------------------

/// Anthropic stop reason vocabulary produced by the conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StopReason {
    #[default]
    EndTurn,
    ToolUse,
    MaxTokens,
}

impl StopReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            StopReason::EndTurn => "end_turn",
            StopReason::ToolUse => "tool_use",
            StopReason::MaxTokens => "max_tokens",
        }
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Map an `OpenAI` `finish_reason` to the Anthropic vocabulary.
///
/// Total: anything unrecognised (including `stop`, `content_filter` and the
/// empty string) becomes `end_turn`. Already-mapped values map to themselves.
#[must_use]
pub fn openai_finish_to_stop_reason(finish_reason: &str) -> StopReason {
    match finish_reason {
        "tool_calls" | "function_call" | "tool_use" => StopReason::ToolUse,
        "length" | "max_tokens" => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Anthropic message role to `OpenAI` chat role.
#[must_use]
pub fn anthropic_role_to_openai(role: &str) -> &'static str {
    match role {
        "assistant" => "assistant",
        _ => "user",
    }
}

// ---------------------------------------------------------------------------
// Usage
// ---------------------------------------------------------------------------

/// Convert aggregated upstream usage to Anthropic usage fields.
#[must_use]
pub fn token_usage_to_anthropic(usage: &TokenUsage) -> AnthropicUsage {
    AnthropicUsage {
        input_tokens: usage.prompt_tokens,
        output_tokens: usage.completion_tokens,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
