//! Folding of decoded upstream chunks into one logical assistant message.

use std::borrow::Cow;

use rustc_hash::FxHashMap;
use tracing::debug;

use crate::config::UsageAccounting;
use crate::error::ConversionError;
use crate::protocol::mapping::{openai_finish_to_stop_reason, StopReason};
use crate::repair::JsonRepair;
use crate::stream::{ChoiceDelta, TokenUsage, ToolCallDelta, UpstreamChunk};

/// A tool call whose fragments have all been folded together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedToolCall {
    pub index: u32,
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// The complete message reconstructed from an upstream response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregatedMessage {
    /// Upstream id as reported; may be empty.
    pub id: String,
    pub model: String,
    pub text: String,
    /// Ordered by upstream index.
    pub tool_calls: Vec<AggregatedToolCall>,
    /// Raw upstream finish reason, last non-empty value seen.
    pub finish_reason: Option<String>,
    pub stop_reason: StopReason,
    /// `None` when no chunk reported usage.
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Default)]
struct PendingToolCall {
    id: Option<String>,
    name: Option<String>,
    arguments: String,
}

#[derive(Debug, Default)]
struct UsageFold {
    seen: bool,
    prompt_tokens: u64,
    completion_tokens: u64,
    total_tokens: u64,
}

impl UsageFold {
    fn add(&mut self, usage: TokenUsage, accounting: UsageAccounting) {
        self.seen = true;
        if usage.prompt_tokens > 0 {
            self.prompt_tokens = usage.prompt_tokens;
        }
        match accounting {
            UsageAccounting::Incremental => {
                self.completion_tokens = self
                    .completion_tokens
                    .saturating_add(usage.completion_tokens);
            }
            UsageAccounting::Cumulative => {
                if usage.completion_tokens > 0 {
                    self.completion_tokens = usage.completion_tokens;
                }
            }
        }
        if usage.total_tokens > 0 {
            self.total_tokens = usage.total_tokens;
        }
    }

    fn finish(self) -> Option<TokenUsage> {
        if !self.seen {
            return None;
        }
        let total_tokens = if self.total_tokens > 0 {
            self.total_tokens
        } else {
            self.prompt_tokens.saturating_add(self.completion_tokens)
        };
        Some(TokenUsage {
            prompt_tokens: self.prompt_tokens,
            completion_tokens: self.completion_tokens,
            total_tokens,
        })
    }
}

/// Stateful fold over [`UpstreamChunk`]s for one response.
///
/// Only choice 0 is folded; deltas for other choices are counted and dropped.
/// Tool calls are keyed by their upstream index: providers commonly send the
/// call id only on the first fragment, so the id is treated as enrichment.
pub struct MessageAggregator<'a> {
    repair: &'a JsonRepair,
    accounting: UsageAccounting,
    chunks_seen: usize,
    id: String,
    model: String,
    text: String,
    tool_calls: FxHashMap<u32, PendingToolCall>,
    finish_reason: Option<String>,
    usage: UsageFold,
    ignored_choices: usize,
}

impl<'a> MessageAggregator<'a> {
    #[must_use]
    pub fn new(repair: &'a JsonRepair, accounting: UsageAccounting) -> Self {
        Self {
            repair,
            accounting,
            chunks_seen: 0,
            id: String::new(),
            model: String::new(),
            text: String::new(),
            tool_calls: FxHashMap::default(),
            finish_reason: None,
            usage: UsageFold::default(),
            ignored_choices: 0,
        }
    }

    /// Fold one chunk into the running message.
    pub fn push(&mut self, chunk: UpstreamChunk) {
        self.chunks_seen += 1;
        if self.id.is_empty() && !chunk.id.is_empty() {
            self.id = chunk.id;
        }
        if self.model.is_empty() && !chunk.model.is_empty() {
            self.model = chunk.model;
        }
        for choice in chunk.choices {
            self.push_choice(choice);
        }
        if let Some(usage) = chunk.usage {
            self.usage.add(usage, self.accounting);
        }
    }

    fn push_choice(&mut self, choice: ChoiceDelta) {
        if choice.index != 0 {
            self.ignored_choices += 1;
            return;
        }
        if let Some(text) = choice.text {
            self.text.push_str(&text);
        }
        for delta in choice.tool_calls {
            self.push_tool_call(delta);
        }
        if let Some(reason) = choice.finish_reason {
            if !reason.is_empty() {
                self.finish_reason = Some(reason);
            }
        }
    }

    fn push_tool_call(&mut self, delta: ToolCallDelta) {
        let call = self.tool_calls.entry(delta.index).or_default();
        if call.id.is_none() {
            call.id = delta.id.filter(|id| !id.is_empty());
        }
        if call.name.is_none() {
            call.name = delta.name.filter(|name| !name.is_empty());
        }
        if let Some(fragment) = delta.arguments {
            call.arguments.push_str(&fragment);
        }
    }

    /// Finalize: order tool calls, trim text, map the stop reason and repair
    /// targeted tool arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Aggregation`] when no chunk was pushed.
    pub fn finish(self) -> Result<AggregatedMessage, ConversionError> {
        if self.chunks_seen == 0 {
            return Err(ConversionError::Aggregation(
                "no chunks to aggregate".to_string(),
            ));
        }

        let mut pending: Vec<(u32, PendingToolCall)> = self.tool_calls.into_iter().collect();
        pending.sort_by_key(|(index, _)| *index);

        let repair = self.repair;
        let tool_calls: Vec<AggregatedToolCall> = pending
            .into_iter()
            .map(|(index, call)| {
                let name = call.name.unwrap_or_default();
                let fixed = match repair.repair_tool_arguments(&name, &call.arguments) {
                    Cow::Owned(fixed) => Some(fixed),
                    Cow::Borrowed(_) => None,
                };
                let arguments = fixed.unwrap_or(call.arguments);
                AggregatedToolCall {
                    index,
                    id: call.id.unwrap_or_else(|| format!("tool_call_{index}")),
                    name,
                    arguments,
                }
            })
            .collect();

        let stop_reason = self
            .finish_reason
            .as_deref()
            .map_or(StopReason::EndTurn, openai_finish_to_stop_reason);
        let text = self.text.trim().to_string();
        let usage = self.usage.finish();

        debug!(
            chunks = self.chunks_seen,
            text_len = text.len(),
            tool_calls = tool_calls.len(),
            finish_reason = self.finish_reason.as_deref().unwrap_or(""),
            stop_reason = stop_reason.as_str(),
            ignored_choices = self.ignored_choices,
            "aggregated upstream response"
        );

        Ok(AggregatedMessage {
            id: self.id,
            model: self.model,
            text,
            tool_calls,
            finish_reason: self.finish_reason,
            stop_reason,
            usage,
        })
    }
}

/// Fold a complete chunk list in one call.
///
/// # Errors
///
/// Returns [`ConversionError::Aggregation`] when `chunks` is empty.
pub fn aggregate_chunks(
    chunks: Vec<UpstreamChunk>,
    repair: &JsonRepair,
    accounting: UsageAccounting,
) -> Result<AggregatedMessage, ConversionError> {
    let mut aggregator = MessageAggregator::new(repair, accounting);
    for chunk in chunks {
        aggregator.push(chunk);
    }
    aggregator.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JsonRepairConfig;
    use smallvec::smallvec;

    fn text_chunk(text: &str) -> UpstreamChunk {
        UpstreamChunk {
            choices: smallvec![ChoiceDelta {
                text: Some(text.to_string()),
                ..ChoiceDelta::default()
            }],
            ..UpstreamChunk::default()
        }
    }

    fn tool_chunk(index: u32, id: Option<&str>, name: Option<&str>, args: &str) -> UpstreamChunk {
        UpstreamChunk {
            choices: smallvec![ChoiceDelta {
                tool_calls: smallvec![ToolCallDelta {
                    index,
                    id: id.map(str::to_string),
                    name: name.map(str::to_string),
                    arguments: Some(args.to_string()),
                }],
                ..ChoiceDelta::default()
            }],
            ..UpstreamChunk::default()
        }
    }

    fn finish_chunk(reason: &str) -> UpstreamChunk {
        UpstreamChunk {
            choices: smallvec![ChoiceDelta {
                finish_reason: Some(reason.to_string()),
                ..ChoiceDelta::default()
            }],
            ..UpstreamChunk::default()
        }
    }

    fn usage_chunk(prompt: u64, completion: u64) -> UpstreamChunk {
        UpstreamChunk {
            usage: Some(TokenUsage {
                prompt_tokens: prompt,
                completion_tokens: completion,
                total_tokens: 0,
            }),
            ..UpstreamChunk::default()
        }
    }

    fn run(chunks: Vec<UpstreamChunk>) -> AggregatedMessage {
        let repair = JsonRepair::new(JsonRepairConfig::default());
        aggregate_chunks(chunks, &repair, UsageAccounting::Incremental).unwrap()
    }

    #[test]
    fn test_empty_input_is_an_error() {
        let repair = JsonRepair::default();
        let err = aggregate_chunks(Vec::new(), &repair, UsageAccounting::Incremental).unwrap_err();
        assert_eq!(err.kind(), "aggregation_error");
    }

    #[test]
    fn test_text_is_concatenated_and_trimmed() {
        let msg = run(vec![text_chunk("  Hel"), text_chunk("lo "), finish_chunk("stop")]);
        assert_eq!(msg.text, "Hello");
        assert_eq!(msg.stop_reason, StopReason::EndTurn);
        assert!(msg.usage.is_none());
    }

    #[test]
    fn test_tool_call_fragments_correlate_by_index() {
        let msg = run(vec![
            tool_chunk(0, Some("call_1"), Some("Read"), "{\"pa"),
            tool_chunk(0, None, None, "th\":"),
            tool_chunk(0, None, Some("Ignored"), "\"a.rs\"}"),
            finish_chunk("tool_calls"),
        ]);
        assert_eq!(msg.tool_calls.len(), 1);
        let call = &msg.tool_calls[0];
        assert_eq!(call.id, "call_1");
        assert_eq!(call.name, "Read");
        assert_eq!(call.arguments, "{\"path\":\"a.rs\"}");
        assert_eq!(msg.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn test_synthetic_id_until_real_id_arrives() {
        let msg = run(vec![
            tool_chunk(2, None, Some("A"), "{}"),
            tool_chunk(5, None, Some("B"), "{"),
            tool_chunk(5, Some("call_real"), None, "}"),
        ]);
        assert_eq!(msg.tool_calls[0].id, "tool_call_2");
        assert_eq!(msg.tool_calls[1].id, "call_real");
    }

    #[test]
    fn test_tool_calls_sorted_by_index() {
        let msg = run(vec![
            tool_chunk(3, Some("c3"), Some("C"), "{}"),
            tool_chunk(1, Some("c1"), Some("A"), "{}"),
            tool_chunk(2, Some("c2"), Some("B"), "{}"),
        ]);
        let order: Vec<u32> = msg.tool_calls.iter().map(|c| c.index).collect();
        assert_eq!(order, vec![1, 2, 3]);
    }

    #[test]
    fn test_choices_other_than_zero_are_ignored() {
        let mut second = tool_chunk(0, Some("call_other"), Some("Other"), "{\"x\":1}");
        second.choices[0].index = 1;
        second.choices[0].text = Some("ignored".to_string());
        second.choices[0].finish_reason = Some("length".to_string());
        let msg = run(vec![
            text_chunk("kept"),
            tool_chunk(0, Some("call_main"), Some("Main"), "{}"),
            second,
            finish_chunk("tool_calls"),
        ]);
        assert_eq!(msg.text, "kept");
        assert_eq!(msg.tool_calls.len(), 1);
        assert_eq!(msg.tool_calls[0].id, "call_main");
        assert_eq!(msg.tool_calls[0].arguments, "{}");
        assert_eq!(msg.stop_reason, StopReason::ToolUse);
    }

    #[test]
    fn test_last_non_empty_finish_reason_wins() {
        let msg = run(vec![finish_chunk("tool_calls"), finish_chunk(""), finish_chunk("length")]);
        assert_eq!(msg.finish_reason.as_deref(), Some("length"));
        assert_eq!(msg.stop_reason, StopReason::MaxTokens);
    }

    #[test]
    fn test_first_non_empty_id_and_model() {
        let msg = run(vec![
            UpstreamChunk {
                id: String::new(),
                model: "gpt-x".to_string(),
                ..UpstreamChunk::default()
            },
            UpstreamChunk {
                id: "chatcmpl-1".to_string(),
                model: "other".to_string(),
                ..UpstreamChunk::default()
            },
        ]);
        assert_eq!(msg.id, "chatcmpl-1");
        assert_eq!(msg.model, "gpt-x");
    }

    #[test]
    fn test_incremental_usage_sums_completion() {
        let msg = run(vec![usage_chunk(10, 5), usage_chunk(10, 7)]);
        let usage = msg.usage.unwrap();
        assert_eq!(usage.prompt_tokens, 10);
        assert_eq!(usage.completion_tokens, 12);
        assert_eq!(usage.total_tokens, 22);
    }

    #[test]
    fn test_cumulative_usage_takes_latest() {
        let repair = JsonRepair::default();
        let msg = aggregate_chunks(
            vec![usage_chunk(10, 5), usage_chunk(10, 7)],
            &repair,
            UsageAccounting::Cumulative,
        )
        .unwrap();
        let usage = msg.usage.unwrap();
        assert_eq!(usage.completion_tokens, 7);
        assert_eq!(usage.total_tokens, 17);
    }

    #[test]
    fn test_reported_total_is_kept() {
        let msg = run(vec![UpstreamChunk {
            usage: Some(TokenUsage {
                prompt_tokens: 3,
                completion_tokens: 2,
                total_tokens: 9,
            }),
            ..UpstreamChunk::default()
        }]);
        assert_eq!(msg.usage.unwrap().total_tokens, 9);
    }

    #[test]
    fn test_target_tool_arguments_are_repaired() {
        let msg = run(vec![
            tool_chunk(0, Some("c"), Some("TodoWrite"), "{'todos': "),
            tool_chunk(0, None, None, "[{'content': 'x', 'status': 'pending'}]}"),
        ]);
        let args: serde_json::Value = serde_json::from_str(&msg.tool_calls[0].arguments).unwrap();
        assert_eq!(args["todos"][0]["status"], "pending");
    }

    #[test]
    fn test_non_target_tool_arguments_untouched() {
        let raw = "{'a': 'b'}";
        let msg = run(vec![tool_chunk(0, Some("c"), Some("Other"), raw)]);
        assert_eq!(msg.tool_calls[0].arguments, raw);
    }
}
