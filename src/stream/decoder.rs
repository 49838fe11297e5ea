//! Decoding of upstream OpenAI-compatible SSE records into incremental chunks.

use smallvec::SmallVec;
use tracing::debug;

use super::sse::{is_done_event, parse_sse_body};
use crate::error::ConversionError;
use crate::protocol::openai_chat::{
    OpenAiContent, OpenAiStreamChunk, OpenAiStreamToolCall, OpenAiUsage,
};
use crate::repair::JsonRepair;

/// Token usage as reported by the upstream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

impl From<OpenAiUsage> for TokenUsage {
    fn from(usage: OpenAiUsage) -> Self {
        Self {
            prompt_tokens: usage.prompt_tokens,
            completion_tokens: usage.completion_tokens,
            total_tokens: usage.total_tokens,
        }
    }
}

/// Incremental tool-call fragment. `index` is the correlation key; `id` and
/// `name` usually arrive only on the first fragment for an index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    pub index: u32,
    pub id: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Per-choice delta of one chunk. `text` is set only for string-typed
/// streaming content.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChoiceDelta {
    pub index: u32,
    pub text: Option<String>,
    pub tool_calls: SmallVec<[ToolCallDelta; 2]>,
    pub finish_reason: Option<String>,
}

/// One decoded upstream record.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpstreamChunk {
    pub id: String,
    pub model: String,
    pub choices: SmallVec<[ChoiceDelta; 1]>,
    pub usage: Option<TokenUsage>,
}

impl From<OpenAiStreamChunk> for UpstreamChunk {
    fn from(wire: OpenAiStreamChunk) -> Self {
        let mut usage = wire.usage.map(TokenUsage::from);
        let mut choices = SmallVec::with_capacity(wire.choices.len());
        for choice in wire.choices {
            if usage.is_none() {
                usage = choice.usage.map(TokenUsage::from);
            }
            choices.push(ChoiceDelta {
                index: choice.index,
                text: match choice.delta.content {
                    Some(OpenAiContent::Text(text)) => Some(text),
                    _ => None,
                },
                tool_calls: choice
                    .delta
                    .tool_calls
                    .unwrap_or_default()
                    .into_iter()
                    .map(ToolCallDelta::from)
                    .collect(),
                finish_reason: choice.finish_reason,
            });
        }
        Self {
            id: wire.id,
            model: wire.model,
            choices,
            usage,
        }
    }
}

impl From<OpenAiStreamToolCall> for ToolCallDelta {
    fn from(wire: OpenAiStreamToolCall) -> Self {
        let (name, arguments) = match wire.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };
        Self {
            index: wire.index,
            id: wire.id,
            name,
            arguments,
        }
    }
}

/// Turns SSE `data:` payloads into [`UpstreamChunk`]s, retrying malformed
/// payloads through the Python-literal repair before skipping them.
pub struct UpstreamChunkDecoder<'a> {
    repair: &'a JsonRepair,
}

impl<'a> UpstreamChunkDecoder<'a> {
    #[must_use]
    pub fn new(repair: &'a JsonRepair) -> Self {
        Self { repair }
    }

    /// Decode one record payload. `None` for `[DONE]` and for payloads that
    /// cannot be parsed even after repair.
    #[must_use]
    pub fn decode_record(&self, payload: &str) -> Option<UpstreamChunk> {
        let payload = payload.trim();
        if payload.is_empty() || payload == "[DONE]" {
            return None;
        }

        let err = match serde_json::from_str::<OpenAiStreamChunk>(payload) {
            Ok(chunk) => return Some(chunk.into()),
            Err(err) => err,
        };

        if self.repair.enabled() {
            let (fixed, was_fixed) = self.repair.fix(payload);
            if was_fixed {
                match serde_json::from_str::<OpenAiStreamChunk>(&fixed) {
                    Ok(chunk) => {
                        debug!("parsed SSE record after Python-style repair");
                        return Some(chunk.into());
                    }
                    Err(fix_err) => {
                        debug!(error = %fix_err, "repaired SSE record still failed to parse");
                    }
                }
            }
        }

        debug!(error = %err, data = payload, "skipping unparseable SSE record");
        None
    }

    /// Decode every record of a buffered SSE body, in order.
    ///
    /// A body that holds no `data:` records but is itself a single chunk
    /// object is accepted as a one-chunk stream.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::EmptyStream`] when no usable chunk remains.
    pub fn decode_stream(&self, body: &str) -> Result<Vec<UpstreamChunk>, ConversionError> {
        let records = parse_sse_body(body);
        let mut chunks = Vec::with_capacity(records.len());
        let mut skipped = 0usize;
        for record in &records {
            if is_done_event(record) {
                continue;
            }
            match self.decode_record(&record.data) {
                Some(chunk) => chunks.push(chunk),
                None => skipped += 1,
            }
        }

        if records.is_empty() {
            if let Some(chunk) = self.decode_record(body) {
                debug!("upstream body has no SSE records; treating it as a single chunk");
                chunks.push(chunk);
            }
        }

        debug!(
            records = records.len(),
            chunks = chunks.len(),
            skipped,
            "decoded upstream SSE stream"
        );

        if chunks.is_empty() {
            return Err(ConversionError::EmptyStream(format!(
                "no usable chunks in upstream stream ({} records, {skipped} skipped)",
                records.len()
            )));
        }
        Ok(chunks)
    }
}
