/// SSE (Server-Sent Events) record parser and Anthropic frame encoder.
///
/// Upstream OpenAI-compatible bodies are read line by line: every `data:`
/// line is one record, so providers that omit the blank separator line
/// between records still decode. Outbound Anthropic frames always use the
/// full `event:`/`data:`/blank-line form.
use super::SseEvent;
use crate::protocol::anthropic::stream::push_anthropic_event_json;
use crate::protocol::anthropic::AnthropicStreamEvent;
use memchr::memchr_iter;

// ---------------------------------------------------------------------------
// SseParser: incremental line parser
// ---------------------------------------------------------------------------

/// Incremental SSE line parser.
///
/// Feed it raw text chunks (potentially split at arbitrary points) and it
/// yields one [`SseEvent`] per complete `data:` line.
pub struct SseParser {
    buffer: String,
    read_offset: usize,
}

impl SseParser {
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: String::new(),
            read_offset: 0,
        }
    }

    /// Feed raw text and append complete records into a caller-provided buffer.
    ///
    /// - `data:` lines each yield a record (one optional space after the colon is stripped)
    /// - blank lines and `:` comments are separators
    /// - `event:`, `id:`, `retry:` and unknown fields are ignored
    pub fn feed_into(&mut self, chunk: &str, out: &mut Vec<SseEvent>) {
        self.buffer.push_str(chunk);
        let mut processed_up_to = self.read_offset;
        let bytes = self.buffer.as_bytes();
        let scan_start = processed_up_to;
        for rel_pos in memchr_iter(b'\n', &bytes[scan_start..]) {
            let line_end = scan_start + rel_pos;
            let line = &self.buffer[processed_up_to..line_end];
            Self::process_line(line, out);
            processed_up_to = line_end + 1;
        }

        self.read_offset = processed_up_to;
        if self.read_offset == self.buffer.len() {
            self.buffer.clear();
            self.read_offset = 0;
            return;
        }
        let should_compact = self.read_offset > 0
            && (self.read_offset >= self.buffer.len() / 2 || self.read_offset >= 8 * 1024);
        if should_compact {
            self.buffer.drain(..self.read_offset);
            self.read_offset = 0;
        }
    }

    /// Flush a trailing line that was not terminated by a newline.
    pub fn finish_into(&mut self, out: &mut Vec<SseEvent>) {
        if self.read_offset < self.buffer.len() {
            let line = &self.buffer[self.read_offset..];
            Self::process_line(line, out);
        }
        self.buffer.clear();
        self.read_offset = 0;
    }

    fn process_line(line: &str, events: &mut Vec<SseEvent>) {
        if let Some(value) = line.trim().strip_prefix("data:") {
            events.push(SseEvent {
                data: value.trim_start().to_string(),
            });
        }
    }
}

impl Default for SseParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a fully buffered SSE body into its `data:` records.
#[must_use]
pub fn parse_sse_body(body: &str) -> Vec<SseEvent> {
    let mut parser = SseParser::new();
    let mut out = Vec::new();
    parser.feed_into(body, &mut out);
    parser.finish_into(&mut out);
    out
}

/// Check if a record is the terminal `[DONE]` sentinel.
#[must_use]
pub fn is_done_event(event: &SseEvent) -> bool {
    event.data.trim() == "[DONE]"
}

// ---------------------------------------------------------------------------
// Encoding helpers
// ---------------------------------------------------------------------------

fn push_anthropic_sse_frame(out: &mut String, event_type: &str, json: &str) {
    out.push_str("event: ");
    out.push_str(event_type);
    out.push('\n');
    out.push_str("data: ");
    out.push_str(json);
    out.push_str("\n\n");
}

/// Serialize events into one Anthropic SSE body, preserving their order.
///
/// No `[DONE]` sentinel is written; Anthropic streams end at `message_stop`.
#[must_use]
pub fn encode_anthropic_events(events: &[AnthropicStreamEvent]) -> String {
    let mut out = String::with_capacity(events.len() * 96);
    let mut json = String::with_capacity(128);
    for event in events {
        json.clear();
        push_anthropic_event_json(&mut json, event);
        push_anthropic_sse_frame(&mut out, event.event_name(), &json);
    }
    out
}
