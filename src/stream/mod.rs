pub mod decoder;
pub mod sse;

pub use decoder::{ChoiceDelta, TokenUsage, ToolCallDelta, UpstreamChunk, UpstreamChunkDecoder};
pub use sse::{encode_anthropic_events, SseParser};

/// One `data:` record read from an upstream SSE body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub data: String,
}
