//! Public entry point: request translation and response conversion for one
//! client exchange.

mod request_id;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use tracing::{debug, error, warn};

use crate::aggregate::{aggregate_chunks, AggregatedMessage};
use crate::config::{ConversionConfig, EndpointConfig, EndpointKind, MaxTokensField};
use crate::error::ConversionError;
use crate::observability::log_conversion_complete;
use crate::protocol::anthropic::decoder::{decode_anthropic_request, offered_tool_names};
use crate::protocol::anthropic::response_encoder::encode_anthropic_response;
use crate::protocol::anthropic::stream::{anthropic_message_id, emit_message_events};
use crate::protocol::openai_chat::encoder::encode_openai_chat_request;
use crate::protocol::openai_chat::response_decoder::{
    decode_openai_chat_response, response_to_chunk,
};
use crate::repair::JsonRepair;
use crate::stream::{encode_anthropic_events, UpstreamChunk, UpstreamChunkDecoder};

use self::request_id::RequestIdGenerator;

/// What the caller knows about the selected upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EndpointInfo {
    pub kind: EndpointKind,
    pub max_tokens_field: MaxTokensField,
}

impl EndpointInfo {
    #[must_use]
    pub fn anthropic() -> Self {
        Self {
            kind: EndpointKind::Anthropic,
            max_tokens_field: MaxTokensField::default(),
        }
    }

    #[must_use]
    pub fn openai(max_tokens_field: MaxTokensField) -> Self {
        Self {
            kind: EndpointKind::OpenAi,
            max_tokens_field,
        }
    }
}

impl From<&EndpointConfig> for EndpointInfo {
    fn from(endpoint: &EndpointConfig) -> Self {
        Self {
            kind: endpoint.endpoint_type,
            max_tokens_field: endpoint.max_tokens_field,
        }
    }
}

/// State carried from request translation to response conversion for one
/// client exchange. Never shared across requests.
#[derive(Debug, Clone)]
pub struct ConversionContext {
    pub request_id: uuid::Uuid,
    pub endpoint_kind: EndpointKind,
    pub streaming: bool,
    /// Model named by the client request.
    pub model: String,
    pub max_tokens_field: MaxTokensField,
    /// Tools the client offered, in declaration order.
    pub tool_names: Vec<String>,
    pub started_at: Instant,
}

impl ConversionContext {
    /// Bare context for an endpoint; request translation fills in the rest.
    #[must_use]
    pub fn new(request_id: uuid::Uuid, endpoint: EndpointInfo) -> Self {
        Self {
            request_id,
            endpoint_kind: endpoint.kind,
            streaming: false,
            model: String::new(),
            max_tokens_field: endpoint.max_tokens_field,
            tool_names: Vec::new(),
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn offers_tool(&self, name: &str) -> bool {
        self.tool_names.iter().any(|t| t == name)
    }
}

/// `true` when traffic to an endpoint of this kind must be converted.
#[must_use]
pub fn should_convert(kind: EndpointKind) -> bool {
    kind == EndpointKind::OpenAi
}

/// Conversion engine. Cheap to share: configuration is immutable after
/// construction and no per-request state lives here.
#[derive(Debug)]
pub struct Converter {
    config: Arc<ConversionConfig>,
    repair: JsonRepair,
    ids: RequestIdGenerator,
}

impl Converter {
    #[must_use]
    pub fn new(config: ConversionConfig) -> Self {
        Self::with_shared_config(Arc::new(config))
    }

    #[must_use]
    pub fn with_shared_config(config: Arc<ConversionConfig>) -> Self {
        let repair = JsonRepair::new(config.python_json_fixing.clone());
        Self {
            config,
            repair,
            ids: RequestIdGenerator::new(),
        }
    }

    /// Translate an Anthropic request body for the given endpoint.
    ///
    /// Anthropic endpoints get the body back unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::Parse`] or [`ConversionError::InvalidRequest`]
    /// when the body is not a usable Anthropic Messages request.
    pub fn convert_request(
        &self,
        body: &[u8],
        endpoint: EndpointInfo,
    ) -> Result<(Bytes, ConversionContext), ConversionError> {
        let request_id = self.ids.next_uuid();
        if !should_convert(endpoint.kind) {
            return Ok((
                Bytes::copy_from_slice(body),
                ConversionContext::new(request_id, endpoint),
            ));
        }

        let request = decode_anthropic_request(body).inspect_err(|err| {
            error!(%request_id, kind = err.kind(), error = %err, "request conversion failed");
        })?;
        let translated = encode_openai_chat_request(&request, endpoint.max_tokens_field);
        let encoded = serde_json::to_vec(&translated).map_err(|err| {
            ConversionError::InvalidRequest(format!("failed to encode OpenAI request: {err}"))
        })?;

        let ctx = ConversionContext {
            request_id,
            endpoint_kind: endpoint.kind,
            streaming: request.stream.unwrap_or(false),
            model: request.model.clone(),
            max_tokens_field: endpoint.max_tokens_field,
            tool_names: offered_tool_names(&request),
            started_at: Instant::now(),
        };
        debug!(
            %request_id,
            model = ctx.model.as_str(),
            streaming = ctx.streaming,
            messages = translated.messages.len(),
            tools = ctx.tool_names.len(),
            max_tokens_field = endpoint.max_tokens_field.as_str(),
            "converted request for OpenAI endpoint"
        );
        Ok((Bytes::from(encoded), ctx))
    }

    /// Convert an upstream response body back into the Anthropic shape.
    ///
    /// Streaming bodies are buffered SSE and come back as an Anthropic SSE
    /// body; otherwise a single `message` JSON object is produced.
    ///
    /// # Errors
    ///
    /// Returns [`ConversionError::SseParse`], [`ConversionError::EmptyStream`],
    /// [`ConversionError::Aggregation`] or [`ConversionError::Parse`].
    pub fn convert_response(
        &self,
        body: &[u8],
        ctx: &ConversionContext,
        is_streaming: bool,
    ) -> Result<Bytes, ConversionError> {
        if !should_convert(ctx.endpoint_kind) {
            return Ok(Bytes::copy_from_slice(body));
        }

        let result = if is_streaming {
            self.convert_streaming_response(body, ctx)
        } else {
            self.convert_non_streaming_response(body, ctx)
        };
        if let Err(err) = &result {
            error!(
                request_id = %ctx.request_id,
                kind = err.kind(),
                error = %err,
                "response conversion failed"
            );
        }
        result
    }

    fn convert_streaming_response(
        &self,
        body: &[u8],
        ctx: &ConversionContext,
    ) -> Result<Bytes, ConversionError> {
        let text = std::str::from_utf8(body).map_err(|err| {
            ConversionError::SseParse(format!("upstream stream is not valid UTF-8: {err}"))
        })?;
        let chunks = UpstreamChunkDecoder::new(&self.repair).decode_stream(text)?;
        let msg = self.aggregate(chunks, ctx)?;

        let (id, model) = self.envelope(&msg, ctx);
        let events = emit_message_events(&msg, &id, &model, self.config.tool_args_chunk_runes);
        let sse = encode_anthropic_events(&events);

        log_conversion_complete(ctx.request_id, &model, true, msg.usage.as_ref(), ctx.started_at);
        Ok(Bytes::from(sse))
    }

    fn convert_non_streaming_response(
        &self,
        body: &[u8],
        ctx: &ConversionContext,
    ) -> Result<Bytes, ConversionError> {
        let response = decode_openai_chat_response(body, &self.repair)?;
        let msg = self.aggregate(vec![response_to_chunk(response)], ctx)?;

        let (id, model) = self.envelope(&msg, ctx);
        let encoded = serde_json::to_vec(&encode_anthropic_response(&msg, &id, &model))
            .map_err(|err| {
                ConversionError::Aggregation(format!("failed to encode Anthropic response: {err}"))
            })?;

        log_conversion_complete(ctx.request_id, &model, false, msg.usage.as_ref(), ctx.started_at);
        Ok(Bytes::from(encoded))
    }

    fn aggregate(
        &self,
        chunks: Vec<UpstreamChunk>,
        ctx: &ConversionContext,
    ) -> Result<AggregatedMessage, ConversionError> {
        let msg = aggregate_chunks(chunks, &self.repair, self.config.usage_accounting)?;

        if !ctx.tool_names.is_empty() {
            for call in &msg.tool_calls {
                if !ctx.offers_tool(&call.name) {
                    warn!(
                        request_id = %ctx.request_id,
                        tool = call.name.as_str(),
                        "upstream called a tool the client did not offer"
                    );
                }
            }
        }
        Ok(msg)
    }

    fn envelope(&self, msg: &AggregatedMessage, ctx: &ConversionContext) -> (String, String) {
        let model = if msg.model.is_empty() {
            ctx.model.clone()
        } else {
            msg.model.clone()
        };
        (anthropic_message_id(&msg.id), model)
    }
}

impl Default for Converter {
    fn default() -> Self {
        Self::new(ConversionConfig::default())
    }
}
