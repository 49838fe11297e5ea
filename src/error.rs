use crate::protocol::error_shapes::anthropic_error_payload;

/// Error type returned by every conversion stage.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("Empty stream: {0}")]
    EmptyStream(String),
    #[error("Aggregation error: {0}")]
    Aggregation(String),
    #[error("SSE parse error: {0}")]
    SseParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Config error: {0}")]
    Config(String),
}

/// Broad error category for status code selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    UpstreamResponse,
    Internal,
}

impl ConversionError {
    /// Stable tag used in logs and by callers deciding on failover.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ConversionError::Parse(_) => "parse_error",
            ConversionError::EmptyStream(_) => "empty_stream",
            ConversionError::Aggregation(_) => "aggregation_error",
            ConversionError::SseParse(_) => "sse_parse_error",
            ConversionError::InvalidRequest(_) => "invalid_request",
            ConversionError::Config(_) => "config_error",
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            ConversionError::InvalidRequest(_) => ErrorCategory::InvalidRequest,
            ConversionError::Parse(_)
            | ConversionError::EmptyStream(_)
            | ConversionError::Aggregation(_)
            | ConversionError::SseParse(_) => ErrorCategory::UpstreamResponse,
            ConversionError::Config(_) => ErrorCategory::Internal,
        }
    }
}

// ---------------------------------------------------------------------------
// Category -> HTTP status code
// ---------------------------------------------------------------------------

fn http_status_for_category(cat: ErrorCategory) -> http::StatusCode {
    match cat {
        ErrorCategory::InvalidRequest => http::StatusCode::BAD_REQUEST,
        ErrorCategory::UpstreamResponse => http::StatusCode::BAD_GATEWAY,
        ErrorCategory::Internal => http::StatusCode::INTERNAL_SERVER_ERROR,
    }
}

// ---------------------------------------------------------------------------
// Client-facing error body
// ---------------------------------------------------------------------------

/// Format an error for an Anthropic client, returning (`status_code`, JSON body).
#[must_use]
pub fn format_error(err: &ConversionError) -> (http::StatusCode, serde_json::Value) {
    let cat = err.category();
    let status = http_status_for_category(cat);
    (status, anthropic_error_payload(cat, &err.to_string()))
}
