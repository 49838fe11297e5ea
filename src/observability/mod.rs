use std::time::Instant;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::stream::TokenUsage;

/// Map a configured log level onto a tracing filter directive.
///
/// `None` means logging is disabled.
#[must_use]
pub fn tracing_directive(log_level: &str) -> Option<String> {
    let level = log_level.trim().to_uppercase();
    match level.as_str() {
        "DISABLED" => None,
        "WARNING" => Some("WARN".to_string()),
        "CRITICAL" => Some("ERROR".to_string()),
        _ => Some(level),
    }
}

/// Initialize the tracing subscriber with the configured log level.
///
/// Maps config log levels to tracing levels:
/// - "DISABLED" -> no subscriber installed
/// - "WARNING" -> WARN
/// - "CRITICAL" -> ERROR
/// - Others map directly (DEBUG, INFO, ERROR)
///
/// Output goes to stderr so converted bodies on stdout stay clean.
pub fn init_tracing(log_level: &str) {
    let Some(directive) = tracing_directive(log_level) else {
        return;
    };

    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("INFO"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Log one finished response conversion at INFO level.
pub fn log_conversion_complete(
    request_id: uuid::Uuid,
    model: &str,
    streaming: bool,
    usage: Option<&TokenUsage>,
    started_at: Instant,
) {
    let usage = usage.copied().unwrap_or_default();
    info!(
        request_id = %request_id,
        model,
        streaming,
        input_tokens = usage.prompt_tokens,
        output_tokens = usage.completion_tokens,
        total_tokens = usage.total_tokens,
        duration_seconds = started_at.elapsed().as_secs_f64(),
        "conversion completed"
    );
}
