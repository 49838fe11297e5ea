use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use msgbridge::config::{load_config, AppConfig, EndpointKind, MaxTokensField};
use msgbridge::error::format_error;
use msgbridge::observability::init_tracing;
use msgbridge::{ConversionContext, ConversionError, Converter, EndpointInfo};

const DEFAULT_CONFIG_PATH: &str = "config.yaml";

/// Convert Anthropic Messages traffic to and from OpenAI Chat Completions.
///
/// Reads a body from stdin and writes the converted body to stdout.
#[derive(Debug, Parser)]
#[command(name = "msgbridge", version)]
struct Cli {
    /// Path to the YAML configuration file (defaults to ./config.yaml when present)
    #[arg(long, global = true, env = "MSGBRIDGE_CONFIG")]
    config: Option<PathBuf>,

    /// Configured endpoint name, or a bare endpoint kind (openai, anthropic)
    #[arg(long, global = true)]
    endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Translate an Anthropic request body for the endpoint
    Request {
        /// Override the endpoint's token-limit field
        #[arg(long, value_enum)]
        max_tokens_field: Option<TokenLimitField>,
    },
    /// Convert an upstream OpenAI response body back to the Anthropic shape
    Response {
        /// The body is a buffered SSE stream
        #[arg(long)]
        stream: bool,

        /// Model reported when the upstream omits one
        #[arg(long)]
        model: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
#[value(rename_all = "snake_case")]
enum TokenLimitField {
    MaxTokens,
    MaxCompletionTokens,
}

impl From<TokenLimitField> for MaxTokensField {
    fn from(field: TokenLimitField) -> Self {
        match field {
            TokenLimitField::MaxTokens => MaxTokensField::MaxTokens,
            TokenLimitField::MaxCompletionTokens => MaxTokensField::MaxCompletionTokens,
        }
    }
}

fn main() {
    let cli = Cli::parse();

    let config = load_app_config(cli.config.as_deref())
        .unwrap_or_else(|err| exit_with_error(&ConversionError::Config(err)));
    init_tracing(&config.logging.level);

    let mut endpoint = resolve_endpoint(&config, cli.endpoint.as_deref())
        .unwrap_or_else(|err| exit_with_error(&ConversionError::Config(err)));

    let mut body = Vec::new();
    if let Err(e) = io::stdin().read_to_end(&mut body) {
        eprintln!("Failed to read stdin: {e}");
        std::process::exit(1);
    }

    let converter = Converter::new(config.conversion.clone());
    let result = match cli.command {
        Command::Request { max_tokens_field } => {
            if let Some(field) = max_tokens_field {
                endpoint.max_tokens_field = field.into();
            }
            converter
                .convert_request(&body, endpoint)
                .map(|(converted, _ctx)| converted)
        }
        Command::Response { stream, model } => {
            let mut ctx = ConversionContext::new(uuid::Uuid::nil(), endpoint);
            ctx.streaming = stream;
            ctx.model = model.unwrap_or_default();
            converter.convert_response(&body, &ctx, stream)
        }
    };

    match result {
        Ok(converted) => {
            let mut stdout = io::stdout().lock();
            if let Err(e) = stdout.write_all(&converted).and_then(|()| stdout.flush()) {
                eprintln!("Failed to write output: {e}");
                std::process::exit(1);
            }
        }
        Err(err) => exit_with_error(&err),
    }
}

fn exit_with_error(err: &ConversionError) -> ! {
    let (status, payload) = format_error(err);
    eprintln!("conversion failed ({status}): {err}");
    println!("{payload}");
    std::process::exit(1);
}

fn load_app_config(path: Option<&Path>) -> Result<AppConfig, String> {
    let path = match path {
        Some(path) => path,
        None if Path::new(DEFAULT_CONFIG_PATH).exists() => Path::new(DEFAULT_CONFIG_PATH),
        None => return Ok(AppConfig::default()),
    };
    let path = path.to_string_lossy();
    load_config(&path).map_err(|e| format!("{path}: {e}"))
}

/// `--endpoint` names a configured endpoint or a bare endpoint kind; OpenAI is the default.
fn resolve_endpoint(config: &AppConfig, name: Option<&str>) -> Result<EndpointInfo, String> {
    let Some(name) = name else {
        return Ok(EndpointInfo::openai(MaxTokensField::default()));
    };
    if let Some(configured) = config.endpoint(name) {
        return Ok(EndpointInfo::from(configured));
    }
    match EndpointKind::parse(name) {
        Some(EndpointKind::OpenAi) => Ok(EndpointInfo::openai(MaxTokensField::default())),
        Some(EndpointKind::Anthropic) => Ok(EndpointInfo::anthropic()),
        None => Err(format!("unknown endpoint '{name}'")),
    }
}
