pub mod validation;

use serde::{Deserialize, Serialize};
use std::fmt;

use self::validation::validate_config;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Wire protocol spoken by an upstream endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EndpointKind {
    #[default]
    Anthropic,
    OpenAi,
}

impl EndpointKind {
    /// Parse the endpoint kind strings used by the surrounding proxy.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Some(EndpointKind::Anthropic),
            "openai" => Some(EndpointKind::OpenAi),
            _ => None,
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EndpointKind::Anthropic => write!(f, "anthropic"),
            EndpointKind::OpenAi => write!(f, "openai"),
        }
    }
}

/// Request field that carries the token limit on an OpenAI-compatible endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MaxTokensField {
    MaxTokens,
    #[default]
    MaxCompletionTokens,
}

impl MaxTokensField {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MaxTokensField::MaxTokens => "max_tokens",
            MaxTokensField::MaxCompletionTokens => "max_completion_tokens",
        }
    }
}

/// How upstream chunks report `completion_tokens`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UsageAccounting {
    /// Each chunk carries a delta; the aggregate is their sum.
    #[default]
    Incremental,
    /// Each chunk carries a running total; the latest non-zero value wins.
    Cumulative,
}

/// Python-literal JSON repair settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRepairConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_target_tools")]
    pub target_tools: Vec<String>,
    #[serde(default)]
    pub debug_logging: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_true() -> bool {
    true
}
fn default_target_tools() -> Vec<String> {
    vec!["TodoWrite".to_string()]
}
fn default_max_attempts() -> u32 {
    3
}

impl Default for JsonRepairConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            target_tools: default_target_tools(),
            debug_logging: false,
            max_attempts: default_max_attempts(),
        }
    }
}

/// Conversion engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionConfig {
    #[serde(default)]
    pub python_json_fixing: JsonRepairConfig,
    #[serde(default = "default_tool_args_chunk_runes")]
    pub tool_args_chunk_runes: usize,
    #[serde(default)]
    pub usage_accounting: UsageAccounting,
}

fn default_tool_args_chunk_runes() -> usize {
    10
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            python_json_fixing: JsonRepairConfig::default(),
            tool_args_chunk_runes: default_tool_args_chunk_runes(),
            usage_accounting: UsageAccounting::default(),
        }
    }
}

/// One upstream endpoint as seen by the conversion layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub name: String,
    #[serde(default)]
    pub endpoint_type: EndpointKind,
    #[serde(default)]
    pub max_tokens_field: MaxTokensField,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub conversion: ConversionConfig,
    #[serde(default)]
    pub endpoints: Vec<EndpointConfig>,
}

impl AppConfig {
    #[must_use]
    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

/// Parse and validate configuration from YAML text.
///
/// # Errors
///
/// Returns [`ConfigError::Yaml`] when parsing fails or [`ConfigError::Validation`]
/// when semantic validation fails.
pub fn parse_config(contents: &str) -> Result<AppConfig, ConfigError> {
    let config: AppConfig = serde_yaml::from_str(contents)?;
    validate_config(&config)?;
    Ok(config)
}

/// Load configuration from a YAML file and validate it.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading the file fails, [`ConfigError::Yaml`]
/// when parsing fails, or [`ConfigError::Validation`] when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    parse_config(&contents)
}
