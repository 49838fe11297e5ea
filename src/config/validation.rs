use std::collections::HashSet;

use super::{AppConfig, ConfigError};

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_log_level(config)?;
    validate_json_repair(config)?;
    validate_conversion(config)?;
    validate_endpoints(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    let valid_levels = ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];
    if !valid_levels.contains(&config.logging.level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "logging.level must be one of {valid_levels:?}"
        )));
    }
    Ok(())
}

fn validate_json_repair(config: &AppConfig) -> Result<(), ConfigError> {
    let fixing = &config.conversion.python_json_fixing;
    if fixing.max_attempts == 0 {
        return Err(validation_err(
            "conversion.python_json_fixing.max_attempts must be greater than 0",
        ));
    }
    for tool in &fixing.target_tools {
        if tool.trim().is_empty() {
            return Err(validation_err(
                "conversion.python_json_fixing.target_tools contains an empty tool name",
            ));
        }
    }
    Ok(())
}

fn validate_conversion(config: &AppConfig) -> Result<(), ConfigError> {
    if config.conversion.tool_args_chunk_runes == 0 {
        return Err(validation_err(
            "conversion.tool_args_chunk_runes must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_endpoints(config: &AppConfig) -> Result<(), ConfigError> {
    let mut names = HashSet::new();
    for endpoint in &config.endpoints {
        if endpoint.name.trim().is_empty() {
            return Err(validation_err("endpoint name cannot be empty"));
        }
        if !names.insert(endpoint.name.as_str()) {
            return Err(validation_err(format!(
                "duplicate endpoint name '{}'",
                endpoint.name
            )));
        }
    }
    Ok(())
}
