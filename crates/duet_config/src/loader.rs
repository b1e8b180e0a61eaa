//! Configuration file loading and validation.

use crate::error::ConfigError;
use crate::types::ProjectConfig;
use std::path::Path;

/// Name of the configuration file looked up in a project directory.
pub const CONFIG_FILE_NAME: &str = "duet.toml";

/// Loads and validates a `duet.toml` configuration from a project directory.
///
/// Reads `<project_dir>/duet.toml`, parses it, and validates its values.
pub fn load_config(project_dir: &Path) -> Result<ProjectConfig, ConfigError> {
    load_config_file(&project_dir.join(CONFIG_FILE_NAME))
}

/// Loads and validates a configuration from an explicit file path.
pub fn load_config_file(path: &Path) -> Result<ProjectConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    load_config_from_str(&content)
}

/// Parses and validates a `duet.toml` configuration from a string.
///
/// Useful for testing without filesystem dependencies.
pub fn load_config_from_str(content: &str) -> Result<ProjectConfig, ConfigError> {
    let config: ProjectConfig =
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
    validate_config(&config)?;
    Ok(config)
}

/// Validates that configuration values are consistent.
fn validate_config(config: &ProjectConfig) -> Result<(), ConfigError> {
    if config.build.output_path.is_empty() {
        return Err(ConfigError::ValidationError(
            "build.output_path must not be empty".to_string(),
        ));
    }
    if config.build.workers == Some(0) {
        return Err(ConfigError::ValidationError(
            "build.workers must be at least 1".to_string(),
        ));
    }
    if config.cache.enabled && config.cache.path.is_empty() {
        return Err(ConfigError::ValidationError(
            "cache.path must not be empty".to_string(),
        ));
    }
    config
        .naming
        .target_naming()
        .map_err(|e| ConfigError::ValidationError(format!("naming: {e}")))?;
    Ok(())
}
