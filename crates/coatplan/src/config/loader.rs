use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub const ENV_DATABASE_PATH: &str = "COATPLAN_DATABASE_PATH";
pub const ENV_STORAGE_ROOT: &str = "COATPLAN_STORAGE_ROOT";
pub const ENV_LOG_LEVEL: &str = "COATPLAN_LOG_LEVEL";

/// Loads a config file, then applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = load_config_from_str(&content)?;
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;

    validate_schema(&json_value)?;

    let config: Config = serde_json::from_value(json_value)?;

    validate_config(&config)?;

    Ok(config)
}

/// Non-empty `COATPLAN_*` variables win over file values.
pub fn apply_env_overrides(config: &mut Config) {
    if let Some(path) = env_value(ENV_DATABASE_PATH) {
        config.database.path = PathBuf::from(path);
    }
    if let Some(root) = env_value(ENV_STORAGE_ROOT) {
        config.storage.root = PathBuf::from(root);
    }
    if let Some(level) = env_value(ENV_LOG_LEVEL) {
        config.logging.level = level;
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn validate_schema(json_value: &serde_json::Value) -> Result<(), ConfigError> {
    let schema: serde_json::Value =
        serde_json::from_str(SCHEMA_JSON).map_err(|e| ConfigError::Validation {
            message: format!("Invalid embedded schema JSON: {}", e),
        })?;

    let validator = jsonschema::validator_for(&schema).map_err(|e| ConfigError::Validation {
        message: format!("Failed to compile JSON schema: {}", e),
    })?;

    let error_messages: Vec<String> = validator
        .iter_errors(json_value)
        .map(|e| e.to_string())
        .collect();
    if !error_messages.is_empty() {
        return Err(ConfigError::SchemaValidation {
            errors: error_messages.join("; "),
        });
    }

    Ok(())
}

fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(invalid(format!("Unsupported config version: {}", config.version)));
    }

    if config.storage.root.as_os_str().is_empty() {
        return Err(invalid("storage.root must not be empty".to_string()));
    }
    if config.storage.write_ttl_secs == 0 {
        return Err(invalid("storage.write_ttl_secs must be positive".to_string()));
    }
    if config.upload.max_file_size == 0 {
        return Err(invalid("upload.max_file_size must be positive".to_string()));
    }
    if config.queue.name.trim().is_empty() {
        return Err(invalid("queue.name must not be empty".to_string()));
    }
    if config.queue.max_attempts == 0 {
        return Err(invalid("queue.max_attempts must be at least 1".to_string()));
    }
    if config.queue.timeout_secs == 0 {
        return Err(invalid("queue.timeout_secs must be positive".to_string()));
    }
    if config.workers.count == 0 {
        return Err(invalid("workers.count must be at least 1".to_string()));
    }
    if !config.costs.labor_rate.is_finite() || config.costs.labor_rate < 0.0 {
        return Err(invalid(format!(
            "costs.labor_rate must be a non-negative number, got {}",
            config.costs.labor_rate
        )));
    }

    Ok(())
}

fn invalid(message: String) -> ConfigError {
    ConfigError::Validation { message }
}
