use std::path::{Path, PathBuf};

use crate::config::schema::Config;
use crate::error::ConfigError;

const SCHEMA_JSON: &str = include_str!("../../schema/config-v1.json");

pub const ENV_MAX_FILE_SIZE: &str = "STOWAGE_MAX_FILE_SIZE";
pub const ENV_JOB_WATCH_TIMEOUT: &str = "STOWAGE_JOB_WATCH_TIMEOUT";
pub const ENV_UPLOADS_PATH: &str = "STOWAGE_UPLOADS_PATH";
pub const ENV_DATABASE_PATH: &str = "STOWAGE_DATABASE_PATH";
pub const ENV_BACKEND_URI: &str = "STOWAGE_BACKEND_URI";
pub const ENV_IPFS_API_URI: &str = "STOWAGE_IPFS_API_URI";
pub const ENV_DEAL_MIN_DURATION: &str = "STOWAGE_DEAL_MIN_DURATION";
pub const ENV_MAX_PRICE: &str = "STOWAGE_MAX_PRICE";

/// Loads a config file, applies `STOWAGE_*` environment overrides and
/// validates the result.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    let mut config = parse_config(&content)?;
    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config)?;
    Ok(config)
}

/// Parses and validates config JSON. The environment is not consulted.
pub fn load_config_from_str(content: &str) -> Result<Config, ConfigError> {
    let config = parse_config(content)?;
    validate_config(&config)?;
    Ok(config)
}

fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let json_value: serde_json::Value = serde_json::from_str(content)?;
    validate_schema(&json_value)?;
    Ok(serde_json::from_value(json_value)?)
}

impl Config {
    /// Defaults plus `STOWAGE_*` environment overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();
        apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
        validate_config(&config)?;
        Ok(config)
    }
}

/// Applies environment overrides read through `lookup`.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(ENV_MAX_FILE_SIZE) {
        config.max_upload_size = parse_env(ENV_MAX_FILE_SIZE, value)?;
    }
    if let Some(value) = lookup(ENV_JOB_WATCH_TIMEOUT) {
        config.job_watch_timeout_ms = parse_env(ENV_JOB_WATCH_TIMEOUT, value)?;
    }
    if let Some(value) = lookup(ENV_UPLOADS_PATH) {
        config.upload_directory = PathBuf::from(value);
    }
    if let Some(value) = lookup(ENV_DATABASE_PATH) {
        config.database_path = PathBuf::from(value);
    }
    if let Some(value) = lookup(ENV_BACKEND_URI) {
        config.backend_uri = value;
    }
    if let Some(value) = lookup(ENV_IPFS_API_URI) {
        config.ipfs_api_uri = value;
    }
    if let Some(value) = lookup(ENV_DEAL_MIN_DURATION) {
        config.deal_min_duration = Some(parse_env(ENV_DEAL_MIN_DURATION, value)?);
    }
    if let Some(value) = lookup(ENV_MAX_PRICE) {
        config.max_price = Some(parse_env(ENV_MAX_PRICE, value)?);
    }
    Ok(())
}

fn parse_env<T>(name: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e: T::Err| ConfigError::InvalidEnv {
        name,
        reason: e.to_string(),
        value,
    })
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
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }
    if config.max_upload_size == 0 {
        return Err(ConfigError::Validation {
            message: "max_upload_size must be greater than zero".to_string(),
        });
    }
    if config.job_watch_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            message: "job_watch_timeout_ms must be greater than zero".to_string(),
        });
    }
    if config.listing_timeout_ms == 0 {
        return Err(ConfigError::Validation {
            message: "listing_timeout_ms must be greater than zero".to_string(),
        });
    }
    for (field, uri) in [
        ("backend_uri", &config.backend_uri),
        ("ipfs_api_uri", &config.ipfs_api_uri),
    ] {
        if let Err(e) = reqwest::Url::parse(uri) {
            return Err(ConfigError::Validation {
                message: format!("{} '{}' is not a valid URI: {}", field, uri, e),
            });
        }
    }
    Ok(())
}
