use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::orchestrator::DealOverrides;

/// 10 MiB.
pub const DEFAULT_MAX_UPLOAD_SIZE: u64 = 10 * 1024 * 1024;
/// 30 minutes.
pub const DEFAULT_JOB_WATCH_TIMEOUT_MS: u64 = 30 * 60 * 1000;
pub const DEFAULT_LISTING_TIMEOUT_MS: u64 = 1500;
pub const DEFAULT_BACKEND_URI: &str = "http://0.0.0.0:6002";
pub const DEFAULT_IPFS_API_URI: &str = "http://localhost:5001";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_upload_directory")]
    pub upload_directory: PathBuf,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size: u64,
    #[serde(default)]
    pub deal_min_duration: Option<i64>,
    #[serde(default)]
    pub max_price: Option<u64>,
    #[serde(default = "default_job_watch_timeout_ms")]
    pub job_watch_timeout_ms: u64,
    #[serde(default = "default_backend_uri")]
    pub backend_uri: String,
    #[serde(default = "default_ipfs_api_uri")]
    pub ipfs_api_uri: String,
    #[serde(default = "default_listing_timeout_ms")]
    pub listing_timeout_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_upload_directory() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data").join("stowage.db")
}

fn default_max_upload_size() -> u64 {
    DEFAULT_MAX_UPLOAD_SIZE
}

fn default_job_watch_timeout_ms() -> u64 {
    DEFAULT_JOB_WATCH_TIMEOUT_MS
}

fn default_backend_uri() -> String {
    DEFAULT_BACKEND_URI.to_string()
}

fn default_ipfs_api_uri() -> String {
    DEFAULT_IPFS_API_URI.to_string()
}

fn default_listing_timeout_ms() -> u64 {
    DEFAULT_LISTING_TIMEOUT_MS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            upload_directory: default_upload_directory(),
            database_path: default_database_path(),
            max_upload_size: DEFAULT_MAX_UPLOAD_SIZE,
            deal_min_duration: None,
            max_price: None,
            job_watch_timeout_ms: DEFAULT_JOB_WATCH_TIMEOUT_MS,
            backend_uri: default_backend_uri(),
            ipfs_api_uri: default_ipfs_api_uri(),
            listing_timeout_ms: DEFAULT_LISTING_TIMEOUT_MS,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn job_watch_timeout(&self) -> Duration {
        Duration::from_millis(self.job_watch_timeout_ms)
    }

    pub fn listing_timeout(&self) -> Duration {
        Duration::from_millis(self.listing_timeout_ms)
    }

    pub fn deal_overrides(&self) -> DealOverrides {
        DealOverrides {
            deal_min_duration: self.deal_min_duration,
            max_price: self.max_price,
        }
    }

    /// The non-secret settings, for the startup log line.
    pub fn public_summary(&self) -> String {
        let optional = |value: Option<String>| value.unwrap_or_else(|| "backend default".to_string());
        format!(
            "upload_directory={} max_upload_size={} max_price={} deal_min_duration={} job_watch_timeout_ms={}",
            self.upload_directory.display(),
            self.max_upload_size,
            optional(self.max_price.map(|v| v.to_string())),
            optional(self.deal_min_duration.map(|v| v.to_string())),
            self.job_watch_timeout_ms,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
