//! The storage backend port.
//!
//! The backend performs hot-store writes, cold-storage deal making and job
//! execution. The orchestrator only consumes it through [`StorageBackend`].

use std::fmt;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use secrecy::SecretString;
use serde::Serialize;
use thiserror::Error;

mod config;
mod subscription;

pub use config::{ColdConfig, FilecoinConfig, StorageConfig};
pub use subscription::{JobEvent, JobSubscription};

/// Error code the backend embeds in messages when a session is no longer valid.
pub const SESSION_INVALID_CODE: u32 = 2;

static RE_ERROR_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bcode\s*[=:]?\s*(\d+)").unwrap());

/// Errors reported by the storage backend.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// The backend answered with an error message.
    #[error("{0}")]
    Request(String),

    /// The backend could not be reached.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The requested entity is unknown to the backend.
    #[error("not found: {0}")]
    NotFound(String),
}

impl BackendError {
    fn message(&self) -> &str {
        match self {
            BackendError::Request(m) | BackendError::Unavailable(m) | BackendError::NotFound(m) => m,
        }
    }

    /// Integer error code embedded in the message (`... code 2 ...`), if any.
    pub fn embedded_code(&self) -> Option<u32> {
        RE_ERROR_CODE
            .captures(self.message())
            .and_then(|caps| caps.get(1))
            .and_then(|m| m.as_str().parse().ok())
    }

    /// Whether this error signals that the backend session was invalidated.
    pub fn is_session_invalid(&self) -> bool {
        matches!(self, BackendError::Request(_))
            && self.embedded_code() == Some(SESSION_INVALID_CODE)
    }
}

/// Credentials returned by the backend for a new session.
#[derive(Debug)]
pub struct SessionCredentials {
    pub id: String,
    pub token: SecretString,
}

/// Backend health as reported by `check_health`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum HealthStatus {
    Unspecified,
    Ok,
    Degraded,
    Error,
}

impl HealthStatus {
    /// Maps a backend health code. Unknown codes are reported as `Unspecified`.
    pub fn from_code(code: i32) -> Self {
        match code {
            1 => HealthStatus::Ok,
            2 => HealthStatus::Degraded,
            3 => HealthStatus::Error,
            _ => HealthStatus::Unspecified,
        }
    }

    /// `OK` and `DEGRADED` accept work.
    pub fn is_serviceable(self) -> bool {
        matches!(self, HealthStatus::Ok | HealthStatus::Degraded)
    }
}

impl fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HealthStatus::Unspecified => "UNSPECIFIED",
            HealthStatus::Ok => "OK",
            HealthStatus::Degraded => "DEGRADED",
            HealthStatus::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Capabilities the orchestrator needs from the storage backend.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Creates a new backend session.
    async fn create_session(&self) -> Result<SessionCredentials, BackendError>;

    /// Installs the token used to authenticate subsequent calls.
    fn set_session_token(&self, token: &SecretString);

    /// Writes content to hot storage and returns its content address.
    async fn add_to_hot(&self, content: &[u8]) -> Result<String, BackendError>;

    async fn default_storage_config(&self) -> Result<StorageConfig, BackendError>;

    async fn set_default_storage_config(&self, config: &StorageConfig)
        -> Result<(), BackendError>;

    /// Pushes a cold-storage job for the content address and returns its job id.
    async fn push_storage_config(&self, content_address: &str) -> Result<String, BackendError>;

    /// Subscribes to status events of a job.
    async fn watch_job(&self, job_id: &str) -> Result<JobSubscription, BackendError>;

    /// Current cold-storage deal and location info for a content address.
    async fn cold_info(&self, content_address: &str) -> Result<serde_json::Value, BackendError>;

    /// Raw health code, see [`HealthStatus::from_code`].
    async fn check_health(&self) -> Result<i32, BackendError>;

    /// Wallet addresses held by the current session.
    async fn list_addresses(&self) -> Result<Vec<String>, BackendError>;
}
