use std::path::PathBuf;
use thiserror::Error;

use crate::backend::{BackendError, HealthStatus};
use crate::db::DatabaseError;
use crate::listing::ListingError;

#[derive(Error, Debug)]
pub enum StowageError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Ingestion error: {0}")]
    Ingest(#[from] IngestError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Listing error: {0}")]
    Listing(#[from] ListingError),

    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid value '{value}' for environment variable {name}: {reason}")]
    InvalidEnv {
        name: &'static str,
        value: String,
        reason: String,
    },
}

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to move file from '{from}' to '{to}': {source}")]
    MoveFile {
        from: PathBuf,
        to: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to remove file '{path}': {source}")]
    RemoveFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Content address '{0}' is not a valid file name")]
    InvalidContentAddress(String),
}

/// Failures of the ingestion pipeline, status queries and job watchers.
#[derive(Error, Debug)]
pub enum IngestError {
    /// The content address already has a completed or running cold-storage job.
    #[error("File already processed or in progress with content address '{content_address}'")]
    Conflict { content_address: String },

    #[error("Content of {size} bytes is larger than the maximum of {max} bytes")]
    SizeExceeded { size: u64, max: u64 },

    /// The backend rejected the session again after a recovery attempt.
    #[error("Backend session invalid after recovery: {0}")]
    SessionInvalid(#[source] BackendError),

    #[error("Backend request '{operation}' failed: {source}")]
    Backend {
        operation: &'static str,
        #[source]
        source: BackendError,
    },

    #[error("Listing folder '{address}' failed: {source}")]
    Listing {
        address: String,
        #[source]
        source: ListingError,
    },

    #[error("Unknown job status code {code} for job '{job_id}'")]
    Protocol { job_id: String, code: i32 },

    #[error("{kind} '{key}' not found")]
    NotFound { kind: &'static str, key: String },

    #[error("Backend is in {status} state")]
    BackendUnhealthy { status: HealthStatus },

    #[error("Invalid source url '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Staging error: {0}")]
    Staging(#[from] StagingError),
}

impl IngestError {
    pub(crate) fn backend(operation: &'static str, source: BackendError) -> Self {
        IngestError::Backend { operation, source }
    }

    pub(crate) fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        IngestError::NotFound {
            kind,
            key: key.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, StowageError>;
