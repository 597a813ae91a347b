//! Persisted records: uploads, remote references and backend sessions.

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use super::status::JobStatus;

/// A file uploaded directly and pushed to hot storage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    /// Content address assigned by hot storage. Unique key.
    pub content_address: String,
    /// Cold-storage job identifier.
    pub job_id: String,
    pub job_status: JobStatus,
    pub original_name: String,
    pub size_bytes: u64,
    /// Cold-storage deal info or failure diagnostic.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    /// Creates a record for a freshly submitted job, in state `NEW`.
    pub fn new(content_address: &str, job_id: &str, original_name: &str, size_bytes: u64) -> Self {
        let now = Utc::now();
        Self {
            content_address: content_address.to_string(),
            job_id: job_id.to_string(),
            job_status: JobStatus::New,
            original_name: original_name.to_string(),
            size_bytes,
            detail: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// A file referenced through a folder-wrapped content address on IPFS.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteRefRecord {
    /// URL the reference was submitted with. Unique key.
    pub source_url: String,
    pub folder_address: String,
    pub file_address: String,
    pub job_id: String,
    pub job_status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RemoteRefRecord {
    pub fn new(source_url: &str, folder_address: &str, file_address: &str, job_id: &str) -> Self {
        let now = Utc::now();
        Self {
            source_url: source_url.to_string(),
            folder_address: folder_address.to_string(),
            file_address: file_address.to_string(),
            job_id: job_id.to_string(),
            job_status: JobStatus::New,
            detail: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Durable identity held with the storage backend.
///
/// Archived sessions are kept for audit and never handed out again.
#[derive(Debug)]
pub struct BackendSession {
    pub id: String,
    pub token: SecretString,
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub archived_at: Option<DateTime<Utc>>,
}

impl BackendSession {
    pub fn new(id: &str, token: SecretString) -> Self {
        Self {
            id: id.to_string(),
            token,
            archived: false,
            created_at: Utc::now(),
            archived_at: None,
        }
    }

    /// Returns an archived copy of this session. The original is left untouched.
    pub fn to_archived(&self) -> Self {
        Self {
            id: self.id.clone(),
            token: SecretString::from(self.token.expose_secret().to_string()),
            archived: true,
            created_at: self.created_at,
            archived_at: Some(Utc::now()),
        }
    }
}
