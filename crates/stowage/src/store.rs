//! The job record store seam.
//!
//! Orchestration code talks to [`JobRecordStore`]; the SQLite-backed
//! implementation delegates to the repositories in [`crate::db`].

use async_trait::async_trait;

use crate::db::{remote_ref_repo, session_repo, upload_repo, Database, DatabaseError};
use crate::model::{BackendSession, RemoteRefRecord, UploadRecord};

/// Durable storage for uploads, remote references and backend sessions.
///
/// Upserts replace the whole record keyed by its natural key.
#[async_trait]
pub trait JobRecordStore: Send + Sync {
    async fn upsert_upload(&self, record: &UploadRecord) -> Result<(), DatabaseError>;

    async fn get_upload(&self, content_address: &str)
        -> Result<Option<UploadRecord>, DatabaseError>;

    /// Updates status and detail of an upload still owned by `record.job_id`.
    /// Returns `false` if the upload now belongs to another job.
    async fn update_upload_status(&self, record: &UploadRecord) -> Result<bool, DatabaseError>;

    async fn upsert_remote_reference(&self, record: &RemoteRefRecord)
        -> Result<(), DatabaseError>;

    async fn get_remote_reference(
        &self,
        source_url: &str,
    ) -> Result<Option<RemoteRefRecord>, DatabaseError>;

    /// Same as [`JobRecordStore::update_upload_status`], keyed by source URL.
    async fn update_remote_reference_status(
        &self,
        record: &RemoteRefRecord,
    ) -> Result<bool, DatabaseError>;

    async fn get_remote_reference_by_job_id(
        &self,
        job_id: &str,
    ) -> Result<Option<RemoteRefRecord>, DatabaseError>;

    async fn save_session(&self, session: &BackendSession) -> Result<(), DatabaseError>;

    /// Returns the current non-archived session, if one exists.
    async fn get_session(&self) -> Result<Option<BackendSession>, DatabaseError>;

    /// Every session ever created, archived ones included.
    async fn list_sessions(&self) -> Result<Vec<BackendSession>, DatabaseError>;
}

/// [`JobRecordStore`] backed by the SQLite [`Database`].
#[derive(Clone)]
pub struct SqliteRecordStore {
    db: Database,
}

impl SqliteRecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// In-memory store with migrations applied.
    pub fn in_memory() -> Result<Self, DatabaseError> {
        Ok(Self::new(Database::open_in_memory()?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }
}

#[async_trait]
impl JobRecordStore for SqliteRecordStore {
    async fn upsert_upload(&self, record: &UploadRecord) -> Result<(), DatabaseError> {
        upload_repo::upsert(&self.db, record)
    }

    async fn get_upload(
        &self,
        content_address: &str,
    ) -> Result<Option<UploadRecord>, DatabaseError> {
        upload_repo::find_by_content_address(&self.db, content_address)
    }

    async fn update_upload_status(&self, record: &UploadRecord) -> Result<bool, DatabaseError> {
        upload_repo::update_job_status(&self.db, record)
    }

    async fn upsert_remote_reference(
        &self,
        record: &RemoteRefRecord,
    ) -> Result<(), DatabaseError> {
        remote_ref_repo::upsert(&self.db, record)
    }

    async fn get_remote_reference(
        &self,
        source_url: &str,
    ) -> Result<Option<RemoteRefRecord>, DatabaseError> {
        remote_ref_repo::find_by_url(&self.db, source_url)
    }

    async fn update_remote_reference_status(
        &self,
        record: &RemoteRefRecord,
    ) -> Result<bool, DatabaseError> {
        remote_ref_repo::update_job_status(&self.db, record)
    }

    async fn get_remote_reference_by_job_id(
        &self,
        job_id: &str,
    ) -> Result<Option<RemoteRefRecord>, DatabaseError> {
        remote_ref_repo::find_by_job_id(&self.db, job_id)
    }

    async fn save_session(&self, session: &BackendSession) -> Result<(), DatabaseError> {
        session_repo::upsert(&self.db, session)
    }

    async fn get_session(&self) -> Result<Option<BackendSession>, DatabaseError> {
        session_repo::find_active(&self.db)
    }

    async fn list_sessions(&self) -> Result<Vec<BackendSession>, DatabaseError> {
        session_repo::list(&self.db)
    }
}
