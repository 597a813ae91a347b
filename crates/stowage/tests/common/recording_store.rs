#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;

use stowage::db::DatabaseError;
use stowage::{
    BackendSession, JobRecordStore, JobStatus, RemoteRefRecord, SqliteRecordStore, UploadRecord,
};

/// Wraps an in-memory SQLite store and logs every persisted status by key.
///
/// Status updates rejected because the record moved to another job are not
/// logged.
pub struct RecordingStore {
    inner: SqliteRecordStore,
    writes: Mutex<Vec<(String, JobStatus)>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self {
            inner: SqliteRecordStore::in_memory().expect("Failed to open in-memory store"),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Statuses persisted for `key`, in write order.
    pub fn statuses_for(&self, key: &str) -> Vec<JobStatus> {
        self.writes
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, status)| *status)
            .collect()
    }

    fn record(&self, key: &str, status: JobStatus) {
        self.writes.lock().unwrap().push((key.to_string(), status));
    }
}

#[async_trait]
impl JobRecordStore for RecordingStore {
    async fn upsert_upload(&self, record: &UploadRecord) -> Result<(), DatabaseError> {
        self.record(&record.content_address, record.job_status);
        self.inner.upsert_upload(record).await
    }

    async fn get_upload(
        &self,
        content_address: &str,
    ) -> Result<Option<UploadRecord>, DatabaseError> {
        self.inner.get_upload(content_address).await
    }

    async fn update_upload_status(&self, record: &UploadRecord) -> Result<bool, DatabaseError> {
        let applied = self.inner.update_upload_status(record).await?;
        if applied {
            self.record(&record.content_address, record.job_status);
        }
        Ok(applied)
    }

    async fn upsert_remote_reference(
        &self,
        record: &RemoteRefRecord,
    ) -> Result<(), DatabaseError> {
        self.record(&record.source_url, record.job_status);
        self.inner.upsert_remote_reference(record).await
    }

    async fn get_remote_reference(
        &self,
        source_url: &str,
    ) -> Result<Option<RemoteRefRecord>, DatabaseError> {
        self.inner.get_remote_reference(source_url).await
    }

    async fn update_remote_reference_status(
        &self,
        record: &RemoteRefRecord,
    ) -> Result<bool, DatabaseError> {
        let applied = self.inner.update_remote_reference_status(record).await?;
        if applied {
            self.record(&record.source_url, record.job_status);
        }
        Ok(applied)
    }

    async fn get_remote_reference_by_job_id(
        &self,
        job_id: &str,
    ) -> Result<Option<RemoteRefRecord>, DatabaseError> {
        self.inner.get_remote_reference_by_job_id(job_id).await
    }

    async fn save_session(&self, session: &BackendSession) -> Result<(), DatabaseError> {
        self.inner.save_session(session).await
    }

    async fn get_session(&self) -> Result<Option<BackendSession>, DatabaseError> {
        self.inner.get_session().await
    }

    async fn list_sessions(&self) -> Result<Vec<BackendSession>, DatabaseError> {
        self.inner.list_sessions().await
    }
}
