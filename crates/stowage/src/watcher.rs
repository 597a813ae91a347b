//! Job watcher.
//!
//! One watcher per cold-storage job. It consumes the backend's status
//! stream, persists every transition of the watched record and stops on a
//! terminal status or when the watch timeout elapses, whichever comes first.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde_json::{json, Value};
use tracing::Instrument;

use crate::backend::{JobEvent, JobSubscription, StorageBackend};
use crate::db::DatabaseError;
use crate::error::IngestError;
use crate::model::{JobStatus, RemoteRefRecord, UploadRecord};
use crate::sanitize::redact_path;
use crate::staging::FileStaging;
use crate::store::JobRecordStore;

/// The record a watcher keeps up to date.
#[derive(Debug, Clone)]
pub enum WatchTarget {
    /// A local upload; its staged file is removed when the watch ends.
    Upload {
        record: UploadRecord,
        staged_path: PathBuf,
    },
    RemoteReference { record: RemoteRefRecord },
}

impl WatchTarget {
    /// Address whose cold-storage info is fetched.
    fn content_address(&self) -> &str {
        match self {
            WatchTarget::Upload { record, .. } => &record.content_address,
            WatchTarget::RemoteReference { record } => &record.file_address,
        }
    }

    /// Natural key of the record, for logs.
    pub fn key(&self) -> &str {
        match self {
            WatchTarget::Upload { record, .. } => &record.content_address,
            WatchTarget::RemoteReference { record } => &record.source_url,
        }
    }

    pub fn status(&self) -> JobStatus {
        match self {
            WatchTarget::Upload { record, .. } => record.job_status,
            WatchTarget::RemoteReference { record } => record.job_status,
        }
    }

    fn staged_path(&self) -> Option<&Path> {
        match self {
            WatchTarget::Upload { staged_path, .. } => Some(staged_path),
            WatchTarget::RemoteReference { .. } => None,
        }
    }

    /// Sets the status. A `None` detail keeps the previous one.
    fn update(&mut self, status: JobStatus, detail: Option<Value>) {
        let now = Utc::now();
        let (job_status, current_detail, updated_at) = match self {
            WatchTarget::Upload { record, .. } => (
                &mut record.job_status,
                &mut record.detail,
                &mut record.updated_at,
            ),
            WatchTarget::RemoteReference { record } => (
                &mut record.job_status,
                &mut record.detail,
                &mut record.updated_at,
            ),
        };
        *job_status = status;
        if detail.is_some() {
            *current_detail = detail;
        }
        *updated_at = now;
    }

    /// Writes the record if it still belongs to this watcher's job.
    async fn persist(&self, store: &dyn JobRecordStore) -> Result<bool, DatabaseError> {
        match self {
            WatchTarget::Upload { record, .. } => store.update_upload_status(record).await,
            WatchTarget::RemoteReference { record } => {
                store.update_remote_reference_status(record).await
            }
        }
    }
}

/// How a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchOutcome {
    /// The backend reported a terminal status.
    Finished(JobStatus),
    /// The watch timeout elapsed first; the record was forced to `UNSPECIFIED`.
    TimedOut,
    /// The record was resubmitted under another job; nothing more was written.
    Superseded,
}

pub struct JobWatcher {
    store: Arc<dyn JobRecordStore>,
    backend: Arc<dyn StorageBackend>,
    staging: FileStaging,
    job_id: String,
    target: WatchTarget,
    timeout: Duration,
}

impl JobWatcher {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        backend: Arc<dyn StorageBackend>,
        staging: FileStaging,
        job_id: &str,
        target: WatchTarget,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            staging,
            job_id: job_id.to_string(),
            target,
            timeout,
        }
    }

    /// Drives the watch to completion.
    ///
    /// The subscription is released exactly once, on a terminal status, on
    /// timeout or on a protocol error.
    pub async fn run(mut self, subscription: JobSubscription) -> Result<WatchOutcome, IngestError> {
        let span = tracing::info_span!(
            "job_watcher",
            job_id = %self.job_id,
            key = %self.target.key(),
        );
        self.watch(subscription).instrument(span).await
    }

    async fn watch(&mut self, mut subscription: JobSubscription) -> Result<WatchOutcome, IngestError> {
        tracing::debug!(timeout_ms = self.timeout.as_millis() as u64, "Watching job");

        let deadline = tokio::time::sleep(self.timeout);
        tokio::pin!(deadline);
        let mut stream_open = true;

        loop {
            tokio::select! {
                biased;
                event = subscription.recv(), if stream_open => match event {
                    Some(event) => {
                        if let Some(outcome) = self.on_event(&mut subscription, event).await? {
                            return Ok(outcome);
                        }
                    }
                    None => {
                        tracing::warn!("Job status stream closed before a terminal status");
                        stream_open = false;
                    }
                },
                () = &mut deadline => {
                    return Ok(self.on_timeout(&mut subscription).await);
                }
            }
        }
    }

    async fn on_event(
        &mut self,
        subscription: &mut JobSubscription,
        event: JobEvent,
    ) -> Result<Option<WatchOutcome>, IngestError> {
        if event.job_id != self.job_id {
            tracing::debug!(other = %event.job_id, "Ignoring event for another job");
            return Ok(None);
        }

        let status = match JobStatus::from_code(event.status_code) {
            Ok(status) => status,
            Err(_) => {
                tracing::error!(code = event.status_code, "Unknown job status code");
                subscription.unsubscribe();
                self.remove_staged_file().await;
                return Err(IngestError::Protocol {
                    job_id: self.job_id.clone(),
                    code: event.status_code,
                });
            }
        };

        let terminal = status.is_terminal();
        if terminal {
            subscription.unsubscribe();
        }

        let mut detail = self.fetch_cold_info().await;
        if detail.is_none() && status.is_unsuccessful() {
            let cause = event
                .error_cause
                .unwrap_or_else(|| format!("job ended with status {}", status));
            detail = Some(json!({ "status": status.as_str(), "error": cause }));
        }

        self.target.update(status, detail);
        if !self.save(status).await {
            subscription.unsubscribe();
            return Ok(Some(WatchOutcome::Superseded));
        }

        if terminal {
            tracing::info!(status = %status, "Job reached terminal status");
            self.remove_staged_file().await;
            return Ok(Some(WatchOutcome::Finished(status)));
        }
        Ok(None)
    }

    async fn on_timeout(&mut self, subscription: &mut JobSubscription) -> WatchOutcome {
        subscription.unsubscribe();

        tracing::warn!(
            timeout_ms = self.timeout.as_millis() as u64,
            "Job watch timed out, forcing status to UNSPECIFIED"
        );
        let detail = json!({
            "status": JobStatus::Unspecified.as_str(),
            "error": format!(
                "watch cancelled after {} ms without a terminal status",
                self.timeout.as_millis()
            ),
        });
        self.target.update(JobStatus::Unspecified, Some(detail));
        if !self.save(JobStatus::Unspecified).await {
            return WatchOutcome::Superseded;
        }
        self.remove_staged_file().await;
        WatchOutcome::TimedOut
    }

    async fn fetch_cold_info(&self) -> Option<Value> {
        match self.backend.cold_info(self.target.content_address()).await {
            Ok(info) => Some(info),
            Err(e) => {
                tracing::debug!(error = %e, "Cold storage info not available yet");
                None
            }
        }
    }

    /// Persists the current state. Returns `false` once the record belongs
    /// to another job; the staged file then belongs to that job too.
    async fn save(&self, status: JobStatus) -> bool {
        match self.target.persist(self.store.as_ref()).await {
            Ok(true) => {
                tracing::debug!(status = %status, "Persisted job status");
                true
            }
            Ok(false) => {
                tracing::warn!(status = %status, "Record resubmitted under another job, stopping watch");
                false
            }
            Err(e) => {
                tracing::error!(status = %status, error = %e, "Failed to persist job status");
                true
            }
        }
    }

    async fn remove_staged_file(&self) {
        let Some(path) = self.target.staged_path() else {
            return;
        };
        match self.staging.remove(path).await {
            Ok(true) => tracing::debug!(file = %redact_path(path), "Removed staged file"),
            Ok(false) => {}
            Err(e) => tracing::warn!(error = %e, "Failed to remove staged file"),
        }
    }
}
