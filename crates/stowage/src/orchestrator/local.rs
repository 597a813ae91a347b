//! Local upload ingestion.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Mutex;

use serde::Serialize;
use serde_json::json;
use tracing::Instrument;

use super::{submit_cold_storage_job, Orchestrator, MAX_SESSION_RECOVERIES};
use crate::error::IngestError;
use crate::model::{JobStatus, UploadRecord};
use crate::watcher::WatchTarget;

/// What the caller gets back once an upload's job is submitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub job_id: String,
    pub content_address: String,
    pub original_name: String,
    pub size_bytes: u64,
    /// Where the content is staged until its watcher finishes.
    #[serde(skip)]
    pub staged_path: PathBuf,
}

/// Reserves a content address for one local ingestion until dropped.
struct InflightClaim<'a> {
    inflight: &'a Mutex<HashSet<String>>,
    content_address: String,
}

impl<'a> InflightClaim<'a> {
    fn acquire(inflight: &'a Mutex<HashSet<String>>, content_address: &str) -> Option<Self> {
        let inserted = inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(content_address.to_string());
        inserted.then(|| Self {
            inflight,
            content_address: content_address.to_string(),
        })
    }
}

impl Drop for InflightClaim<'_> {
    fn drop(&mut self) {
        self.inflight
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&self.content_address);
    }
}

impl Orchestrator {
    /// Stores `content` in hot storage, submits its cold-storage job and
    /// starts watching it. Returns without waiting for the job.
    ///
    /// Fails with `Conflict` when the content already completed a job or
    /// its job is still running. Failed, cancelled and timed-out uploads
    /// may be resubmitted.
    pub async fn submit_local_upload(
        &self,
        original_name: &str,
        content: &[u8],
    ) -> Result<UploadReceipt, IngestError> {
        let size = content.len() as u64;
        let span = tracing::info_span!("local_upload", name = %original_name, size);

        async {
            if size > self.settings.max_upload_size {
                tracing::warn!(max = self.settings.max_upload_size, "Upload rejected, too large");
                return Err(IngestError::SizeExceeded {
                    size,
                    max: self.settings.max_upload_size,
                });
            }

            let mut staged = self.staging.stage(content).await?;
            let result = self.ingest_staged(original_name, content, &mut staged).await;
            if result.is_err() {
                if let Err(e) = self.staging.remove(&staged).await {
                    tracing::warn!(error = %e, "Failed to remove staged upload");
                }
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn ingest_staged(
        &self,
        original_name: &str,
        content: &[u8],
        staged: &mut PathBuf,
    ) -> Result<UploadReceipt, IngestError> {
        let content_address = self.add_to_hot_with_recovery(content).await?;
        tracing::info!(content_address = %content_address, "Content added to hot storage");

        let Some(_claim) = InflightClaim::acquire(&self.inflight, &content_address) else {
            tracing::warn!(content_address = %content_address, "Same content is already being ingested");
            return Err(IngestError::Conflict { content_address });
        };
        if let Some(existing) = self.store.get_upload(&content_address).await? {
            if !existing.job_status.allows_resubmission() {
                tracing::warn!(
                    content_address = %content_address,
                    status = %existing.job_status,
                    "Duplicate of a completed or running upload"
                );
                return Err(IngestError::Conflict { content_address });
            }
        }

        *staged = self.staging.promote(staged.as_path(), &content_address).await?;

        let job_id = submit_cold_storage_job(
            self.backend.as_ref(),
            &self.settings.deal_overrides,
            &content_address,
        )
        .await
        .map_err(|e| {
            tracing::error!(content_address = %content_address, error = %e, "Job submission failed");
            IngestError::backend("push_storage_config", e)
        })?;

        let mut record = UploadRecord::new(&content_address, &job_id, original_name, content.len() as u64);
        self.store.upsert_upload(&record).await?;

        let subscription = match self.backend.watch_job(&job_id).await {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Could not subscribe to job status");
                record.job_status = JobStatus::Unspecified;
                record.detail = Some(json!({
                    "status": JobStatus::Unspecified.as_str(),
                    "error": format!("job status subscription failed: {}", e),
                }));
                record.updated_at = chrono::Utc::now();
                if let Err(db_err) = self.store.upsert_upload(&record).await {
                    tracing::error!(error = %db_err, "Failed to persist unwatched upload");
                }
                return Err(IngestError::backend("watch_job", e));
            }
        };

        let receipt = UploadReceipt {
            job_id: job_id.clone(),
            content_address: content_address.clone(),
            original_name: original_name.to_string(),
            size_bytes: record.size_bytes,
            staged_path: staged.clone(),
        };
        self.spawn_watcher(
            &job_id,
            WatchTarget::Upload {
                record,
                staged_path: staged.clone(),
            },
            subscription,
        );
        Ok(receipt)
    }

    /// Adds content to hot storage, recovering from an invalidated session
    /// at most [`MAX_SESSION_RECOVERIES`] times.
    async fn add_to_hot_with_recovery(&self, content: &[u8]) -> Result<String, IngestError> {
        let mut recoveries = 0;
        loop {
            let session = self.sessions.acquire().await?;
            match self.backend.add_to_hot(content).await {
                Ok(content_address) => return Ok(content_address),
                Err(e) if e.is_session_invalid() => {
                    if recoveries >= MAX_SESSION_RECOVERIES {
                        tracing::error!(session = %session.id, error = %e, "Session invalid again after recovery");
                        return Err(IngestError::SessionInvalid(e));
                    }
                    recoveries += 1;
                    tracing::warn!(session = %session.id, error = %e, "Backend session invalidated, recreating");
                    self.sessions.archive_and_recreate(&session).await?;
                }
                Err(e) => return Err(IngestError::backend("add_to_hot", e)),
            }
        }
    }
}
