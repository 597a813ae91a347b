//! Remote reference ingestion.
//!
//! Each URL names a folder-wrapped content address. Folders are listed
//! concurrently; every URL then independently either gets a cold-storage
//! job or a `FAILED` outcome explaining why not.

use futures_util::future::join_all;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::Instrument;

use super::{submit_cold_storage_job, Orchestrator};
use crate::error::IngestError;
use crate::listing::FolderEntry;
use crate::model::{JobStatus, RemoteRefRecord};
use crate::sanitize::redact_url;
use crate::watcher::WatchTarget;

/// Result for one submitted URL.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteReferenceOutcome {
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl RemoteReferenceOutcome {
    fn failed(url: &str, job_id: Option<String>, error: &IngestError) -> Self {
        tracing::warn!(url = %redact_url(url), error = %error, "Remote reference not submitted");
        Self {
            url: url.to_string(),
            job_id,
            status: JobStatus::Failed,
            detail: Some(json!({ "error": error.to_string() })),
        }
    }
}

/// Extracts the folder content address from a reference URL.
///
/// Path-style gateway URLs (`https://gw/ipfs/<cid>/...`) use the segment
/// after `ipfs`; otherwise the authority is used (`ipfs://<cid>`,
/// `https://<cid>.ipfs.gw`).
pub(crate) fn folder_address_from_url(url: &str) -> Result<String, IngestError> {
    let invalid = |reason: &str| IngestError::InvalidUrl {
        url: url.to_string(),
        reason: reason.to_string(),
    };

    let (_, rest) = url
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    let rest = rest.split(['?', '#']).next().unwrap_or_default();
    let mut segments = rest.split('/');
    let authority = segments.next().unwrap_or_default();

    let mut path = segments.filter(|s| !s.is_empty());
    let address = match path.next() {
        Some("ipfs") => path.next().unwrap_or_default(),
        _ => authority
            .split_once(".ipfs.")
            .map(|(cid, _)| cid)
            .unwrap_or(authority),
    };

    if address.is_empty() || !address.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(invalid("no content address found"));
    }
    Ok(address.to_string())
}

impl Orchestrator {
    /// Submits a cold-storage job for every referenced file.
    ///
    /// Returns one outcome per URL, in input order. A failing URL never
    /// affects the others.
    pub async fn submit_remote_references(&self, urls: &[String]) -> Vec<RemoteReferenceOutcome> {
        let span = tracing::info_span!("remote_references", count = urls.len());
        async {
            let resolved = join_all(urls.iter().map(|url| self.resolve_reference(url))).await;
            join_all(
                urls.iter()
                    .zip(resolved)
                    .map(|(url, resolved)| self.submit_reference(url, resolved)),
            )
            .await
        }
        .instrument(span)
        .await
    }

    async fn resolve_reference(&self, url: &str) -> Result<(String, FolderEntry), IngestError> {
        let folder_address = folder_address_from_url(url)?;
        let listing = self
            .lister
            .list_folder(&folder_address)
            .await
            .map_err(|source| IngestError::Listing {
                address: folder_address.clone(),
                source,
            })?;
        let entry = listing
            .first_entry()
            .cloned()
            .map_err(|source| IngestError::Listing {
                address: folder_address.clone(),
                source,
            })?;
        Ok((folder_address, entry))
    }

    async fn submit_reference(
        &self,
        url: &str,
        resolved: Result<(String, FolderEntry), IngestError>,
    ) -> RemoteReferenceOutcome {
        let (folder_address, entry) = match resolved {
            Ok(resolved) => resolved,
            Err(e) => return RemoteReferenceOutcome::failed(url, None, &e),
        };

        if entry.size_bytes > self.settings.max_upload_size {
            let err = IngestError::SizeExceeded {
                size: entry.size_bytes,
                max: self.settings.max_upload_size,
            };
            return RemoteReferenceOutcome::failed(url, None, &err);
        }

        let job_id = match submit_cold_storage_job(
            self.backend.as_ref(),
            &self.settings.deal_overrides,
            &entry.address,
        )
        .await
        {
            Ok(job_id) => job_id,
            Err(e) => {
                return RemoteReferenceOutcome::failed(
                    url,
                    None,
                    &IngestError::backend("push_storage_config", e),
                )
            }
        };

        let mut record = RemoteRefRecord::new(url, &folder_address, &entry.address, &job_id);
        if let Err(e) = self.store.upsert_remote_reference(&record).await {
            return RemoteReferenceOutcome::failed(url, Some(job_id), &e.into());
        }

        match self.backend.watch_job(&job_id).await {
            Ok(subscription) => {
                tracing::info!(url = %redact_url(url), job_id = %job_id, "Remote reference queued");
                self.spawn_watcher(
                    &job_id,
                    WatchTarget::RemoteReference { record },
                    subscription,
                );
                RemoteReferenceOutcome {
                    url: url.to_string(),
                    job_id: Some(job_id),
                    status: JobStatus::New,
                    detail: None,
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job_id, error = %e, "Could not subscribe to job status");
                let detail = json!({
                    "status": JobStatus::Unspecified.as_str(),
                    "error": format!("job status subscription failed: {}", e),
                });
                record.job_status = JobStatus::Unspecified;
                record.detail = Some(detail.clone());
                record.updated_at = chrono::Utc::now();
                if let Err(db_err) = self.store.upsert_remote_reference(&record).await {
                    tracing::error!(error = %db_err, "Failed to persist unwatched remote reference");
                }
                RemoteReferenceOutcome {
                    url: url.to_string(),
                    job_id: Some(job_id),
                    status: JobStatus::Unspecified,
                    detail: Some(detail),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_folder_address_from_path_gateway() {
        assert_eq!(
            folder_address_from_url("https://ipfs.io/ipfs/QmFolder").unwrap(),
            "QmFolder"
        );
        assert_eq!(
            folder_address_from_url("https://gw.example.com/ipfs/QmFolder/file.csv?download=1").unwrap(),
            "QmFolder"
        );
    }

    #[test]
    fn test_folder_address_from_authority() {
        assert_eq!(folder_address_from_url("ipfs://QmFolder").unwrap(), "QmFolder");
        assert_eq!(folder_address_from_url("ipfs://QmFolder/file.csv").unwrap(), "QmFolder");
        assert_eq!(
            folder_address_from_url("https://bafyfolder.ipfs.dweb.link/").unwrap(),
            "bafyfolder"
        );
    }

    #[test]
    fn test_folder_address_rejects_garbage() {
        for url in ["QmFolder", "https://ipfs.io/ipfs/", "https://gw.io:8080/x", ""] {
            assert!(
                matches!(folder_address_from_url(url), Err(IngestError::InvalidUrl { .. })),
                "{url:?} should be rejected"
            );
        }
    }
}
