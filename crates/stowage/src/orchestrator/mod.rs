//! The storage job orchestrator.
//!
//! [`Orchestrator`] is the process-wide context: it owns the session
//! provider, the record store and the backend ports, accepts local uploads
//! and remote references, spawns one [`JobWatcher`] per submitted job and
//! answers status queries from the record store.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::backend::{HealthStatus, JobSubscription, StorageBackend};
use crate::config::Config;
use crate::db::Database;
use crate::error::{IngestError, Result};
use crate::listing::{DirectoryLister, IpfsLister};
use crate::model::JobStatus;
use crate::session::SessionProvider;
use crate::staging::FileStaging;
use crate::store::{JobRecordStore, SqliteRecordStore};
use crate::watcher::{JobWatcher, WatchOutcome, WatchTarget};

mod local;
mod remote;
mod submit;

pub use local::UploadReceipt;
pub use remote::RemoteReferenceOutcome;
pub use submit::{submit_cold_storage_job, DealOverrides};

type WatchHandle = JoinHandle<std::result::Result<WatchOutcome, IngestError>>;

/// Maximum number of session recoveries per local upload.
pub(crate) const MAX_SESSION_RECOVERIES: u32 = 1;

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Largest accepted file, in bytes.
    pub max_upload_size: u64,
    /// Wall-clock budget of each job watcher.
    pub job_watch_timeout: Duration,
    pub deal_overrides: DealOverrides,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_upload_size: crate::config::DEFAULT_MAX_UPLOAD_SIZE,
            job_watch_timeout: Duration::from_millis(crate::config::DEFAULT_JOB_WATCH_TIMEOUT_MS),
            deal_overrides: DealOverrides::default(),
        }
    }
}

impl From<&Config> for OrchestratorSettings {
    fn from(config: &Config) -> Self {
        Self {
            max_upload_size: config.max_upload_size,
            job_watch_timeout: config.job_watch_timeout(),
            deal_overrides: config.deal_overrides(),
        }
    }
}

/// Status of a single record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatusReport {
    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

/// One item of a batch status lookup.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchStatusItem {
    pub job_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<JobStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Backend health plus the non-secret settings, and the session token the
/// orchestrator currently holds.
#[derive(Debug)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub max_upload_size: u64,
    pub max_price: Option<u64>,
    pub deal_min_duration: Option<i64>,
    /// First address held by the session, if any.
    pub backend_address: Option<String>,
    pub session_token: SecretString,
}

pub struct Orchestrator {
    store: Arc<dyn JobRecordStore>,
    backend: Arc<dyn StorageBackend>,
    lister: Arc<dyn DirectoryLister>,
    sessions: SessionProvider,
    staging: FileStaging,
    settings: OrchestratorSettings,
    watchers: Mutex<Vec<(String, WatchHandle)>>,
    /// Content addresses of local uploads between dedup check and NEW record.
    inflight: Mutex<HashSet<String>>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobRecordStore>,
        backend: Arc<dyn StorageBackend>,
        lister: Arc<dyn DirectoryLister>,
        staging: FileStaging,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            sessions: SessionProvider::new(backend.clone(), store.clone()),
            store,
            backend,
            lister,
            staging,
            settings,
            watchers: Mutex::new(Vec::new()),
            inflight: Mutex::new(HashSet::new()),
        }
    }

    /// Builds an orchestrator from configuration: SQLite store at
    /// `database_path`, IPFS listing and staging under `upload_directory`.
    pub fn from_config(config: &Config, backend: Arc<dyn StorageBackend>) -> Result<Self> {
        let db = Database::open(&config.database_path)?;
        let lister = IpfsLister::new(&config.ipfs_api_uri, config.listing_timeout())?;
        log::info!("Orchestrator configured: {}", config.public_summary());

        Ok(Self::new(
            Arc::new(SqliteRecordStore::new(db)),
            backend,
            Arc::new(lister),
            FileStaging::new(&config.upload_directory),
            OrchestratorSettings::from(config),
        ))
    }

    pub fn settings(&self) -> &OrchestratorSettings {
        &self.settings
    }

    pub fn sessions(&self) -> &SessionProvider {
        &self.sessions
    }

    pub fn store(&self) -> &Arc<dyn JobRecordStore> {
        &self.store
    }

    /// Status of the upload with the given content address.
    pub async fn job_status_by_content_address(
        &self,
        content_address: &str,
    ) -> std::result::Result<JobStatusReport, IngestError> {
        let record = self
            .store
            .get_upload(content_address)
            .await?
            .ok_or_else(|| IngestError::not_found("Upload", content_address))?;
        Ok(JobStatusReport {
            status: record.job_status,
            detail: record.detail,
        })
    }

    /// Status of the remote reference watched under the given job id.
    pub async fn job_status_by_job_id(
        &self,
        job_id: &str,
    ) -> std::result::Result<JobStatusReport, IngestError> {
        let record = self
            .store
            .get_remote_reference_by_job_id(job_id)
            .await?
            .ok_or_else(|| IngestError::not_found("Remote reference", job_id))?;
        Ok(JobStatusReport {
            status: record.job_status,
            detail: record.detail,
        })
    }

    /// Looks up several remote-reference jobs. A failed lookup only affects
    /// its own item.
    pub async fn job_statuses_by_job_ids(&self, job_ids: &[String]) -> Vec<BatchStatusItem> {
        let lookups = job_ids
            .iter()
            .map(|job_id| self.store.get_remote_reference_by_job_id(job_id));
        let results = futures_util::future::join_all(lookups).await;

        job_ids
            .iter()
            .zip(results)
            .map(|(job_id, result)| {
                let mut item = BatchStatusItem {
                    job_id: job_id.clone(),
                    url: None,
                    status: None,
                    detail: None,
                    error: None,
                };
                match result {
                    Ok(Some(record)) => {
                        item.url = Some(record.source_url);
                        item.status = Some(record.job_status);
                        item.detail = record.detail;
                    }
                    Ok(None) => {
                        item.error = Some(IngestError::not_found("Remote reference", job_id).to_string());
                    }
                    Err(e) => {
                        log::error!("Status lookup for job {} failed: {}", job_id, e);
                        item.error = Some(e.to_string());
                    }
                }
                item
            })
            .collect()
    }

    /// Checks backend health and reports the effective settings.
    ///
    /// Fails with `BackendUnhealthy` unless the backend is `OK` or `DEGRADED`.
    pub async fn health_and_config(&self) -> std::result::Result<HealthReport, IngestError> {
        let session = self.sessions.acquire().await?;

        let code = self
            .backend
            .check_health()
            .await
            .map_err(|e| IngestError::backend("check_health", e))?;
        let status = HealthStatus::from_code(code);
        if !status.is_serviceable() {
            log::warn!("Backend reported health code {} ({})", code, status);
            return Err(IngestError::BackendUnhealthy { status });
        }

        let addresses = self
            .backend
            .list_addresses()
            .await
            .map_err(|e| IngestError::backend("list_addresses", e))?;

        Ok(HealthReport {
            status,
            max_upload_size: self.settings.max_upload_size,
            max_price: self.settings.deal_overrides.max_price,
            deal_min_duration: self.settings.deal_overrides.deal_min_duration,
            backend_address: addresses.into_iter().next(),
            session_token: clone_secret(&session.token),
        })
    }

    /// Job ids of watchers still running.
    pub fn active_watchers(&self) -> Vec<String> {
        self.lock_watchers()
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(job_id, _)| job_id.clone())
            .collect()
    }

    /// Waits for every spawned watcher and returns their outcomes.
    pub async fn wait_for_watchers(
        &self,
    ) -> Vec<(String, std::result::Result<WatchOutcome, IngestError>)> {
        let handles = std::mem::take(&mut *self.lock_watchers());
        let mut outcomes = Vec::with_capacity(handles.len());
        for (job_id, handle) in handles {
            let outcome = match handle.await {
                Ok(outcome) => outcome,
                Err(e) => {
                    log::error!("Watcher for job {} panicked or was aborted: {}", job_id, e);
                    continue;
                }
            };
            outcomes.push((job_id, outcome));
        }
        outcomes
    }

    /// Spawns the watcher for `job_id` on an already open subscription.
    fn spawn_watcher(&self, job_id: &str, target: WatchTarget, subscription: JobSubscription) {
        let watcher = JobWatcher::new(
            self.store.clone(),
            self.backend.clone(),
            self.staging.clone(),
            job_id,
            target,
            self.settings.job_watch_timeout,
        );
        let handle = tokio::spawn(watcher.run(subscription));

        let mut watchers = self.lock_watchers();
        watchers.retain(|(_, h)| !h.is_finished());
        watchers.push((job_id.to_string(), handle));
    }

    fn lock_watchers(&self) -> MutexGuard<'_, Vec<(String, WatchHandle)>> {
        self.watchers.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn clone_secret(secret: &SecretString) -> SecretString {
    use secrecy::ExposeSecret;
    SecretString::from(secret.expose_secret().to_string())
}
