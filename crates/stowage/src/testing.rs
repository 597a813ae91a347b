//! In-process doubles of the backend and listing ports.
//!
//! Used by the unit tests and the integration suite; they are scriptable
//! (failure injection, event injection) and count the calls they receive.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::backend::{
    BackendError, JobEvent, JobSubscription, SessionCredentials, StorageBackend, StorageConfig,
};
use crate::listing::{DirectoryLister, FolderEntry, FolderListing, ListingError};

/// The error a backend reports for a session it no longer knows.
pub fn session_invalid_error() -> BackendError {
    BackendError::Request("rpc error: code 2 desc = auth token not found".to_string())
}

#[derive(Default)]
struct FakeState {
    fixed_content_address: Option<String>,
    fixed_job_id: Option<String>,
    default_config: StorageConfig,
    config_read_failure: Option<String>,
    config_writes: usize,
    add_failures: VecDeque<BackendError>,
    push_failures: VecDeque<BackendError>,
    watch_failures: VecDeque<BackendError>,
    sessions_created: usize,
    active_token: Option<String>,
    hot_adds: usize,
    pushed: Vec<String>,
    next_job: usize,
    next_subscriber: u64,
    subscribers: HashMap<String, Vec<(u64, mpsc::UnboundedSender<JobEvent>)>>,
    cold_info: HashMap<String, Value>,
    health: i32,
    addresses: Vec<String>,
}

/// Scriptable [`StorageBackend`].
#[derive(Clone)]
pub struct FakeBackend {
    state: Arc<Mutex<FakeState>>,
}

impl Default for FakeBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackend {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(FakeState {
                health: 1,
                ..Default::default()
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every hot-store write returns `content_address` and every push `job_id`.
    pub fn with_fixed_ids(self, content_address: &str, job_id: &str) -> Self {
        {
            let mut state = self.lock();
            state.fixed_content_address = Some(content_address.to_string());
            state.fixed_job_id = Some(job_id.to_string());
        }
        self
    }

    pub fn with_default_config(self, config: StorageConfig) -> Self {
        self.lock().default_config = config;
        self
    }

    pub fn default_config(&self) -> StorageConfig {
        self.lock().default_config.clone()
    }

    pub fn fail_config_reads(&self, message: &str) {
        self.lock().config_read_failure = Some(message.to_string());
    }

    pub fn fail_next_add(&self, error: BackendError) {
        self.lock().add_failures.push_back(error);
    }

    pub fn fail_next_push(&self, error: BackendError) {
        self.lock().push_failures.push_back(error);
    }

    pub fn fail_next_watch(&self, error: BackendError) {
        self.lock().watch_failures.push_back(error);
    }

    pub fn set_cold_info(&self, content_address: &str, info: Value) {
        self.lock().cold_info.insert(content_address.to_string(), info);
    }

    pub fn set_health(&self, code: i32) {
        self.lock().health = code;
    }

    pub fn set_addresses(&self, addresses: Vec<String>) {
        self.lock().addresses = addresses;
    }

    /// Delivers a status event to every subscriber of `job_id`.
    pub fn emit(&self, job_id: &str, status_code: i32) {
        self.deliver(JobEvent::new(job_id, status_code));
    }

    pub fn emit_with_cause(&self, job_id: &str, status_code: i32, cause: &str) {
        let mut event = JobEvent::new(job_id, status_code);
        event.error_cause = Some(cause.to_string());
        self.deliver(event);
    }

    fn deliver(&self, event: JobEvent) {
        let state = self.lock();
        if let Some(subscribers) = state.subscribers.get(&event.job_id) {
            for (_, sender) in subscribers {
                let _ = sender.send(event.clone());
            }
        }
    }

    /// Ends the status stream of `job_id` without a terminal event.
    pub fn close_stream(&self, job_id: &str) {
        self.lock().subscribers.remove(job_id);
    }

    pub fn subscriber_count(&self, job_id: &str) -> usize {
        self.lock().subscribers.get(job_id).map_or(0, Vec::len)
    }

    pub fn sessions_created(&self) -> usize {
        self.lock().sessions_created
    }

    pub fn active_token(&self) -> Option<String> {
        self.lock().active_token.clone()
    }

    pub fn hot_adds(&self) -> usize {
        self.lock().hot_adds
    }

    pub fn pushed(&self) -> Vec<String> {
        self.lock().pushed.clone()
    }

    pub fn config_writes(&self) -> usize {
        self.lock().config_writes
    }
}

fn derived_content_address(content: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    content.hash(&mut hasher);
    format!("bafk{:016x}", hasher.finish())
}

#[async_trait]
impl StorageBackend for FakeBackend {
    async fn create_session(&self) -> Result<SessionCredentials, BackendError> {
        let mut state = self.lock();
        state.sessions_created += 1;
        let n = state.sessions_created;
        Ok(SessionCredentials {
            id: format!("session-{}", n),
            token: SecretString::from(format!("token-{}", n)),
        })
    }

    fn set_session_token(&self, token: &SecretString) {
        self.lock().active_token = Some(token.expose_secret().to_string());
    }

    async fn add_to_hot(&self, content: &[u8]) -> Result<String, BackendError> {
        let mut state = self.lock();
        state.hot_adds += 1;
        if let Some(error) = state.add_failures.pop_front() {
            return Err(error);
        }
        Ok(state
            .fixed_content_address
            .clone()
            .unwrap_or_else(|| derived_content_address(content)))
    }

    async fn default_storage_config(&self) -> Result<StorageConfig, BackendError> {
        let state = self.lock();
        match &state.config_read_failure {
            Some(message) => Err(BackendError::Request(message.clone())),
            None => Ok(state.default_config.clone()),
        }
    }

    async fn set_default_storage_config(
        &self,
        config: &StorageConfig,
    ) -> Result<(), BackendError> {
        let mut state = self.lock();
        state.config_writes += 1;
        state.default_config = config.clone();
        Ok(())
    }

    async fn push_storage_config(&self, content_address: &str) -> Result<String, BackendError> {
        let mut state = self.lock();
        if let Some(error) = state.push_failures.pop_front() {
            return Err(error);
        }
        state.pushed.push(content_address.to_string());
        state.next_job += 1;
        let job_id = match &state.fixed_job_id {
            Some(job_id) => job_id.clone(),
            None => format!("job-{}", state.next_job),
        };
        Ok(job_id)
    }

    async fn watch_job(&self, job_id: &str) -> Result<JobSubscription, BackendError> {
        let mut state = self.lock();
        if let Some(error) = state.watch_failures.pop_front() {
            return Err(error);
        }
        state.next_subscriber += 1;
        let id = state.next_subscriber;
        let (tx, rx) = mpsc::unbounded_channel();
        state
            .subscribers
            .entry(job_id.to_string())
            .or_default()
            .push((id, tx));

        let registry = self.state.clone();
        let job_id = job_id.to_string();
        Ok(JobSubscription::new(rx, move || {
            let mut state = registry.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(subscribers) = state.subscribers.get_mut(&job_id) {
                subscribers.retain(|(sub_id, _)| *sub_id != id);
                if subscribers.is_empty() {
                    state.subscribers.remove(&job_id);
                }
            }
        }))
    }

    async fn cold_info(&self, content_address: &str) -> Result<Value, BackendError> {
        self.lock()
            .cold_info
            .get(content_address)
            .cloned()
            .ok_or_else(|| BackendError::NotFound(format!("no cold info for {}", content_address)))
    }

    async fn check_health(&self) -> Result<i32, BackendError> {
        Ok(self.lock().health)
    }

    async fn list_addresses(&self) -> Result<Vec<String>, BackendError> {
        Ok(self.lock().addresses.clone())
    }
}

#[derive(Default)]
struct ListerState {
    listings: HashMap<String, Vec<FolderEntry>>,
    failures: HashMap<String, String>,
    calls: usize,
}

/// Scriptable [`DirectoryLister`]. Unknown folders fail as unavailable.
#[derive(Clone, Default)]
pub struct FakeLister {
    state: Arc<Mutex<ListerState>>,
}

impl FakeLister {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ListerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Registers a folder holding a single file.
    pub fn add_file(&self, folder_address: &str, file_address: &str, size_bytes: u64) {
        self.lock().listings.insert(
            folder_address.to_string(),
            vec![FolderEntry {
                name: format!("{}.bin", file_address),
                address: file_address.to_string(),
                size_bytes,
            }],
        );
    }

    pub fn add_empty_folder(&self, folder_address: &str) {
        self.lock()
            .listings
            .insert(folder_address.to_string(), Vec::new());
    }

    pub fn fail(&self, folder_address: &str, message: &str) {
        self.lock()
            .failures
            .insert(folder_address.to_string(), message.to_string());
    }

    pub fn calls(&self) -> usize {
        self.lock().calls
    }
}

#[async_trait]
impl DirectoryLister for FakeLister {
    async fn list_folder(&self, folder_address: &str) -> Result<FolderListing, ListingError> {
        let mut state = self.lock();
        state.calls += 1;
        if let Some(message) = state.failures.get(folder_address) {
            return Err(ListingError::Unavailable(message.clone()));
        }
        match state.listings.get(folder_address) {
            Some(entries) => Ok(FolderListing {
                folder_address: folder_address.to_string(),
                entries: entries.clone(),
            }),
            None => Err(ListingError::Unavailable(format!(
                "folder {} not reachable",
                folder_address
            ))),
        }
    }
}
