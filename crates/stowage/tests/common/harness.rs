//! Test harness for isolated orchestrator runs.
//!
//! The `TestHarness` owns a temporary upload directory, a scriptable
//! backend and lister, a recording store and the orchestrator built on
//! top of them.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use stowage::testing::{FakeBackend, FakeLister};
use stowage::{FileStaging, Orchestrator, OrchestratorSettings};

use super::RecordingStore;

pub const MAX_UPLOAD_SIZE: u64 = 1024;
pub const WATCH_TIMEOUT: Duration = Duration::from_secs(60);

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_dir: PathBuf,
    pub backend: Arc<FakeBackend>,
    pub lister: Arc<FakeLister>,
    pub store: Arc<RecordingStore>,
    pub orchestrator: Orchestrator,
}

impl TestHarness {
    /// Harness with a backend deriving ids from content.
    pub fn new() -> Self {
        Self::with_backend(FakeBackend::new())
    }

    pub fn with_backend(backend: FakeBackend) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_dir = temp_dir.path().join("uploads");
        let backend = Arc::new(backend);
        let lister = Arc::new(FakeLister::new());
        let store = Arc::new(RecordingStore::new());

        let orchestrator = Orchestrator::new(
            store.clone(),
            backend.clone(),
            lister.clone(),
            FileStaging::new(&upload_dir),
            OrchestratorSettings {
                max_upload_size: MAX_UPLOAD_SIZE,
                job_watch_timeout: WATCH_TIMEOUT,
                ..Default::default()
            },
        );

        Self {
            temp_dir,
            upload_dir,
            backend,
            lister,
            store,
            orchestrator,
        }
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Files currently in the upload directory.
    pub fn staged_files(&self) -> Vec<PathBuf> {
        match std::fs::read_dir(&self.upload_dir) {
            Ok(entries) => entries.filter_map(|e| e.ok()).map(|e| e.path()).collect(),
            Err(_) => Vec::new(),
        }
    }
}
