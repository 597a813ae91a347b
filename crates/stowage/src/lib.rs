pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod listing;
pub mod model;
pub mod orchestrator;
pub mod sanitize;
pub mod session;
pub mod staging;
pub mod store;
pub mod telemetry;
pub mod testing;
pub mod watcher;

pub use backend::{BackendError, HealthStatus, JobEvent, JobSubscription, StorageBackend};
pub use config::{load_config, Config, LoggingConfig};
pub use error::{ConfigError, IngestError, Result, StagingError, StowageError};
pub use listing::{DirectoryLister, FolderEntry, FolderListing, IpfsLister, ListingError};
pub use model::{BackendSession, JobStatus, RemoteRefRecord, UploadRecord};
pub use orchestrator::{
    BatchStatusItem, DealOverrides, HealthReport, JobStatusReport, Orchestrator,
    OrchestratorSettings, RemoteReferenceOutcome, UploadReceipt,
};
pub use session::SessionProvider;
pub use staging::FileStaging;
pub use store::{JobRecordStore, SqliteRecordStore};
pub use telemetry::init_logging;
pub use watcher::{JobWatcher, WatchOutcome, WatchTarget};
