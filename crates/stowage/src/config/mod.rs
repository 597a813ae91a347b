pub mod loader;
pub mod schema;

pub use loader::{apply_env_overrides, load_config, load_config_from_str};
pub use schema::{
    Config, LoggingConfig, DEFAULT_BACKEND_URI, DEFAULT_IPFS_API_URI, DEFAULT_JOB_WATCH_TIMEOUT_MS,
    DEFAULT_LISTING_TIMEOUT_MS, DEFAULT_MAX_UPLOAD_SIZE,
};
