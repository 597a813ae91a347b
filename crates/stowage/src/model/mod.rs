//! Job record data model.

pub mod records;
pub mod status;

pub use records::{BackendSession, RemoteRefRecord, UploadRecord};
pub use status::{JobStatus, UnknownStatus};
