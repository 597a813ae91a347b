//! Job status vocabulary shared by upload and remote-reference records.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Status of a cold-storage job.
///
/// Backend codes `0..=5` map to `Unspecified..=Success`. `New` is assigned
/// locally before the backend has reported anything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    #[default]
    New,
    Unspecified,
    Queued,
    Executing,
    Failed,
    Cancelled,
    Success,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnknownStatus {
    #[error("unknown job status code {0}")]
    Code(i32),

    #[error("unknown job status '{0}'")]
    Name(String),
}

impl JobStatus {
    /// Maps a backend status code. Unknown codes are a protocol error.
    pub fn from_code(code: i32) -> Result<Self, UnknownStatus> {
        match code {
            0 => Ok(JobStatus::Unspecified),
            1 => Ok(JobStatus::Queued),
            2 => Ok(JobStatus::Executing),
            3 => Ok(JobStatus::Failed),
            4 => Ok(JobStatus::Cancelled),
            5 => Ok(JobStatus::Success),
            other => Err(UnknownStatus::Code(other)),
        }
    }

    /// Backend code for this status; `None` for the client-only `New`.
    pub fn code(self) -> Option<i32> {
        match self {
            JobStatus::New => None,
            JobStatus::Unspecified => Some(0),
            JobStatus::Queued => Some(1),
            JobStatus::Executing => Some(2),
            JobStatus::Failed => Some(3),
            JobStatus::Cancelled => Some(4),
            JobStatus::Success => Some(5),
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Cancelled | JobStatus::Success
        )
    }

    /// Whether content whose record is in this status may be submitted again.
    /// Completed and running jobs may not.
    pub fn allows_resubmission(self) -> bool {
        matches!(
            self,
            JobStatus::Failed | JobStatus::Cancelled | JobStatus::Unspecified
        )
    }

    /// Failed or cancelled: the two outcomes that carry a diagnostic.
    pub fn is_unsuccessful(self) -> bool {
        matches!(self, JobStatus::Failed | JobStatus::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::New => "NEW",
            JobStatus::Unspecified => "UNSPECIFIED",
            JobStatus::Queued => "QUEUED",
            JobStatus::Executing => "EXECUTING",
            JobStatus::Failed => "FAILED",
            JobStatus::Cancelled => "CANCELLED",
            JobStatus::Success => "SUCCESS",
        }
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "NEW" => Ok(JobStatus::New),
            "UNSPECIFIED" => Ok(JobStatus::Unspecified),
            "QUEUED" => Ok(JobStatus::Queued),
            "EXECUTING" => Ok(JobStatus::Executing),
            "FAILED" => Ok(JobStatus::Failed),
            "CANCELLED" => Ok(JobStatus::Cancelled),
            "SUCCESS" => Ok(JobStatus::Success),
            other => Err(UnknownStatus::Name(other.to_string())),
        }
    }
}
