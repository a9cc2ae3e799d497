//! Scan job identity and lifecycle.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::Display;

/// Identifier of one scan job within an engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub u64);

impl JobId {
    /// Create a new JobId from a u64.
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Lifecycle state of a scan job.
///
/// `Idle` is only reported by an engine that has never started a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    #[default]
    Idle,
    Running,
    Cancelled,
    Completed,
    Failed,
}

impl JobStatus {
    /// Check if the job can no longer change state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Cancelled | JobStatus::Completed | JobStatus::Failed
        )
    }
}

/// Public description of a scan job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanJob {
    /// Job identifier.
    pub id: JobId,
    /// Canonical root path of the job.
    pub root_path: PathBuf,
    /// Current status.
    pub status: JobStatus,
    /// When the job was started.
    pub started_at: DateTime<Utc>,
}

impl ScanJob {
    /// Create a job record in the `Running` state.
    pub fn new(id: JobId, root_path: PathBuf) -> Self {
        Self {
            id,
            root_path,
            status: JobStatus::Running,
            started_at: Utc::now(),
        }
    }
}
