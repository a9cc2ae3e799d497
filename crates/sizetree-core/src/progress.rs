//! Scan progress reporting.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Progress information during a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanProgress {
    /// Number of directories listed so far.
    pub dirs_listed: u64,
    /// Total directories, known once the precount pass has finished.
    pub dirs_total: Option<u64>,
    /// Number of files seen so far.
    pub files_seen: u64,
    /// Total bytes seen so far.
    pub bytes_seen: u64,
    /// Number of per-node errors recorded.
    pub errors: u64,
    /// Directory most recently listed.
    pub current_path: PathBuf,
    /// Time elapsed since the job started.
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Create initial progress state.
    pub fn new() -> Self {
        Self {
            dirs_listed: 0,
            dirs_total: None,
            files_seen: 0,
            bytes_seen: 0,
            errors: 0,
            current_path: PathBuf::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Completion as a percentage (0.0 to 100.0), if a total is known.
    pub fn percentage(&self) -> Option<f64> {
        match self.dirs_total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.dirs_listed as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }

    /// Calculate scan rate in files per second.
    pub fn files_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.files_seen as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

impl Default for ScanProgress {
    fn default() -> Self {
        Self::new()
    }
}
