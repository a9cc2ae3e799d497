//! Scan configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};
use strum::Display;

/// Upper bound for the automatically sized worker pool.
pub const MAX_AUTO_THREADS: usize = 32;

/// How far the initial traversal of a job reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ScanMode {
    /// Walk the whole subtree and aggregate folder sizes.
    #[default]
    Full,
    /// List the root only; deeper directories are listed on demand.
    Shallow,
    /// List nothing up front; every directory is listed on demand.
    OnDemand,
}

/// Configuration for a scan job.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct ScanConfig {
    /// Root path to scan.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Initial traversal reach.
    #[builder(default)]
    #[serde(default)]
    pub mode: ScanMode,

    /// Run a count-only pass first so progress can be reported as a fraction.
    #[builder(default = "false")]
    #[serde(default)]
    pub precount: bool,

    /// Number of traversal workers (0 = auto-detect).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Descend into symlinked directories (guarded against cycles).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub follow_symlinks: bool,

    /// Include hidden files (starting with .).
    #[builder(default = "true")]
    #[serde(default = "default_true")]
    pub include_hidden: bool,

    /// Names to skip, in glob syntax (`node_modules`, `*.log`).
    #[builder(default)]
    #[serde(default)]
    pub ignore_patterns: Vec<String>,

    /// Number of listed directories between two progress events.
    #[builder(default = "64")]
    #[serde(default = "default_progress_interval")]
    pub progress_interval: u64,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_true() -> bool {
    true
}

fn default_progress_interval() -> u64 {
    64
}

impl ScanConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref root) = self.root {
            if root.as_os_str().is_empty() {
                return Err("Root path cannot be empty".to_string());
            }
        } else {
            return Err("Root path is required".to_string());
        }
        if self.progress_interval == Some(0) {
            return Err("Progress interval must be at least 1".to_string());
        }
        Ok(())
    }
}

impl ScanConfig {
    /// Create a new scan config builder.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Create a simple config for scanning a path.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            mode: ScanMode::Full,
            precount: false,
            threads: 0,
            follow_symlinks: true,
            include_hidden: true,
            ignore_patterns: Vec::new(),
            progress_interval: default_progress_interval(),
        }
    }

    /// Return a copy of this config pointed at another root.
    pub fn with_root(&self, root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ..self.clone()
        }
    }

    /// Worker count to use, resolving `0` against the machine.
    ///
    /// Listing is I/O bound, so the automatic value is twice the available
    /// parallelism, capped at [`MAX_AUTO_THREADS`].
    pub fn effective_threads(&self) -> usize {
        match self.threads {
            0 => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                (cores * 2).min(MAX_AUTO_THREADS)
            }
            n => n,
        }
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self::new(default_root())
    }
}
