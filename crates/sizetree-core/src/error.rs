//! Error types for scanning operations.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;

/// Errors returned by the engine API.
///
/// Only [`ScanError::RootInaccessible`] and [`ScanError::NotADirectory`] end a
/// job; problems below the root are recorded per node as [`EntryError`].
#[derive(Debug, Error)]
pub enum ScanError {
    /// The root path could not be opened.
    #[error("Root inaccessible: {path}: {source}")]
    RootInaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Root path is not a directory.
    #[error("Root path is not a directory: {path}")]
    NotADirectory { path: PathBuf },

    /// Invalid configuration.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// An ignore pattern failed to compile.
    #[error("Invalid ignore pattern `{pattern}`: {message}")]
    InvalidPattern { pattern: String, message: String },

    /// The operation needs a job but none was started.
    #[error("No active scan job")]
    NoActiveJob,

    /// The handle refers to a job that has been replaced.
    #[error("Job {id} is no longer active")]
    StaleJob { id: u64 },

    /// The worker pool could not be created.
    #[error("Failed to build worker pool: {message}")]
    PoolBuild { message: String },
}

impl ScanError {
    /// Create a root error with path context.
    pub fn root(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::RootInaccessible {
            path: path.into(),
            source,
        }
    }
}

/// Kind of per-node error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum EntryErrorKind {
    /// Permission was denied.
    PermissionDenied,
    /// Any other I/O failure (vanished entry, broken link, device error).
    Io,
    /// A directory resolved to one already visited in this job.
    CycleDetected,
}

/// Non-fatal error marker attached to a node.
///
/// A marked node stays in the tree; its contribution to ancestor sizes is
/// frozen at the last known value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryError {
    /// Kind of error.
    pub kind: EntryErrorKind,
    /// Human-readable message.
    pub message: String,
}

impl EntryError {
    /// Create a new entry error.
    pub fn new(kind: EntryErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classify an I/O error.
    pub fn from_io(error: &std::io::Error) -> Self {
        let kind = match error.kind() {
            std::io::ErrorKind::PermissionDenied => EntryErrorKind::PermissionDenied,
            _ => EntryErrorKind::Io,
        };
        Self::new(kind, error.to_string())
    }

    /// Create a cycle marker for a directory resolving to `target`.
    pub fn cycle(target: impl Into<PathBuf>) -> Self {
        let target = target.into();
        Self::new(
            EntryErrorKind::CycleDetected,
            format!("Already visited: {}", target.display()),
        )
    }
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}
