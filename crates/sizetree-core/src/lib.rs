//! Core types for sizetree.
//!
//! This crate provides the data model shared by the scanning engine and its
//! consumers: tree entries, scan configuration, job lifecycle, events and
//! search requests. It performs no I/O.

mod config;
mod error;
mod event;
mod job;
mod node;
mod progress;
mod search;

pub use config::{MAX_AUTO_THREADS, ScanConfig, ScanConfigBuilder, ScanMode};
pub use error::{EntryError, EntryErrorKind, ScanError};
pub use event::ScanEvent;
pub use job::{JobId, JobStatus, ScanJob};
pub use node::{EntryKind, EntryUpdate, FsEntry, display_name};
pub use progress::ScanProgress;
pub use search::{Completeness, MatchMode, NameMatcher, SearchHit, SearchQuery};
