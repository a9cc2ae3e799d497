//! Concurrent directory scanning engine for sizetree.
//!
//! This crate walks a directory tree on a pool of workers, aggregating
//! directory sizes bottom-up while the walk is still running.
//!
//! # Overview
//!
//! `sizetree-scan` owns the in-memory tree of the active scan job. Key features:
//!
//! - **Parallel traversal** on a rayon pool, one directory listing per unit
//! - **Incremental sizes** streamed as events while the walk runs
//! - **Cancellation** that stops every worker before it returns
//! - **On-demand listing** of directories a shallow scan left out
//! - **Search** over the known tree, optionally forcing unscanned parts
//! - **Cycle detection** for symlinked directories
//!
//! # Example
//!
//! ```rust,no_run
//! use sizetree_scan::{Engine, JobStatus};
//!
//! let engine = Engine::new();
//! let handle = engine.start("/path/to/scan").unwrap();
//! assert_eq!(engine.wait(&handle).unwrap(), JobStatus::Completed);
//!
//! let root = engine.snapshot(handle.root()).unwrap();
//! println!("Total size: {} bytes", root.size_bytes);
//! ```
//!
//! # Events
//!
//! Every handle carries the job's primary event stream:
//!
//! ```rust,no_run
//! use sizetree_scan::{Engine, ScanEvent};
//!
//! # async fn run() {
//! let engine = Engine::new();
//! let mut handle = engine.start("/path/to/scan").unwrap();
//! let mut events = handle.take_events().unwrap();
//!
//! while let Some(event) = events.recv().await {
//!     if let ScanEvent::JobCompleted { size_bytes, .. } = event {
//!         println!("Done: {size_bytes} bytes");
//!         break;
//!     }
//! }
//! # }
//! ```

mod aggregate;
mod controller;
mod engine;
mod filter;
mod hub;
mod precount;
mod progress;
mod search;
mod store;
mod visited;
mod walker;

pub use engine::{Engine, JobHandle};
pub use hub::EventStream;
pub use search::SearchHandle;

// Re-export core types for convenience
pub use sizetree_core::{
    Completeness, EntryError, EntryErrorKind, EntryKind, EntryUpdate, FsEntry, JobId, JobStatus,
    MatchMode, ScanConfig, ScanError, ScanEvent, ScanJob, ScanMode, ScanProgress, SearchHit,
    SearchQuery,
};
