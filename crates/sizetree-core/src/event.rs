//! Events streamed from a scan job to its subscribers.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::node::EntryUpdate;
use crate::progress::ScanProgress;

/// One structured event of a scan job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ScanEvent {
    /// A new entry was added to the tree.
    NodeDiscovered(EntryUpdate),
    /// A directory's aggregated size grew.
    SizeUpdated(EntryUpdate),
    /// An entry was marked with an error.
    NodeError(EntryUpdate),
    /// A directory and all of its descendants are fully enumerated.
    ScanComplete(EntryUpdate),
    /// The precount pass counted the children of a directory.
    ChildrenCounted { path: PathBuf, count: u64 },
    /// Periodic progress summary.
    Progress(ScanProgress),
    /// The job's initial traversal finished. Directories listed on demand
    /// afterwards still report through the same stream.
    JobCompleted { root: PathBuf, size_bytes: u64 },
    /// The job was cancelled; no events follow.
    JobCancelled { root: PathBuf },
}

impl ScanEvent {
    /// Path the event refers to.
    pub fn path(&self) -> &Path {
        match self {
            ScanEvent::NodeDiscovered(u)
            | ScanEvent::SizeUpdated(u)
            | ScanEvent::NodeError(u)
            | ScanEvent::ScanComplete(u) => &u.path,
            ScanEvent::ChildrenCounted { path, .. } => path,
            ScanEvent::Progress(p) => &p.current_path,
            ScanEvent::JobCompleted { root, .. } | ScanEvent::JobCancelled { root } => root,
        }
    }

    /// Node payload, for node-level events.
    pub fn update(&self) -> Option<&EntryUpdate> {
        match self {
            ScanEvent::NodeDiscovered(u)
            | ScanEvent::SizeUpdated(u)
            | ScanEvent::NodeError(u)
            | ScanEvent::ScanComplete(u) => Some(u),
            _ => None,
        }
    }

    /// Check if this event reports the end of the job's traversal.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanEvent::JobCompleted { .. } | ScanEvent::JobCancelled { .. }
        )
    }
}
