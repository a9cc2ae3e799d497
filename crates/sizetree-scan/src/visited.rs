//! Cycle guard for directory traversal.

use std::path::{Path, PathBuf};

use dashmap::DashSet;

/// Tracks canonical paths of directories listed in the current job.
///
/// A directory resolving to a path that is already in the set is reached a
/// second time (through a link outside the root) and must not be descended.
#[derive(Debug, Default)]
pub(crate) struct VisitedDirs {
    seen: DashSet<PathBuf>,
}

impl VisitedDirs {
    /// Create an empty guard.
    pub fn new() -> Self {
        Self {
            seen: DashSet::new(),
        }
    }

    /// Mark a canonical directory path. Returns `true` if this is the first visit.
    pub fn mark(&self, canonical: PathBuf) -> bool {
        self.seen.insert(canonical)
    }

    /// Check if a canonical path has been visited (without marking).
    pub fn contains(&self, canonical: &Path) -> bool {
        self.seen.contains(canonical)
    }
}
