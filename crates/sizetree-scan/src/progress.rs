//! Shared progress counters for one job.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

use sizetree_core::ScanProgress;

const UNKNOWN_TOTAL: u64 = u64::MAX;

/// Progress tracker updated concurrently by traversal workers.
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    start_time: Instant,
    dirs_listed: AtomicU64,
    dirs_total: AtomicU64,
    files_seen: AtomicU64,
    bytes_seen: AtomicU64,
    errors: AtomicU64,
    current_path: Mutex<PathBuf>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            start_time: Instant::now(),
            dirs_listed: AtomicU64::new(0),
            dirs_total: AtomicU64::new(UNKNOWN_TOTAL),
            files_seen: AtomicU64::new(0),
            bytes_seen: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            current_path: Mutex::new(PathBuf::new()),
        }
    }

    /// Count one listed directory. Returns the new number of listed directories.
    pub fn record_listing(&self, path: &Path, files: u64, bytes: u64) -> u64 {
        self.files_seen.fetch_add(files, Ordering::Relaxed);
        self.bytes_seen.fetch_add(bytes, Ordering::Relaxed);
        *self.current_path.lock() = path.to_path_buf();
        self.dirs_listed.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_total(&self, total: u64) {
        self.dirs_total.store(total, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ScanProgress {
        let total = self.dirs_total.load(Ordering::Relaxed);
        ScanProgress {
            dirs_listed: self.dirs_listed.load(Ordering::Relaxed),
            dirs_total: (total != UNKNOWN_TOTAL).then_some(total),
            files_seen: self.files_seen.load(Ordering::Relaxed),
            bytes_seen: self.bytes_seen.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            current_path: self.current_path.lock().clone(),
            elapsed: self.start_time.elapsed(),
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}
