//! Public entry point: one engine, at most one active job.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, warn};

use sizetree_core::{
    FsEntry, JobId, JobStatus, ScanConfig, ScanError, ScanJob, ScanProgress, SearchQuery,
};

use crate::controller::Job;
use crate::filter::EntryFilter;
use crate::hub::EventStream;
use crate::search::{self, SearchHandle};
use crate::store::Node;

/// What the engine's job slot currently holds.
enum Active {
    Running(Arc<Job>),
    /// A start that never got past root validation.
    Failed(ScanJob),
}

/// Handle to a started job.
///
/// Holds the job's primary event stream, subscribed before traversal began,
/// so it sees every event of the job. Operations through a handle whose job
/// has since been replaced fail with [`ScanError::StaleJob`] or do nothing.
#[derive(Debug)]
pub struct JobHandle {
    id: JobId,
    root: PathBuf,
    job: Weak<Job>,
    events: Option<EventStream>,
}

impl JobHandle {
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Canonical root of the job.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Take the primary event stream. Returns `None` on the second call.
    pub fn take_events(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    fn upgrade(&self) -> Option<Arc<Job>> {
        self.job.upgrade()
    }
}

/// Concurrent directory-size engine.
///
/// Starting a job cancels and discards the previous one; every query runs
/// against the job currently in the slot.
pub struct Engine {
    defaults: ScanConfig,
    next_id: AtomicU64,
    start_lock: Mutex<()>,
    active: Mutex<Option<Active>>,
}

impl Engine {
    /// Create an engine with default settings.
    pub fn new() -> Self {
        Self::with_config(ScanConfig::default())
    }

    /// Create an engine whose [`Engine::start`] uses `defaults` for every
    /// setting except the root.
    pub fn with_config(defaults: ScanConfig) -> Self {
        Self {
            defaults,
            next_id: AtomicU64::new(0),
            start_lock: Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// Start a job for `root` with the engine's default settings.
    pub fn start(&self, root: impl Into<PathBuf>) -> Result<JobHandle, ScanError> {
        self.start_job(self.defaults.with_root(root))
    }

    /// Start a job, replacing any previous one.
    ///
    /// A bad ignore pattern is rejected before anything changes. Otherwise
    /// the previous job is cancelled and fully stopped first; if the new root
    /// cannot be read, the engine reports `Failed` until the next start.
    pub fn start_job(&self, config: ScanConfig) -> Result<JobHandle, ScanError> {
        let _starting = self.start_lock.lock();
        let filter = EntryFilter::new(&config)?;

        // Cancel outside the slot lock; cancel waits for workers to drain.
        if let Some(previous) = self.current() {
            previous.cancel();
        }

        let id = JobId::new(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let started = validate_root(&config.root).and_then(|root| {
            let job = Job::new(id, config.clone(), root.clone(), filter)?;
            Ok((root, job))
        });
        let (root, job) = match started {
            Ok(started) => started,
            Err(e) => {
                warn!(job = %id, root = %config.root.display(), error = %e, "scan failed to start");
                let mut record = ScanJob::new(id, config.root.clone());
                record.status = JobStatus::Failed;
                *self.active.lock() = Some(Active::Failed(record));
                return Err(e);
            }
        };

        let events = job.hub.subscribe();
        *self.active.lock() = Some(Active::Running(Arc::clone(&job)));
        if let Err(e) = job.start() {
            warn!(job = %id, error = %e, "scan failed to start");
            job.cancel();
            return Err(e);
        }

        Ok(JobHandle {
            id,
            root,
            job: Arc::downgrade(&job),
            events,
        })
    }

    /// Open another event stream for a job.
    ///
    /// Events emitted before this call are not replayed. Returns `None` if
    /// the job was cancelled or replaced.
    pub fn subscribe(&self, handle: &JobHandle) -> Option<EventStream> {
        handle.upgrade().and_then(|job| job.hub.subscribe())
    }

    /// Cancel a job and wait until none of its workers is running.
    ///
    /// Idempotent; a handle to a replaced job is ignored.
    pub fn cancel(&self, handle: &JobHandle) {
        if let Some(job) = handle.upgrade() {
            job.cancel();
        }
    }

    /// Block until the job's traversal is finished or stopped.
    pub fn wait(&self, handle: &JobHandle) -> Result<JobStatus, ScanError> {
        let job = handle
            .upgrade()
            .ok_or(ScanError::StaleJob { id: handle.id.0 })?;
        Ok(job.wait())
    }

    /// Status of the current job, `Idle` before the first start.
    pub fn status(&self) -> JobStatus {
        match &*self.active.lock() {
            None => JobStatus::Idle,
            Some(Active::Running(job)) => job.status(),
            Some(Active::Failed(record)) => record.status,
        }
    }

    /// Description of the current job.
    pub fn job(&self) -> Option<ScanJob> {
        match &*self.active.lock() {
            None => None,
            Some(Active::Running(job)) => Some(job.record()),
            Some(Active::Failed(record)) => Some(record.clone()),
        }
    }

    /// Progress counters of the current job.
    pub fn progress(&self) -> Option<ScanProgress> {
        self.current().map(|job| job.progress())
    }

    /// Copy of one entry. Sizes of incomplete directories are lower bounds.
    pub fn snapshot(&self, path: impl AsRef<Path>) -> Option<FsEntry> {
        let job = self.current()?;
        lookup(&job, path.as_ref()).map(|node| node.snapshot())
    }

    /// Copies of an entry's known children.
    pub fn children(&self, path: impl AsRef<Path>) -> Vec<FsEntry> {
        self.current()
            .and_then(|job| lookup(&job, path.as_ref()).map(|node| job.store.children(&node.path)))
            .unwrap_or_default()
    }

    /// List one directory that has not been listed yet.
    ///
    /// Returns `Ok(false)` if the path is unknown, not a directory, or
    /// already listed or queued.
    pub fn expand(&self, path: impl AsRef<Path>) -> Result<bool, ScanError> {
        self.request(path.as_ref(), false)
    }

    /// List everything below a directory that has not been listed yet.
    pub fn expand_all(&self, path: impl AsRef<Path>) -> Result<bool, ScanError> {
        self.request(path.as_ref(), true)
    }

    fn request(&self, path: &Path, recursive: bool) -> Result<bool, ScanError> {
        let job = self.current().ok_or(ScanError::NoActiveJob)?;
        Ok(lookup(&job, path).is_some_and(|node| job.request(node, recursive)))
    }

    /// Search the current job's tree by name.
    pub fn search(&self, query: SearchQuery) -> Result<SearchHandle, ScanError> {
        let job = self.current().ok_or(ScanError::NoActiveJob)?;
        search::spawn(&job, query)
    }

    fn current(&self) -> Option<Arc<Job>> {
        match &*self.active.lock() {
            Some(Active::Running(job)) => Some(Arc::clone(job)),
            _ => None,
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        if let Some(job) = self.current() {
            job.cancel();
        }
    }
}

/// Canonicalize the root and check it can be listed.
fn validate_root(path: &Path) -> Result<PathBuf, ScanError> {
    let root = path.canonicalize().map_err(|e| ScanError::root(path, e))?;
    let metadata = fs::metadata(&root).map_err(|e| ScanError::root(&root, e))?;
    if !metadata.is_dir() {
        return Err(ScanError::NotADirectory { path: root });
    }
    fs::read_dir(&root).map_err(|e| ScanError::root(&root, e))?;
    debug!(root = %root.display(), "validated scan root");
    Ok(root)
}

/// Find a node by the path given, or by its canonical form.
fn lookup(job: &Job, path: &Path) -> Option<Arc<Node>> {
    job.store
        .get(path)
        .or_else(|| path.canonicalize().ok().and_then(|p| job.store.get(&p)))
}
