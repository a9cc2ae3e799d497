//! Job lifecycle: worker pool, task accounting and cancellation.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use rayon::{ThreadPool, ThreadPoolBuilder};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use sizetree_core::{
    JobId, JobStatus, ScanConfig, ScanError, ScanEvent, ScanJob, ScanMode, ScanProgress,
};

use crate::filter::EntryFilter;
use crate::hub::EventHub;
use crate::precount;
use crate::progress::ProgressTracker;
use crate::store::{Listing, Node, TreeStore};
use crate::visited::VisitedDirs;
use crate::walker;

/// Counts units of work in flight and lets callers wait for zero.
#[derive(Debug, Default)]
struct TaskCounter {
    count: Mutex<usize>,
    idle: Condvar,
}

impl TaskCounter {
    fn enter(&self) {
        *self.count.lock() += 1;
    }

    /// Leave a unit. If it was the last one in flight, `on_last` runs
    /// before any waiter is released.
    fn exit(&self, on_last: impl FnOnce()) {
        let mut count = self.count.lock();
        if *count == 1 {
            on_last();
        }
        *count -= 1;
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    fn wait_idle(&self) {
        let mut count = self.count.lock();
        while *count > 0 {
            self.idle.wait(&mut count);
        }
    }
}

/// State of one scan job, shared by its workers, searches and the engine.
#[derive(Debug)]
pub(crate) struct Job {
    pub config: ScanConfig,
    pub store: TreeStore,
    pub hub: EventHub,
    pub token: CancellationToken,
    pub visited: VisitedDirs,
    pub filter: EntryFilter,
    pub stats: ProgressTracker,
    pub pool: Arc<ThreadPool>,
    tasks: TaskCounter,
    record: Mutex<ScanJob>,
}

impl Job {
    /// Build a job for an already validated, canonical root.
    pub fn new(
        id: JobId,
        config: ScanConfig,
        root: PathBuf,
        filter: EntryFilter,
    ) -> Result<Arc<Self>, ScanError> {
        let threads = config.effective_threads();
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(move |i| format!("sizetree-{}-worker-{i}", id.0))
            .build()
            .map_err(|e| ScanError::PoolBuild {
                message: e.to_string(),
            })?;
        let token = CancellationToken::new();
        debug!(job = %id, threads, root = %root.display(), "created scan job");

        Ok(Arc::new(Self {
            config,
            store: TreeStore::new(root.clone()),
            hub: EventHub::new(token.clone()),
            token,
            visited: VisitedDirs::new(),
            filter,
            stats: ProgressTracker::new(),
            pool: Arc::new(pool),
            tasks: TaskCounter::default(),
            record: Mutex::new(ScanJob::new(id, root)),
        }))
    }

    pub fn id(&self) -> JobId {
        self.record.lock().id
    }

    pub fn root(&self) -> &Path {
        self.store.root()
    }

    pub fn status(&self) -> JobStatus {
        self.record.lock().status
    }

    pub fn record(&self) -> ScanJob {
        self.record.lock().clone()
    }

    pub fn progress(&self) -> ScanProgress {
        self.stats.snapshot()
    }

    /// Insert the root and launch the initial traversal.
    ///
    /// A driver thread runs the optional precount pass and then seeds the
    /// pool; it counts as a unit in flight so `cancel` and `wait` cover it.
    pub fn start(self: &Arc<Self>) -> Result<(), ScanError> {
        let root = self.store.insert(Node::directory(self.root().to_path_buf()));
        self.hub.emit(ScanEvent::NodeDiscovered(root.update()));
        info!(job = %self.id(), root = %self.root().display(), mode = %self.config.mode, "scan started");

        self.tasks.enter();
        let job = Arc::clone(self);
        let spawned = std::thread::Builder::new()
            .name(format!("sizetree-{}-driver", self.id().0))
            .spawn(move || job.drive(root));
        if let Err(e) = spawned {
            self.tasks.exit(|| {});
            return Err(ScanError::PoolBuild {
                message: format!("failed to spawn driver thread: {e}"),
            });
        }
        Ok(())
    }

    fn drive(self: Arc<Self>, root: Arc<Node>) {
        if self.config.precount {
            if let Some(total) = precount::run(&self) {
                debug!(job = %self.id(), total, "precount finished");
            }
        }
        match self.config.mode {
            ScanMode::Full => {
                self.request(root, true);
            }
            ScanMode::Shallow => {
                self.request(root, false);
            }
            ScanMode::OnDemand => {}
        }
        self.finish_unit();
    }

    /// Queue a listing of `node` on the pool.
    ///
    /// A recursive request also lists every directory below it. Requests for
    /// directories that are already listed or already queued are dropped, so
    /// the full scan, precount, expansion and search never list a directory
    /// twice. Returns `true` if a unit was queued.
    pub fn request(self: &Arc<Self>, node: Arc<Node>, recursive: bool) -> bool {
        if self.token.is_cancelled() || !node.is_dir() {
            return false;
        }
        if recursive {
            if !node.request_descent() {
                return false;
            }
        } else if node.listing() != Listing::Unlisted {
            return false;
        }

        self.tasks.enter();
        let job = Arc::clone(self);
        self.pool.spawn_fifo(move || {
            job.run_unit(&node, recursive);
            job.finish_unit();
        });
        true
    }

    fn run_unit(self: &Arc<Self>, node: &Arc<Node>, recursive: bool) {
        if self.token.is_cancelled() {
            return;
        }
        if node.try_claim() {
            let subdirs = walker::list_directory(self, node);
            // Read after the listing is published; a concurrent recursive
            // request either sees `Listed` or is seen here.
            if node.wants_descent() {
                for dir in subdirs {
                    self.request(dir, true);
                }
            }
        } else if recursive && node.listing() == Listing::Listed {
            for child in self.store.child_nodes(node) {
                if child.is_dir() {
                    self.request(child, true);
                }
            }
        }
    }

    fn finish_unit(&self) {
        self.tasks.exit(|| self.on_idle());
    }

    /// The pool drained for the first time: the initial traversal is done.
    ///
    /// Runs under the task counter's lock, so `wait` never returns before
    /// the completion is recorded and announced.
    fn on_idle(&self) {
        if self.token.is_cancelled() {
            return;
        }
        {
            let mut record = self.record.lock();
            if record.status != JobStatus::Running {
                return;
            }
            record.status = JobStatus::Completed;
        }

        let size_bytes = self.store.root_node().map(|n| n.size()).unwrap_or(0);
        let progress = self.stats.snapshot();
        info!(
            job = %self.id(),
            size_bytes,
            dirs = progress.dirs_listed,
            files = progress.files_seen,
            errors = progress.errors,
            nodes = self.store.len(),
            elapsed_ms = progress.elapsed.as_millis() as u64,
            "scan completed"
        );
        self.hub.emit(ScanEvent::Progress(progress));
        self.hub.emit(ScanEvent::JobCompleted {
            root: self.root().to_path_buf(),
            size_bytes,
        });
    }

    /// Block until no unit of this job is in flight.
    pub fn wait(&self) -> JobStatus {
        self.tasks.wait_idle();
        self.status()
    }

    /// Stop the job and wait until every worker has observed it.
    ///
    /// Idempotent. The first call ends every event stream of the job with
    /// `JobCancelled`, even when the initial traversal had already completed.
    /// Returns `true` if this call moved the job from `Running` to `Cancelled`.
    pub fn cancel(&self) -> bool {
        self.token.cancel();
        self.tasks.wait_idle();

        let cancelled = {
            let mut record = self.record.lock();
            if record.status == JobStatus::Running {
                record.status = JobStatus::Cancelled;
                true
            } else {
                false
            }
        };
        let closed = self.hub.close_with(ScanEvent::JobCancelled {
            root: self.root().to_path_buf(),
        });
        if closed {
            info!(job = %self.id(), status = %self.status(), "scan cancelled");
        }
        // Searches blocked on a listing notice the token on wake-up.
        self.store.notify_listed();
        cancelled
    }
}
