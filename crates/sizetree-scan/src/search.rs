//! Name search over a job's tree.
//!
//! A search first walks the nodes the store already knows, so hits from the
//! scanned part of the tree arrive immediately. An exhaustive search then
//! asks the job to list every directory under the scope that is still
//! unlisted, reusing the job's listing claims so nothing is read twice.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use sizetree_core::{Completeness, NameMatcher, ScanError, SearchHit, SearchQuery};

use crate::controller::Job;
use crate::store::{Listing, Node};

/// How long a search sleeps between checks on a pending listing.
const LISTING_POLL: Duration = Duration::from_millis(25);

/// Receiving end of a running search.
///
/// Hits are delivered as they are found. The stream ends when the search is
/// exhausted, cancelled, or its job is cancelled or replaced. Dropping the
/// handle stops the search.
#[derive(Debug)]
pub struct SearchHandle {
    rx: mpsc::UnboundedReceiver<SearchHit>,
    token: CancellationToken,
}

impl SearchHandle {
    /// Receive the next hit.
    pub async fn recv(&mut self) -> Option<SearchHit> {
        self.rx.recv().await
    }

    /// Receive the next hit, blocking the current thread.
    ///
    /// Must not be called from within an async runtime.
    pub fn blocking_recv(&mut self) -> Option<SearchHit> {
        self.rx.blocking_recv()
    }

    /// Receive a hit if one is ready.
    pub fn try_recv(&mut self) -> Option<SearchHit> {
        self.rx.try_recv().ok()
    }

    /// Stop the search. Hits already delivered stay readable.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Block until the search ends and return every hit.
    pub fn collect_blocking(mut self) -> Vec<SearchHit> {
        let mut hits = Vec::new();
        while let Some(hit) = self.rx.blocking_recv() {
            hits.push(hit);
        }
        hits
    }

    /// Convert into a `Stream`.
    pub fn into_stream(self) -> UnboundedReceiverStream<SearchHit> {
        UnboundedReceiverStream::new(self.rx)
    }
}

/// Start a search on its own thread.
pub(crate) fn spawn(job: &Arc<Job>, query: SearchQuery) -> Result<SearchHandle, ScanError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let token = job.token.child_token();
    let search = Search {
        job: Arc::clone(job),
        matcher: query.matcher(),
        exhaustive: query.completeness == Completeness::Exhaustive,
        scope: query.scope.unwrap_or_else(|| job.root().to_path_buf()),
        tx,
        token: token.clone(),
        emitted: HashSet::new(),
        hits: 0,
    };

    std::thread::Builder::new()
        .name(format!("sizetree-{}-search", job.id().0))
        .spawn(move || search.run())
        .map_err(|e| ScanError::PoolBuild {
            message: format!("failed to spawn search thread: {e}"),
        })?;
    Ok(SearchHandle { rx, token })
}

struct Search {
    job: Arc<Job>,
    matcher: NameMatcher,
    exhaustive: bool,
    scope: PathBuf,
    tx: mpsc::UnboundedSender<SearchHit>,
    token: CancellationToken,
    emitted: HashSet<PathBuf>,
    hits: usize,
}

impl Search {
    fn run(mut self) {
        let Some(scope) = self.resolve_scope() else {
            debug!(scope = %self.scope.display(), "search scope is not in the tree");
            return;
        };

        let frontier = self.search_known(scope);
        if self.exhaustive && !self.stopped() {
            self.search_unlisted(frontier);
        }
        debug!(scope = %self.scope.display(), hits = self.hits, "search finished");
    }

    fn resolve_scope(&self) -> Option<Arc<Node>> {
        let store = &self.job.store;
        store.get(&self.scope).or_else(|| {
            self.scope
                .canonicalize()
                .ok()
                .and_then(|path| store.get(&path))
        })
    }

    fn stopped(&self) -> bool {
        self.token.is_cancelled() || self.tx.is_closed()
    }

    /// Breadth-first pass over known nodes. Returns the directories whose
    /// contents are not yet known, in the order they were reached.
    fn search_known(&mut self, scope: Arc<Node>) -> VecDeque<Arc<Node>> {
        let mut queue = VecDeque::from([scope]);
        let mut frontier = VecDeque::new();

        while let Some(node) = queue.pop_front() {
            if self.stopped() {
                break;
            }
            if node.is_dir() && node.listing() != Listing::Listed {
                frontier.push_back(Arc::clone(&node));
            }
            for child in self.job.store.child_nodes(&node) {
                if self.visit(&child) && child.is_dir() {
                    queue.push_back(child);
                }
            }
        }
        frontier
    }

    /// List and search everything under the frontier.
    fn search_unlisted(&mut self, mut queue: VecDeque<Arc<Node>>) {
        for node in &queue {
            self.job.request(Arc::clone(node), false);
        }

        while let Some(node) = queue.pop_front() {
            if !self.wait_listed(&node) {
                return;
            }
            for child in self.job.store.child_nodes(&node) {
                if self.visit(&child) && child.is_dir() {
                    self.job.request(Arc::clone(&child), false);
                    queue.push_back(child);
                }
            }
        }
    }

    /// Block until `node` is listed. Returns `false` if the search stopped.
    fn wait_listed(&self, node: &Node) -> bool {
        loop {
            if self.stopped() {
                return false;
            }
            if !node.is_dir() || node.listing() == Listing::Listed {
                return true;
            }
            self.job.store.wait_for_listing(LISTING_POLL);
        }
    }

    /// Check a node once. Returns `true` the first time the node is seen.
    fn visit(&mut self, node: &Node) -> bool {
        if !self.emitted.insert(node.path.clone()) {
            return false;
        }
        if self.matcher.is_match(&node.name) {
            let hit = SearchHit {
                path: node.path.clone(),
                kind: node.kind(),
                size_bytes: node.size(),
            };
            self.hits += 1;
            let _ = self.tx.send(hit);
        }
        true
    }
}
