//! In-memory tree store.
//!
//! Every node lives behind its own `Arc` in a path-keyed map. Sizes and
//! completion counters are atomics on the node; the remaining mutable fields
//! sit behind a mutex scoped to that single node. No code path holds two node
//! locks at once, and map guards are dropped as soon as the `Arc` is cloned.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

use compact_str::CompactString;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};

use sizetree_core::{EntryError, EntryKind, EntryUpdate, FsEntry, display_name};

/// Listing progress of a directory node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Listing {
    Unlisted = 0,
    Claimed = 1,
    Listed = 2,
}

impl Listing {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Listing::Unlisted,
            1 => Listing::Claimed,
            _ => Listing::Listed,
        }
    }
}

#[derive(Debug)]
struct NodeState {
    kind: EntryKind,
    children: Vec<PathBuf>,
    error: Option<EntryError>,
    child_count_hint: Option<u64>,
    /// Largest size already published in a `SizeUpdated` event.
    reported_size: u64,
}

/// One entry of the tree store.
#[derive(Debug)]
pub(crate) struct Node {
    pub path: PathBuf,
    pub name: CompactString,
    size: AtomicU64,
    /// Own listing plus incomplete child directories.
    pending: AtomicUsize,
    complete: AtomicBool,
    listing: AtomicU8,
    /// A recursive listing was requested for this subtree.
    descend: AtomicBool,
    state: Mutex<NodeState>,
}

impl Node {
    fn with(path: PathBuf, kind: EntryKind, size: u64, pending: usize, error: Option<EntryError>) -> Self {
        let complete = pending == 0;
        let listing = if kind.is_dir() {
            Listing::Unlisted
        } else {
            Listing::Listed
        };
        Self {
            name: display_name(&path),
            path,
            size: AtomicU64::new(size),
            pending: AtomicUsize::new(pending),
            complete: AtomicBool::new(complete),
            listing: AtomicU8::new(listing as u8),
            descend: AtomicBool::new(false),
            state: Mutex::new(NodeState {
                kind,
                children: Vec::new(),
                error,
                child_count_hint: None,
                reported_size: size,
            }),
        }
    }

    /// A stat'd file; complete on creation.
    pub fn file(path: PathBuf, size: u64) -> Self {
        Self::with(path, EntryKind::File, size, 0, None)
    }

    /// A directory waiting for its own listing.
    pub fn directory(path: PathBuf) -> Self {
        Self::with(path, EntryKind::Directory, 0, 1, None)
    }

    /// An entry that will never be descended; complete with a frozen size of 0.
    pub fn inaccessible(path: PathBuf, error: EntryError) -> Self {
        Self::with(path, EntryKind::Inaccessible, 0, 0, Some(error))
    }

    pub fn size(&self) -> u64 {
        self.size.load(Ordering::Acquire)
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn kind(&self) -> EntryKind {
        self.state.lock().kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind().is_dir()
    }

    pub fn listing(&self) -> Listing {
        Listing::from_u8(self.listing.load(Ordering::SeqCst))
    }

    /// Take the exclusive right to list this directory.
    pub fn try_claim(&self) -> bool {
        self.listing
            .compare_exchange(
                Listing::Unlisted as u8,
                Listing::Claimed as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Record a recursive request. Returns `false` if one was already recorded.
    pub fn request_descent(&self) -> bool {
        !self.descend.swap(true, Ordering::SeqCst)
    }

    pub fn wants_descent(&self) -> bool {
        self.descend.load(Ordering::SeqCst)
    }

    /// Publish the children found by a listing.
    ///
    /// `pending_dirs` child directories now have to complete before this node
    /// can. Children are visible before the node reads as `Listed`.
    pub fn finish_listing(&self, children: Vec<PathBuf>, pending_dirs: usize) {
        self.pending.fetch_add(pending_dirs, Ordering::AcqRel);
        self.state.lock().children.extend(children);
        self.listing.store(Listing::Listed as u8, Ordering::SeqCst);
    }

    /// Grow the aggregated size.
    pub fn add_size(&self, bytes: u64) {
        self.size.fetch_add(bytes, Ordering::AcqRel);
    }

    /// Drop one outstanding unit. Returns `true` when this completed the node.
    pub fn release(&self) -> bool {
        if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.complete.store(true, Ordering::Release);
            true
        } else {
            false
        }
    }

    /// Mark the node unreadable. Its size stays where it is.
    pub fn mark_inaccessible(&self, error: EntryError) {
        let mut state = self.state.lock();
        state.kind = EntryKind::Inaccessible;
        state.error = Some(error);
    }

    pub fn set_hint(&self, count: u64) {
        self.state.lock().child_count_hint = Some(count);
    }

    pub fn children(&self) -> Vec<PathBuf> {
        self.state.lock().children.clone()
    }

    /// Run `publish` with the current size if it exceeds the last published one.
    ///
    /// Publishing happens under the node lock, so published sizes for one
    /// node never go backwards.
    pub fn publish_size(&self, publish: impl FnOnce(EntryUpdate)) {
        let mut state = self.state.lock();
        let size = self.size();
        if size <= state.reported_size {
            return;
        }
        state.reported_size = size;
        publish(EntryUpdate {
            path: self.path.clone(),
            kind: state.kind,
            size_bytes: size,
            scan_complete: self.is_complete(),
            error: state.error.clone(),
        });
    }

    pub fn update(&self) -> EntryUpdate {
        let state = self.state.lock();
        EntryUpdate {
            path: self.path.clone(),
            kind: state.kind,
            size_bytes: self.size(),
            scan_complete: self.is_complete(),
            error: state.error.clone(),
        }
    }

    pub fn snapshot(&self) -> FsEntry {
        let state = self.state.lock();
        FsEntry {
            path: self.path.clone(),
            name: self.name.clone(),
            kind: state.kind,
            size_bytes: self.size(),
            scan_complete: self.is_complete(),
            children: state.children.clone(),
            child_count_hint: state.child_count_hint,
            error: state.error.clone(),
        }
    }
}

/// Path-keyed owner of every node of one job.
#[derive(Debug)]
pub(crate) struct TreeStore {
    root: PathBuf,
    nodes: DashMap<PathBuf, Arc<Node>>,
    hints: DashMap<PathBuf, u64>,
    listings: Mutex<u64>,
    listed: Condvar,
}

impl TreeStore {
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            nodes: DashMap::new(),
            hints: DashMap::new(),
            listings: Mutex::new(0),
            listed: Condvar::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn get(&self, path: &Path) -> Option<Arc<Node>> {
        self.nodes.get(path).map(|n| Arc::clone(n.value()))
    }

    pub fn root_node(&self) -> Option<Arc<Node>> {
        self.get(&self.root)
    }

    /// Insert a node, keeping the existing one if the path is already known.
    pub fn insert(&self, node: Node) -> Arc<Node> {
        let node = Arc::clone(
            self.nodes
                .entry(node.path.clone())
                .or_insert_with(|| Arc::new(node))
                .value(),
        );
        if let Some(count) = self.hints.get(&node.path).map(|c| *c) {
            node.set_hint(count);
        }
        node
    }

    /// Parent node, or `None` for the root.
    pub fn parent_of(&self, path: &Path) -> Option<Arc<Node>> {
        if path == self.root {
            return None;
        }
        path.parent().and_then(|p| self.get(p))
    }

    pub fn child_nodes(&self, node: &Node) -> Vec<Arc<Node>> {
        node.children().iter().filter_map(|p| self.get(p)).collect()
    }

    pub fn is_complete(&self, path: &Path) -> bool {
        self.get(path).is_some_and(|n| n.is_complete())
    }

    /// Record a precounted child count for `path`, known or not yet discovered.
    pub fn set_hint(&self, path: &Path, count: u64) {
        self.hints.insert(path.to_path_buf(), count);
        if let Some(node) = self.get(path) {
            node.set_hint(count);
        }
    }

    pub fn children(&self, path: &Path) -> Vec<FsEntry> {
        self.get(path)
            .map(|n| self.child_nodes(&n).iter().map(|c| c.snapshot()).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Wake everything waiting for a directory listing to finish.
    pub fn notify_listed(&self) {
        *self.listings.lock() += 1;
        self.listed.notify_all();
    }

    /// Block until some listing finishes or `timeout` elapses.
    pub fn wait_for_listing(&self, timeout: Duration) {
        let mut listings = self.listings.lock();
        let seen = *listings;
        let _ = self
            .listed
            .wait_while_for(&mut listings, |n| *n == seen, timeout);
    }
}
