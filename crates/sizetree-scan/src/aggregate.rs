//! Bottom-up size and completeness aggregation.

use std::sync::Arc;

use sizetree_core::ScanEvent;

use crate::hub::EventHub;
use crate::store::{Node, TreeStore};

/// Propagates listing results from a directory to its ancestors.
///
/// Each step touches exactly one node: an atomic add, or a publish under
/// that node's own lock.
pub(crate) struct Aggregator<'a> {
    store: &'a TreeStore,
    hub: &'a EventHub,
}

impl<'a> Aggregator<'a> {
    pub fn new(store: &'a TreeStore, hub: &'a EventHub) -> Self {
        Self { store, hub }
    }

    /// Add `bytes` of newly found file data to `dir` and every ancestor.
    pub fn add_bytes(&self, dir: &Arc<Node>, bytes: u64) {
        if bytes == 0 {
            return;
        }
        let mut current = Some(Arc::clone(dir));
        while let Some(node) = current {
            node.add_size(bytes);
            node.publish_size(|update| self.hub.emit(ScanEvent::SizeUpdated(update)));
            current = self.store.parent_of(&node.path);
        }
    }

    /// Settle one outstanding unit of `node` (its own listing, or a child
    /// directory), completing ancestors whose last unit this was.
    pub fn release(&self, node: &Arc<Node>) {
        let mut current = Arc::clone(node);
        while current.release() {
            self.hub.emit(ScanEvent::ScanComplete(current.update()));
            match self.store.parent_of(&current.path) {
                Some(parent) => current = parent,
                None => break,
            }
        }
    }
}
