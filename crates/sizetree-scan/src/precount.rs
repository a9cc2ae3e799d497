//! Count-only pre-pass for fractional progress.
//!
//! Walks the tree with jwalk on the job's own pool, recording how many
//! children each directory has and how many directories exist in total.
//! Subtrees the store already knows to be complete are not walked again.

use std::sync::Arc;

use jwalk::{Parallelism, WalkDir};
use tracing::debug;

use sizetree_core::ScanEvent;

use crate::controller::Job;

/// Run the pre-pass. Returns the directory total, or `None` if cancelled.
pub(crate) fn run(job: &Arc<Job>) -> Option<u64> {
    let root = job.root().to_path_buf();
    let counter = Arc::clone(job);

    let walker = WalkDir::new(&root)
        .parallelism(Parallelism::RayonExistingPool {
            pool: Arc::clone(&job.pool),
            busy_timeout: None,
        })
        .skip_hidden(false)
        .follow_links(false)
        .process_read_dir(move |depth, dir_path, _state, children| {
            // The synthetic read above the root holds only the root itself.
            if depth.is_none() {
                return;
            }
            if counter.token.is_cancelled() {
                children.clear();
                return;
            }
            children.retain(|child| match child {
                Ok(entry) => !counter
                    .filter
                    .is_excluded(&entry.file_name.to_string_lossy()),
                Err(_) => false,
            });
            for entry in children.iter_mut().flatten() {
                if entry.read_children_path.is_some() && counter.store.is_complete(&entry.path()) {
                    entry.read_children_path = None;
                }
            }

            let count = children.len() as u64;
            counter.store.set_hint(dir_path, count);
            counter.hub.emit(ScanEvent::ChildrenCounted {
                path: dir_path.to_path_buf(),
                count,
            });
        });

    let mut dirs = 0u64;
    for entry in walker {
        if job.token.is_cancelled() {
            debug!(root = %root.display(), "precount cancelled");
            return None;
        }
        match entry {
            Ok(entry) if entry.file_type.is_dir() => dirs += 1,
            Ok(_) => {}
            Err(e) => debug!(error = %e, "precount skipped an entry"),
        }
    }
    if job.token.is_cancelled() {
        return None;
    }

    job.stats.set_total(dirs);
    Some(dirs)
}
