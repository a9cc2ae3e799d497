//! Single-directory listing, the unit of work of every traversal.

use std::fs::{self, DirEntry};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, trace};

use sizetree_core::{EntryError, ScanEvent};

use crate::aggregate::Aggregator;
use crate::controller::Job;
use crate::store::Node;

/// What a directory entry turned out to be.
enum Classified {
    File(u64),
    Directory,
    Inaccessible(EntryError),
}

/// List a directory the caller has claimed.
///
/// Inserts and announces every child, adds the directory's file bytes to it
/// and its ancestors, then settles the directory's own listing unit. Returns
/// the child directories that still need listing.
pub(crate) fn list_directory(job: &Arc<Job>, dir: &Arc<Node>) -> Vec<Arc<Node>> {
    let agg = Aggregator::new(&job.store, &job.hub);

    let canonical = match dir.path.canonicalize() {
        Ok(path) => path,
        Err(e) => {
            fail_listing(job, dir, EntryError::from_io(&e));
            return Vec::new();
        }
    };
    if !job.visited.mark(canonical.clone()) {
        fail_listing(job, dir, EntryError::cycle(canonical));
        return Vec::new();
    }

    let entries: Vec<DirEntry> = match fs::read_dir(&dir.path) {
        Ok(read_dir) => read_dir
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    debug!(dir = %dir.path.display(), error = %e, "skipping unreadable entry");
                    None
                }
            })
            .collect(),
        Err(e) => {
            fail_listing(job, dir, EntryError::from_io(&e));
            return Vec::new();
        }
    };

    // Nothing from a cancelled listing becomes visible.
    if job.token.is_cancelled() {
        return Vec::new();
    }

    let mut children = Vec::with_capacity(entries.len());
    let mut subdirs = Vec::new();
    let mut files = 0u64;
    let mut bytes = 0u64;

    for entry in entries {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if job.filter.is_excluded(&name) {
            continue;
        }

        let path = entry.path();
        let node = match classify(job, &entry, &path) {
            Classified::File(size) => {
                files += 1;
                bytes += size;
                Node::file(path, size)
            }
            Classified::Directory => Node::directory(path),
            Classified::Inaccessible(error) => {
                trace!(path = %path.display(), %error, "inaccessible entry");
                Node::inaccessible(path, error)
            }
        };

        let node = job.store.insert(node);
        children.push(node.path.clone());
        let update = node.update();
        if update.kind.is_inaccessible() {
            job.stats.record_error();
            job.hub.emit(ScanEvent::NodeDiscovered(update.clone()));
            job.hub.emit(ScanEvent::NodeError(update));
        } else {
            job.hub.emit(ScanEvent::NodeDiscovered(update));
        }
        if node.is_dir() && !node.is_complete() {
            subdirs.push(node);
        }
    }

    dir.finish_listing(children, subdirs.len());
    agg.add_bytes(dir, bytes);
    job.store.notify_listed();

    let listed = job.stats.record_listing(&dir.path, files, bytes);
    if listed % job.config.progress_interval.max(1) == 0 {
        job.hub.emit(ScanEvent::Progress(job.stats.snapshot()));
    }

    agg.release(dir);
    subdirs
}

/// Classify one entry without following it further than one link.
fn classify(job: &Job, entry: &DirEntry, path: &Path) -> Classified {
    let file_type = match entry.file_type() {
        Ok(t) => t,
        Err(e) => return Classified::Inaccessible(EntryError::from_io(&e)),
    };

    if file_type.is_symlink() && job.config.follow_symlinks {
        match fs::metadata(path) {
            Ok(meta) if meta.is_dir() => return classify_linked_dir(job, path),
            Ok(meta) => return Classified::File(meta.len()),
            // Dangling link; counted as the link itself below.
            Err(_) => {}
        }
    } else if file_type.is_dir() {
        return Classified::Directory;
    }

    match entry.metadata() {
        Ok(meta) => Classified::File(meta.len()),
        Err(e) => Classified::Inaccessible(EntryError::from_io(&e)),
    }
}

fn classify_linked_dir(job: &Job, path: &Path) -> Classified {
    match path.canonicalize() {
        // Everything under the root is reached by its real path, so a link
        // into the root is either a loop or a second route. The link gets the
        // marker; the real directory keeps its bytes.
        Ok(target) if target.starts_with(job.root()) || job.visited.contains(&target) => {
            Classified::Inaccessible(EntryError::cycle(target))
        }
        Ok(_) => Classified::Directory,
        Err(e) => Classified::Inaccessible(EntryError::from_io(&e)),
    }
}

/// Turn a claimed directory into an inaccessible leaf and settle it.
fn fail_listing(job: &Job, dir: &Arc<Node>, error: EntryError) {
    debug!(path = %dir.path.display(), %error, "directory not listed");
    dir.mark_inaccessible(error);
    dir.finish_listing(Vec::new(), 0);
    job.stats.record_error();
    job.hub.emit(ScanEvent::NodeError(dir.update()));
    job.store.notify_listed();
    Aggregator::new(&job.store, &job.hub).release(dir);
}
