use sizetree_scan::{
    Engine, EntryErrorKind, EntryKind, EventStream, JobStatus, ScanConfig, ScanError, ScanEvent,
    ScanMode, SearchQuery,
};
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn config_for(root: &Path) -> ScanConfig {
    ScanConfig::builder()
        .root(root)
        .threads(4usize)
        .build()
        .unwrap()
}

fn drain(events: &mut EventStream) -> Vec<ScanEvent> {
    let mut all = Vec::new();
    while let Some(event) = events.try_recv() {
        all.push(event);
    }
    all
}

fn hit_paths(hits: Vec<sizetree_scan::SearchHit>) -> BTreeSet<PathBuf> {
    hits.into_iter().map(|h| h.path).collect()
}

/// Build `width` directories with `files` small files each, `depth` levels deep.
fn build_tree(dir: &Path, depth: usize, width: usize, files: usize) -> u64 {
    let mut total = 0;
    for f in 0..files {
        let size = 10 + f;
        fs::write(dir.join(format!("file{f}.dat")), vec![b'x'; size]).unwrap();
        total += size as u64;
    }
    if depth > 0 {
        for d in 0..width {
            let sub = dir.join(format!("dir{d}"));
            fs::create_dir(&sub).unwrap();
            total += build_tree(&sub, depth - 1, width, files);
        }
    }
    total
}

#[test]
fn test_full_scan_aggregates_sizes() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("small.bin"), vec![0u8; 100]).unwrap();
    fs::write(temp.path().join("large.bin"), vec![0u8; 250]).unwrap();
    fs::create_dir(temp.path().join("empty")).unwrap();

    let engine = Engine::new();
    let mut handle = engine.start_job(config_for(temp.path())).unwrap();
    let mut events = handle.take_events().unwrap();
    assert!(handle.take_events().is_none());

    assert_eq!(engine.wait(&handle).unwrap(), JobStatus::Completed);
    assert_eq!(engine.status(), JobStatus::Completed);

    let root = engine.snapshot(handle.root()).unwrap();
    assert_eq!(root.size_bytes, 350);
    assert!(root.scan_complete);
    assert_eq!(root.child_count(), 3);

    let empty = engine.snapshot(handle.root().join("empty")).unwrap();
    assert_eq!(empty.kind, EntryKind::Directory);
    assert_eq!(empty.size_bytes, 0);
    assert!(empty.scan_complete);

    for child in engine.children(handle.root()) {
        assert!(child.scan_complete, "{} incomplete", child.path.display());
    }

    let events = drain(&mut events);
    assert!(matches!(
        events.last(),
        Some(ScanEvent::JobCompleted { size_bytes: 350, .. })
    ));
    let discovered = events
        .iter()
        .filter(|e| matches!(e, ScanEvent::NodeDiscovered(_)))
        .count();
    assert_eq!(discovered, 4);
}

#[test]
fn test_snapshot_accepts_non_canonical_paths() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("sub")).unwrap();
    fs::write(temp.path().join("sub/a.txt"), "hello").unwrap();

    let engine = Engine::new();
    let handle = engine.start_job(config_for(temp.path())).unwrap();
    engine.wait(&handle).unwrap();

    let entry = engine.snapshot(temp.path().join("sub/../sub")).unwrap();
    assert_eq!(entry.size_bytes, 5);
    assert_eq!(entry.name, "sub");
}

#[cfg(unix)]
#[test]
fn test_unreadable_directory_does_not_fail_job() {
    use std::os::unix::fs::PermissionsExt;

    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("visible.txt"), vec![0u8; 40]).unwrap();
    let locked = temp.path().join("locked");
    fs::create_dir(&locked).unwrap();
    fs::write(locked.join("hidden.txt"), vec![0u8; 1000]).unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();

    // Permission bits do not stop a privileged user.
    if fs::read_dir(&locked).is_ok() {
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
        return;
    }

    let engine = Engine::new();
    let mut handle = engine.start_job(config_for(temp.path())).unwrap();
    let mut events = handle.take_events().unwrap();
    assert_eq!(engine.wait(&handle).unwrap(), JobStatus::Completed);

    let entry = engine.snapshot(handle.root().join("locked")).unwrap();
    assert_eq!(entry.kind, EntryKind::Inaccessible);
    assert_eq!(
        entry.error.as_ref().map(|e| e.kind),
        Some(EntryErrorKind::PermissionDenied)
    );
    assert!(entry.scan_complete);

    let root = engine.snapshot(handle.root()).unwrap();
    assert_eq!(root.size_bytes, 40);
    assert!(root.scan_complete);
    assert_eq!(engine.progress().unwrap().errors, 1);

    let errors: Vec<_> = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ScanEvent::NodeError(_)))
        .collect();
    assert_eq!(errors.len(), 1);

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
}

#[test]
fn test_search_before_scan_needs_exhaustive() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("logs")).unwrap();
    fs::write(temp.path().join("logs/app.log"), "started").unwrap();
    fs::write(temp.path().join("readme.md"), "docs").unwrap();

    let mut config = config_for(temp.path());
    config.mode = ScanMode::OnDemand;
    let engine = Engine::new();
    let handle = engine.start_job(config).unwrap();
    engine.wait(&handle).unwrap();

    let known = engine.search(SearchQuery::new("log")).unwrap();
    assert!(known.collect_blocking().is_empty());

    let exhaustive = engine.search(SearchQuery::new("log").exhaustive()).unwrap();
    let found = hit_paths(exhaustive.collect_blocking());
    let expected: BTreeSet<PathBuf> = [
        handle.root().join("logs"),
        handle.root().join("logs/app.log"),
    ]
    .into_iter()
    .collect();
    assert_eq!(found, expected);

    // The exhaustive search listed everything; the known tree now agrees.
    let known = engine.search(SearchQuery::new("log")).unwrap();
    assert_eq!(hit_paths(known.collect_blocking()), expected);
}

#[test]
fn test_search_scope_and_prefix() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("a/report")).unwrap();
    fs::create_dir_all(temp.path().join("b")).unwrap();
    fs::write(temp.path().join("a/report/final.txt"), "1").unwrap();
    fs::write(temp.path().join("b/report.txt"), "2").unwrap();
    fs::write(temp.path().join("b/old_report.txt"), "3").unwrap();

    let engine = Engine::new();
    let handle = engine.start_job(config_for(temp.path())).unwrap();
    engine.wait(&handle).unwrap();

    let all = engine.search(SearchQuery::new("REPORT")).unwrap();
    assert_eq!(all.collect_blocking().len(), 3);

    let prefix = engine.search(SearchQuery::new("report").prefix()).unwrap();
    assert_eq!(prefix.collect_blocking().len(), 2);

    let scoped = engine
        .search(SearchQuery::new("report").within(handle.root().join("b")))
        .unwrap();
    let hits = scoped.collect_blocking();
    assert_eq!(hits.len(), 2);
    assert!(hits.iter().all(|h| h.kind == EntryKind::File));

    let unknown = engine
        .search(SearchQuery::new("report").within(handle.root().join("missing")))
        .unwrap();
    assert!(unknown.collect_blocking().is_empty());
}

#[test]
fn test_cancel_stops_events_and_sizes() {
    let temp = TempDir::new().unwrap();
    let total = build_tree(temp.path(), 4, 5, 4);

    let mut config = config_for(temp.path());
    config.threads = 2;
    let engine = Engine::new();
    let mut handle = engine.start_job(config).unwrap();
    let mut events = handle.take_events().unwrap();

    // Let the traversal get going before stopping it.
    for _ in 0..50 {
        assert!(events.blocking_recv().is_some());
    }
    engine.cancel(&handle);
    assert_eq!(engine.status(), JobStatus::Cancelled);

    let before = engine.snapshot(handle.root()).unwrap();
    assert!(before.size_bytes <= total);
    assert!(!before.scan_complete);
    std::thread::sleep(Duration::from_millis(50));
    let after = engine.snapshot(handle.root()).unwrap();
    assert_eq!(before.size_bytes, after.size_bytes);

    // The stream is closed; nothing follows the cancellation notice.
    let mut seen = Vec::new();
    while let Some(event) = events.blocking_recv() {
        seen.push(event);
    }
    assert!(matches!(seen.last(), Some(ScanEvent::JobCancelled { .. })));
    assert!(!seen.iter().any(|e| matches!(e, ScanEvent::JobCompleted { .. })));

    // Cancelling again is a no-op.
    engine.cancel(&handle);
    assert_eq!(engine.status(), JobStatus::Cancelled);
    assert!(engine.subscribe(&handle).is_none());
}

#[test]
fn test_search_cancel_leaves_job_running() {
    let temp = TempDir::new().unwrap();
    build_tree(temp.path(), 3, 5, 3);

    let mut config = config_for(temp.path());
    config.mode = ScanMode::OnDemand;
    let engine = Engine::new();
    let handle = engine.start_job(config).unwrap();
    engine.wait(&handle).unwrap();

    let search = engine.search(SearchQuery::new("file").exhaustive()).unwrap();
    search.cancel();
    let partial = hit_paths(search.collect_blocking());
    drop(engine.search(SearchQuery::new("dir").exhaustive()).unwrap());

    engine.wait(&handle).unwrap();
    assert_eq!(engine.status(), JobStatus::Completed);
    assert!(engine.subscribe(&handle).is_some());

    let exhaustive = hit_paths(
        engine
            .search(SearchQuery::new("file").exhaustive())
            .unwrap()
            .collect_blocking(),
    );
    let known = hit_paths(engine.search(SearchQuery::new("file")).unwrap().collect_blocking());
    // Three files in each of the 1 + 5 + 25 + 125 directories.
    assert_eq!(exhaustive.len(), 468);
    assert_eq!(known, exhaustive);
    assert!(partial.is_subset(&exhaustive));
}

#[cfg(unix)]
#[test]
fn test_sibling_alias_keeps_real_directory() {
    for _ in 0..20 {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("real")).unwrap();
        fs::write(temp.path().join("real/x.bin"), vec![0u8; 7]).unwrap();
        std::os::unix::fs::symlink(temp.path().join("real"), temp.path().join("alias")).unwrap();

        let mut config = config_for(temp.path());
        config.threads = 8;
        let engine = Engine::new();
        let handle = engine.start_job(config).unwrap();
        assert_eq!(engine.wait(&handle).unwrap(), JobStatus::Completed);

        let real = engine.snapshot(handle.root().join("real")).unwrap();
        assert_eq!(real.kind, EntryKind::Directory);
        assert!(real.error.is_none());
        assert_eq!(real.size_bytes, 7);
        assert!(real.scan_complete);

        let alias = engine.snapshot(handle.root().join("alias")).unwrap();
        assert_eq!(alias.kind, EntryKind::Inaccessible);
        assert_eq!(
            alias.error.map(|e| e.kind),
            Some(EntryErrorKind::CycleDetected)
        );

        assert_eq!(engine.snapshot(handle.root()).unwrap().size_bytes, 7);
    }
}

#[test]
fn test_restart_replaces_previous_job() {
    let first = TempDir::new().unwrap();
    fs::write(first.path().join("one.txt"), "1").unwrap();
    let second = TempDir::new().unwrap();
    fs::write(second.path().join("two.txt"), "22").unwrap();

    let engine = Engine::new();
    let mut old = engine.start_job(config_for(first.path())).unwrap();
    let mut old_events = old.take_events().unwrap();
    engine.wait(&old).unwrap();

    let new = engine.start_job(config_for(second.path())).unwrap();
    assert_ne!(old.id(), new.id());
    engine.wait(&new).unwrap();

    assert!(engine.snapshot(old.root()).is_none());
    assert_eq!(engine.snapshot(new.root()).unwrap().size_bytes, 2);
    assert_eq!(engine.job().unwrap().root_path, new.root());

    // The old stream was closed when its job was discarded.
    let mut last = None;
    while let Some(event) = old_events.blocking_recv() {
        last = Some(event);
    }
    assert!(matches!(last, Some(ScanEvent::JobCancelled { .. })));
    engine.cancel(&old);
    assert_eq!(engine.status(), JobStatus::Completed);
}

#[cfg(unix)]
#[test]
fn test_symlink_loop_reported_once() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("a")).unwrap();
    fs::write(temp.path().join("a/data.bin"), vec![0u8; 64]).unwrap();
    std::os::unix::fs::symlink(temp.path(), temp.path().join("a/loop")).unwrap();

    let engine = Engine::new();
    let mut handle = engine.start_job(config_for(temp.path())).unwrap();
    let mut events = handle.take_events().unwrap();
    assert_eq!(engine.wait(&handle).unwrap(), JobStatus::Completed);

    let cycles = drain(&mut events)
        .into_iter()
        .filter(|e| match e {
            ScanEvent::NodeError(u) => {
                u.error.as_ref().map(|e| e.kind) == Some(EntryErrorKind::CycleDetected)
            }
            _ => false,
        })
        .count();
    assert_eq!(cycles, 1);

    let root = engine.snapshot(handle.root()).unwrap();
    assert_eq!(root.size_bytes, 64);
    assert!(root.scan_complete);
}

#[test]
fn test_size_updates_are_monotonic() {
    let temp = TempDir::new().unwrap();
    let total = build_tree(temp.path(), 3, 4, 3);

    let engine = Engine::new();
    let mut handle = engine.start_job(config_for(temp.path())).unwrap();
    let mut events = handle.take_events().unwrap();
    engine.wait(&handle).unwrap();

    let mut last: HashMap<PathBuf, u64> = HashMap::new();
    let mut completed = BTreeSet::new();
    for event in drain(&mut events) {
        match event {
            ScanEvent::SizeUpdated(update) => {
                assert!(
                    !completed.contains(&update.path),
                    "size of {} changed after completion",
                    update.path.display()
                );
                let previous = last.insert(update.path.clone(), update.size_bytes);
                assert!(previous.is_none_or(|p| p < update.size_bytes));
            }
            ScanEvent::ScanComplete(update) => {
                completed.insert(update.path);
            }
            _ => {}
        }
    }
    assert_eq!(last.get(handle.root()), Some(&total));
    assert!(completed.contains(handle.root()));
}

#[test]
fn test_precount_reports_total_and_hints() {
    let temp = TempDir::new().unwrap();
    build_tree(temp.path(), 2, 3, 2);

    let mut config = config_for(temp.path());
    config.precount = true;
    let engine = Engine::new();
    let mut handle = engine.start_job(config).unwrap();
    let mut events = handle.take_events().unwrap();
    engine.wait(&handle).unwrap();

    // Root, three children and nine grandchildren.
    let progress = engine.progress().unwrap();
    assert_eq!(progress.dirs_total, Some(13));
    assert_eq!(progress.dirs_listed, 13);
    assert_eq!(progress.percentage(), Some(100.0));

    let root = engine.snapshot(handle.root()).unwrap();
    assert_eq!(root.child_count_hint, Some(5));

    let counted = drain(&mut events)
        .into_iter()
        .filter(|e| matches!(e, ScanEvent::ChildrenCounted { .. }))
        .count();
    assert_eq!(counted, 13);
}

#[test]
fn test_shallow_scan_and_expand() {
    let temp = TempDir::new().unwrap();
    fs::create_dir_all(temp.path().join("sub/deep")).unwrap();
    fs::write(temp.path().join("top.txt"), vec![0u8; 10]).unwrap();
    fs::write(temp.path().join("sub/mid.txt"), vec![0u8; 20]).unwrap();
    fs::write(temp.path().join("sub/deep/low.txt"), vec![0u8; 30]).unwrap();

    let mut config = config_for(temp.path());
    config.mode = ScanMode::Shallow;
    let engine = Engine::new();
    let handle = engine.start_job(config).unwrap();
    assert_eq!(engine.wait(&handle).unwrap(), JobStatus::Completed);

    let root = handle.root().to_path_buf();
    let sub = root.join("sub");
    assert_eq!(engine.snapshot(&root).unwrap().size_bytes, 10);
    assert!(!engine.snapshot(&root).unwrap().scan_complete);
    assert!(engine.children(&sub).is_empty());

    assert!(engine.expand(&sub).unwrap());
    engine.wait(&handle).unwrap();
    assert_eq!(engine.children(&sub).len(), 2);
    assert_eq!(engine.snapshot(&root).unwrap().size_bytes, 30);
    assert!(!engine.snapshot(&sub).unwrap().scan_complete);

    assert!(!engine.expand(root.join("top.txt")).unwrap());
    assert!(!engine.expand(root.join("missing")).unwrap());

    assert!(engine.expand_all(&root).unwrap());
    engine.wait(&handle).unwrap();
    let entry = engine.snapshot(&root).unwrap();
    assert_eq!(entry.size_bytes, 60);
    assert!(entry.scan_complete);
    assert!(engine.snapshot(sub.join("deep")).unwrap().scan_complete);
}

#[test]
fn test_ignore_patterns_and_hidden() {
    let temp = TempDir::new().unwrap();
    fs::create_dir(temp.path().join("node_modules")).unwrap();
    fs::write(temp.path().join("node_modules/big.js"), vec![0u8; 5000]).unwrap();
    fs::write(temp.path().join("debug.log"), vec![0u8; 700]).unwrap();
    fs::write(temp.path().join(".secret"), vec![0u8; 3]).unwrap();
    fs::write(temp.path().join("main.rs"), vec![0u8; 12]).unwrap();

    let config = ScanConfig::builder()
        .root(temp.path())
        .include_hidden(false)
        .ignore_patterns(vec!["node_modules".to_string(), "*.log".to_string()])
        .build()
        .unwrap();
    let engine = Engine::with_config(config);
    let handle = engine.start(temp.path()).unwrap();
    engine.wait(&handle).unwrap();

    let root = engine.snapshot(handle.root()).unwrap();
    assert_eq!(root.size_bytes, 12);
    assert_eq!(root.children, vec![handle.root().join("main.rs")]);
}

#[test]
fn test_root_failures() {
    let engine = Engine::new();
    assert_eq!(engine.status(), JobStatus::Idle);
    assert!(matches!(
        engine.search(SearchQuery::new("x")),
        Err(ScanError::NoActiveJob)
    ));
    assert!(matches!(engine.expand("/"), Err(ScanError::NoActiveJob)));

    let temp = TempDir::new().unwrap();
    let missing = temp.path().join("missing");
    assert!(matches!(
        engine.start(&missing),
        Err(ScanError::RootInaccessible { .. })
    ));
    assert_eq!(engine.status(), JobStatus::Failed);
    assert_eq!(engine.job().unwrap().root_path, missing);

    let file = temp.path().join("file.txt");
    fs::write(&file, "x").unwrap();
    assert!(matches!(
        engine.start(&file),
        Err(ScanError::NotADirectory { .. })
    ));

    // A valid start recovers from a failed one.
    let handle = engine.start(temp.path()).unwrap();
    assert_eq!(engine.wait(&handle).unwrap(), JobStatus::Completed);
}

#[test]
fn test_invalid_pattern_leaves_engine_untouched() {
    let temp = TempDir::new().unwrap();
    let engine = Engine::new();
    let handle = engine.start(temp.path()).unwrap();
    engine.wait(&handle).unwrap();

    let mut config = config_for(temp.path());
    config.ignore_patterns = vec!["a[".to_string()];
    assert!(matches!(
        engine.start_job(config),
        Err(ScanError::InvalidPattern { .. })
    ));
    assert_eq!(engine.status(), JobStatus::Completed);
    assert_eq!(engine.job().unwrap().id, handle.id());
}

#[tokio::test]
async fn test_event_stream_reports_completion() {
    use tokio_stream::StreamExt;

    let temp = TempDir::new().unwrap();
    let total = build_tree(temp.path(), 2, 3, 2);

    let engine = Engine::new();
    let mut handle = engine.start_job(config_for(temp.path())).unwrap();
    let mut stream = handle.take_events().unwrap().into_stream();

    let mut root_complete = false;
    while let Some(event) = stream.next().await {
        match event {
            ScanEvent::ScanComplete(update) if update.path == handle.root() => {
                assert_eq!(update.size_bytes, total);
                root_complete = true;
            }
            ScanEvent::JobCompleted { size_bytes, .. } => {
                assert_eq!(size_bytes, total);
                break;
            }
            _ => {}
        }
    }
    assert!(root_complete);
}
