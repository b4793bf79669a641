use core::time::Duration;
use cuckoo_tonic_core::{Error, FilterStatus};
use cuckoo_tonic_server::server::{
    registry::Registry,
    snapshot::{DumpScheduler, SchedulerState, SnapshotManager},
};
use std::{fs, path::Path, sync::Arc};
use tempfile::TempDir;

fn populated_registry() -> Arc<Registry> {
    let registry = Arc::new(Registry::new());
    for (name, capacity) in [("f1", 1_000), ("a/b", 64), ("", 16)] {
        assert_eq!(registry.create(name, capacity), FilterStatus::Ok);
    }

    let f1 = registry.get("f1").unwrap();
    for i in 0..500 {
        assert!(f1.write().insert(format!("user-{i}").as_bytes()));
    }
    assert!(registry.get("a/b").unwrap().write().insert(b"slash"));
    registry
}

fn file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn dump_then_load_reproduces_registry() {
    let dir = TempDir::new().unwrap();
    let source = populated_registry();

    let report = SnapshotManager::new(Arc::clone(&source), dir.path())
        .dump()
        .await
        .unwrap();
    assert_eq!(report.written, 3);
    assert_eq!(report.removed, 0);
    assert_eq!(file_names(dir.path()), ["%", "a%2Fb", "f1"]);

    let restored = Arc::new(Registry::new());
    let loaded = SnapshotManager::new(Arc::clone(&restored), dir.path())
        .load()
        .await
        .unwrap();
    assert_eq!(loaded, 3);

    let mut names = restored.names();
    names.sort();
    assert_eq!(names, ["", "a/b", "f1"]);

    let f1 = restored.get("f1").unwrap();
    assert_eq!(f1.read().count(), 500);
    for i in 0..500 {
        assert!(f1.read().lookup(format!("user-{i}").as_bytes()));
    }
    assert_eq!(f1.capacity(), source.get("f1").unwrap().read().capacity());
    assert_eq!(*f1.read(), *source.get("f1").unwrap().read());

    assert!(restored.get("a/b").unwrap().read().lookup(b"slash"));
    assert!(restored.get("").unwrap().read().is_empty());
}

#[tokio::test]
async fn missing_directory_loads_nothing() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(Registry::new());

    let loaded = SnapshotManager::new(Arc::clone(&registry), dir.path().join("absent"))
        .load()
        .await
        .unwrap();

    assert_eq!(loaded, 0);
    assert!(registry.is_empty());
}

#[tokio::test]
async fn dump_creates_nested_directory() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("a").join("b");

    SnapshotManager::new(populated_registry(), &target)
        .dump()
        .await
        .unwrap();

    assert_eq!(file_names(&target).len(), 3);
}

#[tokio::test]
async fn corrupt_snapshot_fails_closed() {
    let dir = TempDir::new().unwrap();
    SnapshotManager::new(populated_registry(), dir.path())
        .dump()
        .await
        .unwrap();
    fs::write(dir.path().join("broken"), b"definitely not a filter").unwrap();

    let registry = Arc::new(Registry::new());
    registry.create("existing", 10);

    let err = SnapshotManager::new(Arc::clone(&registry), dir.path())
        .load()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decode { ref name, .. } if name == "broken"));
    assert_eq!(registry.names(), ["existing"]);
}

#[tokio::test]
async fn truncated_snapshot_fails_closed() {
    let dir = TempDir::new().unwrap();
    SnapshotManager::new(populated_registry(), dir.path())
        .dump()
        .await
        .unwrap();

    let path = dir.path().join("f1");
    let bytes = fs::read(&path).unwrap();
    fs::write(&path, &bytes[..bytes.len() / 2]).unwrap();

    let registry = Arc::new(Registry::new());
    let err = SnapshotManager::new(Arc::clone(&registry), dir.path())
        .load()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Decode { .. }));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn undecodable_file_name_fails_closed() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("has space"), b"").unwrap();

    let registry = Arc::new(Registry::new());
    let err = SnapshotManager::new(Arc::clone(&registry), dir.path())
        .load()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidSnapshotName { .. }));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn aliased_file_names_fail_closed() {
    let dir = TempDir::new().unwrap();
    SnapshotManager::new(populated_registry(), dir.path())
        .dump()
        .await
        .unwrap();
    // Decodes to "f1" as well, but is not how "f1" is spelled on disk.
    fs::copy(dir.path().join("f1"), dir.path().join("%66%31")).unwrap();

    let registry = Arc::new(Registry::new());
    let err = SnapshotManager::new(Arc::clone(&registry), dir.path())
        .load()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidSnapshotName { ref file_name } if file_name == "%66%31"));
    assert!(registry.is_empty());
}

#[tokio::test]
async fn staging_files_and_subdirectories_are_ignored_on_load() {
    let dir = TempDir::new().unwrap();
    SnapshotManager::new(populated_registry(), dir.path())
        .dump()
        .await
        .unwrap();
    fs::write(dir.path().join(".f1.tmp"), b"half-written").unwrap();
    fs::create_dir(dir.path().join("nested")).unwrap();

    let registry = Arc::new(Registry::new());
    let loaded = SnapshotManager::new(Arc::clone(&registry), dir.path())
        .load()
        .await
        .unwrap();

    assert_eq!(loaded, 3);
    assert_eq!(registry.get("f1").unwrap().read().count(), 500);
}

#[tokio::test]
async fn dump_prunes_deleted_filters_and_stale_staging_files() {
    let dir = TempDir::new().unwrap();
    let registry = populated_registry();
    let manager = SnapshotManager::new(Arc::clone(&registry), dir.path());

    manager.dump().await.unwrap();
    fs::write(dir.path().join(".gone.tmp"), b"crash leftover").unwrap();
    fs::write(dir.path().join("notes.txt~"), b"not a snapshot name").unwrap();

    assert_eq!(registry.delete("a/b"), FilterStatus::Ok);
    let report = manager.dump().await.unwrap();

    assert_eq!(report.written, 2);
    assert_eq!(report.removed, 2);
    assert_eq!(file_names(dir.path()), ["%", "f1", "notes.txt~"]);

    // Deleted filters do not come back on restart.
    fs::remove_file(dir.path().join("notes.txt~")).unwrap();
    let restored = Arc::new(Registry::new());
    SnapshotManager::new(Arc::clone(&restored), dir.path())
        .load()
        .await
        .unwrap();
    assert!(restored.get("a/b").is_none());
    assert_eq!(restored.len(), 2);
}

#[tokio::test]
async fn dump_overwrites_previous_snapshot() {
    let dir = TempDir::new().unwrap();
    let registry = populated_registry();
    let manager = SnapshotManager::new(Arc::clone(&registry), dir.path());

    manager.dump().await.unwrap();
    registry.get("f1").unwrap().write().reset();
    manager.dump().await.unwrap();

    let restored = Arc::new(Registry::new());
    SnapshotManager::new(Arc::clone(&restored), dir.path())
        .load()
        .await
        .unwrap();
    assert!(restored.get("f1").unwrap().read().is_empty());
}

#[cfg(unix)]
#[tokio::test]
async fn failed_dump_prunes_nothing() {
    let dir = TempDir::new().unwrap();
    let registry = Arc::new(Registry::new());
    registry.create("f1", 10);

    // Renaming a file over a directory fails.
    fs::create_dir(dir.path().join("f1")).unwrap();
    fs::write(dir.path().join("stale"), b"old").unwrap();

    let err = SnapshotManager::new(Arc::clone(&registry), dir.path())
        .dump()
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Io { .. }));
    assert!(dir.path().join("stale").exists());
}

#[tokio::test]
async fn overlapping_trigger_is_skipped() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(SnapshotManager::new(populated_registry(), dir.path()));
    let scheduler = DumpScheduler::new(manager);

    assert_eq!(scheduler.state(), SchedulerState::Idle);
    // The spawned dump cannot make progress before this task yields.
    assert!(scheduler.trigger());
    assert_eq!(scheduler.state(), SchedulerState::Running);
    assert!(!scheduler.trigger());

    scheduler.shutdown().await;

    assert_eq!(scheduler.state(), SchedulerState::Stopped);
    assert_eq!(file_names(dir.path()), ["%", "a%2Fb", "f1"]);
    assert!(!scheduler.trigger());
}

#[tokio::test]
async fn scheduler_returns_to_idle_after_dump() {
    let dir = TempDir::new().unwrap();
    let manager = Arc::new(SnapshotManager::new(populated_registry(), dir.path()));
    let scheduler = DumpScheduler::new(manager);

    assert!(scheduler.trigger());
    wait_for_idle(&scheduler).await;

    assert!(scheduler.trigger());
    scheduler.shutdown().await;
}

#[tokio::test]
async fn failed_dump_does_not_stop_scheduler() {
    let dir = TempDir::new().unwrap();
    // A regular file where the snapshot directory should be.
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"").unwrap();

    let manager = Arc::new(SnapshotManager::new(populated_registry(), &blocker));
    let scheduler = DumpScheduler::new(manager);

    assert!(scheduler.trigger());
    wait_for_idle(&scheduler).await;
    assert!(scheduler.trigger());

    scheduler.shutdown().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn periodic_ticks_dump_until_shutdown() {
    let dir = TempDir::new().unwrap();
    let registry = populated_registry();
    let manager = Arc::new(SnapshotManager::new(Arc::clone(&registry), dir.path()));

    let scheduler = DumpScheduler::start(manager, Duration::from_millis(20));
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !dir.path().join("f1").exists() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "no periodic dump happened"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    scheduler.shutdown().await;
    assert_eq!(scheduler.state(), SchedulerState::Stopped);

    // Nothing is written once shutdown has returned.
    fs::remove_file(dir.path().join("f1")).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert!(!dir.path().join("f1").exists());
}

async fn wait_for_idle(scheduler: &DumpScheduler) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while scheduler.state() != SchedulerState::Idle {
        assert!(
            tokio::time::Instant::now() < deadline,
            "dump never completed"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
