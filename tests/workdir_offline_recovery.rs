//! Bridged working-directory lifecycle against an in-process server:
//! sync stamping, unflushed work surviving restarts, and reclaiming an
//! offline lock.

mod stub;

use std::fs;
use std::io::Cursor;
use std::sync::Arc;
use tempfile::tempdir;

use dirbridge::collection::{DefaultStrategy, ResourceCollection};
use dirbridge::errors::LockError;
use dirbridge::workdir::{BridgedWorkingDirectory, State, WorkingDirectory};
use stub::StubServer;

fn workdir(server: &StubServer, cache_base: &std::path::Path) -> BridgedWorkingDirectory {
    BridgedWorkingDirectory::new(
        server.url(),
        Arc::new(DefaultStrategy::new()),
        "Alice",
        "alice",
        Some(cache_base.to_path_buf()),
    )
    .unwrap()
}

fn meta_dir(wd: &BridgedWorkingDirectory) -> std::path::PathBuf {
    wd.directory().join(".dirbridge")
}

#[test]
fn the_sync_stamp_only_advances_when_a_flush_lands() {
    let server = StubServer::start();
    server.seed("plan.txt", 1_600_000_000_000, b"the plan");

    let cache_base = tempdir().unwrap();
    let wd = workdir(&server, cache_base.path());
    wd.prepare().unwrap();

    // Preparing pulled the server copy down but took no stamp; only a
    // completed flush proves the two sides matched.
    assert!(wd.directory().join("plan.txt").exists());
    assert!(!meta_dir(&wd).join("syncstamp").exists());

    wd.acquire_write_lock("alice").unwrap();
    fs::write(wd.directory().join("memo.txt"), "new work").unwrap();
    assert!(wd.flush_data().unwrap());

    assert!(meta_dir(&wd).join("syncstamp").exists());
    assert!(server.collection().last_modified("memo.txt") > 0);
    wd.release_write_lock();
}

#[test]
fn an_unflushed_draft_survives_update_and_restart() {
    let server = StubServer::start();
    let cache_base = tempdir().unwrap();

    {
        let wd = workdir(&server, cache_base.path());
        wd.prepare().unwrap();
        fs::write(wd.directory().join("draft.txt"), "unsaved work").unwrap();
        wd.update().unwrap();
        assert!(wd.directory().join("draft.txt").exists());
    }

    // A fresh session over the same cache must not mistake the draft for
    // stale state and discard it.
    let wd = workdir(&server, cache_base.path());
    wd.prepare().unwrap();
    assert_eq!(
        fs::read_to_string(wd.directory().join("draft.txt")).unwrap(),
        "unsaved work"
    );
}

#[test]
fn a_lost_offline_lock_is_fatal_while_local_edits_are_at_risk() {
    let server = StubServer::start();
    server.refuse("resumeOfflineLock", "notLocked");

    let cache_base = tempdir().unwrap();
    let wd = workdir(&server, cache_base.path());
    fs::create_dir_all(meta_dir(&wd)).unwrap();
    fs::write(meta_dir(&wd).join("offline"), "true\n").unwrap();
    fs::write(meta_dir(&wd).join("syncstamp"), "1000\n").unwrap();
    wd.collection()
        .write_resource("draft.txt", 2_000, &mut Cursor::new(b"offline edit".to_vec()))
        .unwrap();

    wd.prepare().unwrap();
    match wd.acquire_write_lock("alice") {
        Err(LockError::OfflineLockLost { last_sync }) => {
            assert_eq!(last_sync, Some(1_000));
        }
        other => panic!("expected OfflineLockLost, got {other:?}"),
    }
    assert_eq!(wd.state(), State::Prepared);
    assert_eq!(
        fs::read_to_string(wd.directory().join("draft.txt")).unwrap(),
        "offline edit"
    );
}

#[test]
fn a_lost_offline_lock_rejoins_online_when_nothing_is_at_risk() {
    let server = StubServer::start();
    server.refuse("resumeOfflineLock", "notLocked");

    let cache_base = tempdir().unwrap();
    let wd = workdir(&server, cache_base.path());
    fs::create_dir_all(meta_dir(&wd)).unwrap();
    fs::write(meta_dir(&wd).join("offline"), "true\n").unwrap();
    // Every cached file predates this stamp, so no local work is at risk.
    fs::write(meta_dir(&wd).join("syncstamp"), "9999999999999\n").unwrap();

    wd.prepare().unwrap();
    wd.acquire_write_lock("alice").unwrap();

    assert_eq!(wd.state(), State::Writable);
    assert!(!wd.is_offline());
    assert_eq!(server.count_of("acquireLock"), 1);
    wd.release_write_lock();
}
