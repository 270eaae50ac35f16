//! End-to-end sync exchanges against an in-process bridge server.

mod stub;

use std::io::{Cursor, Read};
use std::sync::Arc;
use tempfile::tempdir;

use dirbridge::collection::{
    CollectionStrategy, DefaultStrategy, FileCollection, ResourceCollection,
};
use dirbridge::errors::{LockError, SyncError};
use dirbridge::sync::{BridgeClient, OfflineLockStatus, SyncAll};
use stub::StubServer;

fn client_for(
    server: &StubServer,
    local_dir: &std::path::Path,
    strategy: Arc<DefaultStrategy>,
) -> (Arc<FileCollection>, BridgeClient) {
    let local = Arc::new(FileCollection::new(
        local_dir,
        Arc::clone(&strategy) as Arc<dyn CollectionStrategy>,
    ));
    let client = BridgeClient::new(
        server.url(),
        Arc::clone(&local) as Arc<dyn ResourceCollection>,
        strategy,
        "Alice",
        "alice",
    )
    .unwrap();
    (local, client)
}

fn read_all(collection: &FileCollection, name: &str) -> String {
    let mut body = String::new();
    collection
        .open_resource(name)
        .unwrap()
        .unwrap()
        .read_to_string(&mut body)
        .unwrap();
    body
}

#[test]
fn collections_converge_and_a_second_sync_is_a_no_op() {
    let server = StubServer::start();
    server.seed("plan.txt", 1_600_000_000_000, b"the plan");
    server.seed("notes/day1.txt", 1_600_000_100_000, b"day one");

    let local_dir = tempdir().unwrap();
    let (local, client) = client_for(&server, local_dir.path(), Arc::new(DefaultStrategy::new()));

    assert!(client.sync_down(&SyncAll).unwrap());
    assert_eq!(read_all(&local, "plan.txt"), "the plan");
    assert_eq!(read_all(&local, "notes/day1.txt"), "day one");

    // Fully converged now, so the hashcode check short-circuits.
    assert!(!client.sync_down(&SyncAll).unwrap());

    client.acquire_lock().unwrap();
    local
        .write_resource("plan.txt", 1_600_000_200_000, &mut Cursor::new(b"v2".to_vec()))
        .unwrap();
    assert!(client.sync_up(&SyncAll).unwrap());
    assert_eq!(read_all(server.collection(), "plan.txt"), "v2");
}

#[test]
fn large_uploads_go_out_in_batches() {
    let server = StubServer::start();
    let local_dir = tempdir().unwrap();
    let (local, client) = client_for(&server, local_dir.path(), Arc::new(DefaultStrategy::new()));

    for i in 0..250 {
        local
            .write_resource(
                &format!("data/file{i:03}.txt"),
                1_600_000_000_000 + i,
                &mut Cursor::new(format!("payload {i}").into_bytes()),
            )
            .unwrap();
    }

    client.acquire_lock().unwrap();
    assert!(client.sync_up(&SyncAll).unwrap());

    assert_eq!(server.count_of("upload"), 3);
    assert_eq!(server.collection().list_resource_names().len(), 250);
}

#[test]
fn sync_up_refuses_to_run_without_the_lock() {
    let server = StubServer::start();
    let local_dir = tempdir().unwrap();
    let (local, client) = client_for(&server, local_dir.path(), Arc::new(DefaultStrategy::new()));
    local
        .write_resource("draft.txt", 1_000, &mut Cursor::new(b"wip".to_vec()))
        .unwrap();

    match client.sync_up(&SyncAll) {
        Err(SyncError::Lock(LockError::NotLocked)) => {}
        other => panic!("expected a lock failure, got {other:?}"),
    }
    // The refusal happens before anything touches the wire.
    assert!(server.requests().is_empty());
}

#[test]
fn unlocked_files_follow_the_server_during_sync_up() {
    let server = StubServer::start();
    server.seed("notes.txt", 2_000, b"server notes");

    let strategy = Arc::new(DefaultStrategy::new().with_unlocked(["notes.txt", "scratch.txt"]));
    let local_dir = tempdir().unwrap();
    let (local, client) = client_for(&server, local_dir.path(), strategy);
    local
        .write_resource("notes.txt", 1_000, &mut Cursor::new(b"local notes".to_vec()))
        .unwrap();
    local
        .write_resource("scratch.txt", 1_500, &mut Cursor::new(b"discarded".to_vec()))
        .unwrap();

    client.acquire_lock().unwrap();
    assert!(client.sync_up(&SyncAll).unwrap());

    // The server copy wins for both names; nothing was pushed up.
    assert_eq!(read_all(&local, "notes.txt"), "server notes");
    assert_eq!(local.last_modified("scratch.txt"), 0);
    assert_eq!(server.count_of("upload"), 0);
    assert_eq!(server.count_of("delete"), 0);
}

#[test]
fn lock_requests_identify_the_user_host_and_working_copy() {
    let server = StubServer::start();
    let local_dir = tempdir().unwrap();
    let (_local, client) = client_for(&server, local_dir.path(), Arc::new(DefaultStrategy::new()));

    client.set_extra_lock_data("wd-guid-1");
    client.acquire_lock().unwrap();

    let requests = server.requests();
    let acquire = requests
        .iter()
        .find(|r| r.action == "acquireLock")
        .expect("no acquireLock request");
    assert_eq!(acquire.first("userName"), Some("Alice"));
    assert_eq!(acquire.first("userId"), Some("alice"));
    assert!(!acquire.first("sourceId").unwrap_or("").is_empty());
    assert_eq!(acquire.first("lockData"), Some("wd-guid-1"));
}

#[test]
fn offline_status_header_drives_the_reported_status() {
    let server = StubServer::start();
    let local_dir = tempdir().unwrap();
    let (_local, client) = client_for(&server, local_dir.path(), Arc::new(DefaultStrategy::new()));
    assert_eq!(client.offline_lock_status(), OfflineLockStatus::Unsupported);

    server.set_offline_header(Some("Enabled"));
    client.acquire_lock().unwrap();
    assert_eq!(client.offline_lock_status(), OfflineLockStatus::Enabled);

    server.set_offline_header(Some("Disabled"));
    client.ping_lock().unwrap();
    assert_eq!(client.offline_lock_status(), OfflineLockStatus::Disabled);
}

#[test]
fn a_contended_lock_reports_its_owner() {
    let server = StubServer::start();
    server.refuse("acquireLock", "alreadyLocked: bob");

    let local_dir = tempdir().unwrap();
    let (_local, client) = client_for(&server, local_dir.path(), Arc::new(DefaultStrategy::new()));

    match client.acquire_lock() {
        Err(LockError::AlreadyLocked { owner }) => assert_eq!(owner.as_deref(), Some("bob")),
        other => panic!("expected AlreadyLocked, got {other:?}"),
    }
    assert!(!client.holds_lock());
}
