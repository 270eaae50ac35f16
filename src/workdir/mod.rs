//! Working directories: the directory an application actually reads and
//! writes, kept convergent with an authoritative target location.
//!
//! Every implementation moves through the same lifecycle:
//!
//! ```text
//! Unprepared -> Prepared -> Writable -> Prepared -> Closed
//! ```
//!
//! `prepare` brings the directory up to date, `acquire_write_lock` makes
//! it writable, `release_write_lock` drops back to read-only, and
//! `dispose` ends the session. `update` is only legal while read-only;
//! `flush_data` only while writable.

mod bridged;
mod local;
mod meta;
mod worker;

pub use bridged::BridgedWorkingDirectory;
pub use local::LocalWorkingDirectory;

use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

use tracing::warn;

use crate::errors::{LockError, SyncError, SyncResult};
use crate::sync::OfflineLockStatus;

/// Out-of-band notifications a working directory can raise after setup,
/// from its background worker or its lock listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryEvent {
    /// The write lock was definitely taken over by another party. The
    /// directory is no longer safe to write.
    LockLost,
    /// A same-host process contending for our lock sent a message.
    Message(String),
    /// The server reported a different offline-lock status than before.
    OfflineStatusChanged(OfflineLockStatus),
}

/// Lifecycle phase; see the module docs for the legal transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Unprepared,
    Prepared,
    Writable,
    Closed,
}

pub trait WorkingDirectory: Send + Sync {
    fn description(&self) -> String;

    /// The authoritative location this directory mirrors.
    fn target(&self) -> String;

    /// The directory callers read and write files in.
    fn directory(&self) -> &Path;

    fn state(&self) -> State;

    /// Bring the directory up to date with the target. Legal from
    /// `Unprepared` or `Prepared`.
    fn prepare(&self) -> SyncResult<()>;

    /// Take the write lock on the target. Legal from `Prepared`.
    fn acquire_write_lock(&self, owner: &str) -> Result<(), LockError>;

    /// Confirm the write lock is still ours.
    fn assert_write_lock(&self) -> Result<(), LockError>;

    /// Pull fresh target content. Legal only while read-only; a writable
    /// directory is the authority, not a mirror.
    fn update(&self) -> SyncResult<()>;

    /// Push local changes to the target. Legal only while writable.
    /// Returns true when anything needed saving.
    fn flush_data(&self) -> SyncResult<bool>;

    /// Snapshot the collection, preferring the target's own backup
    /// machinery where one exists.
    fn backup(&self, qualifier: &str) -> SyncResult<()>;

    fn release_write_lock(&self);

    /// End the session. Flushes and releases if still writable.
    fn dispose(&self) -> SyncResult<()>;

    /// Subscribe to out-of-band events.
    fn subscribe(&self) -> Receiver<DirectoryEvent>;
}

/// Fan-out channel for [`DirectoryEvent`]s. Dead receivers are pruned on
/// publish.
pub(crate) struct EventHub {
    senders: Mutex<Vec<Sender<DirectoryEvent>>>,
}

impl EventHub {
    pub(crate) fn new() -> Self {
        EventHub {
            senders: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn subscribe(&self) -> Receiver<DirectoryEvent> {
        let (tx, rx) = mpsc::channel();
        self.senders.lock().unwrap().push(tx);
        rx
    }

    pub(crate) fn publish(&self, event: DirectoryEvent) {
        self.senders
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

pub(crate) fn state_error(msg: &str) -> SyncError {
    SyncError::Protocol(msg.to_string())
}

/// Write a local ZIP snapshot of a collection under
/// `<base>/.dirbridge/backups/`. Used directly by local directories and as
/// the offline fallback for bridged ones.
pub(crate) fn write_local_backup(
    collection: &dyn crate::collection::ResourceCollection,
    base: &Path,
    qualifier: &str,
) -> SyncResult<std::path::PathBuf> {
    let names: Vec<String> = collection.list_resource_names();
    let bundle = crate::sync::archive::build_bundle(&names, collection)?;

    let backup_dir = base.join(meta::META_DIR).join("backups");
    std::fs::create_dir_all(&backup_dir)?;
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let path = backup_dir.join(format!("backup-{stamp}-{qualifier}.zip"));
    std::fs::write(&path, bundle)?;
    tracing::info!(path = %path.display(), files = names.len(), "wrote local backup");
    Ok(path)
}

/// Run an operation up to `attempts` times, pausing briefly between
/// failures.
pub(crate) fn with_retries<T>(
    what: &str,
    attempts: u32,
    mut op: impl FnMut() -> SyncResult<T>,
) -> SyncResult<T> {
    let mut tried = 0;
    loop {
        tried += 1;
        match op() {
            Ok(v) => return Ok(v),
            Err(e) if tried < attempts => {
                warn!(what, attempt = tried, error = %e, "operation failed; retrying");
                std::thread::sleep(Duration::from_secs(1));
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_hub_fans_out_and_prunes() {
        let hub = EventHub::new();
        let a = hub.subscribe();
        let b = hub.subscribe();
        hub.publish(DirectoryEvent::LockLost);
        assert_eq!(a.recv().unwrap(), DirectoryEvent::LockLost);
        assert_eq!(b.recv().unwrap(), DirectoryEvent::LockLost);

        drop(a);
        hub.publish(DirectoryEvent::Message("hi".into()));
        assert_eq!(b.recv().unwrap(), DirectoryEvent::Message("hi".into()));
        assert_eq!(hub.senders.lock().unwrap().len(), 1);
    }

    #[test]
    fn retries_stop_after_the_limit() {
        let mut calls = 0;
        let result: SyncResult<()> = with_retries("test-op", 3, || {
            calls += 1;
            Err(SyncError::Protocol("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(calls, 3);
    }

    #[test]
    fn retries_return_the_first_success() {
        let mut calls = 0;
        let result = with_retries("test-op", 5, || {
            calls += 1;
            if calls < 3 {
                Err(SyncError::Protocol("warming up".into()))
            } else {
                Ok(calls)
            }
        });
        assert_eq!(result.unwrap(), 3);
    }
}
