//! Working directory bridged to an HTTP collection server.
//!
//! The application works in a private cache directory under the platform
//! cache dir; `prepare`/`update` pull the server's content down and
//! `flush_data` pushes local changes back. A metadata sidecar records the
//! working copy's identity, its offline-lock flag, and the timestamp of the
//! last completed sync, which together drive crash and offline recovery.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use crate::collection::{hash, CollectionStrategy, FileCollection, ResourceCollection};
use crate::errors::{LockError, SyncError, SyncResult};
use crate::lock::{registry, FileLock, LockMessageHandler};
use crate::sync::{BridgeClient, OfflineLockStatus, SyncAll, SyncDownFilter};

use super::meta::Metadata;
use super::worker::{self, WorkerHandle};
use super::{
    state_error, with_retries, write_local_backup, DirectoryEvent, EventHub, State,
    WorkingDirectory,
};

/// How many sync attempts prepare/update/flush make before giving up.
const SYNC_ATTEMPTS: u32 = 5;
/// Every Nth flush also re-uploads the housekeeping files the routine
/// filters skip.
pub(crate) const FULL_FLUSH_FREQUENCY: u32 = 12;

pub struct BridgedWorkingDirectory {
    inner: Arc<BridgedInner>,
    worker: Mutex<Option<WorkerHandle>>,
}

pub(crate) struct BridgedInner {
    remote_url: String,
    cache_dir: PathBuf,
    strategy: Arc<dyn CollectionStrategy>,
    pub(crate) collection: Arc<FileCollection>,
    pub(crate) client: BridgeClient,
    pub(crate) metadata: Metadata,
    process_lock: Arc<FileLock>,
    state: Mutex<State>,
    flush_count: AtomicU32,
    pub(crate) events: Arc<EventHub>,
}

impl BridgedWorkingDirectory {
    pub fn new(
        remote_url: impl Into<String>,
        strategy: Arc<dyn CollectionStrategy>,
        user_name: &str,
        user_id: &str,
        cache_base: Option<PathBuf>,
    ) -> SyncResult<Self> {
        let remote_url = remote_url.into();
        let cache_dir = cache_dir_for(&remote_url, cache_base);
        let collection = Arc::new(FileCollection::new(&cache_dir, Arc::clone(&strategy)));
        let client = BridgeClient::new(
            remote_url.clone(),
            Arc::clone(&collection) as Arc<dyn ResourceCollection>,
            Arc::clone(&strategy),
            user_name,
            user_id,
        )?;
        let process_lock = Arc::new(FileLock::new(cache_dir.join(strategy.lock_filename())));
        let metadata = Metadata::new(&cache_dir);
        let events = Arc::new(EventHub::new());

        // Keep the persisted offline flag in step with what the server
        // reports, and let sessions hear about the change.
        {
            let meta = Metadata::new(&cache_dir);
            let events = Arc::clone(&events);
            client.on_offline_status_change(move |status| {
                let enabled = status == OfflineLockStatus::Enabled;
                if let Err(e) = meta.set_offline(enabled) {
                    warn!(error = %e, "could not record offline flag");
                }
                events.publish(DirectoryEvent::OfflineStatusChanged(status));
            });
        }

        Ok(BridgedWorkingDirectory {
            inner: Arc::new(BridgedInner {
                remote_url,
                cache_dir,
                strategy,
                collection,
                client,
                metadata,
                process_lock,
                state: Mutex::new(State::Unprepared),
                flush_count: AtomicU32::new(0),
                events,
            }),
            worker: Mutex::new(None),
        })
    }

    pub fn collection(&self) -> &Arc<FileCollection> {
        &self.inner.collection
    }

    pub fn client(&self) -> &BridgeClient {
        &self.inner.client
    }

    /// Stable identifier for this working copy.
    pub fn guid(&self) -> SyncResult<String> {
        std::fs::create_dir_all(&self.inner.cache_dir)?;
        Ok(self.inner.metadata.guid()?)
    }

    pub fn is_offline(&self) -> bool {
        self.inner.metadata.offline()
    }

    /// Enable or disable offline use of the write lock. Requires the lock.
    /// The status listener wired up at construction persists the flag.
    pub fn set_offline_enabled(&self, enabled: bool) -> Result<(), LockError> {
        if self.state() != State::Writable {
            return Err(LockError::NotLocked);
        }
        self.inner.client.set_offline_lock_enabled(enabled)?;
        info!(enabled, "offline lock mode changed");
        Ok(())
    }

    fn message_handler(&self) -> Arc<dyn LockMessageHandler> {
        let events = Arc::clone(&self.inner.events);
        Arc::new(move |message: &str| {
            events.publish(DirectoryEvent::Message(message.to_string()));
            "acknowledged".to_string()
        })
    }

    /// Re-establish the server lock after an offline session.
    ///
    /// A definite refusal is not always fatal: when a sync stamp exists
    /// and every cached file predates it, nothing written offline is at
    /// risk, so we quietly refresh from the server and take an ordinary
    /// online lock instead.
    fn resume_server_lock(&self) -> Result<(), LockError> {
        match self.inner.client.resume_offline_lock() {
            Ok(()) => Ok(()),
            Err(e) if e.is_fatal() => {
                let last_sync = self.inner.metadata.last_sync();
                match last_sync {
                    Some(stamp) if !self.inner.local_edits_since(stamp) => {
                        info!("offline lock was refused but no local edits are at risk");
                        self.rejoin_online()
                    }
                    _ => Err(LockError::OfflineLockLost { last_sync }),
                }
            }
            Err(e) => Err(e),
        }
    }

    /// Abandon the offline session: refresh the cache from the server,
    /// then take a fresh online lock.
    fn rejoin_online(&self) -> Result<(), LockError> {
        self.online_prepare()
            .map_err(|e| LockError::Failed(e.to_string()))?;
        self.inner.client.acquire_lock()?;
        self.inner
            .metadata
            .set_offline(false)
            .map_err(LockError::from)?;
        Ok(())
    }

    fn online_prepare(&self) -> SyncResult<()> {
        // Preserve whatever the cache held before the first sync touches it.
        if !self.inner.collection.list_resource_names().is_empty() {
            if let Err(e) =
                write_local_backup(self.inner.collection.as_ref(), &self.inner.cache_dir, "startup")
            {
                warn!(error = %e, "could not write startup backup");
            }
        }

        let filter = self.inner.sync_down_filter();
        with_retries("sync-down", SYNC_ATTEMPTS, || {
            self.inner.client.sync_down(&filter)
        })?;
        Ok(())
    }
}

impl BridgedInner {
    pub(crate) fn sync_down_filter(&self) -> SyncDownFilter {
        SyncDownFilter::new(
            &self.cache_dir,
            Arc::clone(&self.strategy),
            self.metadata.last_sync().unwrap_or(0),
        )
    }

    /// Whether any cached file was modified after `stamp`.
    fn local_edits_since(&self, stamp: i64) -> bool {
        self.collection
            .list_resource_names()
            .iter()
            .any(|name| self.collection.last_modified(name) > stamp)
    }

    pub(crate) fn do_flush(&self) -> SyncResult<bool> {
        let changed = self.client.sync_up(&SyncAll)?;
        self.metadata.set_last_sync(chrono::Utc::now().timestamp_millis())?;
        let flushes = self.flush_count.fetch_add(1, Ordering::SeqCst) + 1;
        if flushes % FULL_FLUSH_FREQUENCY == 0 {
            if let Err(e) = self.client.save_default_excluded_files() {
                warn!(error = %e, "could not refresh housekeeping files on server");
            }
        }
        Ok(changed)
    }

    pub(crate) fn offline(&self) -> bool {
        self.metadata.offline()
    }
}

impl WorkingDirectory for BridgedWorkingDirectory {
    fn description(&self) -> String {
        format!("{} (cached at {})", self.inner.remote_url, self.inner.cache_dir.display())
    }

    fn target(&self) -> String {
        self.inner.remote_url.clone()
    }

    fn directory(&self) -> &Path {
        &self.inner.cache_dir
    }

    fn state(&self) -> State {
        *self.inner.state.lock().unwrap()
    }

    fn prepare(&self) -> SyncResult<()> {
        {
            let state = self.inner.state.lock().unwrap();
            match *state {
                State::Unprepared | State::Prepared => {}
                _ => return Err(state_error("cannot prepare a writable or closed directory")),
            }
        }
        std::fs::create_dir_all(&self.inner.cache_dir)?;
        let guid = self.inner.metadata.guid()?;
        self.inner.client.set_extra_lock_data(guid);

        if self.inner.offline() {
            info!(url = %self.inner.remote_url, "preparing in offline mode; using cached copy");
            self.inner.collection.validate()?;
            *self.inner.state.lock().unwrap() = State::Prepared;
            return Ok(());
        }

        // The sync stamp is only advanced when a flush lands on the
        // server; stamping a download here would hide unsaved local work
        // from the recovery filters.
        self.online_prepare()?;
        *self.inner.state.lock().unwrap() = State::Prepared;
        Ok(())
    }

    fn acquire_write_lock(&self, owner: &str) -> Result<(), LockError> {
        if self.state() != State::Prepared {
            return Err(LockError::Failed(format!(
                "cannot lock a directory in state {:?}",
                self.state()
            )));
        }

        let events = Arc::clone(&self.inner.events);
        self.inner
            .process_lock
            .set_loss_handler(Arc::new(move || events.publish(DirectoryEvent::LockLost)));
        self.inner
            .process_lock
            .acquire(Some(self.message_handler()), None, owner)?;
        registry::register(&self.inner.process_lock);

        let server_result = if self.inner.offline() {
            self.resume_server_lock()
        } else {
            self.inner.client.acquire_lock()
        };
        if let Err(e) = server_result {
            self.inner.process_lock.release();
            return Err(e);
        }

        *self.worker.lock().unwrap() = Some(worker::spawn(Arc::clone(&self.inner)));
        *self.inner.state.lock().unwrap() = State::Writable;
        Ok(())
    }

    fn assert_write_lock(&self) -> Result<(), LockError> {
        self.inner.process_lock.assert_lock()?;
        match self.inner.client.assert_lock() {
            Err(LockError::Uncertain(msg)) if self.inner.offline() => {
                // Offline mode exists precisely so an unreachable server is
                // not a problem.
                warn!(%msg, "server unreachable; offline lock carries on");
                Ok(())
            }
            other => other,
        }
    }

    fn update(&self) -> SyncResult<()> {
        if self.state() != State::Prepared {
            return Err(state_error("update is only legal while read-only"));
        }
        if self.inner.offline() {
            return Err(state_error("cannot update from the server in offline mode"));
        }
        let filter = self.inner.sync_down_filter();
        with_retries("sync-down", SYNC_ATTEMPTS, || {
            self.inner.client.sync_down(&filter)
        })?;
        Ok(())
    }

    fn flush_data(&self) -> SyncResult<bool> {
        if self.state() != State::Writable {
            return Err(state_error("flush requires the write lock"));
        }
        let result = if self.inner.offline() {
            // One best-effort attempt; an unreachable server is expected.
            self.inner.do_flush()
        } else {
            with_retries("sync-up", SYNC_ATTEMPTS, || self.inner.do_flush())
        };
        match result {
            Ok(changed) => Ok(changed),
            Err(e) if self.inner.offline() => {
                // The cache keeps the data safe until the server is back.
                info!(error = %e, "could not reach the server; offline cache holds the data");
                Ok(true)
            }
            Err(e) => Err(e),
        }
    }

    fn backup(&self, qualifier: &str) -> SyncResult<()> {
        if self.inner.offline() {
            write_local_backup(self.inner.collection.as_ref(), &self.inner.cache_dir, qualifier)?;
            return Ok(());
        }
        match self.inner.client.do_backup(qualifier) {
            Ok(url) => {
                info!(%url, "server backup complete");
                Ok(())
            }
            Err(SyncError::Http(e)) => {
                warn!(error = %e, "server backup failed; writing a local one");
                write_local_backup(
                    self.inner.collection.as_ref(),
                    &self.inner.cache_dir,
                    qualifier,
                )?;
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn release_write_lock(&self) {
        *self.worker.lock().unwrap() = None;
        if !self.inner.offline() {
            self.inner.client.release_lock();
        }
        self.inner.process_lock.release();
        let mut state = self.inner.state.lock().unwrap();
        if *state == State::Writable {
            *state = State::Prepared;
        }
    }

    fn dispose(&self) -> SyncResult<()> {
        if self.state() == State::Writable {
            if let Err(e) = self.flush_data() {
                warn!(error = %e, "final flush failed while closing");
            }
            self.release_write_lock();
        }
        *self.inner.state.lock().unwrap() = State::Closed;
        Ok(())
    }

    fn subscribe(&self) -> Receiver<DirectoryEvent> {
        self.inner.events.subscribe()
    }
}

/// Cache location for a remote collection: a directory under the platform
/// cache dir, named by a short content hash of the target URL so distinct
/// targets never collide.
fn cache_dir_for(remote_url: &str, base: Option<PathBuf>) -> PathBuf {
    let base = base
        .or_else(dirs::cache_dir)
        .unwrap_or_else(std::env::temp_dir);
    let digest = hash::bytes_checksum(remote_url.as_bytes());
    base.join("dirbridge").join(format!("{digest:016x}"))
}
