//! Working directory whose target is itself a local (or mounted) path.
//! No cache is involved; the lifecycle mostly manages the cross-process
//! lock.

use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::collection::{CollectionStrategy, FileCollection, ResourceCollection};
use crate::errors::{LockError, SyncResult};
use crate::lock::{registry, FileLock, LockMessageHandler};

use super::{state_error, write_local_backup, DirectoryEvent, EventHub, State, WorkingDirectory};

pub struct LocalWorkingDirectory {
    directory: PathBuf,
    strategy: Arc<dyn CollectionStrategy>,
    collection: Arc<FileCollection>,
    lock: Arc<FileLock>,
    state: Mutex<State>,
    events: Arc<EventHub>,
}

impl LocalWorkingDirectory {
    pub fn new(directory: impl Into<PathBuf>, strategy: Arc<dyn CollectionStrategy>) -> Self {
        let directory = directory.into();
        let collection = Arc::new(FileCollection::new(&directory, Arc::clone(&strategy)));
        let lock = Arc::new(FileLock::new(directory.join(strategy.lock_filename())));
        LocalWorkingDirectory {
            directory,
            strategy,
            collection,
            lock,
            state: Mutex::new(State::Unprepared),
            events: Arc::new(EventHub::new()),
        }
    }

    pub fn collection(&self) -> &Arc<FileCollection> {
        &self.collection
    }

    /// Confirm the directory accepts writes before we claim a write lock
    /// on it. A read-only network mount fails here rather than halfway
    /// through a save.
    fn check_writable(&self) -> Result<(), LockError> {
        let probe = self.directory.join(".dirbridge-write-probe.tmp");
        match OpenOptions::new().write(true).create(true).truncate(true).open(&probe) {
            Ok(_) => {
                let _ = std::fs::remove_file(&probe);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                Err(LockError::ReadOnly(self.directory.clone()))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn message_handler(&self) -> Arc<dyn LockMessageHandler> {
        let events = Arc::clone(&self.events);
        Arc::new(move |message: &str| {
            events.publish(DirectoryEvent::Message(message.to_string()));
            "acknowledged".to_string()
        })
    }
}

impl WorkingDirectory for LocalWorkingDirectory {
    fn description(&self) -> String {
        self.directory.display().to_string()
    }

    fn target(&self) -> String {
        self.directory.display().to_string()
    }

    fn directory(&self) -> &Path {
        &self.directory
    }

    fn state(&self) -> State {
        *self.state.lock().unwrap()
    }

    fn prepare(&self) -> SyncResult<()> {
        let mut state = self.state.lock().unwrap();
        match *state {
            State::Unprepared | State::Prepared => {}
            _ => return Err(state_error("cannot prepare a writable or closed directory")),
        }
        self.collection.validate()?;
        *state = State::Prepared;
        Ok(())
    }

    fn acquire_write_lock(&self, owner: &str) -> Result<(), LockError> {
        {
            let state = self.state.lock().unwrap();
            if *state != State::Prepared {
                return Err(LockError::Failed(format!(
                    "cannot lock a directory in state {:?}",
                    *state
                )));
            }
        }
        self.check_writable()?;

        let events = Arc::clone(&self.events);
        self.lock
            .set_loss_handler(Arc::new(move || events.publish(DirectoryEvent::LockLost)));
        self.lock
            .acquire(Some(self.message_handler()), None, owner)?;
        registry::register(&self.lock);

        *self.state.lock().unwrap() = State::Writable;
        Ok(())
    }

    fn assert_write_lock(&self) -> Result<(), LockError> {
        self.lock.assert_lock()
    }

    fn update(&self) -> SyncResult<()> {
        let state = self.state.lock().unwrap();
        if *state != State::Prepared {
            return Err(state_error("update is only legal while read-only"));
        }
        // The target is this directory; rescanning it is all an update means.
        self.collection.invalidate_cache();
        Ok(())
    }

    fn flush_data(&self) -> SyncResult<bool> {
        let state = self.state.lock().unwrap();
        if *state != State::Writable {
            return Err(state_error("flush requires the write lock"));
        }
        // Writes land directly in the target; nothing is pending.
        debug!(dir = %self.directory.display(), "flush is a no-op for local directories");
        Ok(true)
    }

    fn backup(&self, qualifier: &str) -> SyncResult<()> {
        write_local_backup(self.collection.as_ref(), &self.directory, qualifier)?;
        Ok(())
    }

    fn release_write_lock(&self) {
        self.lock.release();
        let mut state = self.state.lock().unwrap();
        if *state == State::Writable {
            *state = State::Prepared;
        }
    }

    fn dispose(&self) -> SyncResult<()> {
        if self.state() == State::Writable {
            self.release_write_lock();
        }
        *self.state.lock().unwrap() = State::Closed;
        Ok(())
    }

    fn subscribe(&self) -> Receiver<DirectoryEvent> {
        self.events.subscribe()
    }
}
