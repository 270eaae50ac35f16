//! Advisory cross-process lock on a sidecar file.
//!
//! The holder keeps an exclusive `fs2` lock on the file and runs a small
//! loopback listener so same-host contenders can deliver a message instead
//! of just seeing "already locked". The listener thread doubles as a
//! watchdog, periodically rechecking that the metadata in the file still
//! carries our token.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use fs2::FileExt;
use tracing::{debug, info, warn};

use super::message::{
    answer_contender, current_host, read_metadata, send_lock_message, LockMetadata,
};
use super::LockMessageHandler;
use crate::errors::LockError;

const LISTENER_POLL: Duration = Duration::from_millis(500);
// 60 seconds at the poll cadence above.
const VALIDITY_CHECK_TICKS: u32 = 120;

/// One process's handle on a directory's write lock.
pub struct FileLock {
    path: PathBuf,
    inner: Mutex<Option<Held>>,
    on_lost: Mutex<Option<Arc<dyn Fn() + Send + Sync>>>,
}

struct Held {
    file: File,
    meta: LockMetadata,
    handler: Option<Arc<dyn LockMessageHandler>>,
    listener: Option<ListenerHandle>,
}

struct ListenerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

impl FileLock {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileLock {
            path: path.into(),
            inner: Mutex::new(None),
            on_lost: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Install a callback fired when the watchdog sees the lock definitely
    /// taken over by someone else.
    pub fn set_loss_handler(&self, f: Arc<dyn Fn() + Send + Sync>) {
        *self.on_lost.lock().unwrap() = Some(f);
    }

    pub fn is_locked(&self) -> bool {
        self.inner.lock().unwrap().is_some()
    }

    /// Try to take the lock. On contention, if `message` is given and the
    /// current holder is on this machine with a live listener, the message
    /// is delivered and the holder's reply comes back as
    /// [`LockError::SentMessage`]; otherwise [`LockError::AlreadyLocked`].
    pub fn acquire(
        &self,
        handler: Option<Arc<dyn LockMessageHandler>>,
        message: Option<&str>,
        owner: &str,
    ) -> Result<(), LockError> {
        let mut held = self.inner.lock().unwrap();
        if held.is_some() {
            return Ok(());
        }

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(LockError::from)?;
        }
        let mut file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.path)
        {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(LockError::ReadOnly(self.path.clone()));
            }
            Err(e) => return Err(e.into()),
        };

        match file.try_lock_exclusive() {
            Ok(()) => {}
            Err(e) if is_contended(&e) => return Err(self.contended(message)),
            Err(e) => return Err(e.into()),
        }

        let mut meta = LockMetadata {
            host: current_host(),
            port: 0,
            token: uuid::Uuid::new_v4().simple().to_string(),
            owner: owner.to_string(),
        };
        let listener = match &handler {
            Some(h) => {
                let (handle, port) = self.spawn_listener(meta.token.clone(), Arc::clone(h))?;
                meta.port = port;
                Some(handle)
            }
            None => None,
        };
        meta.write(&mut file)?;
        info!(path = %self.path.display(), port = meta.port, "lock acquired");

        *held = Some(Held {
            file,
            meta,
            handler,
            listener,
        });
        Ok(())
    }

    fn contended(&self, message: Option<&str>) -> LockError {
        let meta = match read_metadata(&self.path) {
            Ok(Some(m)) => m,
            Ok(None) => return LockError::AlreadyLocked { owner: None },
            Err(e) => {
                debug!(error = %e, "could not read lock metadata from contender side");
                return LockError::AlreadyLocked { owner: None };
            }
        };
        if let Some(msg) = message {
            if meta.port > 0 && meta.is_same_host() {
                match send_lock_message(&meta, msg) {
                    Ok(response) => return LockError::SentMessage { response },
                    Err(e) => return e,
                }
            }
        }
        LockError::AlreadyLocked {
            owner: meta.owner_or_none(),
        }
    }

    /// Confirm we still hold the lock. A deleted lock file is silently
    /// repaired by relocking; metadata carrying someone else's token means
    /// the lock was definitely taken over.
    pub fn assert_lock(&self) -> Result<(), LockError> {
        let mut held = self.inner.lock().unwrap();
        let current = held.as_mut().ok_or(LockError::NotLocked)?;

        match read_metadata(&self.path) {
            Ok(Some(meta)) if meta.token == current.meta.token => Ok(()),
            Ok(Some(_)) => {
                warn!(path = %self.path.display(), "lock metadata overwritten by another process");
                let handler = current.handler.clone();
                let owner = current.meta.owner.clone();
                drop_held(held.take());
                drop(held);
                // One shot at winning the lock back before conceding.
                match self.acquire(handler, None, &owner) {
                    Ok(()) => Err(LockError::Uncertain(
                        "lock was briefly lost and re-acquired".into(),
                    )),
                    Err(_) => Err(LockError::Failed("lock taken over by another process".into())),
                }
            }
            Ok(None) => {
                info!(path = %self.path.display(), "lock file disappeared; recreating");
                let handler = current.handler.clone();
                let owner = current.meta.owner.clone();
                drop_held(held.take());
                drop(held);
                self.acquire(handler, None, &owner)
            }
            Err(e) => Err(LockError::Uncertain(e.to_string())),
        }
    }

    /// Let go of the lock and remove the lock file. Never fails; a release
    /// that cannot delete the file still drops the advisory lock.
    pub fn release(&self) {
        if let Some(held) = self.inner.lock().unwrap().take() {
            info!(path = %self.path.display(), "lock released");
            drop_held(Some(held));
            let _ = fs::remove_file(&self.path);
        }
    }

    fn spawn_listener(
        &self,
        token: String,
        handler: Arc<dyn LockMessageHandler>,
    ) -> Result<(ListenerHandle, u16), LockError> {
        let listener = TcpListener::bind("127.0.0.1:0").map_err(LockError::from)?;
        let port = listener.local_addr().map_err(LockError::from)?.port();
        listener.set_nonblocking(true).map_err(LockError::from)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let path = self.path.clone();
        let on_lost = self.on_lost.lock().unwrap().clone();

        let thread = thread::Builder::new()
            .name("dirbridge-lock-listener".into())
            .spawn(move || {
                let mut ticks = 0u32;
                while !thread_stop.load(Ordering::Relaxed) {
                    match listener.accept() {
                        Ok((stream, _)) => {
                            if let Err(e) = answer_contender(stream, &token, handler.as_ref()) {
                                debug!(error = %e, "failed answering lock contender");
                            }
                        }
                        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                            thread::sleep(LISTENER_POLL);
                            ticks += 1;
                            if ticks >= VALIDITY_CHECK_TICKS {
                                ticks = 0;
                                match read_metadata(&path) {
                                    Ok(Some(meta)) if meta.token != token => {
                                        warn!(path = %path.display(),
                                              "lock taken over; notifying owner");
                                        if let Some(f) = &on_lost {
                                            f();
                                        }
                                        return;
                                    }
                                    Ok(Some(_)) => {}
                                    Ok(None) => {
                                        // The foreground assert repairs this.
                                        debug!(path = %path.display(), "lock file missing");
                                    }
                                    Err(e) => {
                                        debug!(error = %e, "lock validity check inconclusive")
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            debug!(error = %e, "lock listener accept error");
                            thread::sleep(LISTENER_POLL);
                        }
                    }
                }
            })
            .map_err(|e| LockError::Failed(e.to_string()))?;

        Ok((
            ListenerHandle {
                stop,
                thread: Some(thread),
            },
            port,
        ))
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        self.release();
    }
}

fn drop_held(held: Option<Held>) {
    if let Some(held) = held {
        drop(held.listener);
        let _ = fs2::FileExt::unlock(&held.file);
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
