//! Process-wide registry of live locks, drained on shutdown.
//!
//! Drop handles the ordinary path; the registry covers Ctrl-C, where
//! destructors never run. The signal handler calls [`release_all`] so lock
//! files do not outlive the process.

use std::sync::{Arc, Mutex, OnceLock, Weak};

use tracing::debug;

use super::FileLock;

static REGISTRY: OnceLock<Mutex<Vec<Weak<FileLock>>>> = OnceLock::new();

fn registry() -> &'static Mutex<Vec<Weak<FileLock>>> {
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Track a lock for release at shutdown. Dead entries are pruned as a side
/// effect, so the list stays small.
pub fn register(lock: &Arc<FileLock>) {
    let mut entries = registry().lock().unwrap();
    entries.retain(|w| w.strong_count() > 0);
    entries.push(Arc::downgrade(lock));
}

/// Release every still-live registered lock. Idempotent; safe to call from
/// a signal handler thread.
pub fn release_all() {
    let entries = std::mem::take(&mut *registry().lock().unwrap());
    for weak in entries {
        if let Some(lock) = weak.upgrade() {
            debug!(path = %lock.path().display(), "releasing lock at shutdown");
            lock.release();
        }
    }
}
