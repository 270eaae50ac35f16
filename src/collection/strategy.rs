//! Collection strategy: the per-dataset policy object.
//! Decides which filenames belong to a collection, which are housekeeping
//! files excluded from routine syncs, which may be written without a write
//! lock, and how the lock file is named.

use std::path::Path;

/// Policy hooks consulted by collections, sync operations and directories.
pub trait CollectionStrategy: Send + Sync {
    /// Whether a resource name belongs to this collection at all.
    fn includes(&self, name: &str) -> bool;

    /// Housekeeping files excluded from routine listings and hash
    /// computations (but re-uploaded occasionally so the server copy does
    /// not go permanently stale).
    fn default_excluded_files(&self) -> &[&str];

    fn is_default_excluded(&self, name: &str) -> bool {
        self.default_excluded_files().iter().any(|f| *f == name)
    }

    /// Name of the lock file inside a collection directory.
    fn lock_filename(&self) -> &str;

    /// Whether a resource may be modified without holding the write lock.
    fn is_unlocked(&self, name: &str) -> bool;

    /// Quick local test for a file that looks damaged (e.g. after a crash).
    /// A corrupt newer local file loses to the server copy during sync-down
    /// recovery.
    fn is_possibly_corrupt(&self, _path: &Path) -> bool {
        false
    }
}

/// Strategy for ordinary data directories: everything except the lock file,
/// hidden files and temp droppings is collection data; `log.txt` is
/// housekeeping and writable without a lock.
#[derive(Debug, Clone)]
pub struct DefaultStrategy {
    unlocked: Vec<String>,
}

pub(crate) const LOCK_FILENAME: &str = ".dirbridge.lock";

const DEFAULT_EXCLUDES: &[&str] = &["log.txt"];

impl DefaultStrategy {
    pub fn new() -> Self {
        DefaultStrategy {
            unlocked: DEFAULT_EXCLUDES.iter().map(|s| s.to_string()).collect(),
        }
    }

    /// Extend the set of files writable without a write lock.
    pub fn with_unlocked<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unlocked.extend(names.into_iter().map(Into::into));
        self
    }
}

impl Default for DefaultStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl CollectionStrategy for DefaultStrategy {
    fn includes(&self, name: &str) -> bool {
        if name.split('/').any(|part| part.starts_with('.')) {
            return false;
        }
        let base = name.rsplit('/').next().unwrap_or(name);
        if base == LOCK_FILENAME {
            return false;
        }
        if base.ends_with(".tmp") || base.ends_with('~') {
            return false;
        }
        true
    }

    fn default_excluded_files(&self) -> &[&str] {
        DEFAULT_EXCLUDES
    }

    fn lock_filename(&self) -> &str {
        LOCK_FILENAME
    }

    fn is_unlocked(&self, name: &str) -> bool {
        self.unlocked.iter().any(|f| f == name)
    }
}
