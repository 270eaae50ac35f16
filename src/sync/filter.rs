//! Sync filters: per-name vetoes applied to a computed diff before acting
//! on it.

use std::path::PathBuf;
use std::sync::Arc;

use crate::collection::CollectionStrategy;

/// Decides whether one resource should take part in a sync operation.
/// `local_ts`/`remote_ts` are millisecond timestamps, 0 for "absent".
pub trait SyncFilter: Send + Sync {
    fn should_sync(&self, name: &str, local_ts: i64, remote_ts: i64) -> bool;
}

/// The default filter: everything syncs.
pub struct SyncAll;

impl SyncFilter for SyncAll {
    fn should_sync(&self, _name: &str, _local_ts: i64, _remote_ts: i64) -> bool {
        true
    }
}

/// Recovery filter for a sync-down over a directory that may hold unsaved
/// local edits, e.g. after a crash before the edits were flushed.
///
/// A file modified locally after the last completed sync is kept only
/// while the server copy is untouched since that sync. If the server copy
/// has moved past the sync stamp too, the server wins. A kept file still
/// loses to the server when it fails the strategy's corruption probe.
pub struct SyncDownFilter {
    directory: PathBuf,
    strategy: Arc<dyn CollectionStrategy>,
    last_sync: i64,
}

impl SyncDownFilter {
    pub fn new(
        directory: impl Into<PathBuf>,
        strategy: Arc<dyn CollectionStrategy>,
        last_sync: i64,
    ) -> Self {
        SyncDownFilter {
            directory: directory.into(),
            strategy,
            last_sync,
        }
    }
}

impl SyncFilter for SyncDownFilter {
    fn should_sync(&self, name: &str, local_ts: i64, remote_ts: i64) -> bool {
        if local_ts <= 0 {
            // nothing local to protect
            return true;
        }
        if remote_ts <= 0 {
            // remote copy is gone; protect local edits made after the
            // last sync, let anything older be deleted
            return local_ts <= self.last_sync;
        }
        if remote_ts <= self.last_sync {
            // server copy untouched since the last sync; keep the local
            // copy unless it looks damaged
            return self.strategy.is_possibly_corrupt(&self.directory.join(name));
        }
        // server copy changed since the last sync; server wins
        true
    }
}
