//! Import directories: read-mostly views of data published by someone
//! else. Consumers never take the write lock; the only writes allowed are
//! to the strategy's unlocked housekeeping files.

mod bridged;
mod cached;
mod caching_local;
mod dynamic;
mod local;

pub use bridged::BridgedImportDirectory;
pub use cached::CachedImportDirectory;
pub use caching_local::CachingLocalImportDirectory;
pub use dynamic::DynamicImportDirectory;
pub use local::LocalImportDirectory;

use std::io::Read;
use std::path::PathBuf;

use crate::errors::{LockError, SyncError, SyncResult};

pub trait ImportDirectory: Send + Sync {
    fn description(&self) -> String;

    /// Where readers find the imported files. Owned, because delegating
    /// implementations can change their backing directory over time.
    fn directory(&self) -> PathBuf;

    /// Refresh the view from its origin. Implementations for which the
    /// origin is currently unreachable keep serving stale content.
    fn update(&self) -> SyncResult<()>;

    fn validate(&self) -> SyncResult<()>;

    /// Write one of the unlocked housekeeping files. Any other name is
    /// refused with [`LockError::NotLocked`].
    fn write_unlocked_file(&self, name: &str, data: &mut dyn Read) -> SyncResult<()>;

    fn delete_unlocked_file(&self, name: &str) -> SyncResult<()>;

    /// For delegating implementations: whether the current delegate is a
    /// fallback that should be replaced when something better appears.
    /// `None` means "not a delegating directory".
    fn is_bad_delegate(&self) -> Option<bool> {
        None
    }
}

pub(crate) fn require_unlocked(
    strategy: &dyn crate::collection::CollectionStrategy,
    name: &str,
) -> SyncResult<()> {
    if strategy.is_unlocked(name) {
        Ok(())
    } else {
        Err(SyncError::Lock(LockError::NotLocked))
    }
}
