//! Resource collections: named sets of byte-stream resources with a
//! last-modified time and a checksum. A local directory is the canonical
//! backing store; the sync engine talks to a remote counterpart through
//! the same listing/diff vocabulary.

mod diff;
mod file;
pub mod hash;
mod listing;
mod strategy;

pub use diff::CollectionDiff;
pub use file::FileCollection;
pub use listing::{CollectionListing, ResourceInfo};
pub use strategy::{CollectionStrategy, DefaultStrategy};

use std::io::{self, Read};

/// A named set of resources. Implemented by the local filesystem store and
/// exercised by the sync engine; an alternate implementation with the same
/// contract could serve compressed working copies.
pub trait ResourceCollection: Send + Sync {
    /// Human-readable description (directory path or URL).
    fn description(&self) -> String;

    /// Check that the backing store is usable right now.
    fn validate(&self) -> io::Result<()>;

    /// Names of all resources currently present, per the strategy's filter.
    fn list_resource_names(&self) -> Vec<String>;

    /// Last-modified time in ms since the epoch; 0 means "does not exist".
    fn last_modified(&self, name: &str) -> i64;

    /// Content checksum, or None if unknown/unreadable/nonexistent.
    fn checksum(&self, name: &str) -> Option<u64>;

    /// Open a resource for reading. Ok(None) when the name is rejected or
    /// the resource does not exist.
    fn open_resource(&self, name: &str) -> io::Result<Option<Box<dyn Read + Send>>>;

    /// Atomically replace a resource's contents. A positive `mod_time` is
    /// applied to the file; otherwise the filesystem clock wins. Returns
    /// false when the name is rejected by the collection's strategy.
    fn write_resource(&self, name: &str, mod_time: i64, data: &mut dyn Read) -> io::Result<bool>;

    /// Delete a resource. Deleting a nonexistent resource is not an error.
    fn delete_resource(&self, name: &str) -> io::Result<()>;

    /// Discard cached file metadata so the next listing rechecks the disk.
    fn invalidate_cache(&self);

    /// Snapshot the collection into a listing, keeping only names accepted
    /// by `keep`.
    fn listing(&self, keep: &dyn Fn(&str) -> bool) -> CollectionListing {
        let mut out = CollectionListing::default();
        for name in self.list_resource_names() {
            if !keep(&name) {
                continue;
            }
            let last_modified = self.last_modified(&name);
            if last_modified <= 0 {
                continue;
            }
            out.insert(
                name.clone(),
                ResourceInfo {
                    last_modified,
                    checksum: self.checksum(&name),
                },
            );
        }
        out
    }
}

/// Reject names that could escape the collection directory or that use a
/// platform-specific separator. Names are forward-slash relative paths.
pub(crate) fn check_resource_name(name: &str) -> bool {
    if name.is_empty() {
        return false;
    }
    if name.contains('\\') || name.contains(':') || name.contains("..") {
        return false;
    }
    !name.starts_with('/')
}
