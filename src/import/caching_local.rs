//! Import directory mirroring a directory on a network share into a local
//! cache. Readers always use the cache, so a dropped share slows nothing
//! down; `update` diffs the two sides and copies only what changed, in
//! parallel.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::collection::{
    CollectionDiff, CollectionStrategy, FileCollection, ResourceCollection,
};
use crate::errors::SyncResult;

use super::{require_unlocked, ImportDirectory};

pub struct CachingLocalImportDirectory {
    origin_dir: PathBuf,
    cache_dir: PathBuf,
    strategy: Arc<dyn CollectionStrategy>,
    origin: FileCollection,
    cache: FileCollection,
}

impl CachingLocalImportDirectory {
    pub fn new(
        origin_dir: impl Into<PathBuf>,
        cache_dir: impl Into<PathBuf>,
        strategy: Arc<dyn CollectionStrategy>,
    ) -> SyncResult<Self> {
        let origin_dir = origin_dir.into();
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        Ok(CachingLocalImportDirectory {
            origin: FileCollection::new(&origin_dir, Arc::clone(&strategy)),
            cache: FileCollection::new(&cache_dir, Arc::clone(&strategy)),
            origin_dir,
            cache_dir,
            strategy,
        })
    }

    fn mirror(&self) -> SyncResult<()> {
        let keep = |_: &str| true;
        let diff = CollectionDiff::compute(self.cache.listing(&keep), self.origin.listing(&keep));

        for name in diff.only_in_local() {
            debug!(name, "removing cached file gone from origin");
            self.cache.delete_resource(name)?;
        }

        let to_copy: Vec<&String> =
            diff.only_in_remote().iter().chain(diff.differing()).collect();
        let failures: Vec<String> = to_copy
            .par_iter()
            .filter_map(|name| {
                let result = (|| -> std::io::Result<()> {
                    let Some(mut data) = self.origin.open_resource(name)? else {
                        return Ok(());
                    };
                    let mod_time = self.origin.last_modified(name);
                    self.cache.write_resource(name, mod_time, &mut data)?;
                    Ok(())
                })();
                match result {
                    Ok(()) => None,
                    Err(e) => {
                        warn!(name = name.as_str(), error = %e, "could not mirror file");
                        Some((*name).clone())
                    }
                }
            })
            .collect();

        self.cache.invalidate_cache();
        if !failures.is_empty() {
            warn!(count = failures.len(), "some files could not be mirrored");
        }
        Ok(())
    }
}

impl ImportDirectory for CachingLocalImportDirectory {
    fn description(&self) -> String {
        format!(
            "{} (mirrored at {})",
            self.origin_dir.display(),
            self.cache_dir.display()
        )
    }

    fn directory(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    fn update(&self) -> SyncResult<()> {
        if self.origin.validate().is_err() {
            // Share is away; keep serving the mirror.
            warn!(origin = %self.origin_dir.display(),
                  "origin unreachable; serving mirrored copy");
            return Ok(());
        }
        self.origin.invalidate_cache();
        self.mirror()
    }

    fn validate(&self) -> SyncResult<()> {
        // Unlike update, validation insists on a live origin share.
        self.origin.validate()?;
        Ok(self.cache.validate()?)
    }

    fn write_unlocked_file(&self, name: &str, data: &mut dyn Read) -> SyncResult<()> {
        require_unlocked(self.strategy.as_ref(), name)?;
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;
        self.origin
            .write_resource(name, 0, &mut std::io::Cursor::new(&bytes))?;
        self.cache
            .write_resource(name, 0, &mut std::io::Cursor::new(&bytes))?;
        Ok(())
    }

    fn delete_unlocked_file(&self, name: &str) -> SyncResult<()> {
        require_unlocked(self.strategy.as_ref(), name)?;
        self.origin.delete_resource(name)?;
        Ok(self.cache.delete_resource(name)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::DefaultStrategy;
    use std::io::Cursor;

    fn pair() -> (tempfile::TempDir, tempfile::TempDir, CachingLocalImportDirectory) {
        let origin = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let dir = CachingLocalImportDirectory::new(
            origin.path(),
            cache.path().join("mirror"),
            Arc::new(DefaultStrategy::new()),
        )
        .unwrap();
        (origin, cache, dir)
    }

    #[test]
    fn update_mirrors_new_changed_and_deleted_files() {
        let (origin, _cache, dir) = pair();
        let origin_files = FileCollection::new(origin.path(), Arc::new(DefaultStrategy::new()));
        origin_files
            .write_resource("a.txt", 1_000, &mut Cursor::new(b"one"))
            .unwrap();
        origin_files
            .write_resource("sub/b.txt", 2_000, &mut Cursor::new(b"two"))
            .unwrap();

        dir.update().unwrap();
        assert!(dir.directory().join("a.txt").exists());
        assert!(dir.directory().join("sub/b.txt").exists());

        origin_files
            .write_resource("a.txt", 3_000, &mut Cursor::new(b"one-changed"))
            .unwrap();
        origin_files.delete_resource("sub/b.txt").unwrap();

        dir.update().unwrap();
        assert_eq!(
            std::fs::read_to_string(dir.directory().join("a.txt")).unwrap(),
            "one-changed"
        );
        assert!(!dir.directory().join("sub/b.txt").exists());
    }

    #[test]
    fn missing_origin_keeps_the_mirror() {
        let (origin, _cache, dir) = pair();
        let origin_files = FileCollection::new(origin.path(), Arc::new(DefaultStrategy::new()));
        origin_files
            .write_resource("a.txt", 1_000, &mut Cursor::new(b"one"))
            .unwrap();
        dir.update().unwrap();

        drop(origin);
        dir.update().unwrap();
        assert!(dir.directory().join("a.txt").exists());
        assert!(dir.validate().is_err());
    }
}
