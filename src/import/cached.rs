//! Last-resort import directory: a cache directory left behind by some
//! earlier session, with no way to refresh it. Always reports itself as a
//! bad delegate so a dynamic wrapper keeps looking for something better.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::debug;

use crate::collection::{CollectionStrategy, FileCollection, ResourceCollection};
use crate::errors::SyncResult;

use super::{require_unlocked, ImportDirectory};

pub struct CachedImportDirectory {
    origin_description: String,
    cache_dir: PathBuf,
    strategy: Arc<dyn CollectionStrategy>,
    collection: FileCollection,
}

impl CachedImportDirectory {
    pub fn new(
        origin_description: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        strategy: Arc<dyn CollectionStrategy>,
    ) -> Self {
        let cache_dir = cache_dir.into();
        let collection = FileCollection::new(&cache_dir, Arc::clone(&strategy));
        CachedImportDirectory {
            origin_description: origin_description.into(),
            cache_dir,
            strategy,
            collection,
        }
    }
}

impl ImportDirectory for CachedImportDirectory {
    fn description(&self) -> String {
        format!("{} (stale cache)", self.origin_description)
    }

    fn directory(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    fn update(&self) -> SyncResult<()> {
        // Nothing to refresh from; the cache is all there is.
        debug!(origin = %self.origin_description, "serving stale cached import");
        Ok(())
    }

    fn validate(&self) -> SyncResult<()> {
        Ok(self.collection.validate()?)
    }

    fn write_unlocked_file(&self, name: &str, data: &mut dyn Read) -> SyncResult<()> {
        require_unlocked(self.strategy.as_ref(), name)?;
        self.collection.write_resource(name, 0, data)?;
        Ok(())
    }

    fn delete_unlocked_file(&self, name: &str) -> SyncResult<()> {
        require_unlocked(self.strategy.as_ref(), name)?;
        Ok(self.collection.delete_resource(name)?)
    }

    fn is_bad_delegate(&self) -> Option<bool> {
        Some(true)
    }
}
