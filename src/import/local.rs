//! Import directory read straight from a local (or reliably mounted) path.

use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use crate::collection::{CollectionStrategy, FileCollection, ResourceCollection};
use crate::errors::SyncResult;

use super::{require_unlocked, ImportDirectory};

pub struct LocalImportDirectory {
    directory: PathBuf,
    strategy: Arc<dyn CollectionStrategy>,
    collection: FileCollection,
}

impl LocalImportDirectory {
    pub fn new(directory: impl Into<PathBuf>, strategy: Arc<dyn CollectionStrategy>) -> Self {
        let directory = directory.into();
        let collection = FileCollection::new(&directory, Arc::clone(&strategy));
        LocalImportDirectory {
            directory,
            strategy,
            collection,
        }
    }
}

impl ImportDirectory for LocalImportDirectory {
    fn description(&self) -> String {
        self.directory.display().to_string()
    }

    fn directory(&self) -> PathBuf {
        self.directory.clone()
    }

    fn update(&self) -> SyncResult<()> {
        self.collection.invalidate_cache();
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
}
