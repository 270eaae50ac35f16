//! Import directory served from a bridge server, cached locally so reads
//! keep working when the server is away.

use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::warn;

use crate::collection::{CollectionStrategy, FileCollection, ResourceCollection};
use crate::errors::{SyncError, SyncResult};
use crate::sync::{BridgeClient, SyncAll};

use super::{require_unlocked, ImportDirectory};

pub struct BridgedImportDirectory {
    remote_url: String,
    cache_dir: PathBuf,
    strategy: Arc<dyn CollectionStrategy>,
    collection: Arc<FileCollection>,
    client: BridgeClient,
}

impl BridgedImportDirectory {
    pub fn new(
        remote_url: impl Into<String>,
        cache_dir: impl Into<PathBuf>,
        strategy: Arc<dyn CollectionStrategy>,
    ) -> SyncResult<Self> {
        let remote_url = remote_url.into();
        let cache_dir = cache_dir.into();
        std::fs::create_dir_all(&cache_dir)?;
        let collection = Arc::new(FileCollection::new(&cache_dir, Arc::clone(&strategy)));
        let client = BridgeClient::new(
            remote_url.clone(),
            Arc::clone(&collection) as Arc<dyn ResourceCollection>,
            Arc::clone(&strategy),
            "import",
            "import",
        )?;
        Ok(BridgedImportDirectory {
            remote_url,
            cache_dir,
            strategy,
            collection,
            client,
        })
    }
}

impl ImportDirectory for BridgedImportDirectory {
    fn description(&self) -> String {
        self.remote_url.clone()
    }

    fn directory(&self) -> PathBuf {
        self.cache_dir.clone()
    }

    fn update(&self) -> SyncResult<()> {
        match self.client.sync_down(&SyncAll) {
            Ok(_) => Ok(()),
            Err(SyncError::Http(e)) => {
                // Stale beats empty for an import.
                warn!(url = %self.remote_url, error = %e,
                      "import refresh failed; serving cached copy");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn validate(&self) -> SyncResult<()> {
        // Unlike update, validation insists on a live server; a stale
        // cache is not proof the source still exists.
        self.collection.validate()?;
        self.client.sync_down(&SyncAll)?;
        Ok(())
    }

    fn write_unlocked_file(&self, name: &str, data: &mut dyn Read) -> SyncResult<()> {
        require_unlocked(self.strategy.as_ref(), name)?;
        let mut bytes = Vec::new();
        data.read_to_end(&mut bytes)?;
        BridgeClient::upload_single_file(&self.remote_url, name, Cursor::new(bytes.clone()))?;
        self.collection
            .write_resource(name, 0, &mut Cursor::new(bytes))?;
        Ok(())
    }

    fn delete_unlocked_file(&self, name: &str) -> SyncResult<()> {
        require_unlocked(self.strategy.as_ref(), name)?;
        BridgeClient::delete_single_file(&self.remote_url, name)?;
        self.collection.delete_resource(name)?;
        Ok(())
    }
}
