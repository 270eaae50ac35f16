//! Metadata sidecar for a bridged cache directory.
//!
//! One tiny file per key under a `.dirbridge/` subdirectory, so the values
//! survive process restarts and stay out of the synced resource space
//! (dotted names are filtered by the collection strategy).

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use tracing::debug;

pub(crate) const META_DIR: &str = ".dirbridge";

const GUID_KEY: &str = "guid";
const OFFLINE_KEY: &str = "offline";
const SYNC_STAMP_KEY: &str = "syncstamp";

pub(crate) struct Metadata {
    dir: PathBuf,
}

impl Metadata {
    pub(crate) fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Metadata {
            dir: cache_dir.into().join(META_DIR),
        }
    }

    fn read(&self, key: &str) -> Option<String> {
        match fs::read_to_string(self.dir.join(key)) {
            Ok(text) => Some(text.trim().to_string()),
            Err(e) => {
                if e.kind() != io::ErrorKind::NotFound {
                    debug!(key, error = %e, "could not read metadata key");
                }
                None
            }
        }
    }

    fn write(&self, key: &str, value: &str) -> io::Result<()> {
        fs::create_dir_all(&self.dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        writeln!(tmp, "{value}")?;
        tmp.as_file().sync_all()?;
        tmp.persist(self.dir.join(key)).map_err(|e| e.error)?;
        Ok(())
    }

    /// Stable identifier for this working copy, minted on first use.
    pub(crate) fn guid(&self) -> io::Result<String> {
        if let Some(guid) = self.read(GUID_KEY) {
            if !guid.is_empty() {
                return Ok(guid);
            }
        }
        let guid = uuid::Uuid::new_v4().to_string();
        self.write(GUID_KEY, &guid)?;
        Ok(guid)
    }

    pub(crate) fn offline(&self) -> bool {
        self.read(OFFLINE_KEY).as_deref() == Some("true")
    }

    pub(crate) fn set_offline(&self, offline: bool) -> io::Result<()> {
        self.write(OFFLINE_KEY, if offline { "true" } else { "false" })
    }

    /// Timestamp of the last completed sync, ms since the epoch.
    pub(crate) fn last_sync(&self) -> Option<i64> {
        self.read(SYNC_STAMP_KEY).and_then(|v| v.parse().ok())
    }

    pub(crate) fn set_last_sync(&self, stamp: i64) -> io::Result<()> {
        self.write(SYNC_STAMP_KEY, &stamp.to_string())
    }
}
