//! Directory-backed resource collection.
//!
//! File metadata (mtime, checksum) is cached briefly so a listing pass over
//! a few hundred resources does not rehash every file; the cache entry is
//! rechecked against the on-disk mtime after a short window, and a checksum
//! is only trusted once the mtime reads the same before and after hashing.

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use filetime::FileTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

use super::hash::resource_checksum;
use super::strategy::CollectionStrategy;
use super::{check_resource_name, ResourceCollection};

/// How long a cached (mtime, checksum) pair is trusted before rechecking
/// the file on disk.
const CACHE_RECHECK_MS: i64 = 5_000;

#[derive(Debug, Clone, Copy)]
struct CachedFileData {
    last_modified: i64,
    checksum: Option<u64>,
    cached_at: i64,
}

/// A resource collection stored as plain files under a directory.
/// Resource names are forward-slash relative paths.
pub struct FileCollection {
    directory: PathBuf,
    strategy: Arc<dyn CollectionStrategy>,
    cache: Mutex<HashMap<String, CachedFileData>>,
    invalidated_at: AtomicI64,
}

impl FileCollection {
    pub fn new(directory: impl Into<PathBuf>, strategy: Arc<dyn CollectionStrategy>) -> Self {
        FileCollection {
            directory: directory.into(),
            strategy,
            cache: Mutex::new(HashMap::new()),
            invalidated_at: AtomicI64::new(0),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn strategy(&self) -> &Arc<dyn CollectionStrategy> {
        &self.strategy
    }

    fn resolve(&self, name: &str) -> Option<PathBuf> {
        if !check_resource_name(name) || !self.strategy.includes(name) {
            return None;
        }
        Some(self.directory.join(name))
    }

    fn file_data(&self, name: &str) -> CachedFileData {
        let now = now_ms();
        let invalidated = self.invalidated_at.load(Ordering::Acquire);
        {
            let cache = self.cache.lock().unwrap();
            if let Some(entry) = cache.get(name) {
                if entry.cached_at > invalidated && now - entry.cached_at < CACHE_RECHECK_MS {
                    return *entry;
                }
            }
        }

        let data = self.read_file_data(name);
        self.cache.lock().unwrap().insert(name.to_string(), data);
        data
    }

    fn read_file_data(&self, name: &str) -> CachedFileData {
        let gone = CachedFileData {
            last_modified: 0,
            checksum: None,
            cached_at: now_ms(),
        };
        let Some(path) = self.resolve(name) else {
            return gone;
        };

        // Hash only once the mtime reads the same before and after; a file
        // being rewritten underneath us would otherwise cache a checksum
        // that matches neither version.
        for _ in 0..5 {
            let Some(before) = mtime_ms(&path) else {
                return gone;
            };
            let checksum = match resource_checksum(&path) {
                Ok(c) => Some(c),
                Err(e) => {
                    debug!(name, error = %e, "could not checksum resource");
                    None
                }
            };
            match mtime_ms(&path) {
                Some(after) if after == before => {
                    return CachedFileData {
                        last_modified: before,
                        checksum,
                        cached_at: now_ms(),
                    };
                }
                Some(_) => continue,
                None => return gone,
            }
        }
        warn!(name, "resource kept changing while being checksummed");
        match mtime_ms(&path) {
            Some(ts) => CachedFileData {
                last_modified: ts,
                checksum: None,
                cached_at: now_ms(),
            },
            None => gone,
        }
    }
}

impl ResourceCollection for FileCollection {
    fn description(&self) -> String {
        self.directory.display().to_string()
    }

    fn validate(&self) -> io::Result<()> {
        let meta = fs::metadata(&self.directory)?;
        if !meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", self.directory.display()),
            ));
        }
        Ok(())
    }

    fn list_resource_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.directory)
            .follow_links(false)
            .into_iter()
            .filter_map(Result::ok)
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(&self.directory) else {
                continue;
            };
            let name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            if check_resource_name(&name) && self.strategy.includes(&name) {
                names.push(name);
            }
        }
        names.sort();
        names
    }

    fn last_modified(&self, name: &str) -> i64 {
        self.file_data(name).last_modified
    }

    fn checksum(&self, name: &str) -> Option<u64> {
        self.file_data(name).checksum
    }

    fn open_resource(&self, name: &str) -> io::Result<Option<Box<dyn Read + Send>>> {
        let Some(path) = self.resolve(name) else {
            return Ok(None);
        };
        match File::open(&path) {
            Ok(file) => Ok(Some(Box::new(file))),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_resource(&self, name: &str, mod_time: i64, data: &mut dyn Read) -> io::Result<bool> {
        let Some(path) = self.resolve(name) else {
            return Ok(false);
        };
        let parent = path
            .parent()
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "resource has no parent"))?;
        fs::create_dir_all(parent)?;

        let mut tmp = tempfile::Builder::new()
            .prefix(".dirbridge-")
            .suffix(".tmp")
            .tempfile_in(parent)?;
        io::copy(data, tmp.as_file_mut())?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path).map_err(|e| e.error)?;

        if mod_time > 0 {
            let ft = FileTime::from_unix_time(mod_time / 1000, ((mod_time % 1000) * 1_000_000) as u32);
            filetime::set_file_mtime(&path, ft)?;
        }
        // Directory durability is best-effort; the data file itself is synced.
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }

        self.cache.lock().unwrap().remove(name);
        Ok(true)
    }

    fn delete_resource(&self, name: &str) -> io::Result<()> {
        let Some(path) = self.resolve(name) else {
            return Ok(());
        };
        match fs::remove_file(&path) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        self.cache.lock().unwrap().remove(name);
        Ok(())
    }

    fn invalidate_cache(&self) {
        self.invalidated_at.store(now_ms(), Ordering::Release);
    }
}

fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn mtime_ms(path: &Path) -> Option<i64> {
    let meta = fs::metadata(path).ok()?;
    let ft = FileTime::from_last_modification_time(&meta);
    Some(ft.unix_seconds() * 1000 + i64::from(ft.nanoseconds()) / 1_000_000)
}
