//! Explicit construction context for working and import directories.
//!
//! One context owns the user's identity, the cache location, and the
//! instance caches, so two parts of an application asking for the same
//! location share one directory object (and therefore one lock and one
//! background worker). Locations are remapped and canonicalized before
//! they are used as cache keys.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info};

use crate::collection::{hash, CollectionStrategy, DefaultStrategy};
use crate::errors::{SyncError, SyncResult};
use crate::import::{
    BridgedImportDirectory, CachedImportDirectory, CachingLocalImportDirectory,
    DynamicImportDirectory, ImportDirectory, LocalImportDirectory,
};
use crate::sync::BridgeClient;
use crate::workdir::{BridgedWorkingDirectory, LocalWorkingDirectory, WorkingDirectory};

use super::ServerSelector;

/// Oldest server protocol this client will talk to.
pub const MIN_SERVER_VERSION: &str = "1.0";

pub struct DirectoryContext {
    strategy: Arc<dyn CollectionStrategy>,
    user_name: String,
    user_id: String,
    cache_base: Option<PathBuf>,
    default_server: Option<String>,
    selector: ServerSelector,
    remappings: Mutex<Vec<(String, String)>>,
    workdirs: Mutex<HashMap<String, Arc<dyn WorkingDirectory>>>,
    imports: Mutex<HashMap<String, Arc<dyn ImportDirectory>>>,
    chosen: Mutex<HashMap<String, String>>,
}

impl DirectoryContext {
    pub fn new(user_name: &str, user_id: &str) -> Self {
        DirectoryContext {
            strategy: Arc::new(DefaultStrategy::new()),
            user_name: user_name.to_string(),
            user_id: user_id.to_string(),
            cache_base: None,
            default_server: None,
            selector: ServerSelector::new(MIN_SERVER_VERSION),
            remappings: Mutex::new(Vec::new()),
            workdirs: Mutex::new(HashMap::new()),
            imports: Mutex::new(HashMap::new()),
            chosen: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_strategy(mut self, strategy: Arc<dyn CollectionStrategy>) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the platform cache dir, mainly for tests and portable
    /// installs.
    pub fn with_cache_base(mut self, base: impl Into<PathBuf>) -> Self {
        self.cache_base = Some(base.into());
        self
    }

    /// Base URL of a server that may host collections the configured
    /// locations migrated to. Candidate lists are extended with URLs
    /// derived from it.
    pub fn with_default_server(mut self, base_url: impl Into<String>) -> Self {
        self.default_server = Some(base_url.into());
        self
    }

    /// Register a location rewrite, e.g. an old server name to its
    /// replacement. Applied by longest matching prefix.
    pub fn add_remapping(&self, from: impl Into<String>, to: impl Into<String>) {
        let mut maps = self.remappings.lock().unwrap();
        maps.push((from.into(), to.into()));
        maps.sort_by_key(|(from, _)| std::cmp::Reverse(from.len()));
    }

    pub fn remap(&self, location: &str) -> String {
        for (from, to) in self.remappings.lock().unwrap().iter() {
            if let Some(rest) = location.strip_prefix(from.as_str()) {
                debug!(location, from = from.as_str(), "remapped location");
                return format!("{to}{rest}");
            }
        }
        location.to_string()
    }

    fn canonical_key(&self, location: &str) -> String {
        if ServerSelector::is_url_format(location) {
            return location.trim_end_matches('/').to_string();
        }
        let path = Path::new(location);
        dunce::canonicalize(path)
            .unwrap_or_else(|_| path.to_path_buf())
            .to_string_lossy()
            .into_owned()
    }

    fn cache_root(&self) -> PathBuf {
        self.cache_base
            .clone()
            .or_else(dirs::cache_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("dirbridge")
    }

    fn import_cache_dir(&self, location: &str) -> PathBuf {
        let digest = hash::bytes_checksum(location.as_bytes());
        self.cache_root().join("import").join(format!("{digest:016x}"))
    }

    /// URLs the default server might host each candidate under: the last
    /// path segment for a URL that moved, or a server-side location token
    /// (falling back to the directory name) for a filesystem path.
    fn default_server_candidates(&self, locations: &[String]) -> Vec<String> {
        let Some(base) = self.default_server.as_deref() else {
            return Vec::new();
        };
        let base = base.trim_end_matches('/');
        let mut derived = Vec::new();
        for location in locations {
            if ServerSelector::is_url_format(location) {
                if location.starts_with(base) {
                    continue;
                }
                if let Some(id) = location.trim_end_matches('/').rsplit('/').next() {
                    if !id.is_empty() {
                        derived.push(format!("{base}/{id}"));
                    }
                }
            } else if let Some(name) = Path::new(location).file_name().and_then(|n| n.to_str()) {
                let token = BridgeClient::lookup_location_token(base, name)
                    .unwrap_or_else(|_| name.to_string());
                derived.push(ServerSelector::collection_url(base, &token));
            }
        }
        derived
    }

    /// Pick the location to use from an ordered candidate list: the
    /// fastest responding server if any candidate is a URL, otherwise the
    /// first path that exists. A successful choice is remembered for the
    /// lifetime of the context.
    fn choose_location(&self, locations: &[String]) -> Option<String> {
        let memo_key = locations.join("|");
        if let Some(found) = self.chosen.lock().unwrap().get(&memo_key) {
            return Some(found.clone());
        }

        let mut urls: Vec<String> = locations
            .iter()
            .filter(|l| ServerSelector::is_url_format(l))
            .cloned()
            .collect();
        for candidate in self.default_server_candidates(locations) {
            if !urls.contains(&candidate) {
                urls.push(candidate);
            }
        }
        let mut choice = self.selector.select(&urls).map(|probe| probe.url);
        if choice.is_none() {
            choice = locations
                .iter()
                .find(|l| !ServerSelector::is_url_format(l) && Path::new(l.as_str()).is_dir())
                .cloned();
        }
        if choice.is_none() {
            // No candidate is reachable right now; an unverified server URL
            // still lets offline-enabled callers proceed from their cache.
            choice = urls.first().cloned();
        }

        if let Some(found) = &choice {
            info!(location = found.as_str(), "selected directory location");
            self.chosen
                .lock()
                .unwrap()
                .insert(memo_key, found.clone());
        }
        choice
    }

    /// A shared working directory for the first usable candidate location.
    pub fn working_directory(
        &self,
        locations: &[String],
    ) -> SyncResult<Arc<dyn WorkingDirectory>> {
        let locations: Vec<String> = locations.iter().map(|l| self.remap(l)).collect();
        let location = self
            .choose_location(&locations)
            .ok_or_else(|| SyncError::Protocol("no usable working directory location".into()))?;

        let key = self.canonical_key(&location);
        let mut cache = self.workdirs.lock().unwrap();
        if let Some(existing) = cache.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let workdir: Arc<dyn WorkingDirectory> = if ServerSelector::is_url_format(&location) {
            Arc::new(BridgedWorkingDirectory::new(
                location,
                Arc::clone(&self.strategy),
                &self.user_name,
                &self.user_id,
                Some(self.cache_root()),
            )?)
        } else {
            Arc::new(LocalWorkingDirectory::new(
                PathBuf::from(&location),
                Arc::clone(&self.strategy),
            ))
        };
        cache.insert(key, Arc::clone(&workdir));
        Ok(workdir)
    }

    fn resolve_import(
        &self,
        locations: &[String],
        base: Option<&Path>,
    ) -> SyncResult<Arc<dyn ImportDirectory>> {
        for location in locations {
            if ServerSelector::is_url_format(location) {
                return Ok(Arc::new(BridgedImportDirectory::new(
                    location.clone(),
                    self.import_cache_dir(location),
                    Arc::clone(&self.strategy),
                )?));
            }
            if is_share_path(location) {
                // Network shares read slowly and drop out; serve them
                // through a local mirror.
                return Ok(Arc::new(CachingLocalImportDirectory::new(
                    resolve_path(location, base),
                    self.import_cache_dir(location),
                    Arc::clone(&self.strategy),
                )?));
            }
            let path = resolve_path(location, base);
            if path.is_dir() {
                return Ok(Arc::new(LocalImportDirectory::new(
                    path,
                    Arc::clone(&self.strategy),
                )));
            }
        }

        // Nothing reachable. Fall back to a stale cache if any candidate
        // left one behind.
        for location in locations {
            let cache_dir = self.import_cache_dir(location);
            if cache_dir.is_dir() {
                return Ok(Arc::new(CachedImportDirectory::new(
                    location.clone(),
                    cache_dir,
                    Arc::clone(&self.strategy),
                )));
            }
        }
        Err(SyncError::Protocol(
            "no usable import directory location".into(),
        ))
    }

    /// A shared import directory for the candidate location list.
    /// `base` anchors `./`-relative candidates to a working directory.
    pub fn import_directory(
        self: &Arc<Self>,
        locations: &[String],
        base: Option<&Path>,
    ) -> SyncResult<Arc<dyn ImportDirectory>> {
        let locations: Vec<String> = locations.iter().map(|l| self.remap(l)).collect();
        let key = format!(
            "{}@{}",
            locations.join("|"),
            base.map(|b| b.display().to_string()).unwrap_or_default()
        );
        let mut cache = self.imports.lock().unwrap();
        if let Some(existing) = cache.get(&key) {
            return Ok(Arc::clone(existing));
        }

        let delegate = self.resolve_import(&locations, base)?;
        let import: Arc<dyn ImportDirectory> = if delegate.is_bad_delegate() == Some(true) {
            let ctx = Arc::clone(self);
            let resolver_locations = locations.clone();
            let resolver_base = base.map(Path::to_path_buf);
            Arc::new(DynamicImportDirectory::new(
                locations.join("|"),
                delegate,
                Box::new(move || {
                    ctx.resolve_import(&resolver_locations, resolver_base.as_deref())
                }),
            ))
        } else {
            delegate
        };
        cache.insert(key, Arc::clone(&import));
        Ok(import)
    }
}

/// UNC or POSIX-style network share paths.
fn is_share_path(location: &str) -> bool {
    location.starts_with("\\\\") || location.starts_with("//")
}

fn resolve_path(location: &str, base: Option<&Path>) -> PathBuf {
    if let Some(base) = base {
        if let Some(rest) = location.strip_prefix("./") {
            return base.join(rest);
        }
    }
    PathBuf::from(location)
}
