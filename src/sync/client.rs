//! HTTP client for a bridge server hosting the authoritative copy of a
//! collection.
//!
//! All traffic goes through one endpoint URL with an `action` parameter.
//! Small requests travel as GET; requests whose URL would grow past the
//! length cap, and all uploads, travel as POST. Lock failures come back as
//! 409 plus a tagged header and surface as [`LockError`] values.

use std::io::Read;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reqwest::blocking::multipart::{Form, Part};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

use crate::collection::{
    hash::listing_hash, CollectionDiff, CollectionListing, CollectionStrategy, ResourceCollection,
};
use crate::errors::{LockError, SyncError, SyncResult};
use crate::lock::current_host;

use super::archive::{build_bundle, unpack_bundle};
use super::filter::SyncFilter;
use super::protocol::*;

/// Most names one download request may carry.
const DOWNLOAD_BATCH: usize = 450;
/// Most files one upload request may carry.
const UPLOAD_BATCH: usize = 100;

const HTTP_TIMEOUT: Duration = Duration::from_secs(60);

/// Callback the client invokes when the server-side offline lock status
/// changes.
pub type OfflineStatusListener = Box<dyn Fn(OfflineLockStatus) + Send>;

/// Client for one remote collection, bound to its local counterpart.
pub struct BridgeClient {
    http: Client,
    remote_url: String,
    local: Arc<dyn ResourceCollection>,
    strategy: Arc<dyn CollectionStrategy>,
    user_name: String,
    user_id: String,
    source_id: String,
    extra_lock_data: Mutex<Option<String>>,
    server_version: Mutex<Option<String>>,
    holds_lock: AtomicBool,
    offline_status: Mutex<OfflineLockStatus>,
    offline_listener: Mutex<Option<OfflineStatusListener>>,
    // Serializes the protocol conversation; the server tracks lock state
    // per session, so interleaved requests from one client confuse it.
    op_lock: Mutex<()>,
}

impl BridgeClient {
    pub fn new(
        remote_url: impl Into<String>,
        local: Arc<dyn ResourceCollection>,
        strategy: Arc<dyn CollectionStrategy>,
        user_name: &str,
        user_id: &str,
    ) -> SyncResult<Self> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        Ok(BridgeClient {
            http,
            remote_url: remote_url.into(),
            local,
            strategy,
            user_name: user_name.to_string(),
            user_id: truncated_user_id(user_id),
            source_id: current_host(),
            extra_lock_data: Mutex::new(None),
            server_version: Mutex::new(None),
            holds_lock: AtomicBool::new(false),
            offline_status: Mutex::new(OfflineLockStatus::Unsupported),
            offline_listener: Mutex::new(None),
            op_lock: Mutex::new(()),
        })
    }

    pub fn remote_url(&self) -> &str {
        &self.remote_url
    }

    /// The version the server reported on the most recent exchange.
    pub fn server_version(&self) -> Option<String> {
        self.server_version.lock().unwrap().clone()
    }

    /// Record the correlation value lock requests carry so the server can
    /// recognize this working directory across sessions. Must be set before
    /// resuming an offline lock or toggling offline mode.
    pub fn set_extra_lock_data(&self, data: impl Into<String>) {
        *self.extra_lock_data.lock().unwrap() = Some(data.into());
    }

    /// Whether this client believes it holds the server write lock.
    pub fn holds_lock(&self) -> bool {
        self.holds_lock.load(Ordering::SeqCst)
    }

    /// The server-side offline lock status as of the last lock exchange.
    pub fn offline_lock_status(&self) -> OfflineLockStatus {
        *self.offline_status.lock().unwrap()
    }

    /// Register the callback invoked whenever the offline lock status
    /// changes. Replaces any earlier listener.
    pub fn on_offline_status_change(
        &self,
        listener: impl Fn(OfflineLockStatus) + Send + 'static,
    ) {
        *self.offline_listener.lock().unwrap() = Some(Box::new(listener));
    }

    fn set_offline_status(&self, status: OfflineLockStatus) {
        {
            let mut current = self.offline_status.lock().unwrap();
            if *current == status {
                return;
            }
            *current = status;
        }
        debug!(url = %self.remote_url, ?status, "offline lock status changed");
        if let Some(listener) = self.offline_listener.lock().unwrap().as_ref() {
            listener(status);
        }
    }

    fn assert_lock_held(&self) -> Result<(), LockError> {
        if self.holds_lock.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(LockError::NotLocked)
        }
    }

    fn supports_zip_upload(&self) -> bool {
        self.server_version()
            .map(|v| version_at_least(&v, MIN_ZIP_UPLOAD_VERSION))
            .unwrap_or(false)
    }

    // ----- transport -------------------------------------------------

    fn request(&self, params: &[(&str, &str)]) -> SyncResult<Response> {
        let query: String = params
            .iter()
            .map(|(k, v)| format!("{k}={}", urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let url = format!("{}?{}", self.remote_url, query);

        let resp = if url.len() <= MAX_GET_URL_LENGTH {
            self.http.get(&url).send()?
        } else {
            self.http.post(&self.remote_url).form(params).send()?
        };
        self.check(resp)
    }

    fn post_multipart(&self, form: Form) -> SyncResult<Response> {
        let resp = self.http.post(&self.remote_url).multipart(form).send()?;
        self.check(resp)
    }

    fn check(&self, resp: Response) -> SyncResult<Response> {
        if let Some(v) = resp
            .headers()
            .get(SERVER_VERSION_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            *self.server_version.lock().unwrap() = Some(v.to_string());
        }

        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::CONFLICT {
            if let Some(tag) = resp
                .headers()
                .get(LOCK_ERROR_HEADER)
                .and_then(|v| v.to_str().ok())
            {
                return Err(SyncError::Lock(lock_error_from_tag(tag)));
            }
        }
        Err(SyncError::Protocol(format!(
            "server returned {status} for {}",
            self.remote_url
        )))
    }

    // ----- listings ---------------------------------------------------

    /// Combined listing hash from the server.
    pub fn hashcode(&self) -> SyncResult<u64> {
        let _op = self.op_lock.lock().unwrap();
        self.fetch_hashcode()
    }

    fn fetch_hashcode(&self) -> SyncResult<u64> {
        let body = self
            .request(&[(ACTION_PARAM, HASHCODE_ACTION)])?
            .text()?;
        body.trim()
            .parse()
            .map_err(|_| SyncError::Protocol(format!("bad hashcode reply: {body:?}")))
    }

    /// Full listing from the server.
    pub fn list(&self) -> SyncResult<CollectionListing> {
        let _op = self.op_lock.lock().unwrap();
        self.fetch_listing()
    }

    fn fetch_listing(&self) -> SyncResult<CollectionListing> {
        let body = self.request(&[(ACTION_PARAM, LIST_ACTION)])?.text()?;
        CollectionListing::parse_xml(&body).map_err(SyncError::from)
    }

    fn local_listing(&self) -> CollectionListing {
        let strategy = Arc::clone(&self.strategy);
        self.local
            .listing(&move |name| strategy.includes(name) && !strategy.is_default_excluded(name))
    }

    // ----- sync down --------------------------------------------------

    /// Make the local collection match the server. Returns true when
    /// anything changed locally.
    pub fn sync_down(&self, filter: &dyn SyncFilter) -> SyncResult<bool> {
        let _op = self.op_lock.lock().unwrap();
        self.local.validate()?;
        let local = self.local_listing();
        if self.fetch_hashcode()? == listing_hash(&local, self.strategy.as_ref()) {
            debug!(url = %self.remote_url, "collections already match");
            return Ok(false);
        }

        // Opportunistic first pass: grab everything the server modified
        // after our newest file, which usually covers the whole delta in
        // one request.
        let newest = local.most_recent_mod_time();
        if newest > 0 {
            let after = newest.to_string();
            let resp = self.request(&[
                (ACTION_PARAM, DOWNLOAD_ACTION),
                ("after", after.as_str()),
            ])?;
            let got = unpack_bundle(resp, self.local.as_ref())?;
            if !got.is_empty() {
                self.local.invalidate_cache();
            }
        }

        let local = self.local_listing();
        let remote = self.fetch_listing()?;
        let diff = CollectionDiff::compute(local, remote);

        let mut changed = false;
        for name in diff.only_in_local() {
            if filter.should_sync(name, diff.local().last_modified(name), 0) {
                info!(name, "deleting local file absent from server");
                self.local.delete_resource(name)?;
                changed = true;
            }
        }

        let mut wanted: Vec<&String> = Vec::new();
        for name in diff.only_in_remote().iter().chain(diff.differing()) {
            let local_ts = diff.local().last_modified(name);
            let remote_ts = diff.remote().last_modified(name);
            if filter.should_sync(name, local_ts, remote_ts) {
                wanted.push(name);
            }
        }
        for batch in wanted.chunks(DOWNLOAD_BATCH) {
            let mut params: Vec<(&str, &str)> = vec![(ACTION_PARAM, DOWNLOAD_ACTION)];
            params.extend(batch.iter().map(|n| (NAME_PARAM, n.as_str())));
            let resp = self.request(&params)?;
            let got = unpack_bundle(resp, self.local.as_ref())?;
            changed |= !got.is_empty();
        }

        self.local.invalidate_cache();
        Ok(changed)
    }

    // ----- sync up ----------------------------------------------------

    /// Make the server match the local collection. Requires the server
    /// write lock. Names on the strategy's unlocked list are brought into
    /// line the other way (the server copy wins for those). Names the
    /// caller's filter vetoes are left untouched on both sides. Returns
    /// true when either side changed.
    pub fn sync_up(&self, filter: &dyn SyncFilter) -> SyncResult<bool> {
        let _op = self.op_lock.lock().unwrap();
        self.assert_lock_held().map_err(SyncError::Lock)?;
        self.local.validate()?;
        let local = self.local_listing();
        let remote = self.fetch_listing()?;
        let diff = CollectionDiff::compute(local, remote);
        if diff.is_empty() {
            return Ok(false);
        }

        let mut upload: Vec<String> = Vec::new();
        let mut delete_remote: Vec<String> = Vec::new();
        let mut download: Vec<String> = Vec::new();
        let mut delete_local: Vec<String> = Vec::new();

        for name in diff.only_in_local() {
            if !filter.should_sync(name, diff.local().last_modified(name), 0) {
                continue;
            }
            if self.strategy.is_unlocked(name) {
                delete_local.push(name.clone());
            } else {
                upload.push(name.clone());
            }
        }
        for name in diff.differing() {
            let lts = diff.local().last_modified(name);
            let rts = diff.remote().last_modified(name);
            if !filter.should_sync(name, lts, rts) {
                continue;
            }
            if self.strategy.is_unlocked(name) {
                download.push(name.clone());
            } else {
                upload.push(name.clone());
            }
        }
        for name in diff.only_in_remote() {
            if !filter.should_sync(name, 0, diff.remote().last_modified(name)) {
                continue;
            }
            if self.strategy.is_unlocked(name) {
                download.push(name.clone());
            } else {
                delete_remote.push(name.clone());
            }
        }

        let mut changed = false;
        for batch in upload.chunks(UPLOAD_BATCH) {
            self.upload_batch(batch)?;
            changed = true;
        }
        for batch in delete_remote.chunks(DOWNLOAD_BATCH) {
            let mut params: Vec<(&str, &str)> = vec![(ACTION_PARAM, DELETE_ACTION)];
            params.extend(batch.iter().map(|n| (NAME_PARAM, n.as_str())));
            self.request(&params)?;
            changed = true;
        }
        for batch in download.chunks(DOWNLOAD_BATCH) {
            let mut params: Vec<(&str, &str)> = vec![(ACTION_PARAM, DOWNLOAD_ACTION)];
            params.extend(batch.iter().map(|n| (NAME_PARAM, n.as_str())));
            let resp = self.request(&params)?;
            changed |= !unpack_bundle(resp, self.local.as_ref())?.is_empty();
        }
        for name in &delete_local {
            info!(name, "deleting local copy of unlocked file absent from server");
            self.local.delete_resource(name)?;
            changed = true;
        }

        if changed {
            self.local.invalidate_cache();
        }
        Ok(changed)
    }

    fn upload_batch(&self, names: &[String]) -> SyncResult<()> {
        if self.supports_zip_upload() {
            let bundle = build_bundle(names, self.local.as_ref())?;
            debug!(files = names.len(), bytes = bundle.len(), "uploading bundled batch");
            let form = Form::new()
                .text(ACTION_PARAM, UPLOAD_ACTION)
                .part(
                    "archive",
                    Part::bytes(bundle).file_name("bundle.zip"),
                );
            self.post_multipart(form)?;
            return Ok(());
        }

        let mut manifest = CollectionListing::default();
        let mut form = Form::new().text(ACTION_PARAM, UPLOAD_ACTION);
        for name in names {
            let Some(data) = self.local.open_resource(name)? else {
                debug!(name, "resource vanished before upload; skipped");
                continue;
            };
            manifest.insert(
                name.clone(),
                crate::collection::ResourceInfo {
                    last_modified: self.local.last_modified(name),
                    checksum: self.local.checksum(name),
                },
            );
            form = form.part("file", Part::reader(data).file_name(name.clone()));
        }
        form = form.part(
            "manifest",
            Part::text(manifest.to_xml()?).file_name("manifest.xml"),
        );
        debug!(files = names.len(), "uploading plain batch");
        self.post_multipart(form)?;
        Ok(())
    }

    /// Push the housekeeping files the routine filters skip, so the server
    /// copies do not go permanently stale. Requires the server write lock.
    pub fn save_default_excluded_files(&self) -> SyncResult<()> {
        let _op = self.op_lock.lock().unwrap();
        self.assert_lock_held().map_err(SyncError::Lock)?;
        let names: Vec<String> = self
            .strategy
            .default_excluded_files()
            .iter()
            .map(|n| n.to_string())
            .filter(|n| self.local.last_modified(n) > 0)
            .collect();
        if names.is_empty() {
            return Ok(());
        }
        self.upload_batch(&names)
    }

    /// Ask the server to snapshot its copy of the collection. Returns the
    /// URL the snapshot can be fetched from.
    pub fn do_backup(&self, qualifier: &str) -> SyncResult<String> {
        let _op = self.op_lock.lock().unwrap();
        self.request(&[
            (ACTION_PARAM, BACKUP_ACTION),
            (QUALIFIER_PARAM, qualifier),
        ])?;
        Ok(format!(
            "{}?{ACTION_PARAM}={GET_BACKUP_ACTION}",
            self.remote_url
        ))
    }

    // ----- locks ------------------------------------------------------

    fn lock_request(&self, action: &str, extra: &[(&str, &str)]) -> Result<(), LockError> {
        let lock_data = self.extra_lock_data.lock().unwrap().clone();
        let mut params: Vec<(&str, &str)> = vec![
            (ACTION_PARAM, action),
            (USER_NAME_PARAM, self.user_name.as_str()),
            (USER_ID_PARAM, self.user_id.as_str()),
            (SOURCE_ID_PARAM, self.source_id.as_str()),
        ];
        if let Some(data) = lock_data.as_deref() {
            params.push((LOCK_DATA_PARAM, data));
        }
        params.extend_from_slice(extra);

        match self.request(&params) {
            Ok(resp) => {
                let header = resp
                    .headers()
                    .get(OFFLINE_STATUS_HEADER)
                    .and_then(|v| v.to_str().ok());
                self.set_offline_status(offline_status_from_header(header));
                Ok(())
            }
            Err(SyncError::Lock(e)) => {
                if e.is_fatal() {
                    self.set_offline_status(OfflineLockStatus::NotLocked);
                }
                Err(e)
            }
            Err(SyncError::Http(e)) => Err(LockError::Uncertain(e.to_string())),
            Err(e) => Err(LockError::Failed(e.to_string())),
        }
    }

    fn require_lock_data(&self) -> Result<(), LockError> {
        if self.extra_lock_data.lock().unwrap().is_some() {
            Ok(())
        } else {
            Err(LockError::Failed(
                "lock correlation data has not been set".into(),
            ))
        }
    }

    pub fn acquire_lock(&self) -> Result<(), LockError> {
        let _op = self.op_lock.lock().unwrap();
        match self.lock_request(ACQUIRE_LOCK_ACTION, &[]) {
            Ok(()) => {
                self.holds_lock.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                self.holds_lock.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn ping_lock(&self) -> Result<(), LockError> {
        let _op = self.op_lock.lock().unwrap();
        self.assert_lock_held()?;
        self.lock_request(PING_LOCK_ACTION, &[])
    }

    pub fn assert_lock(&self) -> Result<(), LockError> {
        let _op = self.op_lock.lock().unwrap();
        self.assert_lock_held()?;
        self.lock_request(ASSERT_LOCK_ACTION, &[])
    }

    /// Best-effort; a server we cannot reach will expire the lock on its
    /// own. Does nothing when no lock is held.
    pub fn release_lock(&self) {
        let _op = self.op_lock.lock().unwrap();
        if !self.holds_lock.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.lock_request(RELEASE_LOCK_ACTION, &[]) {
            warn!(url = %self.remote_url, error = %e, "could not release server lock");
        }
    }

    /// Reclaim a lock that was taken offline. An unreachable server is
    /// treated as success: the lock was enabled when we went offline, and
    /// only a reachable server can tell us otherwise.
    pub fn resume_offline_lock(&self) -> Result<(), LockError> {
        let _op = self.op_lock.lock().unwrap();
        self.require_lock_data()?;
        match self.lock_request(RESUME_OFFLINE_LOCK_ACTION, &[]) {
            Ok(()) => {
                self.holds_lock.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(LockError::Uncertain(msg)) => {
                warn!(url = %self.remote_url, %msg,
                      "server unreachable; assuming offline lock is still in force");
                self.holds_lock.store(true, Ordering::SeqCst);
                self.set_offline_status(OfflineLockStatus::Enabled);
                Ok(())
            }
            Err(e) => {
                self.holds_lock.store(false, Ordering::SeqCst);
                Err(e)
            }
        }
    }

    pub fn set_offline_lock_enabled(&self, enabled: bool) -> Result<(), LockError> {
        let _op = self.op_lock.lock().unwrap();
        self.assert_lock_held()?;
        self.require_lock_data()?;
        let flag = enabled.to_string();
        self.lock_request(SET_OFFLINE_LOCK_ACTION, &[(ENABLED_PARAM, flag.as_str())])?;
        self.set_offline_status(if enabled {
            OfflineLockStatus::Enabled
        } else {
            OfflineLockStatus::Disabled
        });
        Ok(())
    }

    // ----- anonymous collection management ----------------------------

    /// Upload one file into a collection without any lock or local
    /// counterpart.
    pub fn upload_single_file(
        url: &str,
        name: &str,
        data: impl Read + Send + 'static,
    ) -> SyncResult<()> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let form = Form::new()
            .text(ACTION_PARAM, UPLOAD_ACTION)
            .part("file", Part::reader(data).file_name(name.to_string()));
        let resp = http.post(url).multipart(form).send()?;
        expect_success(resp, url)?;
        Ok(())
    }

    /// Delete one file from a collection without any lock state.
    pub fn delete_single_file(url: &str, name: &str) -> SyncResult<()> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let resp = http
            .get(url)
            .query(&[(ACTION_PARAM, DELETE_ACTION), (NAME_PARAM, name)])
            .send()?;
        expect_success(resp, url)?;
        Ok(())
    }

    /// Ask the server to create a new, empty collection. Returns the id of
    /// the collection it created.
    pub fn create_new_collection(base_url: &str) -> SyncResult<String> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let resp = http
            .get(base_url)
            .query(&[(ACTION_PARAM, NEW_COLLECTION_ACTION)])
            .send()?;
        let body = expect_success(resp, base_url)?.text()?;
        let id = body.trim().to_string();
        if id.is_empty() {
            return Err(SyncError::Protocol("server returned no collection id".into()));
        }
        Ok(id)
    }

    /// Ask a server which collection id a named directory maps to.
    pub fn lookup_location_token(base_url: &str, name: &str) -> SyncResult<String> {
        let http = Client::builder().timeout(HTTP_TIMEOUT).build()?;
        let resp = http
            .get(base_url)
            .query(&[(ACTION_PARAM, LOCATION_TOKEN_ACTION), (NAME_PARAM, name)])
            .send()?;
        let body = expect_success(resp, base_url)?.text()?;
        let token = body.trim().to_string();
        if token.is_empty() {
            return Err(SyncError::Protocol("server returned no location token".into()));
        }
        Ok(token)
    }
}

fn expect_success(resp: Response, url: &str) -> SyncResult<Response> {
    let status = resp.status();
    if status.is_success() {
        Ok(resp)
    } else {
        Err(SyncError::Protocol(format!("server returned {status} for {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collection::{DefaultStrategy, FileCollection};

    fn client(url: &str) -> BridgeClient {
        let dir = tempfile::tempdir().unwrap();
        let strategy = Arc::new(DefaultStrategy::new());
        let local = Arc::new(FileCollection::new(dir.path(), strategy.clone()));
        BridgeClient::new(url, local, strategy, "Alice Tester", "a.tester@example.com").unwrap()
    }

    #[test]
    fn user_id_is_truncated_at_construction() {
        let c = client("http://127.0.0.1:1/data");
        assert_eq!(c.user_id.len(), 15);
        assert!(c.user_id.ends_with('*'));
    }

    #[test]
    fn unreachable_server_makes_acquisition_uncertain() {
        let c = client("http://127.0.0.1:1/data");
        match c.acquire_lock() {
            Err(LockError::Uncertain(_)) => {}
            other => panic!("expected Uncertain, got {other:?}"),
        }
        assert!(!c.holds_lock());
    }

    #[test]
    fn lock_dependent_calls_fail_fast_without_a_lock() {
        let c = client("http://127.0.0.1:1/data");
        assert!(matches!(c.ping_lock(), Err(LockError::NotLocked)));
        assert!(matches!(c.assert_lock(), Err(LockError::NotLocked)));
        assert!(matches!(
            c.sync_up(&crate::sync::SyncAll),
            Err(SyncError::Lock(LockError::NotLocked))
        ));
        assert!(matches!(
            c.save_default_excluded_files(),
            Err(SyncError::Lock(LockError::NotLocked))
        ));
    }

    #[test]
    fn releasing_an_unheld_lock_is_a_no_op() {
        let c = client("http://127.0.0.1:1/data");
        c.release_lock();
        assert!(!c.holds_lock());
    }

    #[test]
    fn resume_offline_lock_is_lenient_about_unreachable_servers() {
        let c = client("http://127.0.0.1:1/data");
        c.set_extra_lock_data("1234-5678");
        c.resume_offline_lock().unwrap();
        assert!(c.holds_lock());
        assert_eq!(c.offline_lock_status(), OfflineLockStatus::Enabled);
    }

    #[test]
    fn resume_offline_lock_insists_on_correlation_data() {
        let c = client("http://127.0.0.1:1/data");
        match c.resume_offline_lock() {
            Err(LockError::Failed(msg)) => assert!(msg.contains("correlation")),
            other => panic!("expected Failed, got {other:?}"),
        }
        assert!(!c.holds_lock());
    }

    #[test]
    fn offline_toggle_insists_on_lock_and_correlation_data() {
        let c = client("http://127.0.0.1:1/data");
        assert!(matches!(
            c.set_offline_lock_enabled(true),
            Err(LockError::NotLocked)
        ));
        c.holds_lock.store(true, Ordering::SeqCst);
        assert!(matches!(
            c.set_offline_lock_enabled(true),
            Err(LockError::Failed(_))
        ));
    }

    #[test]
    fn offline_status_changes_reach_the_listener() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let c = client("http://127.0.0.1:1/data");
        let sink = Arc::clone(&seen);
        c.on_offline_status_change(move |s| sink.lock().unwrap().push(s));
        c.set_offline_status(OfflineLockStatus::Enabled);
        c.set_offline_status(OfflineLockStatus::Enabled);
        c.set_offline_status(OfflineLockStatus::Disabled);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![OfflineLockStatus::Enabled, OfflineLockStatus::Disabled]
        );
    }

    #[test]
    fn zip_upload_requires_a_known_new_enough_server() {
        let c = client("http://127.0.0.1:1/data");
        assert!(!c.supports_zip_upload());
        *c.server_version.lock().unwrap() = Some("3.6.8".into());
        assert!(!c.supports_zip_upload());
        *c.server_version.lock().unwrap() = Some("3.6.9".into());
        assert!(c.supports_zip_upload());
    }

    #[test]
    fn batching_splits_at_the_documented_sizes() {
        let names: Vec<String> = (0..250).map(|i| format!("f{i}")).collect();
        assert_eq!(names.chunks(UPLOAD_BATCH).count(), 3);
        let names: Vec<String> = (0..900).map(|i| format!("f{i}")).collect();
        assert_eq!(names.chunks(DOWNLOAD_BATCH).count(), 2);
    }
}
