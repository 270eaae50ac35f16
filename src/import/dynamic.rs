//! Import directory that re-resolves its own backing store.
//!
//! When the best reachable delegate at construction time was a fallback
//! (a stale cache, say), every update gives the resolver another chance to
//! find the real origin, with a debounce so a tight polling loop does not
//! hammer an absent server.

use std::io::Read;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::errors::SyncResult;

use super::ImportDirectory;

const RERESOLVE_DEBOUNCE: Duration = Duration::from_secs(1);

type Resolver = dyn Fn() -> SyncResult<Arc<dyn ImportDirectory>> + Send + Sync;

pub struct DynamicImportDirectory {
    location: String,
    resolver: Box<Resolver>,
    delegate: Mutex<Arc<dyn ImportDirectory>>,
    last_attempt: Mutex<Option<Instant>>,
}

impl DynamicImportDirectory {
    pub fn new(
        location: impl Into<String>,
        initial: Arc<dyn ImportDirectory>,
        resolver: Box<Resolver>,
    ) -> Self {
        DynamicImportDirectory {
            location: location.into(),
            resolver,
            delegate: Mutex::new(initial),
            last_attempt: Mutex::new(None),
        }
    }

    fn delegate(&self) -> Arc<dyn ImportDirectory> {
        Arc::clone(&self.delegate.lock().unwrap())
    }

    fn maybe_reresolve(&self) {
        if self.delegate().is_bad_delegate() != Some(true) {
            return;
        }
        {
            let mut last = self.last_attempt.lock().unwrap();
            if let Some(at) = *last {
                if at.elapsed() < RERESOLVE_DEBOUNCE {
                    return;
                }
            }
            *last = Some(Instant::now());
        }
        match (self.resolver)() {
            Ok(better) if better.is_bad_delegate() != Some(true) => {
                info!(location = %self.location, delegate = %better.description(),
                      "found a better import delegate");
                *self.delegate.lock().unwrap() = better;
            }
            Ok(_) => debug!(location = %self.location, "re-resolution still yields a fallback"),
            Err(e) => debug!(location = %self.location, error = %e, "re-resolution failed"),
        }
    }
}

impl ImportDirectory for DynamicImportDirectory {
    fn description(&self) -> String {
        self.delegate().description()
    }

    fn directory(&self) -> PathBuf {
        self.delegate().directory()
    }

    fn update(&self) -> SyncResult<()> {
        self.maybe_reresolve();
        self.delegate().update()
    }

    fn validate(&self) -> SyncResult<()> {
        self.delegate().validate()
    }

    fn write_unlocked_file(&self, name: &str, data: &mut dyn Read) -> SyncResult<()> {
        self.delegate().write_unlocked_file(name, data)
    }

    fn delete_unlocked_file(&self, name: &str) -> SyncResult<()> {
        self.delegate().delete_unlocked_file(name)
    }

    fn is_bad_delegate(&self) -> Option<bool> {
        self.delegate().is_bad_delegate()
    }
}
