//! Process-wide shutdown coordination.
//! A flag set from the signal handler so worker threads and retry loops
//! can exit promptly; the handler also drains the lock registry so no lock
//! files outlive the process.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::info;

use crate::lock::registry;

static SHUTDOWN: AtomicBool = AtomicBool::new(false);

/// Request a cooperative shutdown (idempotent).
#[inline]
pub fn request() {
    SHUTDOWN.store(true, Ordering::Relaxed);
}

/// Check whether a shutdown has been requested.
#[inline]
pub fn is_requested() -> bool {
    SHUTDOWN.load(Ordering::Relaxed)
}

/// Install the Ctrl-C / SIGTERM handler. Call once, early in main.
pub fn install_signal_handler() -> Result<(), ctrlc::Error> {
    ctrlc::set_handler(|| {
        info!("shutdown requested");
        request();
        registry::release_all();
    })
}

/// Test-only: clear the shutdown flag.
#[cfg(test)]
pub fn reset() {
    SHUTDOWN.store(false, Ordering::Relaxed);
}
