//! Background maintenance thread for a writable bridged directory.
//!
//! Once a minute it pings the server lock so the session does not expire;
//! every fifth wake it also flushes local changes, so a crash can lose a
//! few minutes of work at most. Both run in offline mode as well, which is
//! how an offline session catches up the moment the server reappears.
//! Transient failures are logged and retried on the next wake; a definite
//! lock loss stops the worker and notifies subscribers.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};

use crate::shutdown;

use super::bridged::BridgedInner;
use super::DirectoryEvent;

const TICK: Duration = Duration::from_secs(1);
/// Ticks per wake: one minute.
const WAKE_TICKS: u32 = 60;
/// Every Nth wake also flushes.
const FLUSH_FREQUENCY: u32 = 5;

pub(crate) struct WorkerHandle {
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(t) = self.thread.take() {
            let _ = t.join();
        }
    }
}

pub(crate) fn spawn(inner: Arc<BridgedInner>) -> WorkerHandle {
    let stop = Arc::new(AtomicBool::new(false));
    let thread_stop = Arc::clone(&stop);
    let thread = thread::Builder::new()
        .name("dirbridge-worker".into())
        .spawn(move || run(inner, thread_stop))
        .ok();
    if thread.is_none() {
        warn!("could not start background worker; lock will not be pinged");
    }
    WorkerHandle { stop, thread }
}

fn run(inner: Arc<BridgedInner>, stop: Arc<AtomicBool>) {
    let mut wakes: u32 = 0;
    'outer: loop {
        for _ in 0..WAKE_TICKS {
            if stop.load(Ordering::Relaxed) || shutdown::is_requested() {
                break 'outer;
            }
            thread::sleep(TICK);
        }
        wakes += 1;

        // The ping runs in offline mode too: once the server is back it
        // refreshes the session, and the flush below pushes the backlog.
        match inner.client.ping_lock() {
            Ok(()) => debug!(wakes, "lock pinged"),
            Err(e) if !e.is_fatal() => {
                warn!(error = %e, "lock ping inconclusive; will retry");
                continue;
            }
            Err(e) => {
                warn!(error = %e, "server lock definitely lost");
                inner.events.publish(DirectoryEvent::LockLost);
                return;
            }
        }

        if wakes % FLUSH_FREQUENCY == 0 {
            match inner.do_flush() {
                Ok(changed) => debug!(changed, "periodic flush complete"),
                Err(e) if inner.offline() => {
                    debug!(error = %e, "periodic flush could not reach the server");
                }
                Err(e) => warn!(error = %e, "periodic flush failed"),
            }
        }
    }
    debug!("background worker stopped");
}
