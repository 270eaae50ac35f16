//! Cross-process working-directory lock.
//!
//! One process at a time may hold the write lock for a directory. The lock
//! is an advisory exclusive lock on a small file inside the directory; the
//! holder leaves contact details in the file so a later contender on the
//! same machine can deliver a message (and get a reply) instead of just
//! failing.

mod file_lock;
mod message;
pub mod registry;

pub use file_lock::FileLock;
pub use message::{current_host, LockMetadata};

/// Callback invoked by a lock owner when a same-host contender sends a
/// message. The returned string travels back as the reply.
pub trait LockMessageHandler: Send + Sync {
    fn dispatch(&self, message: &str) -> String;
}

impl<F> LockMessageHandler for F
where
    F: Fn(&str) -> String + Send + Sync,
{
    fn dispatch(&self, message: &str) -> String {
        self(message)
    }
}
