//! Synchronization engine: the HTTP bridge client, transfer bundles, and
//! the filters that decide which names a given sync may touch.

pub mod archive;
mod client;
mod filter;
pub mod protocol;

pub use client::BridgeClient;
pub use filter::{SyncAll, SyncDownFilter, SyncFilter};
pub use protocol::OfflineLockStatus;
