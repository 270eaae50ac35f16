//! dirbridge keeps a local working directory in sync with an authoritative
//! copy of the same file collection, which may live on another filesystem
//! path or behind an HTTP bridge server.
//!
//! The main entry point is [`select::DirectoryContext`], which turns a list
//! of candidate locations into a shared [`workdir::WorkingDirectory`] or
//! [`import::ImportDirectory`]. Below that sit the building blocks:
//! resource collections and their listings ([`collection`]), the sync engine
//! and wire protocol ([`sync`]), cross-process file locking ([`lock`]) and
//! the working-directory lifecycle with offline support ([`workdir`]).

pub mod collection;
pub mod config;
pub mod errors;
pub mod import;
pub mod lock;
pub mod output;
pub mod select;
pub mod shutdown;
pub mod sync;
pub mod workdir;
