//! Named, versioned cache instances.
//!
//! This module provides the `CacheStore` abstraction and its backends:
//!
//! - `CacheDb`: persistent SQLite storage with async access via tokio-rusqlite
//!   (WAL mode, schema migrations, cascading instance deletion)
//! - `MemoryStore`: in-process storage for tests
//!
//! Entries are keyed by `(method, url)` with `Vary`-aware matching and keep
//! their insertion order, which `enforce_bound` uses for FIFO eviction.

pub mod connection;
pub mod entry;
pub mod hash;
pub mod instances;
pub mod memory;
pub mod migrations;
pub mod store;

pub use crate::Error;

pub use connection::CacheDb;
pub use entry::EntryKey;
pub use memory::MemoryStore;
pub use store::{CacheHandle, CacheStore, enforce_bound};
