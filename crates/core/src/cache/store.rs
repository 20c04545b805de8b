//! The storage abstraction the worker is written against.
//!
//! A store holds any number of named cache instances. Each instance maps
//! request descriptors to responses and remembers insertion order, which is
//! the only order eviction ever uses.

use async_trait::async_trait;

use super::entry::EntryKey;
use crate::{Error, Request, Response};

/// Handle to an opened cache instance.
///
/// Handles are cheap and carry only the instance name; operations on a handle
/// whose instance has since been deleted see an empty instance, and writes to
/// it fail with `Error::CacheNotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheHandle {
    name: String,
}

impl CacheHandle {
    pub(crate) fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Persistent, process-wide cache storage.
///
/// Every method is individually atomic. No ordering is guaranteed between
/// concurrent callers; the last `put` for a key wins.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Return the instance called `name`, creating it on first use.
    async fn open(&self, name: &str) -> Result<CacheHandle, Error>;

    async fn has(&self, name: &str) -> Result<bool, Error>;

    /// Names of all instances, in creation order.
    async fn names(&self) -> Result<Vec<String>, Error>;

    /// Drop an instance with all of its entries. Returns false if it did not exist.
    async fn delete(&self, name: &str) -> Result<bool, Error>;

    /// Look `request` up in a single instance.
    async fn match_in(&self, handle: &CacheHandle, request: &Request) -> Result<Option<Response>, Error>;

    /// Look `request` up in every instance, oldest instance first.
    async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error>;

    /// Store `response` under `request`, replacing any entry with the same key.
    ///
    /// A replaced entry counts as newly inserted.
    async fn put(&self, handle: &CacheHandle, request: &Request, response: &Response) -> Result<(), Error>;

    /// Store every pair in one step: either all entries land or none do.
    async fn put_all(&self, handle: &CacheHandle, entries: &[(Request, Response)]) -> Result<(), Error>;

    /// Keys of an instance, oldest insertion first.
    async fn keys(&self, handle: &CacheHandle) -> Result<Vec<EntryKey>, Error>;

    /// Remove a single entry. Returns false if it was already gone.
    async fn delete_entry(&self, handle: &CacheHandle, key: &EntryKey) -> Result<bool, Error>;

    async fn len(&self, handle: &CacheHandle) -> Result<usize, Error>;
}

/// Evict the oldest entry of `handle`, one at a time, until at most `bound` remain.
///
/// Keys are re-read after every deletion so concurrent inserts are accounted
/// for. Returns the number of evicted entries.
pub async fn enforce_bound(store: &dyn CacheStore, handle: &CacheHandle, bound: usize) -> Result<usize, Error> {
    let mut evicted = 0;
    loop {
        let keys = store.keys(handle).await?;
        let Some(oldest) = keys.first() else {
            return Ok(evicted);
        };
        if keys.len() <= bound {
            return Ok(evicted);
        }

        if store.delete_entry(handle, oldest).await? {
            evicted += 1;
            tracing::trace!(cache = handle.name(), url = %oldest.url, "evicted oldest entry");
        }
    }
}
