//! In-process `CacheStore` with the same semantics as the SQLite backend.
//!
//! Nothing survives the process. Used by tests and by embedders that
//! only need a per-run cache.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::entry::{EntryKey, PreparedEntry};
use super::store::{CacheHandle, CacheStore};
use crate::{Error, Request, Response};

#[derive(Debug)]
struct MemoryCache {
    name: String,
    /// Oldest insertion first.
    entries: Vec<PreparedEntry>,
}

impl MemoryCache {
    fn insert(&mut self, request: &Request, entry: PreparedEntry) {
        self.entries.retain(|e| !e.replaced_by(request));
        self.entries.push(entry);
    }

    fn find(&self, request: &Request) -> Option<Response> {
        let key = EntryKey::for_request(request);
        self.entries
            .iter()
            .find(|e| e.key.hash == key.hash && e.matches(request))
            .map(|e| e.response.clone())
    }
}

/// In-memory cache storage.
///
/// A single lock guards all instances, which keeps every operation atomic.
#[derive(Debug, Default)]
pub struct MemoryStore {
    /// Creation order.
    caches: RwLock<Vec<MemoryCache>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn open(&self, name: &str) -> Result<CacheHandle, Error> {
        let mut caches = self.caches.write().await;
        if !caches.iter().any(|c| c.name == name) {
            caches.push(MemoryCache { name: name.to_string(), entries: Vec::new() });
        }
        Ok(CacheHandle::new(name))
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        Ok(self.caches.read().await.iter().any(|c| c.name == name))
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        Ok(self.caches.read().await.iter().map(|c| c.name.clone()).collect())
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        let mut caches = self.caches.write().await;
        let before = caches.len();
        caches.retain(|c| c.name != name);
        Ok(caches.len() != before)
    }

    async fn match_in(&self, handle: &CacheHandle, request: &Request) -> Result<Option<Response>, Error> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|c| c.name == handle.name())
            .and_then(|c| c.find(request)))
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
        let caches = self.caches.read().await;
        Ok(caches.iter().find_map(|c| c.find(request)))
    }

    async fn put(&self, handle: &CacheHandle, request: &Request, response: &Response) -> Result<(), Error> {
        let entry = PreparedEntry::new(request, response)?;
        let mut caches = self.caches.write().await;
        let cache = caches
            .iter_mut()
            .find(|c| c.name == handle.name())
            .ok_or_else(|| Error::CacheNotFound(handle.name().to_string()))?;
        cache.insert(request, entry);
        Ok(())
    }

    async fn put_all(&self, handle: &CacheHandle, entries: &[(Request, Response)]) -> Result<(), Error> {
        let prepared = entries
            .iter()
            .map(|(request, response)| PreparedEntry::new(request, response).map(|entry| (request, entry)))
            .collect::<Result<Vec<_>, _>>()?;
        let mut caches = self.caches.write().await;
        let cache = caches
            .iter_mut()
            .find(|c| c.name == handle.name())
            .ok_or_else(|| Error::CacheNotFound(handle.name().to_string()))?;
        for (request, entry) in prepared {
            cache.insert(request, entry);
        }
        Ok(())
    }

    async fn keys(&self, handle: &CacheHandle) -> Result<Vec<EntryKey>, Error> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|c| c.name == handle.name())
            .map(|c| c.entries.iter().map(|e| e.key.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete_entry(&self, handle: &CacheHandle, key: &EntryKey) -> Result<bool, Error> {
        let mut caches = self.caches.write().await;
        let Some(cache) = caches.iter_mut().find(|c| c.name == handle.name()) else {
            return Ok(false);
        };
        let before = cache.entries.len();
        cache
            .entries
            .retain(|e| !(e.key.hash == key.hash && e.key.vary_values == key.vary_values));
        Ok(cache.entries.len() != before)
    }

    async fn len(&self, handle: &CacheHandle) -> Result<usize, Error> {
        let caches = self.caches.read().await;
        Ok(caches
            .iter()
            .find(|c| c.name == handle.name())
            .map_or(0, |c| c.entries.len()))
    }
}
