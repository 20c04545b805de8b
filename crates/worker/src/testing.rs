//! Test doubles shared by the worker's unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use precache_client::Network;
use precache_core::{AppConfig, CacheHandle, CacheStore, EntryKey, Error, MemoryStore, Request, Response};
use tokio::sync::Notify;
use url::Url;

pub(crate) const ORIGIN: &str = "https://portfolio.example.com";

pub(crate) fn url(path_or_url: &str) -> Url {
    if path_or_url.contains("://") {
        Url::parse(path_or_url).unwrap()
    } else {
        Url::parse(&format!("{ORIGIN}{path_or_url}")).unwrap()
    }
}

/// Site configuration for `version`, owning every instance in the store.
pub(crate) fn site_config(version: &str) -> AppConfig {
    AppConfig { origin: ORIGIN.into(), cache_version: version.into(), cache_prefix: None, ..Default::default() }
}

/// A network that answers from a script. Unscripted URLs are unreachable.
#[derive(Default)]
pub(crate) struct FakeNetwork {
    routes: Mutex<HashMap<String, Response>>,
    calls: Mutex<Vec<String>>,
}

impl FakeNetwork {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A network serving every static asset of `config` with a body naming the path.
    pub(crate) fn serving_site(config: &AppConfig) -> Arc<Self> {
        let network = Self::new();
        for asset in &config.static_assets {
            network.respond(asset, Response::ok(format!("static:{asset}")));
        }
        network
    }

    pub(crate) fn respond(&self, path_or_url: &str, response: Response) {
        self.routes.lock().unwrap().insert(url(path_or_url).to_string(), response);
    }

    pub(crate) fn offline(&self, path_or_url: &str) {
        self.routes.lock().unwrap().remove(url(path_or_url).as_str());
    }

    pub(crate) fn go_offline(&self) {
        self.routes.lock().unwrap().clear();
    }

    pub(crate) fn calls_to(&self, path_or_url: &str) -> usize {
        let target = url(path_or_url).to_string();
        self.calls.lock().unwrap().iter().filter(|c| **c == target).count()
    }

    pub(crate) fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl Network for FakeNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, Error> {
        let key = request.url.to_string();
        self.calls.lock().unwrap().push(key.clone());

        self.routes
            .lock()
            .unwrap()
            .get(&key)
            .cloned()
            .ok_or_else(|| Error::Network(format!("unreachable: {key}")))
    }
}

/// A `MemoryStore` whose eviction path can be held, broken or counted.
#[derive(Default)]
pub(crate) struct GatedStore {
    pub(crate) inner: MemoryStore,
    failing: Mutex<HashSet<String>>,
    gate: Mutex<Option<Arc<Notify>>>,
    started: Notify,
    key_reads: AtomicUsize,
}

impl GatedStore {
    /// Make `keys` fail for the instance called `name`.
    pub(crate) fn fail(&self, name: &str) {
        self.failing.lock().unwrap().insert(name.to_string());
    }

    /// Park every `delete_entry` until `release_evictions`.
    pub(crate) fn hold_evictions(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    pub(crate) fn release_evictions(&self, gate: &Notify) {
        self.gate.lock().unwrap().take();
        gate.notify_one();
    }

    /// Wait until a `delete_entry` is parked on the gate.
    pub(crate) async fn eviction_started(&self) {
        self.started.notified().await;
    }

    pub(crate) fn key_reads(&self) -> usize {
        self.key_reads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheStore for GatedStore {
    async fn open(&self, name: &str) -> Result<CacheHandle, Error> {
        self.inner.open(name).await
    }

    async fn has(&self, name: &str) -> Result<bool, Error> {
        self.inner.has(name).await
    }

    async fn names(&self) -> Result<Vec<String>, Error> {
        self.inner.names().await
    }

    async fn delete(&self, name: &str) -> Result<bool, Error> {
        self.inner.delete(name).await
    }

    async fn match_in(&self, handle: &CacheHandle, request: &Request) -> Result<Option<Response>, Error> {
        self.inner.match_in(handle, request).await
    }

    async fn match_any(&self, request: &Request) -> Result<Option<Response>, Error> {
        self.inner.match_any(request).await
    }

    async fn put(&self, handle: &CacheHandle, request: &Request, response: &Response) -> Result<(), Error> {
        self.inner.put(handle, request, response).await
    }

    async fn put_all(&self, handle: &CacheHandle, entries: &[(Request, Response)]) -> Result<(), Error> {
        self.inner.put_all(handle, entries).await
    }

    async fn keys(&self, handle: &CacheHandle) -> Result<Vec<EntryKey>, Error> {
        self.key_reads.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(handle.name()) {
            return Err(Error::CorruptEntry(format!("{}: unreadable", handle.name())));
        }
        self.inner.keys(handle).await
    }

    async fn delete_entry(&self, handle: &CacheHandle, key: &EntryKey) -> Result<bool, Error> {
        let gate = self.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            self.started.notify_one();
            gate.notified().await;
        }
        self.inner.delete_entry(handle, key).await
    }

    async fn len(&self, handle: &CacheHandle) -> Result<usize, Error> {
        self.inner.len(handle).await
    }
}
