//! A single worker version.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use futures::future::try_join_all;
use precache_client::Network;
use precache_core::{CacheStore, Error, Request, Response};
use tokio::sync::RwLock;
use url::Url;

use crate::events::Command;
use crate::lifecycle::{WorkerId, WorkerState};
use crate::maintenance::Maintenance;
use crate::router::{FetchOutcome, Router};
use crate::settings::WorkerSettings;

/// One version of the worker: its settings, its view of the cache store and
/// network, and its lifecycle state.
///
/// The `Registration` decides when each phase runs; the worker only performs it.
pub struct ServiceWorker {
    id: WorkerId,
    settings: WorkerSettings,
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    router: Router,
    maintenance: Maintenance,
    state: RwLock<WorkerState>,
    skip_waiting: AtomicBool,
}

impl ServiceWorker {
    /// Create a worker in the `Parsed` state.
    ///
    /// Spawns the worker's maintenance task, so a tokio runtime must be running.
    pub fn new(settings: WorkerSettings, store: Arc<dyn CacheStore>, network: Arc<dyn Network>) -> Result<Self, Error> {
        let maintenance = Maintenance::spawn(store.clone());
        let router = Router::new(&settings, store.clone(), network.clone(), maintenance.clone())?;

        Ok(Self {
            id: WorkerId::next(),
            settings,
            store,
            network,
            router,
            maintenance,
            state: RwLock::new(WorkerState::Parsed),
            skip_waiting: AtomicBool::new(false),
        })
    }

    pub fn id(&self) -> WorkerId {
        self.id
    }

    pub fn settings(&self) -> &WorkerSettings {
        &self.settings
    }

    pub fn maintenance(&self) -> &Maintenance {
        &self.maintenance
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether this worker asked to skip the waiting phase.
    pub fn skip_waiting_requested(&self) -> bool {
        self.skip_waiting.load(Ordering::SeqCst)
    }

    async fn transition(&self, next: WorkerState) -> Result<(), Error> {
        let mut state = self.state.write().await;
        let from = *state;
        if !from.can_transition_to(next) {
            return Err(Error::InvalidState(format!("{}: cannot go from {from} to {next}", self.id)));
        }

        tracing::info!(worker = %self.id, version = %self.settings.version, %from, to = %next, "state change");
        *state = next;
        Ok(())
    }

    /// Precache every static asset.
    ///
    /// All assets are fetched concurrently and must answer `200`; only then
    /// is the static instance opened and filled in one atomic write. On any
    /// failure nothing is stored and the worker becomes `Redundant`.
    pub async fn install(&self) -> Result<(), Error> {
        self.transition(WorkerState::Installing).await?;
        let start = Instant::now();

        match self.precache().await {
            Ok(count) => {
                tracing::info!(
                    worker = %self.id,
                    cache = %self.settings.static_cache,
                    assets = count,
                    install_ms = start.elapsed().as_millis() as u64,
                    "precached static assets"
                );
                self.transition(WorkerState::Installed).await?;
                if self.settings.skip_waiting {
                    self.skip_waiting.store(true, Ordering::SeqCst);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!(worker = %self.id, version = %self.settings.version, error = %e, "install failed");
                self.transition(WorkerState::Redundant).await?;
                Err(e)
            }
        }
    }

    async fn precache(&self) -> Result<usize, Error> {
        let fetches = self.settings.static_assets.iter().map(|url| self.fetch_asset(url));
        let entries = try_join_all(fetches).await?;

        let handle = self.store.open(&self.settings.static_cache).await?;
        self.store.put_all(&handle, &entries).await?;

        Ok(entries.len())
    }

    async fn fetch_asset(&self, url: &Url) -> Result<(Request, Response), Error> {
        let request = Request::get(url.clone());
        let response = self
            .network
            .fetch(&request)
            .await
            .map_err(|e| Error::InstallFailed { url: url.to_string(), reason: e.to_string() })?;

        if !response.is_ok_status() {
            return Err(Error::InstallFailed { url: url.to_string(), reason: format!("status {}", response.status) });
        }

        Ok((request, response))
    }

    /// Enter `Activating` and delete every cache instance this version does not use.
    ///
    /// Returns the deleted names. Deletion failures are logged and skipped.
    pub async fn begin_activation(&self) -> Result<Vec<String>, Error> {
        self.transition(WorkerState::Activating).await?;

        let names = match self.store.names().await {
            Ok(names) => names,
            Err(e) => {
                tracing::warn!(worker = %self.id, error = %e, "could not list cache instances");
                return Ok(Vec::new());
            }
        };

        let mut pruned = Vec::new();
        for name in names {
            if self.settings.is_current(&name) || !self.settings.owns(&name) {
                continue;
            }

            match self.store.delete(&name).await {
                Ok(true) => {
                    tracing::info!(worker = %self.id, cache = %name, "deleted superseded cache");
                    pruned.push(name);
                }
                Ok(false) => {}
                Err(e) => tracing::warn!(worker = %self.id, cache = %name, error = %e, "failed to delete cache"),
            }
        }

        Ok(pruned)
    }

    pub async fn complete_activation(&self) -> Result<(), Error> {
        self.transition(WorkerState::Activated).await
    }

    /// Mark a replaced or abandoned worker as `Redundant`.
    pub async fn retire(&self) {
        if let Err(e) = self.transition(WorkerState::Redundant).await {
            tracing::debug!(worker = %self.id, error = %e, "already retired");
        }
    }

    /// Route an intercepted request.
    pub async fn handle_fetch(&self, request: &Request) -> Result<FetchOutcome, Error> {
        self.router.handle(request).await
    }

    pub fn handle_message(&self, command: Command) {
        match command {
            Command::SkipWaiting => {
                tracing::debug!(worker = %self.id, "skip waiting requested");
                self.skip_waiting.store(true, Ordering::SeqCst);
            }
        }
    }
}

impl std::fmt::Debug for ServiceWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceWorker")
            .field("id", &self.id)
            .field("version", &self.settings.version)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNetwork, site_config, url};
    use http::StatusCode;
    use precache_core::{AppConfig, MemoryStore};

    fn worker(config: &AppConfig, store: &Arc<MemoryStore>, network: &Arc<FakeNetwork>) -> ServiceWorker {
        let settings = WorkerSettings::from_config(config).unwrap();
        ServiceWorker::new(settings, store.clone(), network.clone()).unwrap()
    }

    #[tokio::test]
    async fn test_install_precaches_every_asset() {
        let config = site_config("v1");
        let store = Arc::new(MemoryStore::default());
        let network = FakeNetwork::serving_site(&config);
        let sw = worker(&config, &store, &network);

        sw.install().await.unwrap();

        assert_eq!(sw.state().await, WorkerState::Installed);
        let handle = store.open("v1-static").await.unwrap();
        assert_eq!(store.len(&handle).await.unwrap(), 7);
        let shell = store.match_in(&handle, &Request::get(url("/index.html"))).await.unwrap().unwrap();
        assert_eq!(&shell.body[..], b"static:/index.html");
    }

    #[tokio::test]
    async fn test_install_is_all_or_nothing() {
        let config = site_config("v1");
        let store = Arc::new(MemoryStore::default());
        let network = FakeNetwork::serving_site(&config);
        network.offline("/js/i18n.js");
        let sw = worker(&config, &store, &network);

        let result = sw.install().await;

        assert!(matches!(result, Err(Error::InstallFailed { ref url, .. }) if url.ends_with("/js/i18n.js")));
        assert_eq!(sw.state().await, WorkerState::Redundant);
        assert!(!store.has("v1-static").await.unwrap());
    }

    #[tokio::test]
    async fn test_install_rejects_non_ok_asset() {
        let config = site_config("v1");
        let store = Arc::new(MemoryStore::default());
        let network = FakeNetwork::serving_site(&config);
        network.respond("/manifest.json", Response::new(StatusCode::NOT_FOUND, ""));
        let sw = worker(&config, &store, &network);

        let err = sw.install().await.unwrap_err();
        assert_eq!(err.code(), "INSTALL_FAILED");
        assert!(err.to_string().contains("404"));
        assert!(!store.has("v1-static").await.unwrap());
    }

    #[tokio::test]
    async fn test_install_sets_skip_waiting_from_config() {
        let config = site_config("v1");
        let store = Arc::new(MemoryStore::default());
        let network = FakeNetwork::serving_site(&config);

        let eager = worker(&config, &store, &network);
        eager.install().await.unwrap();
        assert!(eager.skip_waiting_requested());

        let patient_config = AppConfig { skip_waiting: false, ..site_config("v2") };
        let patient = worker(&patient_config, &store, &network);
        patient.install().await.unwrap();
        assert!(!patient.skip_waiting_requested());

        patient.handle_message(Command::SkipWaiting);
        assert!(patient.skip_waiting_requested());
    }

    #[tokio::test]
    async fn test_activation_prunes_other_versions() {
        let config = site_config("v2");
        let store = Arc::new(MemoryStore::default());
        for name in ["v1-static", "v1-dynamic", "v2-dynamic"] {
            store.open(name).await.unwrap();
        }
        let network = FakeNetwork::serving_site(&config);
        let sw = worker(&config, &store, &network);

        sw.install().await.unwrap();
        let pruned = sw.begin_activation().await.unwrap();
        sw.complete_activation().await.unwrap();

        assert_eq!(pruned, vec!["v1-static", "v1-dynamic"]);
        assert_eq!(store.names().await.unwrap(), vec!["v2-dynamic", "v2-static"]);
        assert_eq!(sw.state().await, WorkerState::Activated);
    }

    #[tokio::test]
    async fn test_activation_keeps_foreign_instances_by_default() {
        let config = AppConfig { origin: crate::testing::ORIGIN.into(), ..Default::default() };
        let store = Arc::new(MemoryStore::default());
        store.open("lp-portfolio-v2.0-static").await.unwrap();
        store.open("analytics-v3").await.unwrap();
        let network = FakeNetwork::serving_site(&config);
        let sw = worker(&config, &store, &network);

        sw.install().await.unwrap();
        let pruned = sw.begin_activation().await.unwrap();

        assert_eq!(pruned, vec!["lp-portfolio-v2.0-static"]);
        assert!(store.has("analytics-v3").await.unwrap());
    }

    #[tokio::test]
    async fn test_activation_before_install_rejected() {
        let config = site_config("v1");
        let store = Arc::new(MemoryStore::default());
        let network = FakeNetwork::serving_site(&config);
        let sw = worker(&config, &store, &network);

        let result = sw.begin_activation().await;
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(sw.state().await, WorkerState::Parsed);
    }

    #[tokio::test]
    async fn test_retire_is_idempotent() {
        let config = site_config("v1");
        let store = Arc::new(MemoryStore::default());
        let network = FakeNetwork::serving_site(&config);
        let sw = worker(&config, &store, &network);

        sw.retire().await;
        sw.retire().await;
        assert_eq!(sw.state().await, WorkerState::Redundant);
    }
}
