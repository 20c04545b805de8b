//! Request interception.
//!
//! ### Routing
//! - Non-GET: passthrough, no cache read or write.
//! - GET, any origin: a hit in any cache instance answers without touching the network.
//! - Same-origin miss: network; a `200` is copied into the dynamic cache.
//!   A failed navigation falls back to the cached app shell.
//! - Cross-origin miss: network; a `200` for an allow-listed extension is copied
//!   into the dynamic cache. Failures propagate.
//!
//! Every dynamic insertion schedules bound enforcement on the maintenance task.

pub mod filter;

use std::sync::Arc;

use precache_client::Network;
use precache_core::{CacheHandle, CacheStore, Error, Request, Response};
use url::Url;

pub use filter::AssetFilter;

use crate::maintenance::Maintenance;
use crate::settings::WorkerSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseSource {
    Cache,
    Network,
    /// The cached app shell, served because a navigation could not reach the network.
    AppShell,
}

/// Result of intercepting one request.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchOutcome {
    /// Not intercepted; the request goes to the network untouched.
    Passthrough,
    Respond { response: Response, source: ResponseSource },
}

impl FetchOutcome {
    fn respond(response: Response, source: ResponseSource) -> Self {
        FetchOutcome::Respond { response, source }
    }

    pub fn response(&self) -> Option<&Response> {
        match self {
            FetchOutcome::Respond { response, .. } => Some(response),
            FetchOutcome::Passthrough => None,
        }
    }

    pub fn source(&self) -> Option<ResponseSource> {
        match self {
            FetchOutcome::Respond { source, .. } => Some(*source),
            FetchOutcome::Passthrough => None,
        }
    }
}

pub struct Router {
    store: Arc<dyn CacheStore>,
    network: Arc<dyn Network>,
    maintenance: Maintenance,
    origin: Url,
    dynamic_cache: String,
    app_shell: Url,
    bound: usize,
    filter: AssetFilter,
}

impl Router {
    pub fn new(
        settings: &WorkerSettings, store: Arc<dyn CacheStore>, network: Arc<dyn Network>, maintenance: Maintenance,
    ) -> Result<Self, Error> {
        Ok(Self {
            store,
            network,
            maintenance,
            origin: settings.origin.clone(),
            dynamic_cache: settings.dynamic_cache.clone(),
            app_shell: settings.app_shell.clone(),
            bound: settings.max_dynamic_entries,
            filter: AssetFilter::new(&settings.cacheable_extensions)?,
        })
    }

    /// Decide how to answer `request`.
    ///
    /// # Errors
    ///
    /// Returns the network error when neither the cache nor the fallback can
    /// answer, or a storage error from the cache lookup.
    pub async fn handle(&self, request: &Request) -> Result<FetchOutcome, Error> {
        if !request.is_get() {
            tracing::debug!(method = %request.method, url = %request.url, "passthrough");
            return Ok(FetchOutcome::Passthrough);
        }

        if let Some(hit) = self.store.match_any(request).await? {
            tracing::debug!(url = %request.url, "cache hit");
            return Ok(FetchOutcome::respond(hit, ResponseSource::Cache));
        }

        tracing::debug!(url = %request.url, "cache miss");

        if request.is_same_origin(&self.origin) {
            self.same_origin(request).await
        } else {
            self.cross_origin(request).await
        }
    }

    async fn same_origin(&self, request: &Request) -> Result<FetchOutcome, Error> {
        match self.network.fetch(request).await {
            Ok(response) => {
                if response.is_ok_status() {
                    self.store_dynamic(request, &response).await;
                }
                Ok(FetchOutcome::respond(response, ResponseSource::Network))
            }
            Err(err) if request.is_navigation() => self.app_shell(request, err).await,
            Err(err) => Err(err),
        }
    }

    async fn cross_origin(&self, request: &Request) -> Result<FetchOutcome, Error> {
        let response = self.network.fetch(request).await?;

        if response.is_ok_status() && self.filter.is_cacheable(&request.url) {
            self.store_dynamic(request, &response).await;
        }

        Ok(FetchOutcome::respond(response, ResponseSource::Network))
    }

    async fn app_shell(&self, request: &Request, err: Error) -> Result<FetchOutcome, Error> {
        let shell = Request::get(self.app_shell.clone());

        match self.store.match_any(&shell).await {
            Ok(Some(response)) => {
                tracing::info!(url = %request.url, error = %err, "network unreachable; serving app shell");
                Ok(FetchOutcome::respond(response, ResponseSource::AppShell))
            }
            Ok(None) => Err(err),
            Err(lookup) => {
                tracing::warn!(url = %request.url, error = %lookup, "app shell lookup failed");
                Err(err)
            }
        }
    }

    /// Store a copy of `response` in the dynamic cache. Storage errors are
    /// logged; the caller still gets the response.
    async fn store_dynamic(&self, request: &Request, response: &Response) {
        match self.put_dynamic(request, response).await {
            Ok(handle) => self.maintenance.enforce_bound(handle, self.bound),
            Err(e) => tracing::warn!(url = %request.url, error = %e, "failed to store response"),
        }
    }

    async fn put_dynamic(&self, request: &Request, response: &Response) -> Result<CacheHandle, Error> {
        let handle = self.store.open(&self.dynamic_cache).await?;
        self.store.put(&handle, request, response).await?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeNetwork, GatedStore, site_config, url};
    use futures::future::join_all;
    use http::{Method, StatusCode, header};
    use precache_core::{Destination, MemoryStore};

    struct Fixture {
        store: Arc<MemoryStore>,
        network: Arc<FakeNetwork>,
        maintenance: Maintenance,
        router: Router,
        settings: WorkerSettings,
    }

    fn fixture_with(max_dynamic_entries: usize) -> Fixture {
        let config = precache_core::AppConfig { max_dynamic_entries, ..site_config("v1") };
        let settings = WorkerSettings::from_config(&config).unwrap();
        let store = Arc::new(MemoryStore::default());
        let network = FakeNetwork::new();
        let maintenance = Maintenance::spawn(store.clone());
        let router = Router::new(&settings, store.clone(), network.clone(), maintenance.clone()).unwrap();
        Fixture { store, network, maintenance, router, settings }
    }

    fn fixture() -> Fixture {
        fixture_with(50)
    }

    impl Fixture {
        async fn dynamic(&self) -> CacheHandle {
            self.store.open(&self.settings.dynamic_cache).await.unwrap()
        }

        async fn seed_static(&self, path: &str, body: &'static str) {
            let handle = self.store.open(&self.settings.static_cache).await.unwrap();
            self.store.put(&handle, &Request::get(url(path)), &Response::ok(body)).await.unwrap();
        }

        async fn cached(&self, path_or_url: &str) -> bool {
            self.store.match_any(&Request::get(url(path_or_url))).await.unwrap().is_some()
        }
    }

    #[tokio::test]
    async fn test_non_get_passthrough() {
        let f = fixture();
        f.seed_static("/contact", "cached").await;
        f.network.respond("/contact", Response::ok("sent"));

        for method in [Method::POST, Method::PUT, Method::DELETE] {
            let outcome = f.router.handle(&Request::new(method, url("/contact"))).await.unwrap();
            assert_eq!(outcome, FetchOutcome::Passthrough);
        }

        assert_eq!(f.network.total_calls(), 0);
        assert!(!f.store.has(&f.settings.dynamic_cache).await.unwrap());
    }

    #[tokio::test]
    async fn test_cache_hit_skips_network() {
        let f = fixture();
        f.seed_static("/css/styles.css", "body{}").await;
        f.network.respond("/css/styles.css", Response::ok("fresh"));

        let outcome = f.router.handle(&Request::get(url("/css/styles.css"))).await.unwrap();
        assert_eq!(outcome.source(), Some(ResponseSource::Cache));
        assert_eq!(&outcome.response().unwrap().body[..], b"body{}");
        assert_eq!(f.network.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_same_origin_miss_is_stored() {
        let f = fixture();
        f.network.respond("/projects.html", Response::ok("<h1>Projects</h1>"));

        let outcome = f.router.handle(&Request::get(url("/projects.html"))).await.unwrap();
        assert_eq!(outcome.source(), Some(ResponseSource::Network));
        assert_eq!(&outcome.response().unwrap().body[..], b"<h1>Projects</h1>");

        let handle = f.dynamic().await;
        let stored = f.store.match_in(&handle, &Request::get(url("/projects.html"))).await.unwrap().unwrap();
        assert_eq!(&stored, outcome.response().unwrap());

        f.network.go_offline();
        let again = f.router.handle(&Request::get(url("/projects.html"))).await.unwrap();
        assert_eq!(again.source(), Some(ResponseSource::Cache));
        assert_eq!(f.network.calls_to("/projects.html"), 1);
    }

    #[tokio::test]
    async fn test_non_ok_status_not_stored() {
        let f = fixture();
        f.network.respond("/missing", Response::new(StatusCode::NOT_FOUND, "nope"));
        f.network.respond("/empty", Response::new(StatusCode::NO_CONTENT, ""));

        let outcome = f.router.handle(&Request::get(url("/missing"))).await.unwrap();
        assert_eq!(outcome.response().unwrap().status, StatusCode::NOT_FOUND);
        let outcome = f.router.handle(&Request::get(url("/empty"))).await.unwrap();
        assert_eq!(outcome.response().unwrap().status, StatusCode::NO_CONTENT);

        assert!(!f.cached("/missing").await);
        assert!(!f.cached("/empty").await);
    }

    #[tokio::test]
    async fn test_offline_navigation_serves_app_shell() {
        let f = fixture();
        f.seed_static("/index.html", "<!doctype html><main id=app></main>").await;

        let outcome = f.router.handle(&Request::navigate(url("/projects/weather-app"))).await.unwrap();
        assert_eq!(outcome.source(), Some(ResponseSource::AppShell));
        assert_eq!(&outcome.response().unwrap().body[..], b"<!doctype html><main id=app></main>");
    }

    #[tokio::test]
    async fn test_offline_navigation_without_shell_fails() {
        let f = fixture();
        let result = f.router.handle(&Request::navigate(url("/about"))).await;
        assert!(matches!(result, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_offline_subresource_fails_even_with_shell() {
        let f = fixture();
        f.seed_static("/index.html", "<html></html>").await;

        let request = Request::get(url("/js/extra.js")).with_destination(Destination::Script);
        assert!(matches!(f.router.handle(&request).await, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_cross_origin_png_not_cached() {
        let f = fixture();
        let avatar = "https://images.example.net/avatar.png";
        f.network.respond(avatar, Response::ok("PNG"));

        let first = f.router.handle(&Request::get(url(avatar))).await.unwrap();
        assert_eq!(first.source(), Some(ResponseSource::Network));
        assert!(!f.cached(avatar).await);

        let second = f.router.handle(&Request::get(url(avatar))).await.unwrap();
        assert_eq!(second.source(), Some(ResponseSource::Network));
        assert_eq!(f.network.calls_to(avatar), 2);
    }

    #[tokio::test]
    async fn test_cross_origin_font_cached() {
        let f = fixture();
        let font = "https://fonts.example.net/inter.woff2";
        f.network.respond(font, Response::ok("wOF2").with_header(header::CONTENT_TYPE, "font/woff2".parse().unwrap()));

        f.router.handle(&Request::get(url(font)).with_destination(Destination::Font)).await.unwrap();
        assert!(f.cached(font).await);

        let again = f.router.handle(&Request::get(url(font))).await.unwrap();
        assert_eq!(again.source(), Some(ResponseSource::Cache));
        assert_eq!(f.network.calls_to(font), 1);
    }

    #[tokio::test]
    async fn test_cross_origin_error_status_not_cached() {
        let f = fixture();
        let sheet = "https://cdn.example.net/theme.css";
        f.network.respond(sheet, Response::new(StatusCode::SERVICE_UNAVAILABLE, ""));

        let outcome = f.router.handle(&Request::get(url(sheet))).await.unwrap();
        assert_eq!(outcome.response().unwrap().status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!f.cached(sheet).await);
    }

    #[tokio::test]
    async fn test_cross_origin_failure_propagates() {
        let f = fixture();
        f.seed_static("/index.html", "<html></html>").await;

        let request = Request::navigate(url("https://cdn.example.net/embed"));
        assert!(matches!(f.router.handle(&request).await, Err(Error::Network(_))));
    }

    #[tokio::test]
    async fn test_dynamic_bound_keeps_newest() {
        let f = fixture_with(2);
        for path in ["/a", "/b", "/c"] {
            f.network.respond(path, Response::ok(path));
            f.router.handle(&Request::get(url(path))).await.unwrap();
        }
        f.maintenance.flush().await;

        assert!(!f.cached("/a").await);
        assert!(f.cached("/b").await);
        assert!(f.cached("/c").await);
        assert_eq!(f.store.len(&f.dynamic().await).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_bound_evicts_exactly_the_oldest() {
        let f = fixture_with(3);
        let paths: Vec<String> = (0..7).map(|i| format!("/post/{i}")).collect();
        for path in &paths {
            f.network.respond(path, Response::ok(path.clone()));
            f.router.handle(&Request::get(url(path))).await.unwrap();
        }
        f.maintenance.flush().await;

        for (i, path) in paths.iter().enumerate() {
            assert_eq!(f.cached(path).await, i >= 4, "{path}");
        }
    }

    #[tokio::test]
    async fn test_eviction_does_not_delay_response() {
        let config = precache_core::AppConfig { max_dynamic_entries: 1, ..site_config("v1") };
        let settings = WorkerSettings::from_config(&config).unwrap();
        let store = Arc::new(GatedStore::default());
        let network = FakeNetwork::new();
        let maintenance = Maintenance::spawn(store.clone());
        let router = Router::new(&settings, store.clone(), network.clone(), maintenance.clone()).unwrap();
        let gate = store.hold_evictions();

        for path in ["/a", "/b", "/c"] {
            network.respond(path, Response::ok(path));
            let outcome = router.handle(&Request::get(url(path))).await.unwrap();
            assert_eq!(outcome.source(), Some(ResponseSource::Network));
        }
        store.eviction_started().await;

        let dynamic = store.open(&settings.dynamic_cache).await.unwrap();
        assert_eq!(store.len(&dynamic).await.unwrap(), 3);

        store.release_evictions(&gate);
        maintenance.flush().await;
        assert_eq!(store.len(&dynamic).await.unwrap(), 1);
        assert!(store.match_in(&dynamic, &Request::get(url("/c"))).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_concurrent_misses_are_all_stored() {
        let f = fixture();
        let paths: Vec<String> = (0..6).map(|i| format!("/post/{i}")).collect();
        for path in &paths {
            f.network.respond(path, Response::ok(path.clone()));
        }

        let requests: Vec<Request> = paths.iter().map(|p| Request::get(url(p))).collect();
        let outcomes = join_all(requests.iter().map(|r| f.router.handle(r))).await;
        f.maintenance.flush().await;

        for (path, outcome) in paths.iter().zip(outcomes) {
            assert_eq!(&outcome.unwrap().response().unwrap().body[..], path.as_bytes());
            assert!(f.cached(path).await, "{path}");
        }
        assert_eq!(f.store.len(&f.dynamic().await).await.unwrap(), 6);
    }

    #[tokio::test]
    async fn test_concurrent_misses_for_one_url_keep_one_entry() {
        let f = fixture();
        f.network.respond("/about", Response::ok("About"));

        let request = Request::get(url("/about"));
        let (first, second, third) =
            tokio::join!(f.router.handle(&request), f.router.handle(&request), f.router.handle(&request));
        for outcome in [first, second, third] {
            assert_eq!(&outcome.unwrap().response().unwrap().body[..], b"About");
        }

        assert_eq!(f.store.len(&f.dynamic().await).await.unwrap(), 1);
    }
}
