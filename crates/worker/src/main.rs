//! precache entry point.
//!
//! Boots the worker against the configured origin and SQLite database, runs
//! install and activation once, and reports the resulting cache instances.
//! Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use precache_client::{FetchClient, FetchConfig};
use precache_core::{AppConfig, CacheDb, CacheStore};
use precache_worker::{EventOutcome, Registration, ServiceWorker, WorkerSettings};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let settings = WorkerSettings::from_config(&config)?;

    tracing::info!(
        origin = %settings.origin,
        version = %settings.version,
        db = %config.db_path.display(),
        "starting precache"
    );

    let store: Arc<dyn CacheStore> = Arc::new(
        CacheDb::open(&config.db_path)
            .await
            .with_context(|| format!("opening cache database {}", config.db_path.display()))?,
    );
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);

    let registration = Registration::new(settings.origin.clone());
    let worker = ServiceWorker::new(settings, store.clone(), network)?;

    match registration.register(worker).await {
        Ok(EventOutcome::Installed { activated }) => tracing::info!(activated, "install complete"),
        Ok(outcome) => tracing::info!(?outcome, "install finished"),
        Err(e) => {
            tracing::error!(error = %e, "install failed");
            return Err(e.into());
        }
    }

    if let Some(active) = registration.active().await {
        active.maintenance().flush().await;
    }

    for name in store.names().await? {
        let handle = store.open(&name).await?;
        let entries = store.len(&handle).await?;
        tracing::info!(cache = %name, entries, "cache instance");
    }

    Ok(())
}
