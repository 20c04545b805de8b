//! Resolved, per-version worker settings.
//!
//! `AppConfig` carries strings as loaded from defaults, TOML and environment;
//! `WorkerSettings` is the same information resolved against the origin, with
//! the version's cache instance names derived once.

use precache_client::resolve_asset;
use precache_core::{AppConfig, Error};
use url::Url;

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub version: String,
    pub origin: Url,
    pub static_cache: String,
    pub dynamic_cache: String,
    pub cache_prefix: Option<String>,
    pub static_assets: Vec<Url>,
    pub app_shell: Url,
    pub max_dynamic_entries: usize,
    pub cacheable_extensions: Vec<String>,
    pub skip_waiting: bool,
}

impl WorkerSettings {
    /// Resolve `config` into settings for one worker version.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidUrl` if the origin, a static asset or the app
    /// shell cannot be resolved.
    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = config.origin_url().map_err(|e| Error::InvalidUrl(e.to_string()))?;

        let static_assets = config
            .static_assets
            .iter()
            .map(|asset| resolve_asset(&origin, asset).map_err(|e| Error::InvalidUrl(format!("{asset}: {e}"))))
            .collect::<Result<Vec<_>, _>>()?;

        let app_shell = resolve_asset(&origin, &config.app_shell)
            .map_err(|e| Error::InvalidUrl(format!("{}: {e}", config.app_shell)))?;

        Ok(Self {
            version: config.cache_version.clone(),
            origin,
            static_cache: config.static_cache_name(),
            dynamic_cache: config.dynamic_cache_name(),
            cache_prefix: config.cache_prefix.clone(),
            static_assets,
            app_shell,
            max_dynamic_entries: config.max_dynamic_entries,
            cacheable_extensions: config.cacheable_extensions.clone(),
            skip_waiting: config.skip_waiting,
        })
    }

    /// True for this version's static and dynamic instance names.
    pub fn is_current(&self, name: &str) -> bool {
        name == self.static_cache || name == self.dynamic_cache
    }

    /// True when activation may delete `name`.
    ///
    /// Without a prefix, or with an empty one, every instance in the store belongs to the site.
    pub fn owns(&self, name: &str) -> bool {
        self.cache_prefix.as_deref().is_none_or(|prefix| name.starts_with(prefix))
    }
}
