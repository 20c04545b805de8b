//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (PRECACHE_*)
//! 2. TOML config file (if PRECACHE_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use url::Url;

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (PRECACHE_*)
/// 2. TOML config file (if PRECACHE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Origin of the site the worker serves; requests to any other origin are cross-origin.
    ///
    /// Set via PRECACHE_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Cache version. Bumping it orphans every instance named under the old one.
    ///
    /// Set via PRECACHE_CACHE_VERSION environment variable.
    #[serde(default = "default_cache_version")]
    pub cache_version: String,

    /// Activation only prunes instances whose name starts with this prefix.
    /// `None` or an empty prefix lets it prune every other instance in the store.
    ///
    /// Set via PRECACHE_CACHE_PREFIX environment variable.
    #[serde(default = "default_cache_prefix")]
    pub cache_prefix: Option<String>,

    /// Paths (or absolute URLs) precached at install time, in order.
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Maximum number of entries kept in the dynamic cache.
    ///
    /// Set via PRECACHE_MAX_DYNAMIC_ENTRIES environment variable.
    #[serde(default = "default_max_dynamic_entries")]
    pub max_dynamic_entries: usize,

    /// Document served to navigations when the network is unreachable.
    ///
    /// Set via PRECACHE_APP_SHELL environment variable.
    #[serde(default = "default_app_shell")]
    pub app_shell: String,

    /// Extensions of cross-origin assets that may be stored in the dynamic cache.
    #[serde(default = "default_cacheable_extensions")]
    pub cacheable_extensions: Vec<String>,

    /// Skip the waiting phase right after a successful install.
    ///
    /// Set via PRECACHE_SKIP_WAITING environment variable.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Path to SQLite cache database.
    ///
    /// Set via PRECACHE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for network requests.
    ///
    /// Set via PRECACHE_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Optional network timeout in milliseconds. Unset means requests may wait indefinitely.
    ///
    /// Set via PRECACHE_TIMEOUT_MS environment variable.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_cache_version() -> String {
    "lp-portfolio-v2.1".into()
}

fn default_cache_prefix() -> Option<String> {
    Some("lp-portfolio-".into())
}

fn default_static_assets() -> Vec<String> {
    ["/", "/index.html", "/css/styles.css", "/js/main.js", "/js/interactive.js", "/js/i18n.js", "/manifest.json"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_max_dynamic_entries() -> usize {
    50
}

fn default_app_shell() -> String {
    "/index.html".into()
}

fn default_cacheable_extensions() -> Vec<String> {
    ["css", "js", "woff2", "woff", "ttf"].into_iter().map(String::from).collect()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./precache.sqlite")
}

fn default_user_agent() -> String {
    "precache/0.1".into()
}

fn default_true() -> bool {
    true
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            origin: default_origin(),
            cache_version: default_cache_version(),
            cache_prefix: default_cache_prefix(),
            static_assets: default_static_assets(),
            max_dynamic_entries: default_max_dynamic_entries(),
            app_shell: default_app_shell(),
            cacheable_extensions: default_cacheable_extensions(),
            skip_waiting: true,
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            timeout_ms: None,
        }
    }
}

impl AppConfig {
    /// Name of the precache instance for the current version.
    pub fn static_cache_name(&self) -> String {
        format!("{}-static", self.cache_version)
    }

    /// Name of the runtime-populated instance for the current version.
    pub fn dynamic_cache_name(&self) -> String {
        format!("{}-dynamic", self.cache_version)
    }

    /// Parsed site origin.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if `origin` is not an absolute URL.
    pub fn origin_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.origin).map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })
    }

    /// Timeout as Duration for use with reqwest, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `PRECACHE_`
    /// 2. TOML file from `PRECACHE_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("PRECACHE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("PRECACHE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }
}
