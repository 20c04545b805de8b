//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;
use url::Url;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `cache_version` is empty
    /// - `origin` is not an absolute http(s) URL
    /// - `max_dynamic_entries` is 0
    /// - `app_shell` is not an absolute path
    /// - a static asset is neither an absolute path nor an http(s) URL
    /// - `user_agent` is empty
    /// - `timeout_ms` is set outside 100ms..=5 minutes
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.cache_version.trim().is_empty() {
            return Err(invalid("cache_version", "must not be empty"));
        }

        let origin = self.origin_url()?;
        if !matches!(origin.scheme(), "http" | "https") {
            return Err(invalid("origin", format!("unsupported scheme: {}", origin.scheme())));
        }

        if self.max_dynamic_entries == 0 {
            return Err(invalid("max_dynamic_entries", "must be greater than 0"));
        }

        if !self.app_shell.starts_with('/') {
            return Err(invalid("app_shell", "must be an absolute path"));
        }

        for asset in &self.static_assets {
            let acceptable = asset.starts_with('/')
                || Url::parse(asset).is_ok_and(|url| matches!(url.scheme(), "http" | "https"));
            if !acceptable {
                return Err(invalid("static_assets", format!("not an absolute path or http(s) URL: {asset}")));
            }
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if let Some(timeout_ms) = self.timeout_ms {
            if timeout_ms < 100 {
                return Err(invalid("timeout_ms", "must be at least 100ms"));
            }
            if timeout_ms > 300_000 {
                return Err(invalid("timeout_ms", "must not exceed 5 minutes (300000ms)"));
            }
        }

        if let Some(prefix) = self.cache_prefix.as_deref().filter(|p| !self.cache_version.starts_with(p)) {
            tracing::warn!(
                cache_prefix = prefix,
                cache_version = %self.cache_version,
                "cache_version is outside cache_prefix; future versions will not prune its instances"
            );
        }

        if !self.static_assets.iter().any(|asset| asset == &self.app_shell) {
            tracing::warn!(
                app_shell = %self.app_shell,
                "app_shell is not in static_assets; offline navigations will only \
                 succeed once it has been cached at runtime"
            );
        }

        Ok(())
    }
}
