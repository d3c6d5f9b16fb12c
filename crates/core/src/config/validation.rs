//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `version` is empty or contains `:` (the partition name separator)
    /// - `origin` is not an http(s) URL
    /// - a `static_assets` entry is neither an absolute path nor an http(s) URL
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - `timeout_ms` is less than 100ms or exceeds 5 minutes
    /// - `user_agent` is empty
    /// - `backup_limit` is 0
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "version".into(),
                hint: "Set LARDER_VERSION environment variable".into(),
            });
        }
        if self.version.contains(':') {
            return Err(ConfigError::Invalid { field: "version".into(), reason: "must not contain ':'".into() });
        }

        self.origin_url()?;

        for asset in &self.static_assets {
            if !is_manifest_entry(asset) {
                return Err(ConfigError::Invalid {
                    field: "static_assets".into(),
                    reason: format!("{asset:?} is not an absolute path or http(s) URL"),
                });
            }
        }

        if let Some(fallback) = &self.fallback_asset {
            if !is_manifest_entry(fallback) {
                return Err(ConfigError::Invalid {
                    field: "fallback_asset".into(),
                    reason: format!("{fallback:?} is not an absolute path or http(s) URL"),
                });
            }
            if !self.static_assets.contains(fallback) {
                tracing::warn!(
                    fallback_asset = %fallback,
                    "fallback_asset is not precached; it is served only once a runtime copy exists"
                );
            }
        }

        if self.max_bytes == 0 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must be greater than 0".into() });
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(ConfigError::Invalid { field: "max_bytes".into(), reason: "must not exceed 50MB".into() });
        }

        if self.timeout_ms < 100 {
            return Err(ConfigError::Invalid { field: "timeout_ms".into(), reason: "must be at least 100ms".into() });
        }
        if self.timeout_ms > 300_000 {
            return Err(ConfigError::Invalid {
                field: "timeout_ms".into(),
                reason: "must not exceed 5 minutes (300000ms)".into(),
            });
        }

        if self.user_agent.is_empty() {
            return Err(ConfigError::Invalid { field: "user_agent".into(), reason: "must not be empty".into() });
        }

        if self.backup_limit == 0 {
            return Err(ConfigError::Invalid { field: "backup_limit".into(), reason: "must be greater than 0".into() });
        }

        Ok(())
    }
}

fn is_manifest_entry(entry: &str) -> bool {
    entry.starts_with('/') || entry.starts_with("http://") || entry.starts_with("https://")
}
