//! Application configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (LARDER_*)
//! 2. TOML config file (if LARDER_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (LARDER_*)
/// 2. TOML config file (if LARDER_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Version tag embedded in partition names (`static:<version>`).
    ///
    /// Set via LARDER_VERSION environment variable.
    #[serde(default = "default_version")]
    pub version: String,

    /// Origin that relative manifest entries and request paths resolve against.
    ///
    /// Set via LARDER_ORIGIN environment variable.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Assets precached into the static partition at install time.
    ///
    /// Set via LARDER_STATIC_ASSETS (array syntax, e.g. `["/","/favicon.svg"]`).
    #[serde(default = "default_static_assets")]
    pub static_assets: Vec<String>,

    /// Asset served when an image or font cannot be fetched.
    ///
    /// Set via LARDER_FALLBACK_ASSET environment variable.
    #[serde(default = "default_fallback_asset")]
    pub fallback_asset: Option<String>,

    /// Path to SQLite partition database.
    ///
    /// Set via LARDER_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// User-Agent string for HTTP requests.
    ///
    /// Set via LARDER_USER_AGENT environment variable.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum bytes to fetch per request.
    ///
    /// Set via LARDER_MAX_BYTES environment variable.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Network timeout in milliseconds, applied to every strategy fetch.
    ///
    /// Set via LARDER_TIMEOUT_MS environment variable.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Ask the host to activate right after install.
    ///
    /// Set via LARDER_SKIP_WAITING environment variable.
    #[serde(default = "default_true")]
    pub skip_waiting: bool,

    /// Ask the host to hand open clients to this version on activation.
    ///
    /// Set via LARDER_CLAIM_CLIENTS environment variable.
    #[serde(default = "default_true")]
    pub claim_clients: bool,

    /// Run install (and activation, when skipping the wait) at server start.
    ///
    /// Set via LARDER_BOOTSTRAP_ON_START environment variable.
    #[serde(default = "default_true")]
    pub bootstrap_on_start: bool,

    /// Origins allowed to use the CORS relay. `*` allows any origin.
    ///
    /// Set via LARDER_RELAY_ALLOWED_ORIGINS environment variable.
    #[serde(default = "default_relay_origins")]
    pub relay_allowed_origins: Vec<String>,

    /// Target hostnames the CORS relay may forward to. Empty allows any host.
    ///
    /// Set via LARDER_RELAY_ALLOWED_HOSTS environment variable.
    #[serde(default)]
    pub relay_allowed_hosts: Vec<String>,

    /// Number of form backups kept.
    ///
    /// Set via LARDER_BACKUP_LIMIT environment variable.
    #[serde(default = "default_backup_limit")]
    pub backup_limit: usize,
}

fn default_version() -> String {
    "v1.1.0".into()
}

fn default_origin() -> String {
    "http://localhost:5173".into()
}

fn default_static_assets() -> Vec<String> {
    vec!["/".into(), "/favicon.svg".into(), "/manifest.webmanifest".into(), "/src/shadcn.css".into()]
}

fn default_fallback_asset() -> Option<String> {
    Some("/favicon.svg".into())
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./larder-cache.sqlite")
}

fn default_user_agent() -> String {
    "larder/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_timeout_ms() -> u64 {
    20_000
}

fn default_true() -> bool {
    true
}

fn default_relay_origins() -> Vec<String> {
    vec!["*".into()]
}

fn default_backup_limit() -> usize {
    50
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            origin: default_origin(),
            static_assets: default_static_assets(),
            fallback_asset: default_fallback_asset(),
            db_path: default_db_path(),
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            timeout_ms: default_timeout_ms(),
            skip_waiting: true,
            claim_clients: true,
            bootstrap_on_start: true,
            relay_allowed_origins: default_relay_origins(),
            relay_allowed_hosts: Vec::new(),
            backup_limit: default_backup_limit(),
        }
    }
}

impl AppConfig {
    /// Timeout as Duration for use with reqwest/tokio.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `LARDER_`
    /// 2. TOML file from `LARDER_CONFIG_FILE` (if set)
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

        if let Ok(config_path) = std::env::var("LARDER_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("LARDER_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// Parsed origin URL.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if the origin is not an http(s) URL.
    pub fn origin_url(&self) -> Result<url::Url, ConfigError> {
        let parsed = url::Url::parse(&self.origin)
            .map_err(|e| ConfigError::Invalid { field: "origin".into(), reason: e.to_string() })?;
        match parsed.scheme() {
            "http" | "https" => Ok(parsed),
            scheme => Err(ConfigError::Invalid { field: "origin".into(), reason: format!("unsupported scheme {scheme}") }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.version, "v1.1.0");
        assert_eq!(config.origin, "http://localhost:5173");
        assert_eq!(config.static_assets, vec!["/", "/favicon.svg", "/manifest.webmanifest", "/src/shadcn.css"]);
        assert_eq!(config.fallback_asset.as_deref(), Some("/favicon.svg"));
        assert_eq!(config.db_path, PathBuf::from("./larder-cache.sqlite"));
        assert_eq!(config.user_agent, "larder/0.1");
        assert_eq!(config.max_bytes, 5_242_880);
        assert_eq!(config.timeout_ms, 20_000);
        assert!(config.skip_waiting);
        assert!(config.claim_clients);
        assert_eq!(config.relay_allowed_origins, vec!["*"]);
        assert!(config.relay_allowed_hosts.is_empty());
        assert_eq!(config.backup_limit, 50);
    }

    #[test]
    fn test_timeout_duration() {
        let config = AppConfig::default();
        assert_eq!(config.timeout(), Duration::from_millis(20_000));
    }

    #[test]
    fn test_origin_url() {
        let config = AppConfig::default();
        assert_eq!(config.origin_url().unwrap().as_str(), "http://localhost:5173/");

        let config = AppConfig { origin: "ftp://example.com".into(), ..Default::default() };
        assert!(matches!(config.origin_url(), Err(ConfigError::Invalid { .. })));
    }

    #[test]
    fn test_toml_layer_overrides_defaults() {
        let config: AppConfig = Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::string(
                r#"
                version = "v2"
                static_assets = ["/", "/icon.svg"]
                skip_waiting = false
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(config.version, "v2");
        assert_eq!(config.static_assets, vec!["/", "/icon.svg"]);
        assert!(!config.skip_waiting);
        assert_eq!(config.timeout_ms, 20_000);
    }
}
