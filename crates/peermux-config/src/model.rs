//! Typed configuration model.
//!
//! # Design
//! - Pure data carriers; IO lives in `loader.rs`, checks in `validate.rs`.
//! - Every field has a serde default so partial documents load cleanly.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::defaults;

/// Root configuration document.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// HTTP listener settings.
    pub http: HttpConfig,
    /// Directory holding all persisted JSON state.
    pub data_dir: PathBuf,
    /// Web authentication settings.
    pub auth: AuthConfig,
    /// Back-end endpoints.
    pub engines: EngineEndpoints,
    /// Prowlarr passthrough settings.
    pub prowlarr: ProwlarrConfig,
    /// Notifier and event-script settings.
    pub notifier: NotifierConfig,
    /// Periodic loop cadences.
    pub cadence: CadenceConfig,
    /// Hostname resolver cache settings.
    pub resolver: ResolverConfig,
    /// Default save path advertised through the qBittorrent facade.
    pub save_path: String,
    /// Temp path advertised through the qBittorrent facade.
    pub temp_path: String,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Bind address.
    pub bind_addr: String,
    /// Listen port.
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind_addr: defaults::BIND_ADDR.to_string(),
            port: defaults::HTTP_PORT,
        }
    }
}

/// Web authentication settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    /// Whether login is required.
    pub enabled: bool,
    /// Web username.
    pub username: String,
    /// argon2 PHC string of the web password.
    pub password_hash: Option<String>,
}

/// Back-end endpoints and enables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineEndpoints {
    /// Whether the ED2K engine is driven.
    pub amule_enabled: bool,
    /// ED2K engine host.
    pub amule_host: String,
    /// ED2K EC port.
    pub amule_port: u16,
    /// ED2K EC password.
    pub amule_password: String,
    /// Whether the BitTorrent engine is driven.
    pub rtorrent_enabled: bool,
    /// BitTorrent RPC `host:port`.
    pub rtorrent_addr: String,
}

impl Default for EngineEndpoints {
    fn default() -> Self {
        Self {
            amule_enabled: false,
            amule_host: "127.0.0.1".to_string(),
            amule_port: defaults::AMULE_EC_PORT,
            amule_password: String::new(),
            rtorrent_enabled: false,
            rtorrent_addr: defaults::RTORRENT_ADDR.to_string(),
        }
    }
}

/// Prowlarr passthrough settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProwlarrConfig {
    /// Whether BT search is delegated to Prowlarr.
    pub enabled: bool,
    /// Prowlarr base URL.
    pub base_url: String,
    /// Prowlarr API key.
    pub api_key: String,
}

/// Notifier and event-script settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    /// Apprise binary name or path.
    pub apprise_bin: String,
    /// Optional user event script.
    pub script_path: Option<PathBuf>,
    /// Event-script kill timeout in seconds.
    pub script_timeout_secs: u64,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            apprise_bin: "apprise".to_string(),
            script_path: None,
            script_timeout_secs: defaults::SCRIPT_TIMEOUT_SECS,
        }
    }
}

/// Periodic loop cadences.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Snapshot merge cadence in seconds.
    pub snapshot_secs: u64,
    /// Category reconciliation cadence in seconds.
    pub category_sync_secs: u64,
    /// History refresh cadence in seconds.
    pub history_secs: u64,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            snapshot_secs: defaults::SNAPSHOT_SECS,
            category_sync_secs: defaults::CATEGORY_SYNC_SECS,
            history_secs: defaults::HISTORY_SECS,
        }
    }
}

/// Hostname resolver cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Success TTL in seconds.
    pub ttl_secs: u64,
    /// Failure TTL in seconds.
    pub failed_ttl_secs: u64,
    /// Strict cache bound.
    pub max_cache_size: usize,
    /// Per-lookup deadline in seconds.
    pub lookup_timeout_secs: u64,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            ttl_secs: defaults::RESOLVER_TTL_SECS,
            failed_ttl_secs: defaults::RESOLVER_FAILED_TTL_SECS,
            max_cache_size: defaults::RESOLVER_MAX_CACHE,
            lookup_timeout_secs: defaults::RESOLVER_LOOKUP_SECS,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_loads_with_defaults() {
        let config: AppConfig = serde_json::from_str("{}").expect("parse");
        assert_eq!(config.http.port, 8686);
        assert_eq!(config.cadence.snapshot_secs, 2);
        assert_eq!(config.resolver.lookup_timeout_secs, 3);
        assert!(!config.auth.enabled);
        assert!(!config.engines.amule_enabled);
    }

    #[test]
    fn partial_document_overrides_selected_fields() {
        let config: AppConfig = serde_json::from_str(
            r#"{"http": {"port": 9000}, "engines": {"amule_enabled": true, "amule_host": "mule"}}"#,
        )
        .expect("parse");
        assert_eq!(config.http.port, 9000);
        assert_eq!(config.http.bind_addr, "0.0.0.0");
        assert!(config.engines.amule_enabled);
        assert_eq!(config.engines.amule_host, "mule");
        assert_eq!(config.engines.amule_port, 4712);
    }
}
