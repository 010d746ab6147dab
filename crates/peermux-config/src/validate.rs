//! Structural validation of the configuration model.

use url::Url;

use crate::error::{ConfigError, ConfigResult};
use crate::model::AppConfig;

/// Validate a parsed configuration before it is handed to the app.
///
/// # Errors
///
/// Returns `ConfigError::Invalid` naming the first violated rule.
pub fn validate(config: &AppConfig) -> ConfigResult<()> {
    if config.http.port == 0 {
        return Err(ConfigError::invalid("http.port must be non-zero"));
    }
    config
        .http
        .bind_addr
        .parse::<std::net::IpAddr>()
        .map_err(|_| {
            ConfigError::invalid(format!(
                "http.bind_addr '{}' is not an IP address",
                config.http.bind_addr
            ))
        })?;

    if !config.data_dir.as_os_str().is_empty() && !config.data_dir.is_absolute() {
        return Err(ConfigError::invalid("data_dir must be an absolute path"));
    }

    if config.engines.amule_enabled {
        if config.engines.amule_host.is_empty() {
            return Err(ConfigError::invalid(
                "engines.amule_host must be set when the ED2K engine is enabled",
            ));
        }
        if config.engines.amule_port == 0 {
            return Err(ConfigError::invalid("engines.amule_port must be non-zero"));
        }
    }
    if config.engines.rtorrent_enabled && config.engines.rtorrent_addr.is_empty() {
        return Err(ConfigError::invalid(
            "engines.rtorrent_addr must be set when the BT engine is enabled",
        ));
    }

    if config.prowlarr.enabled {
        Url::parse(&config.prowlarr.base_url).map_err(|_| {
            ConfigError::invalid(format!(
                "prowlarr.base_url '{}' is not a URL",
                config.prowlarr.base_url
            ))
        })?;
    }

    if config.auth.enabled && config.auth.password_hash.is_none() {
        return Err(ConfigError::invalid(
            "auth.password_hash must be set when auth is enabled",
        ));
    }

    if config.cadence.snapshot_secs == 0 || config.cadence.history_secs == 0 {
        return Err(ConfigError::invalid("cadence values must be non-zero"));
    }
    if config.resolver.max_cache_size == 0 {
        return Err(ConfigError::invalid(
            "resolver.max_cache_size must be non-zero",
        ));
    }

    Ok(())
}
