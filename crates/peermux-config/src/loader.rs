//! JSON-file configuration facade and password handling.

use std::fs;
use std::path::{Path, PathBuf};

use argon2::Argon2;
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::{info, warn};

use crate::defaults::{CONFIG_FILE, DATA_DIR};
use crate::error::{ConfigError, ConfigResult};
use crate::model::AppConfig;
use crate::validate::validate;

/// Loaded configuration plus the secrets helpers built on it.
#[derive(Debug, Clone)]
pub struct ConfigService {
    config: AppConfig,
    path: PathBuf,
}

impl ConfigService {
    /// Load and validate the configuration file at `path`.
    ///
    /// A missing file yields the defaults (with `data_dir` pointed at the
    /// file's directory) so a fresh deployment starts without ceremony.
    ///
    /// # Errors
    ///
    /// Returns an error when an existing file cannot be read or parsed, or
    /// when the document fails validation.
    pub fn load_from(path: impl Into<PathBuf>) -> ConfigResult<Self> {
        let path = path.into();
        let mut config = match fs::read(&path) {
            Ok(bytes) => {
                serde_json::from_slice::<AppConfig>(&bytes).map_err(|source| ConfigError::Parse {
                    path: path.clone(),
                    source,
                })?
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "config file absent; starting from defaults");
                AppConfig::default()
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.clone(),
                    source,
                });
            }
        };

        if config.data_dir.as_os_str().is_empty() {
            config.data_dir = path
                .parent()
                .filter(|parent| !parent.as_os_str().is_empty())
                .map_or_else(|| PathBuf::from(DATA_DIR), Path::to_path_buf);
        }

        validate(&config)?;
        Ok(Self { config, path })
    }

    /// Load from `PEERMUX_CONFIG` or the default data-dir location.
    ///
    /// # Errors
    ///
    /// Propagates the same failures as [`Self::load_from`].
    pub fn load_from_env() -> ConfigResult<Self> {
        let path = std::env::var_os("PEERMUX_CONFIG")
            .map_or_else(|| Path::new(DATA_DIR).join(CONFIG_FILE), PathBuf::from);
        Self::load_from(path)
    }

    /// The validated configuration.
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Where the configuration was loaded from.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Verify a login attempt against the stored hash.
    ///
    /// Always false when auth is enabled but no hash is stored; login is
    /// not consulted at all when auth is disabled.
    #[must_use]
    pub fn verify_password(&self, candidate: &str) -> bool {
        let Some(stored) = self.config.auth.password_hash.as_deref() else {
            return false;
        };
        let Ok(parsed) = PasswordHash::new(stored) else {
            warn!("stored password hash is not a valid PHC string");
            return false;
        };
        Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok()
    }

    /// Hash a password into the PHC string form the config stores.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::PasswordHash` when hashing fails.
    pub fn hash_password(password: &str) -> ConfigResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|_| ConfigError::PasswordHash)
    }
}
