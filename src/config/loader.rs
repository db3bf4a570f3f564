//! Configuration loading from disk and the environment.

use std::path::{Path, PathBuf};
use std::fs;
use crate::config::schema::DriveConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Signing secret for session tokens.
pub const SIGNING_KEY_ENV: &str = "SIGNING_KEY";
/// Base directory for per-user roots.
pub const STORAGE_ROOT_ENV: &str = "STORAGE_ROOT";
/// `maintenance` switches maintenance mode on, anything else switches it off.
pub const SERVER_STATUS_ENV: &str = "SERVER_STATUS";
/// Bearer key for the admin API and maintenance bypass.
pub const ADMIN_API_KEY_ENV: &str = "ADMIN_API_KEY";

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load configuration from an optional TOML file, apply environment
/// overrides, then validate.
pub fn load_config(path: Option<&Path>) -> Result<DriveConfig, ConfigError> {
    let mut config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
            toml::from_str(&content).map_err(ConfigError::Parse)?
        }
        None => DriveConfig::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Overlay environment values onto a parsed config.
///
/// `lookup` is `std::env::var` in production; tests pass a map.
pub fn apply_env_overrides<F>(config: &mut DriveConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup(SIGNING_KEY_ENV).filter(|v| !v.is_empty()) {
        config.session.signing_key = key;
    }
    if let Some(root) = lookup(STORAGE_ROOT_ENV).filter(|v| !v.is_empty()) {
        config.storage.base_dir = PathBuf::from(root);
    }
    if let Some(status) = lookup(SERVER_STATUS_ENV) {
        config.maintenance.enabled = status.trim().eq_ignore_ascii_case("maintenance");
    }
    if let Some(key) = lookup(ADMIN_API_KEY_ENV).filter(|v| !v.is_empty()) {
        config.admin.api_key = key;
    }
}
