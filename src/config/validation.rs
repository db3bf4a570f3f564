//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and relationships
//! between fields. All errors are collected, not just the first.

use thiserror::Error;

use crate::config::schema::DriveConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("rate_limit.requests_per_second must be a positive number, got {0}")]
    InvalidRate(f64),

    #[error("rate_limit.burst_size must be at least 1")]
    ZeroBurst,

    #[error("rate_limit.sweep_interval_secs must be greater than 0")]
    ZeroSweepInterval,

    #[error("rate_limit.idle_retention_secs ({retention}) must not be shorter than sweep_interval_secs ({interval})")]
    RetentionShorterThanSweep { retention: u64, interval: u64 },

    #[error("timeouts.request_secs must be greater than 0")]
    ZeroRequestTimeout,

    #[error("storage.base_dir must not be empty")]
    EmptyBaseDir,

    #[error("session.cookie_name must be a non-empty token without separators")]
    InvalidCookieName,

    #[error("session.ttl_secs must be greater than 0")]
    ZeroSessionTtl,

    #[error("listener.max_connections must be greater than 0")]
    ZeroMaxConnections,

    #[error("security.max_upload_bytes ({upload}) exceeds security.max_body_size ({body})")]
    UploadLargerThanBody { upload: usize, body: usize },

    #[error("admin.api_key must be set when the admin API is enabled")]
    MissingAdminKey,
}

/// Validate a parsed configuration.
pub fn validate_config(config: &DriveConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let rate = &config.rate_limit;
    if !(rate.requests_per_second.is_finite() && rate.requests_per_second > 0.0) {
        errors.push(ValidationError::InvalidRate(rate.requests_per_second));
    }
    if rate.burst_size == 0 {
        errors.push(ValidationError::ZeroBurst);
    }
    if rate.sweep_interval_secs == 0 {
        errors.push(ValidationError::ZeroSweepInterval);
    } else if rate.idle_retention_secs < rate.sweep_interval_secs {
        errors.push(ValidationError::RetentionShorterThanSweep {
            retention: rate.idle_retention_secs,
            interval: rate.sweep_interval_secs,
        });
    }

    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroRequestTimeout);
    }
    if config.storage.base_dir.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyBaseDir);
    }

    let cookie = &config.session.cookie_name;
    if cookie.is_empty() || cookie.chars().any(|c| c.is_whitespace() || ";=,\"".contains(c)) {
        errors.push(ValidationError::InvalidCookieName);
    }
    if config.session.ttl_secs == 0 {
        errors.push(ValidationError::ZeroSessionTtl);
    }
    if config.listener.max_connections == 0 {
        errors.push(ValidationError::ZeroMaxConnections);
    }

    let security = &config.security;
    if security.max_upload_bytes > security.max_body_size {
        errors.push(ValidationError::UploadLargerThanBody {
            upload: security.max_upload_bytes,
            body: security.max_body_size,
        });
    }
    if config.admin.enabled && config.admin.api_key.is_empty() {
        errors.push(ValidationError::MissingAdminKey);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
