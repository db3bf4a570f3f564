//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! drive.toml (optional)
//!     → loader.rs (parse, environment overrides)
//!     → validation.rs (semantic checks)
//!     → DriveConfig (validated, immutable)
//!     → held in an ArcSwap; each request loads one snapshot
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → server swaps the snapshot and updates the limiter policy
//! ```

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, DriveConfig, ListenerConfig, MaintenanceConfig, ObservabilityConfig,
    RateLimitConfig, SecurityConfig, SessionConfig, SigningAlgorithm, StorageConfig,
    TimeoutConfig, TlsConfig,
};
