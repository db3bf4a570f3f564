//! Drive gatekeeper library.
//!
//! Authenticates session cookies, rate-limits clients and confines every path
//! to the caller's storage root before a file operation runs.

pub mod admin;
pub mod config;
pub mod drive;
pub mod gatekeeper;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod resilience;
pub mod security;

pub use config::schema::DriveConfig;
pub use gatekeeper::{GateError, Pipeline};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
