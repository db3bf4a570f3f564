//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware stack)
//!     → request.rs (request id, client address)
//!     → middleware/ (in-flight bound, maintenance gate)
//!     → drive.rs (gatekeeper pipeline, file operation)
//!     → response.rs (render outcome)
//!     → Send to client
//! ```

pub mod drive;
pub mod middleware;
pub mod request;
pub mod response;
pub mod server;

pub use request::{UuidRequestId, X_REQUEST_ID};
pub use server::{AppState, HttpServer};
