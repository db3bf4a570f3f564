//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request:
//!     → session.rs (verify the session cookie)
//!     → rate_limit.rs (per-client token bucket)
//!     → sandbox.rs (contain every path in the caller's root)
//!     → headers.rs (security response headers)
//! ```
//!
//! # Design Decisions
//! - Fail closed: reject on any security check failure
//! - No trust in client input, forwarded headers included unless configured

pub mod headers;
pub mod rate_limit;
pub mod sandbox;
pub mod session;
