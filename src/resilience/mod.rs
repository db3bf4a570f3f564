//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Request handler:
//!     → timeouts.rs (start deadline, create cancellation gate)
//!     → blocking pool: bind root, sandbox, gate.authorize(), file operation
//!     → deadline elapsed: gate.cancel(), respond 504
//! ```
//!
//! # Design Decisions
//! - Every gated request has a deadline
//! - File operations are never retried

pub mod timeouts;

pub use timeouts::{CancelGate, RequestDeadline};
