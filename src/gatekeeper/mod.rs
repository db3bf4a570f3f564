//! Request gatekeeping: the stage pipeline and its error taxonomy.

pub mod error;
pub mod pipeline;

pub use error::GateError;
pub use pipeline::{Admission, GateRequest, Pipeline};
