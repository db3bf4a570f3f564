pub mod backpressure;
pub mod maintenance;

pub use backpressure::backpressure_middleware;
pub use maintenance::maintenance_middleware;
