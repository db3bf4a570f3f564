//! Network layer: optional TLS termination for the drive listener.

pub mod tls;

pub use tls::load_tls_config;
