//! Infrastructure layer module
//!
//! - Configuration management (figment)
//! - Logging infrastructure (tracing)
//! - HTTP serving surface (axum)

pub mod config;
pub mod logging;
pub mod server;
