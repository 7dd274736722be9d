//! Domain layer for the mirror proxy
//!
//! This module contains the cached content model, configuration, errors and
//! the ports the proxy core talks through.

pub mod errors;
pub mod models;
pub mod ports;

// Re-export error types for convenient access
pub use errors::{FetchError, ProxyError, ProxyResult, StoreError};
