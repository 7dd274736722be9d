//! Adapters implementing the domain ports.
//!
//! - `http`: reqwest origin client with auto-blocking
//! - `memory`: in-memory content store

pub mod http;
pub mod memory;

pub use http::{AutoBlock, HttpOriginClient};
pub use memory::MemoryContentStore;
