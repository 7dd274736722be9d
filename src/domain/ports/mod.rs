//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that infrastructure adapters must implement:
//! - ContentStore: Local copy of proxied content
//! - OriginClient: Conditional fetches from the upstream repository
//!
//! These traits keep the proxy core independent of the storage engine and
//! the HTTP stack.

pub mod content_store;
pub mod origin_client;

pub use content_store::ContentStore;
pub use origin_client::{FetchRequest, OriginClient, OriginResponse, STATUS_NOT_MODIFIED, STATUS_OK};
