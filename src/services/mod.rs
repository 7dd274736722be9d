//! Proxy core: freshness policy, request cooperation and the facet that
//! ties them to the store and the origin.

pub mod cooperation;
pub mod freshness;
pub mod proxy_facet;

pub use cooperation::Cooperation;
pub use freshness::{CacheController, CacheControllerHolder};
pub use proxy_facet::{normalize_remote_url, ProxyFacet};
