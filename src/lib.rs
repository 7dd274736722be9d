//! mirror-proxy - caching proxy for remote artifact repositories
//!
//! The proxy serves artifacts from a local store while they are fresh and
//! goes to the upstream origin when they are stale or missing. Concurrent
//! requests for the same resource share one origin fetch, and origin failures
//! fall back to the stale copy when one exists.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): content model, errors and the store/origin ports
//! - **Service Layer** (`services`): freshness policy, cooperation and the proxy facet
//! - **Adapters** (`adapters`): reqwest origin client and in-memory store
//! - **Infrastructure Layer** (`infrastructure`): configuration, logging and HTTP serving
//! - **CLI Layer** (`cli`): Command-line interface
//!
//! # Example
//!
//! ```ignore
//! use mirror_proxy::{cli::build_facet, Config, Resource};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let facet = build_facet(&Config::default())?;
//!     let content = facet.get(&Resource::classified("org/acme/lib/maven-metadata.xml")).await?;
//!     println!("found: {}", content.is_some());
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::models::{CacheCategory, Config, Content, CooperationKey, Resource};
pub use domain::ports::{ContentStore, OriginClient};
pub use domain::{FetchError, ProxyError, ProxyResult, StoreError};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CacheControllerHolder, Cooperation, ProxyFacet};
