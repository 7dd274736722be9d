//! Proxy configuration loading.
//!
//! Defaults, `mirror-proxy.yaml`, `local.yaml` and `MIRROR_PROXY_*`
//! environment variables are merged with figment, then checked by
//! [`ConfigLoader::validate`] before the facet is built.

pub mod loader;

pub use loader::{ConfigError, ConfigLoader, CONFIG_FILE, ENV_PREFIX, LOCAL_CONFIG_FILE};
