pub mod config;
pub mod content;
pub mod resource;

pub use config::{
    AutoBlockConfig, Config, CooperationConfig, HttpClientConfig, LoggingConfig, ProxyConfig,
    ServerConfig, StorageConfig,
};
pub use content::{CacheInfo, Content, ContentAttributes, Payload, RemoteBody};
pub use resource::{CacheCategory, CooperationKey, Resource};
