use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for the mirror proxy
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Proxy repository configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Single-flight cooperation configuration
    #[serde(default)]
    pub cooperation: CooperationConfig,

    /// Outbound HTTP client configuration
    #[serde(default)]
    pub http: HttpClientConfig,

    /// Remote auto-blocking configuration
    #[serde(default)]
    pub auto_block: AutoBlockConfig,

    /// Local content store configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP serving configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Proxy repository configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ProxyConfig {
    /// Base URL of the upstream repository being mirrored
    #[serde(default = "default_remote_url")]
    pub remote_url: String,

    /// Max-age of cached content, in minutes
    #[serde(default = "default_max_age_minutes")]
    pub content_max_age_minutes: i64,

    /// Max-age of cached metadata, in minutes
    #[serde(default = "default_max_age_minutes")]
    pub metadata_max_age_minutes: i64,
}

fn default_remote_url() -> String {
    "https://repo.maven.apache.org/maven2/".to_string()
}

const fn default_max_age_minutes() -> i64 {
    1440
}

impl ProxyConfig {
    pub const fn content_max_age_secs(&self) -> i64 {
        self.content_max_age_minutes.saturating_mul(60)
    }

    pub const fn metadata_max_age_secs(&self) -> i64 {
        self.metadata_max_age_minutes.saturating_mul(60)
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            remote_url: default_remote_url(),
            content_max_age_minutes: default_max_age_minutes(),
            metadata_max_age_minutes: default_max_age_minutes(),
        }
    }
}

/// Single-flight cooperation configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct CooperationConfig {
    /// How long a follower waits on the leader's download; 0 disables cooperation
    #[serde(default = "default_passive_timeout_secs")]
    pub passive_timeout_secs: u64,

    /// Bound on a follower's own attempt once the passive wait is exhausted
    #[serde(default = "default_active_timeout_secs")]
    pub active_timeout_secs: u64,
}

const fn default_passive_timeout_secs() -> u64 {
    600
}

const fn default_active_timeout_secs() -> u64 {
    10
}

impl CooperationConfig {
    pub const fn is_enabled(&self) -> bool {
        self.passive_timeout_secs > 0
    }

    pub const fn passive_timeout(&self) -> Duration {
        Duration::from_secs(self.passive_timeout_secs)
    }

    pub const fn active_timeout(&self) -> Duration {
        Duration::from_secs(self.active_timeout_secs)
    }
}

impl Default for CooperationConfig {
    fn default() -> Self {
        Self {
            passive_timeout_secs: default_passive_timeout_secs(),
            active_timeout_secs: default_active_timeout_secs(),
        }
    }
}

/// Outbound HTTP client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct HttpClientConfig {
    /// Total request timeout in seconds
    #[serde(default = "default_http_timeout_secs")]
    pub timeout_secs: u64,

    /// Connection establishment timeout in seconds
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,

    /// User-Agent sent to the origin
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Idle pooled connections kept per origin host
    #[serde(default = "default_pool_max_idle_per_host")]
    pub pool_max_idle_per_host: usize,
}

const fn default_http_timeout_secs() -> u64 {
    60
}

const fn default_connect_timeout_secs() -> u64 {
    20
}

fn default_user_agent() -> String {
    format!("mirror-proxy/{}", env!("CARGO_PKG_VERSION"))
}

const fn default_pool_max_idle_per_host() -> usize {
    10
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_http_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            user_agent: default_user_agent(),
            pool_max_idle_per_host: default_pool_max_idle_per_host(),
        }
    }
}

/// Remote auto-blocking configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct AutoBlockConfig {
    /// Block the remote after repeated transient failures
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Consecutive transient failures before blocking
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// How long the remote stays blocked, in seconds
    #[serde(default = "default_block_secs")]
    pub block_secs: u64,
}

const fn default_true() -> bool {
    true
}

const fn default_failure_threshold() -> u32 {
    5
}

const fn default_block_secs() -> u64 {
    60
}

impl Default for AutoBlockConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            failure_threshold: default_failure_threshold(),
            block_secs: default_block_secs(),
        }
    }
}

/// Local content store configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct StorageConfig {
    /// Upper bound on cached blob bytes held in memory
    #[serde(default = "default_max_blob_bytes")]
    pub max_blob_bytes: u64,
}

const fn default_max_blob_bytes() -> u64 {
    512 * 1024 * 1024
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            max_blob_bytes: default_max_blob_bytes(),
        }
    }
}

/// HTTP serving configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ServerConfig {
    /// Address the proxy listens on
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8081".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind: default_bind() }
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,

    /// Log file rotation: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}
