use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use reqwest::Url;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project config file, created by hand or by `mirror-proxy config`.
pub const CONFIG_FILE: &str = "mirror-proxy.yaml";

/// Optional local overrides, not meant to be committed.
pub const LOCAL_CONFIG_FILE: &str = "local.yaml";

/// Prefix of environment overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "MIRROR_PROXY_";

/// Reasons a merged configuration is rejected.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid remote_url: {0}. Must be an absolute http(s) URL")]
    InvalidRemoteUrl(String),

    #[error("Invalid {field}: {value}. Cannot be negative")]
    NegativeMaxAge { field: &'static str, value: i64 },

    #[error("Invalid active_timeout_secs: 0. Must be positive while cooperation is enabled")]
    ZeroActiveTimeout,

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Invalid http timeout_secs: 0. Must be positive")]
    ZeroHttpTimeout,

    #[error("Invalid auto_block failure_threshold: 0. Must be at least 1")]
    ZeroFailureThreshold,

    #[error("Invalid bind address: {0}")]
    InvalidBindAddress(String),
}

/// Builds a [`Config`] from layered sources.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from the working directory.
    ///
    /// Later sources win:
    /// 1. Built-in defaults
    /// 2. mirror-proxy.yaml in the working directory
    /// 3. local.yaml (local overrides, optional)
    /// 4. Environment variables (MIRROR_PROXY_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(CONFIG_FILE))
            .merge(Yaml::file(LOCAL_CONFIG_FILE))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .context("Failed to load mirror-proxy configuration")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file. Environment overrides still
    /// apply on top.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let path = path.as_ref();
        if !path.exists() {
            anyhow::bail!("Config file not found: {}", path.display());
        }

        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Reject settings the proxy cannot run with.
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let remote_url = &config.proxy.remote_url;
        match Url::parse(remote_url) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.has_host() => {}
            _ => return Err(ConfigError::InvalidRemoteUrl(remote_url.clone())),
        }

        if config.proxy.content_max_age_minutes < 0 {
            return Err(ConfigError::NegativeMaxAge {
                field: "content_max_age_minutes",
                value: config.proxy.content_max_age_minutes,
            });
        }
        if config.proxy.metadata_max_age_minutes < 0 {
            return Err(ConfigError::NegativeMaxAge {
                field: "metadata_max_age_minutes",
                value: config.proxy.metadata_max_age_minutes,
            });
        }

        if config.cooperation.is_enabled() && config.cooperation.active_timeout_secs == 0 {
            return Err(ConfigError::ZeroActiveTimeout);
        }

        if config.http.timeout_secs == 0 {
            return Err(ConfigError::ZeroHttpTimeout);
        }

        if config.auto_block.enabled && config.auto_block.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }

        if config.server.bind.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidBindAddress(config.server.bind.clone()));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(config.logging.rotation.clone()));
        }

        Ok(())
    }
}
