//! Implementation of the `mirror-proxy serve` command.

use anyhow::{Context, Result};
use clap::Args;
use tracing::info;

use crate::cli::build_facet;
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::infrastructure::logging::{LogConfig, LoggerImpl};
use crate::infrastructure::server;

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Address to listen on, overriding server.bind
    #[arg(long)]
    pub bind: Option<String>,

    /// Upstream repository URL, overriding proxy.remote_url
    #[arg(long)]
    pub remote_url: Option<String>,
}

pub async fn execute(args: ServeArgs, mut config: Config, _json_mode: bool) -> Result<()> {
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(remote_url) = args.remote_url {
        config.proxy.remote_url = remote_url;
    }
    ConfigLoader::validate(&config)?;

    let _logger = LoggerImpl::init(&LogConfig::from(&config.logging))?;
    let facet = build_facet(&config)?;

    info!(
        remote_url = %facet.remote_url(),
        passive_timeout = ?config.cooperation.passive_timeout(),
        active_timeout = ?config.cooperation.active_timeout(),
        "starting mirror proxy"
    );

    server::serve(&config.server, facet, shutdown_signal())
        .await
        .context("Proxy server exited with an error")
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}
