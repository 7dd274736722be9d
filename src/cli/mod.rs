//! Command-line interface.

pub mod commands;
pub mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::adapters::{HttpOriginClient, MemoryContentStore};
use crate::domain::models::Config;
use crate::infrastructure::config::ConfigLoader;
use crate::services::ProxyFacet;

use commands::config::ConfigArgs;
use commands::fetch::FetchArgs;
use commands::serve::ServeArgs;

#[derive(Parser, Debug)]
#[command(name = "mirror-proxy")]
#[command(about = "Caching proxy for remote artifact repositories", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: mirror-proxy.yaml and local.yaml in the working directory)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format
    #[arg(short, long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve the proxy over HTTP
    Serve(ServeArgs),

    /// Fetch a single resource through the proxy
    Fetch(FetchArgs),

    /// Print the effective configuration
    Config(ConfigArgs),
}

/// Load configuration from `path`, or from the default locations.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => ConfigLoader::load_from_file(path),
        None => ConfigLoader::load(),
    }
}

/// Wire the production adapters into a facet.
pub fn build_facet(config: &Config) -> Result<ProxyFacet> {
    let store = Arc::new(MemoryContentStore::from_config(&config.storage));
    let origin = Arc::new(HttpOriginClient::from_config(config)?);
    ProxyFacet::new(config, store, origin).context("Failed to create proxy facet")
}

/// Report a command failure and exit non-zero.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let causes: Vec<String> = err.chain().skip(1).map(ToString::to_string).collect();
        let value = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": causes,
        });
        println!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    } else {
        eprintln!("Error: {err:#}");
    }
    std::process::exit(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fetch() {
        let cli = Cli::try_parse_from([
            "mirror-proxy",
            "--json",
            "fetch",
            "org/acme/lib/1.0/lib-1.0.jar",
            "--output",
            "lib.jar",
        ])
        .unwrap();

        assert!(cli.json);
        match cli.command {
            Commands::Fetch(args) => {
                assert_eq!(args.path, "org/acme/lib/1.0/lib-1.0.jar");
                assert_eq!(args.output, Some(PathBuf::from("lib.jar")));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli =
            Cli::try_parse_from(["mirror-proxy", "serve", "--config", "/etc/mirror-proxy.yaml"])
                .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/mirror-proxy.yaml")));
        assert!(matches!(cli.command, Commands::Serve(_)));
    }

    #[test]
    fn test_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["mirror-proxy"]).is_err());
    }

    #[test]
    fn test_build_facet_from_defaults() {
        let facet = build_facet(&Config::default()).unwrap();
        assert_eq!(facet.remote_url().as_str(), "https://repo.maven.apache.org/maven2/");
        assert!(facet.cooperation().is_enabled());
    }
}
