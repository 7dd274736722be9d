//! Implementation of the `mirror-proxy config` command.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Write the effective configuration as YAML to this file
    #[arg(long)]
    pub write: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct ConfigOutput {
    pub config: Config,
    pub written_to: Option<PathBuf>,
}

impl CommandOutput for ConfigOutput {
    fn to_human(&self) -> String {
        let yaml = serde_yaml::to_string(&self.config).unwrap_or_default();
        match &self.written_to {
            Some(path) => format!("{yaml}\nWritten to {}", path.display()),
            None => yaml,
        }
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: ConfigArgs, config: Config, json_mode: bool) -> Result<()> {
    if let Some(path) = &args.write {
        let yaml = serde_yaml::to_string(&config).context("Failed to serialize configuration")?;
        fs::write(path, yaml)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    output(
        &ConfigOutput {
            config,
            written_to: args.write,
        },
        json_mode,
    );
    Ok(())
}
