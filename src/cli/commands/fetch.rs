//! Implementation of the `mirror-proxy fetch` command.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use tokio::fs;

use crate::cli::build_facet;
use crate::cli::output::{format_size, output, CommandOutput};
use crate::domain::models::{CacheCategory, Config, Resource};

#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Repository path of the resource
    pub path: String,

    /// Write the body to this file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Query parameter as name=value (repeatable)
    #[arg(short = 'p', long = "param", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Treat the resource as metadata regardless of its name
    #[arg(long)]
    pub metadata: bool,
}

fn parse_param(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{raw}'"))
}

#[derive(Debug, Serialize)]
pub struct FetchOutput {
    pub resource: String,
    pub category: CacheCategory,
    pub found: bool,
    pub size: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
    pub last_verified: Option<DateTime<Utc>>,
    pub written_to: Option<PathBuf>,
}

impl CommandOutput for FetchOutput {
    fn to_human(&self) -> String {
        if !self.found {
            return format!("{}: not found", self.resource);
        }

        let mut lines = vec![format!("{} ({})", self.resource, self.category.as_str())];
        if let Some(size) = self.size {
            lines.push(format!("  size:          {}", format_size(size)));
        }
        if let Some(etag) = &self.etag {
            lines.push(format!("  etag:          {etag}"));
        }
        if let Some(last_modified) = self.last_modified {
            lines.push(format!("  last modified: {}", last_modified.to_rfc2822()));
        }
        if let Some(last_verified) = self.last_verified {
            lines.push(format!("  verified:      {}", last_verified.to_rfc3339()));
        }
        if let Some(path) = &self.written_to {
            lines.push(format!("  written to:    {}", path.display()));
        }
        lines.join("\n")
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub async fn execute(args: FetchArgs, config: Config, json_mode: bool) -> Result<()> {
    let facet = build_facet(&config)?;

    let mut resource = Resource::classified(&args.path);
    if args.metadata {
        resource = resource.with_category(CacheCategory::Metadata);
    }
    for (name, value) in args.params {
        resource = resource.with_param(name, value);
    }

    let content = facet
        .get(&resource)
        .await
        .with_context(|| format!("Failed to fetch {resource}"))?;

    let Some(content) = content else {
        output(
            &FetchOutput {
                resource: resource.to_string(),
                category: resource.category(),
                found: false,
                size: None,
                etag: None,
                last_modified: None,
                last_verified: None,
                written_to: None,
            },
            json_mode,
        );
        return Ok(());
    };

    let attributes = content.attributes().clone();
    let bytes = content
        .into_bytes()
        .await
        .with_context(|| format!("Failed to read body of {resource}"))?;

    if let Some(path) = &args.output {
        fs::write(path, &bytes)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }

    output(
        &FetchOutput {
            resource: resource.to_string(),
            category: resource.category(),
            found: true,
            size: Some(bytes.len() as u64),
            etag: attributes.etag,
            last_modified: attributes.last_modified,
            last_verified: attributes.cache_info.map(|info| info.last_verified),
            written_to: args.output,
        },
        json_mode,
    );
    Ok(())
}
