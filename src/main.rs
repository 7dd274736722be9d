//! mirror-proxy CLI entry point.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use mirror_proxy::cli::{handle_error, load_config, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // `serve` installs the configured logger itself.
    if !matches!(cli.command, Commands::Serve(_)) {
        tracing_subscriber::registry()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => handle_error(err, cli.json),
    };

    let result = match cli.command {
        Commands::Serve(args) => mirror_proxy::cli::commands::serve::execute(args, config, cli.json).await,
        Commands::Fetch(args) => mirror_proxy::cli::commands::fetch::execute(args, config, cli.json).await,
        Commands::Config(args) => mirror_proxy::cli::commands::config::execute(args, config, cli.json).await,
    };

    if let Err(err) = result {
        handle_error(err, cli.json);
    }
}
