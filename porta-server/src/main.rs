//! Porta identity provider server

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use porta_authn::Registry;
use porta_core::PortaConfig;
use porta_server::{App, PortaServer};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "porta-server")]
#[command(about = "BrowserID identity provider backed by pluggable authenticators")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long)]
    config: PathBuf,

    /// Override `[global] listen`
    #[arg(short, long)]
    listen: Option<String>,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_format);

    let mut config = PortaConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(listen) = cli.listen {
        config.global.listen = listen;
    }

    let registry = Registry::builtin();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        authenticator = %config.global.auth,
        available = ?registry.names(),
        "Starting Porta"
    );

    let app = App::from_config(&config, &registry).context("initializing application")?;
    PortaServer::new(app).serve().await
}

fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}
