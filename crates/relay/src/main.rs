//! Convoy relay daemon (convoyd).

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use convoy_relay::RelayConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "convoyd")]
#[command(about = "Relay that keeps convoy displays in sync")]
#[command(version)]
struct Cli {
    /// JSON config file.
    #[arg(short, long, env = "CONVOYD_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, overrides the config file.
    #[arg(short, long, env = "CONVOYD_BIND")]
    bind: Option<SocketAddr>,

    /// Verbose logging.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "convoy_relay=debug,info",
        1 => "convoy_relay=trace,debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("Starting convoy relay v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => RelayConfig::load_from_path(path).await?,
        None => RelayConfig::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }

    convoy_relay::serve(config).await?;
    info!("Relay stopped");
    Ok(())
}
