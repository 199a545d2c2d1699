//! Headless convoy display (convoy-dash).
//!
//! Reads one JSON command per line from stdin, for example
//! `{"command":"set_destination","place":{"name":"Depot","latitude":52.5,"longitude":13.4}}`.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use convoy_dashboard::{Dashboard, DashboardCommand, DashboardConfig};
use convoy_nav_engine::{LogVoiceSink, OsrmRouteProvider};
use convoy_schemas::DeviceRole;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "convoy-dash")]
#[command(about = "Headless convoy navigation display")]
#[command(version)]
struct Cli {
    /// JSON config file.
    #[arg(short, long, env = "CONVOY_DASH_CONFIG")]
    config: Option<PathBuf>,

    /// Relay address, overrides the config file.
    #[arg(short, long, env = "CONVOY_RELAY")]
    relay: Option<String>,

    /// Role to request, e.g. car1-main.
    #[arg(long)]
    role: Option<DeviceRole>,

    /// OSRM base URL.
    #[arg(long, env = "CONVOY_OSRM_URL")]
    osrm: Option<String>,

    /// Start navigating to the configured destination right away.
    #[arg(long)]
    auto_start: bool,

    /// Verbose logging.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "convoy_dashboard=debug,info",
        1 => "convoy_dashboard=trace,convoy_sync_client=debug,info",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    info!("Starting convoy display v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &cli.config {
        Some(path) => DashboardConfig::load_from_path(path).await?,
        None => DashboardConfig::default(),
    };
    if let Some(relay) = cli.relay {
        config.sync.server_url = relay;
    }
    if let Some(role) = cli.role {
        config.sync.requested_role = Some(role);
    }
    if let Some(osrm) = cli.osrm {
        config.osrm_url = osrm;
    }
    config.auto_start |= cli.auto_start;

    let provider = Arc::new(OsrmRouteProvider::new(
        config.osrm_url.clone(),
        config.route_timeout(),
    )?);
    let dashboard = Dashboard::start(config, provider, Arc::new(LogVoiceSink))?;

    let (tx, commands) = mpsc::unbounded_channel();
    tokio::spawn(read_commands(tx));

    let controller = dashboard
        .run(commands, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for shutdown signal");
            }
            info!("Shutdown requested");
        })
        .await?;
    info!(role = %controller.role(), phase = ?controller.phase(), "Display stopped");
    Ok(())
}

async fn read_commands(tx: mpsc::UnboundedSender<DashboardCommand>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) if line.trim().is_empty() => {}
            Ok(Some(line)) => match serde_json::from_str::<DashboardCommand>(&line) {
                Ok(command) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Err(e) => warn!(error = %e, "Ignoring unreadable command"),
            },
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Command input closed");
                break;
            }
        }
    }
}
