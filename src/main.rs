//! btmanagerd: standalone Bluetooth session manager daemon.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use bluetooth_manager::{
    CallbackSink, Controller, DbusTransport, ManagerConfig, NullPlayback, SessionManager,
};

#[derive(Parser, Debug)]
#[command(name = "btmanagerd", about = "Bluetooth device/session manager daemon")]
struct Args {
    /// Path to a TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    let config = match &args.config {
        Some(path) => ManagerConfig::load(path)?,
        None => ManagerConfig::default(),
    };
    info!("managing adapter {}", config.adapter_path);

    let transport = Arc::new(DbusTransport::system().await?);
    let events = Arc::new(CallbackSink::new(|event| {
        info!(event = event.name(), payload = %event.payload(), "session event");
    }));
    let manager = SessionManager::new(transport, events, Arc::new(NullPlayback), config);
    manager.start().await?;

    // The control surface belongs to the host RPC layer in embedded use;
    // the daemon just keeps the worker alive until interrupted.
    let _controller = Controller::new(manager);

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    Ok(())
}
