//! qxmon: broadcast signed QX orders and follow them to finality.

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use qxmon_core::FillMode;
use tracing::info;

/// QX order finality monitor
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via QXMON_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Broadcast a signed QX order and wait until it is confirmed or expires
    Place {
        /// Signed transaction, base64 encoded
        #[arg(long)]
        tx: String,
        /// Identity that owns the order
        #[arg(long)]
        owner: Option<String>,
        /// Expect the order to rest on the book instead of filling
        #[arg(long)]
        maker: bool,
    },
    /// Show the current network tick and the tick a new order should target
    Tick,
}

#[tokio::main]
async fn main() -> Result<()> {
    qxmon_notify::init_crypto();

    let args = Args::parse();

    qxmon_telemetry::init_logging()?;

    info!("Starting qxmon v{}", env!("CARGO_PKG_VERSION"));

    // CLI arg > QXMON_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("QXMON_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");
    let config = qxmon_bot::AppConfig::load(Some(&config_path))?;
    info!(rpc_url = %config.rpc_url, qx_api_url = %config.qx_api_url, "Configuration loaded");

    let mut app = qxmon_bot::Application::new(config)?;

    match args.command {
        Command::Tick => {
            let info = app.tick_info().await?;
            let target = info.tick + app.config().orders.tick_offset;
            println!("tick:   {}", info.tick);
            println!("epoch:  {}", info.epoch);
            println!("target: {target}");
        }
        Command::Place { tx, owner, maker } => {
            let fill = if maker { FillMode::Maker } else { FillMode::Taker };
            let notice = app.place(&tx, owner.as_deref(), fill).await?;
            println!("{}: {}", notice.task_id, notice.message);
            if !notice.is_success() {
                bail!("{}", notice.message);
            }
        }
    }

    Ok(())
}
