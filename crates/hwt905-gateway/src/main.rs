//! HWT905 Gateway - Main Entry Point

use clap::Parser;
use hwt905_gateway::{init_logging, run, GatewayConfig};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "hwt905-gateway")]
#[command(about = "Polls an HWT905 IMU and serves the latest values over TCP")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device, overriding the configuration
    #[arg(short, long)]
    device: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = GatewayConfig::load(cli.config.as_deref())?;
    if let Some(device) = cli.device {
        config.serial.device = device;
    }

    init_logging(config.log.json)?;
    info!("=== HWT905 Gateway v{} ===", env!("CARGO_PKG_VERSION"));

    run(config).await
}
