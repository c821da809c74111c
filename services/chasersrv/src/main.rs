//! chasersrv - chasing-light PLC controller service

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use chasersrv::{AppConfig, Controller};

#[derive(Parser, Debug)]
#[command(
    name = "chasersrv",
    about = "Chasing-light PLC controller over Modbus TCP",
    version
)]
struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "CHASERSRV_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Validate the configuration and exit
    #[arg(long)]
    validate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .init();

    let config = AppConfig::load(args.config.as_deref())?;
    if args.validate {
        info!(
            "Configuration OK: {}:{} unit {} delays {:?}ms",
            config.host, config.port, config.unit_id, config.speed_delays_ms
        );
        return Ok(());
    }

    info!(
        "chasersrv starting, target PLC {}:{} unit {}",
        config.host, config.port, config.unit_id
    );
    let controller = Arc::new(Controller::new(config));

    // The service stays up if the PLC is unreachable at startup; the
    // operator reconnects once the link is available.
    if let Err(e) = controller.connect().await {
        warn!("Initial PLC connect failed: {e}");
    }

    let summary = {
        let controller = controller.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(10));
            loop {
                ticker.tick().await;
                info!("Status: {}", controller.snapshot().summary());
            }
        })
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    summary.abort();
    controller.shutdown().await;
    info!("chasersrv stopped");
    Ok(())
}
