use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use firewatch::{Controller, ControllerConfig, Shutdown};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "firewatch-controller")]
#[command(about = "Fuse thermal and imagery feeds into fire decisions")]
struct Args {
    /// Configuration file (TOML, YAML or JSON); FIREWATCH_* variables override it
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Thermal feed listening port
    #[arg(long)]
    thermal_port: Option<u16>,

    /// Imagery feed listening port
    #[arg(long)]
    imagery_port: Option<u16>,

    /// Structured (JSON lines) fusion log
    #[arg(long)]
    latency_log: Option<PathBuf>,

    /// Tabular (CSV) fusion log
    #[arg(long)]
    fusion_log: Option<PathBuf>,

    /// Default log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn apply(&self, config: &mut ControllerConfig) {
        if let Some(port) = self.thermal_port {
            config.thermal_port = port;
        }
        if let Some(port) = self.imagery_port {
            config.imagery_port = port;
        }
        if let Some(path) = &self.latency_log {
            config.latency_log = path.clone();
        }
        if let Some(path) = &self.fusion_log {
            config.fusion_log = path.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config =
        ControllerConfig::load(args.config.as_deref()).context("failed to load configuration")?;
    args.apply(&mut config);

    let controller = Controller::new(config).context("failed to start controller")?;
    info!(
        thermal = %controller.config().bind_addr(firewatch_types::Feed::Thermal),
        imagery = %controller.config().bind_addr(firewatch_types::Feed::Imagery),
        "controller starting"
    );

    match controller.run().await {
        Shutdown::Interrupted => Ok(()),
        shutdown @ Shutdown::Degraded(feed) => {
            error!(feed = %feed, code = shutdown.exit_code(), "exiting after degraded stop");
            std::process::exit(shutdown.exit_code());
        }
    }
}
