//! Binary entry point: loads configuration, initializes tracing, and runs
//! the acquisition core until a shutdown signal arrives.

use clap::Parser;
use das_daq::{Config, Controller};
use miette::IntoDiagnostic;
use std::{path::PathBuf, time::Duration};
use tokio::runtime;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Acquisition core for a distributed acoustic sensing interrogator host")]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, env = "DAS_DAQ_CONFIG", default_value = "config.yaml")]
    config: PathBuf,
}

fn main() -> miette::Result<()> {
    let cli = Cli::parse();
    let config = Config::load(&cli.config).into_diagnostic()?;
    init_tracing(&config.log.level);

    runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .into_diagnostic()?
        .block_on(async_main(config))
}

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

async fn async_main(config: Config) -> miette::Result<()> {
    Toplevel::new(move |s| async move {
        s.start(SubsystemBuilder::new("das-daq", move |s| run(s, config)));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(2))
    .await
    .into_diagnostic()?;

    Ok(())
}

async fn run(subsys: SubsystemHandle, config: Config) -> das_daq::DasCoreResult<()> {
    info!("starting acquisition core");
    let controller = Controller::start(&config)?;

    subsys.on_shutdown_requested().await;
    info!("shutdown requested, stopping acquisition core");

    tokio::task::spawn_blocking(move || controller.stop())
        .await
        .expect("controller stop task should not panic");

    Ok(())
}
