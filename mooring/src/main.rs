use std::{pin::pin, sync::Arc};

use anyhow::Result;
use clap::Parser;
use mooring_core::{
    container::ServiceContainer, deployment::DeploymentPipeline, orchestrator::WorkerPool,
};
use mooring_services::{appclient::LogLauncher, naming::install_naming_registry};
use scanner::DeploymentScanner;
use tracing_subscriber::{filter::LevelFilter, fmt, prelude::*, EnvFilter};

use crate::config::Config;

mod chains;
mod config;
mod scanner;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    /// Path of the config file
    #[clap(short, long, value_parser)]
    config: Option<String>,
    /// Application client module to run, enables application client mode
    #[clap(short, long, value_parser)]
    deployment: Option<String>,
    /// Deploy what is in the deployment directory, then shut down
    #[clap(long)]
    once: bool,
    /// Arguments for the application client
    #[clap(last = true)]
    args: Vec<String>,
}

#[monoio::main(timer_enabled = true)]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    config.merge_args(args.deployment, args.args);

    // Start workers
    let pool = Arc::new(WorkerPool::spawn(&config.runtime)?);
    tracing::info!("{} workers started", pool.workers());

    let container = ServiceContainer::new();
    install_naming_registry(&container)?;
    let chains = chains::build(&config, pool.clone(), Arc::new(LogLauncher))?;
    let mut scanner = DeploymentScanner::new(
        config.scanner.directory.clone(),
        DeploymentPipeline::new(chains, container),
    );

    let report = scanner.scan()?;
    tracing::info!(
        "{} deployed, {} failed",
        report.deployed.len(),
        report.failed.len()
    );
    if !args.once {
        let interval = config.scanner.scan_interval();
        let rescan = config.scanner.enabled;
        let mut ctrl_c = pin!(monoio::utils::CtrlC::new()?);
        loop {
            monoio::select! {
                _ = &mut ctrl_c => break,
                _ = monoio::time::sleep(interval), if rescan => {
                    if let Err(e) = scanner.scan() {
                        tracing::error!("scan failed: {e}");
                    }
                }
            }
        }
        tracing::info!("interrupted, shutting down");
    }

    scanner.undeploy_all();
    let container = scanner.pipeline().container();
    container.shutdown();
    if !container.await_termination(config.container.shutdown_timeout()) {
        tracing::warn!(
            "services still stopping after {}s",
            config.container.shutdown_timeout_sec
        );
    }
    pool.shutdown();
    Ok(())
}
