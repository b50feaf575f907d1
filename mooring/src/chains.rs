use std::sync::Arc;

use mooring_core::deployment::{ChainError, DeployerChains};
use mooring_services::{
    appclient::{self, EntryPointLauncher},
    common::SharedExecutor,
    ee, structure,
};
use tracing::info;

use crate::config::Config;

/// The server's deployer chains. Application client processors are only
/// part of them in application client mode.
pub fn build(
    config: &Config,
    executor: SharedExecutor,
    launcher: Arc<dyn EntryPointLauncher>,
) -> Result<DeployerChains, ChainError> {
    let mut builder = DeployerChains::builder();
    structure::register(&mut builder)?;
    ee::register(&mut builder)?;
    if config.appclient.enabled {
        appclient::register(&mut builder, config, executor, launcher)?;
    }
    let chains = builder.build()?;
    info!("{} deployment processors registered", chains.len());
    Ok(chains)
}
