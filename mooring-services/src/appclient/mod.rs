//! Application client support: pick the client module of a deployment, find
//! its entry point and launch it once the deployment is installed.
//!
//! The processors are only registered when the server boots as an
//! application client container, see [`register`].
use std::sync::Arc;

use mooring_core::deployment::{priority, ChainError, DeployerChainsBuilder, Phase};
use service_async::Param;

mod manifest;
mod start;
mod structure;

pub use manifest::ApplicationClientManifestProcessor;
pub use start::{
    ApplicationClientStartProcessor, ApplicationClientStartService, EntryPoint,
    EntryPointLauncher, LaunchConfig, LogLauncher,
};
pub use structure::{ApplicationClientStructureProcessor, APPLICATION_CLIENT_XML};

use crate::common::SharedExecutor;

/// Boot parameters of the application client container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppClientParams {
    /// The client module to run when a deployment holds more than one.
    pub deployment: Option<String>,
    /// Arguments handed to the client's entry point.
    pub args: Vec<String>,
}

/// Register the application client processors. Needs the structure
/// processors in the same chains.
pub fn register<C>(
    builder: &mut DeployerChainsBuilder,
    config: &C,
    executor: SharedExecutor,
    launcher: Arc<dyn EntryPointLauncher>,
) -> Result<(), ChainError>
where
    C: Param<AppClientParams>,
{
    let params = config.param();
    builder
        .add(
            Phase::Structure,
            priority::STRUCTURE_APP_CLIENT,
            ApplicationClientStructureProcessor::new(params.deployment.clone()),
        )?
        .add(
            Phase::PostModule,
            priority::POST_MODULE_APPLICATION_CLIENT_MANIFEST,
            ApplicationClientManifestProcessor,
        )?
        .add(
            Phase::Install,
            priority::INSTALL_APPLICATION_CLIENT,
            ApplicationClientStartProcessor::new(params.args, executor, launcher),
        )?;
    Ok(())
}
