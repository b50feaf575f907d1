//! The phased deployment pipeline.
//!
//! A [`DeploymentPipeline`] walks a deployment unit, and every sub-deployment
//! discovered while processing it, through the [`Phase`]s in order. In each
//! phase every unit runs in preorder and every registered
//! [`DeploymentUnitProcessor`] runs in ascending priority. Processors talk to
//! each other only through the unit's typed attachments.
//!
//! The first failure stops the deployment. Every processor that already ran
//! is undeployed in exact reverse order and every service installed through
//! the units' service targets is removed.
mod chains;
mod error;
mod phase;
mod pipeline;
mod processor;
mod select;
mod unit;

pub use chains::{DeployerChains, DeployerChainsBuilder};
pub use error::{ChainError, DeploymentFailure, DeploymentUnitProcessingError, SelectionError};
pub use phase::{priority, Phase};
pub use pipeline::DeploymentPipeline;
pub use processor::{AttachmentContract, DeploymentPhaseContext, DeploymentUnitProcessor};
pub use select::select_exactly_one;
pub use unit::{
    subunit_service_name, unit_service_name, Deployment, DeploymentStatus, DeploymentUnit,
};
