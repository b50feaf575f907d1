use mooring_core::deployment::{
    AttachmentContract, DeploymentPhaseContext, DeploymentUnit, DeploymentUnitProcessingError,
    DeploymentUnitProcessor,
};
use tracing::debug;

use crate::{
    keys::{DeploymentType, APPLICATION_CLIENT_MAIN_CLASS, DEPLOYMENT_TYPE, MANIFEST},
    structure::MAIN_CLASS,
};

/// Resolves the entry point class of the application client unit.
pub struct ApplicationClientManifestProcessor;

impl DeploymentUnitProcessor for ApplicationClientManifestProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        if ctx.attachments().get(&DEPLOYMENT_TYPE) != Some(&DeploymentType::ApplicationClient) {
            return Ok(());
        }
        let main_class = ctx
            .attachments()
            .get(&MANIFEST)
            .and_then(|m| m.main_class())
            .map(str::to_string)
            .ok_or_else(|| {
                DeploymentUnitProcessingError::new(format!(
                    "application client {} has no {MAIN_CLASS} in its manifest",
                    ctx.unit().name()
                ))
            })?;
        debug!(unit = ctx.unit().name(), %main_class, "application client entry point");
        ctx.attachments_mut()
            .put(&APPLICATION_CLIENT_MAIN_CLASS, main_class);
        Ok(())
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        unit.attachments_mut().remove(&APPLICATION_CLIENT_MAIN_CLASS);
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(
            AttachmentContract::new()
                .reads(&DEPLOYMENT_TYPE)
                .reads(&MANIFEST)
                .writes(&APPLICATION_CLIENT_MAIN_CLASS),
        )
    }
}
