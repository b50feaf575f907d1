use mooring_core::{
    attachment::Attachments,
    deployment::{
        AttachmentContract, DeploymentPhaseContext, DeploymentUnit, DeploymentUnitProcessingError,
        DeploymentUnitProcessor,
    },
};
use tracing::debug;

use crate::{
    archive::ArchiveKind,
    keys::{DeploymentType, DEPLOYMENT_ROOT, DEPLOYMENT_TYPE},
};

/// Turns the modules of an exploded EAR into sub-deployments.
///
/// Every `*.jar`, `*.war` and `*.rar` directory directly below the EAR root
/// becomes a sub-deployment, in name order, carrying its own
/// [`DEPLOYMENT_ROOT`]. Anything else is left alone.
pub struct EarStructureProcessor;

impl DeploymentUnitProcessor for EarStructureProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        if !ctx.unit().is_top_level() {
            return Ok(());
        }
        let Some(root) = ctx.attachments().get(&DEPLOYMENT_ROOT) else {
            return Ok(());
        };
        if root.kind() != ArchiveKind::Ear {
            return Ok(());
        }
        let modules = root.children().map_err(|e| {
            DeploymentUnitProcessingError::with_cause(
                format!("cannot list the modules of {}", root.name()),
                e,
            )
        })?;

        ctx.attachments_mut().put(&DEPLOYMENT_TYPE, DeploymentType::Ear);
        for module in modules.into_iter().filter(|m| m.kind().is_module()) {
            debug!(ear = ctx.unit().name(), module = module.name(), "module found");
            let name = module.name().to_string();
            let mut attachments = Attachments::new();
            attachments.put(&DEPLOYMENT_ROOT, module);
            ctx.add_sub_deployment(name, attachments)?;
        }
        Ok(())
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        unit.attachments_mut().remove(&DEPLOYMENT_TYPE);
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(
            AttachmentContract::new()
                .reads(&DEPLOYMENT_ROOT)
                .writes(&DEPLOYMENT_TYPE),
        )
    }
}
