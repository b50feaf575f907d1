use mooring_core::deployment::{
    select_exactly_one, AttachmentContract, DeploymentPhaseContext, DeploymentUnit,
    DeploymentUnitProcessingError, DeploymentUnitProcessor, SelectionError,
};
use tracing::info;

use crate::{
    archive::{ArchiveKind, ResourceRoot},
    keys::{DeploymentType, APPLICATION_CLIENT_SELECTION, DEPLOYMENT_ROOT, DEPLOYMENT_TYPE},
    structure::Manifest,
};

pub const APPLICATION_CLIENT_XML: &str = "META-INF/application-client.xml";

/// Marks the application client of a deployment.
///
/// Inside an EAR exactly one client module is picked among the
/// sub-deployments, disambiguated by the requested deployment name. The EAR
/// records the pick and the chosen module marks itself when it runs through
/// this step. A top level jar that is a client marks itself.
pub struct ApplicationClientStructureProcessor {
    requested: Option<String>,
}

impl ApplicationClientStructureProcessor {
    pub fn new(requested: Option<String>) -> Self {
        Self { requested }
    }

    /// A jar with a client descriptor or a `Main-Class` entry.
    pub fn is_application_client(
        root: &ResourceRoot,
    ) -> Result<bool, DeploymentUnitProcessingError> {
        if root.kind() != ArchiveKind::Jar {
            return Ok(false);
        }
        if root.exists(APPLICATION_CLIENT_XML) {
            return Ok(true);
        }
        Ok(Manifest::read(root)?.is_some_and(|m| m.main_class().is_some()))
    }

    fn select_in_ear(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let ear = ctx.unit().name().to_string();
        let mut clients = Vec::new();
        for module in ctx.sub_deployments() {
            if let Some(root) = module.attachments().get(&DEPLOYMENT_ROOT) {
                if Self::is_application_client(root)? {
                    clients.push(module.name().to_string());
                }
            }
        }
        let chosen = select_exactly_one(clients, self.requested.as_deref(), |c| c.as_str())
            .map_err(|e| {
                let message = match &e {
                    SelectionError::NotFound(name) => {
                        format!("{ear} has no application client named {name}")
                    }
                    SelectionError::Ambiguous(names) => format!(
                        "{ear} contains more than one application client ({}), choose one by name",
                        names.join(", ")
                    ),
                    SelectionError::Absent => format!("{ear} contains no application client"),
                };
                DeploymentUnitProcessingError::with_cause(message, e)
            })?;

        info!(%ear, client = %chosen, "application client selected");
        ctx.attachments_mut().put(&APPLICATION_CLIENT_SELECTION, chosen);
        Ok(())
    }

    fn is_selected(ctx: &DeploymentPhaseContext<'_>) -> bool {
        ctx.parent()
            .and_then(|parent| parent.attachments().get(&APPLICATION_CLIENT_SELECTION))
            .is_some_and(|chosen| chosen == ctx.unit().name())
    }
}

impl DeploymentUnitProcessor for ApplicationClientStructureProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        if ctx.attachments().get(&DEPLOYMENT_TYPE) == Some(&DeploymentType::Ear) {
            return self.select_in_ear(ctx);
        }
        let is_client = if ctx.unit().is_top_level() {
            match ctx.attachments().get(&DEPLOYMENT_ROOT) {
                Some(root) => Self::is_application_client(root)?,
                None => false,
            }
        } else {
            Self::is_selected(ctx)
        };
        if is_client {
            ctx.attachments_mut()
                .put(&DEPLOYMENT_TYPE, DeploymentType::ApplicationClient);
        }
        Ok(())
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        unit.attachments_mut().remove(&APPLICATION_CLIENT_SELECTION);
        if unit.attachments().get(&DEPLOYMENT_TYPE) == Some(&DeploymentType::ApplicationClient) {
            unit.attachments_mut().remove(&DEPLOYMENT_TYPE);
        }
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(
            AttachmentContract::new()
                .reads(&DEPLOYMENT_ROOT)
                .reads(&DEPLOYMENT_TYPE)
                .writes(&DEPLOYMENT_TYPE)
                .writes(&APPLICATION_CLIENT_SELECTION),
        )
    }
}
