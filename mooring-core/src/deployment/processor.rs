use std::any::type_name;

use super::{Deployment, DeploymentUnit, DeploymentUnitProcessingError, Phase};
use crate::{
    attachment::{AttachmentId, AttachmentKey, Attachments},
    container::{ServiceContainer, TrackingServiceTarget},
};

/// One step of deployment logic, registered once and shared by every
/// deployment.
pub trait DeploymentUnitProcessor: Send + Sync {
    /// Do this processor's part for the unit in `ctx`. Missing optional
    /// structure is not an error: return `Ok(())` and do nothing.
    fn deploy(&self, ctx: &mut DeploymentPhaseContext<'_>)
        -> Result<(), DeploymentUnitProcessingError>;

    /// Best effort cleanup of whatever `deploy` did to `unit`.
    fn undeploy(&self, unit: &mut DeploymentUnit) {
        let _ = unit;
    }

    /// The attachments this processor reads and writes, if it declares them.
    fn contract(&self) -> Option<AttachmentContract> {
        None
    }

    fn name(&self) -> &'static str {
        let full = type_name::<Self>();
        full.rsplit("::").next().unwrap_or(full)
    }
}

/// Declared attachment inputs and outputs of a processor.
///
/// Reads are checked when the chains are built. Writes are enforced while the
/// processor runs unless the contract is lenient.
#[derive(Debug, Clone, Default)]
pub struct AttachmentContract {
    pub(crate) reads: Vec<AttachmentId>,
    pub(crate) writes: Vec<AttachmentId>,
    pub(crate) enforced: bool,
}

impl AttachmentContract {
    pub fn new() -> Self {
        Self {
            enforced: true,
            ..Self::default()
        }
    }

    pub fn reads<T: 'static>(mut self, key: &AttachmentKey<T>) -> Self {
        self.reads.push(key.id());
        self
    }

    pub fn writes<T: 'static>(mut self, key: &AttachmentKey<T>) -> Self {
        self.writes.push(key.id());
        self
    }

    /// Keep the declared writes for chain validation only.
    pub fn lenient(mut self) -> Self {
        self.enforced = false;
        self
    }
}

/// What a processor sees while it runs for one unit.
pub struct DeploymentPhaseContext<'a> {
    deployment: &'a mut Deployment,
    unit: usize,
    phase: Phase,
}

impl<'a> DeploymentPhaseContext<'a> {
    pub(crate) fn new(deployment: &'a mut Deployment, unit: usize, phase: Phase) -> Self {
        Self {
            deployment,
            unit,
            phase,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn unit(&self) -> &DeploymentUnit {
        &self.deployment.units[self.unit]
    }

    pub fn unit_mut(&mut self) -> &mut DeploymentUnit {
        &mut self.deployment.units[self.unit]
    }

    pub fn attachments(&self) -> &Attachments {
        self.unit().attachments()
    }

    pub fn attachments_mut(&mut self) -> &mut Attachments {
        self.unit_mut().attachments_mut()
    }

    pub fn parent(&self) -> Option<&DeploymentUnit> {
        self.deployment
            .parent_of(self.unit)
            .map(|p| &self.deployment.units[p])
    }

    /// The unit's direct children, in discovery order.
    pub fn sub_deployments(&self) -> impl Iterator<Item = &DeploymentUnit> {
        self.deployment
            .children_of(self.unit)
            .iter()
            .map(|&i| &self.deployment.units[i])
    }

    /// Attach a nested unit. It catches up on the phases it missed once the
    /// current unit finishes this phase.
    pub fn add_sub_deployment(
        &mut self,
        name: impl Into<String>,
        attachments: Attachments,
    ) -> Result<&mut DeploymentUnit, DeploymentUnitProcessingError> {
        let name = name.into();
        if self.sub_deployments().any(|u| u.name() == name) {
            return Err(DeploymentUnitProcessingError::new(format!(
                "duplicate sub-deployment {name} in {}",
                self.unit().name()
            )));
        }
        let index = self.deployment.add_child(self.unit, name, attachments);
        Ok(&mut self.deployment.units[index])
    }

    /// Services installed here are removed when the unit is undeployed.
    pub fn service_target(&self) -> &TrackingServiceTarget {
        self.unit().service_target()
    }

    pub fn container(&self) -> &ServiceContainer {
        self.service_target().container()
    }
}

#[cfg(test)]
mod tests {
    use super::{DeploymentPhaseContext, DeploymentUnitProcessor};
    use crate::deployment::DeploymentUnitProcessingError;

    struct NoOpProcessor;

    impl DeploymentUnitProcessor for NoOpProcessor {
        fn deploy(
            &self,
            _ctx: &mut DeploymentPhaseContext<'_>,
        ) -> Result<(), DeploymentUnitProcessingError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_name_is_short() {
        assert_eq!("NoOpProcessor", NoOpProcessor.name());
        let boxed: Box<dyn DeploymentUnitProcessor> = Box::new(NoOpProcessor);
        assert_eq!("NoOpProcessor", boxed.name());
        assert!(boxed.contract().is_none());
    }
}
