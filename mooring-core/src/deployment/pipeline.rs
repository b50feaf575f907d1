use std::{panic::AssertUnwindSafe, sync::Arc};

use tracing::{debug, error, info, warn};

use super::{
    chains::Registration, unit::Executed, DeployerChains, Deployment, DeploymentFailure,
    DeploymentPhaseContext, DeploymentStatus, DeploymentUnitProcessingError, Phase,
};
use crate::{
    attachment::Attachments,
    container::{panic_message, ServiceContainer, ServiceTarget, ValueService},
};

/// Walks deployments through the phases of a fixed set of chains.
#[derive(Clone)]
pub struct DeploymentPipeline {
    chains: Arc<DeployerChains>,
    container: ServiceContainer,
}

impl DeploymentPipeline {
    pub fn new(chains: DeployerChains, container: ServiceContainer) -> Self {
        Self {
            chains: Arc::new(chains),
            container,
        }
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    pub fn chains(&self) -> &DeployerChains {
        &self.chains
    }

    /// Run every phase for `name` and every sub-deployment found along the
    /// way. On failure everything done so far is undone before returning.
    pub fn deploy(
        &self,
        name: &str,
        attachments: Attachments,
    ) -> Result<Deployment, DeploymentFailure> {
        info!("deploying {name}");
        let mut deployment = Deployment::new(name, attachments, &self.container);
        for phase in Phase::ALL {
            while let Some(unit) = next_behind(&deployment, phase) {
                let from = deployment.units[unit].phases_done();
                for missed in &Phase::ALL[from..=phase.index()] {
                    if let Err(failure) = self.run_phase(&mut deployment, unit, *missed) {
                        error!("{failure}");
                        deployment.units[unit].set_status(DeploymentStatus::Failed);
                        self.teardown(&mut deployment);
                        return Err(failure);
                    }
                }
            }
        }
        for unit in deployment.units.iter_mut() {
            unit.set_status(DeploymentStatus::Deployed);
        }
        info!(units = deployment.units.len(), "deployed {name}");
        Ok(deployment)
    }

    /// Undo a deployment: every processor's `undeploy` in reverse execution
    /// order, then removal of every service its units installed.
    pub fn undeploy(&self, mut deployment: Deployment) {
        info!("undeploying {}", deployment.name());
        self.teardown(&mut deployment);
    }

    fn run_phase(
        &self,
        deployment: &mut Deployment,
        unit: usize,
        phase: Phase,
    ) -> Result<(), DeploymentFailure> {
        deployment.units[unit].set_status(DeploymentStatus::Processing(phase));
        if phase == Phase::Structure {
            self.install_unit_service(deployment, unit)
                .map_err(|cause| DeploymentFailure {
                    unit: deployment.units[unit].name().to_string(),
                    phase,
                    processor: None,
                    cause,
                })?;
        }
        for registration in self.chains.phase(phase) {
            debug!(
                unit = deployment.units[unit].name(),
                %phase,
                priority = registration.priority,
                "running {}",
                registration.processor.name()
            );
            run_processor(deployment, unit, registration).map_err(|cause| DeploymentFailure {
                unit: deployment.units[unit].name().to_string(),
                phase,
                processor: Some(registration.processor.name()),
                cause,
            })?;
            deployment.executed.push(Executed {
                unit,
                phase,
                priority: registration.priority,
                processor: registration.processor.clone(),
            });
        }
        deployment.units[unit].finish_phase(phase);
        Ok(())
    }

    /// The unit's own service anchors everything installed for it.
    fn install_unit_service(
        &self,
        deployment: &mut Deployment,
        unit: usize,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let parent = deployment
            .parent_of(unit)
            .map(|p| deployment.units[p].service_name().clone());
        let this = &mut deployment.units[unit];
        let service_name = this.service_name().clone();
        let mut builder = this
            .service_target()
            .add_service(service_name.clone(), ValueService::new(this.name().to_string()));
        if let Some(parent) = parent {
            builder = builder.add_dependency(parent);
        }
        builder.install().map_err(|e| {
            DeploymentUnitProcessingError::with_cause(
                format!("cannot register deployment {}", this.name()),
                e,
            )
        })?;
        this.service_target_mut().add_dependency(service_name);
        Ok(())
    }

    fn teardown(&self, deployment: &mut Deployment) {
        for executed in deployment.executed.drain(..).rev() {
            let unit = &mut deployment.units[executed.unit];
            let undone = std::panic::catch_unwind(AssertUnwindSafe(|| {
                executed.processor.undeploy(unit)
            }));
            if let Err(panic) = undone {
                error!(
                    unit = unit.name(),
                    phase = %executed.phase,
                    priority = executed.priority,
                    "{} panicked while undeploying: {}",
                    executed.processor.name(),
                    panic_message(&*panic)
                );
            }
        }
        // children first
        for unit in deployment.units.iter_mut().rev() {
            if let Err(e) = unit.service_target().remove_all() {
                warn!("services of {} may still be stopping: {e}", unit.name());
            }
            unit.set_status(DeploymentStatus::NotStarted);
        }
    }
}

/// The first unit, in preorder, that has not finished `phase` yet.
fn next_behind(deployment: &Deployment, phase: Phase) -> Option<usize> {
    deployment
        .preorder()
        .into_iter()
        .find(|&u| deployment.units[u].phases_done() <= phase.index())
}

fn run_processor(
    deployment: &mut Deployment,
    unit: usize,
    registration: &Registration,
) -> Result<(), DeploymentUnitProcessingError> {
    if let Some(allowed) = &registration.allowed_writes {
        deployment.units[unit]
            .attachments_mut()
            .begin_guard(allowed.iter().copied());
    }
    let outcome = {
        let mut ctx = DeploymentPhaseContext::new(deployment, unit, registration.phase);
        std::panic::catch_unwind(AssertUnwindSafe(|| registration.processor.deploy(&mut ctx)))
    };
    let violations = deployment.units[unit].attachments_mut().end_guard();
    match outcome {
        Ok(Ok(())) if violations.is_empty() => Ok(()),
        Ok(Ok(())) => Err(DeploymentUnitProcessingError::new(format!(
            "{} wrote undeclared attachments to {}: {}",
            registration.processor.name(),
            deployment.units[unit].name(),
            violations
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ")
        ))),
        Ok(Err(e)) => Err(e),
        Err(panic) => Err(DeploymentUnitProcessingError::new(format!(
            "{} panicked: {}",
            registration.processor.name(),
            panic_message(&*panic)
        ))),
    }
}
