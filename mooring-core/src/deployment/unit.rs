use std::{fmt, sync::Arc};

use serde::Serialize;

use super::{DeploymentUnitProcessor, Phase};
use crate::{
    attachment::Attachments,
    container::{ServiceContainer, TrackingServiceTarget},
    ServiceName,
};

/// `jboss.deployment.unit.<name>`
pub fn unit_service_name(name: &str) -> ServiceName {
    ServiceName::jboss().append(["deployment", "unit", name])
}

/// `jboss.deployment.subunit.<parent>.<name>`
pub fn subunit_service_name(parent: &str, name: &str) -> ServiceName {
    ServiceName::jboss().append(["deployment", "subunit", parent, name])
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DeploymentStatus {
    NotStarted,
    Processing(Phase),
    Deployed,
    Failed,
}

/// One deployable artifact, top level or nested.
pub struct DeploymentUnit {
    name: String,
    parent: Option<usize>,
    parent_name: Option<String>,
    children: Vec<usize>,
    service_name: ServiceName,
    attachments: Attachments,
    target: TrackingServiceTarget,
    status: DeploymentStatus,
    // number of phases this unit went through
    phases_done: usize,
}

impl DeploymentUnit {
    fn new(
        name: String,
        parent: Option<(usize, String)>,
        attachments: Attachments,
        container: &ServiceContainer,
    ) -> Self {
        let service_name = match &parent {
            Some((_, parent_name)) => subunit_service_name(parent_name, &name),
            None => unit_service_name(&name),
        };
        let (parent, parent_name) = parent.unzip();
        Self {
            name,
            parent,
            parent_name,
            children: Vec::new(),
            service_name,
            attachments,
            target: TrackingServiceTarget::new(container.clone()),
            status: DeploymentStatus::NotStarted,
            phases_done: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent_name(&self) -> Option<&str> {
        self.parent_name.as_deref()
    }

    pub fn is_top_level(&self) -> bool {
        self.parent.is_none()
    }

    pub fn service_name(&self) -> &ServiceName {
        &self.service_name
    }

    pub fn attachments(&self) -> &Attachments {
        &self.attachments
    }

    pub fn attachments_mut(&mut self) -> &mut Attachments {
        &mut self.attachments
    }

    /// Services installed through this target are removed with the unit.
    pub fn service_target(&self) -> &TrackingServiceTarget {
        &self.target
    }

    pub(crate) fn service_target_mut(&mut self) -> &mut TrackingServiceTarget {
        &mut self.target
    }

    pub fn status(&self) -> DeploymentStatus {
        self.status
    }

    pub(crate) fn set_status(&mut self, status: DeploymentStatus) {
        self.status = status;
    }

    pub(crate) fn phases_done(&self) -> usize {
        self.phases_done
    }

    pub(crate) fn finish_phase(&mut self, phase: Phase) {
        self.phases_done = phase.index() + 1;
    }
}

impl fmt::Debug for DeploymentUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeploymentUnit")
            .field("name", &self.name)
            .field("parent", &self.parent_name)
            .field("status", &self.status)
            .field("attachments", &self.attachments)
            .finish()
    }
}

pub(crate) struct Executed {
    pub(crate) unit: usize,
    pub(crate) phase: Phase,
    pub(crate) priority: u32,
    pub(crate) processor: Arc<dyn DeploymentUnitProcessor>,
}

/// A deployment tree: the top level unit and every sub-deployment found
/// while processing it, in discovery order.
pub struct Deployment {
    // parents always precede their children
    pub(crate) units: Vec<DeploymentUnit>,
    pub(crate) executed: Vec<Executed>,
}

impl Deployment {
    pub(crate) fn new(name: &str, attachments: Attachments, container: &ServiceContainer) -> Self {
        Self {
            units: vec![DeploymentUnit::new(
                name.to_string(),
                None,
                attachments,
                container,
            )],
            executed: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.root().name()
    }

    pub fn root(&self) -> &DeploymentUnit {
        &self.units[0]
    }

    /// Every unit, parents before children.
    pub fn units(&self) -> impl Iterator<Item = &DeploymentUnit> {
        self.preorder().into_iter().map(|i| &self.units[i])
    }

    pub fn sub_deployments(&self) -> impl Iterator<Item = &DeploymentUnit> {
        self.units[0].children.iter().map(|&i| &self.units[i])
    }

    /// Look a unit up by name: the root name or the name of a sub-deployment.
    pub fn unit(&self, name: &str) -> Option<&DeploymentUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    pub(crate) fn add_child(
        &mut self,
        parent: usize,
        name: String,
        attachments: Attachments,
    ) -> usize {
        let parent_name = self.units[parent].name.clone();
        let container = self.units[parent].target.container().clone();
        let index = self.units.len();
        self.units.push(DeploymentUnit::new(
            name,
            Some((parent, parent_name)),
            attachments,
            &container,
        ));
        self.units[parent].children.push(index);
        index
    }

    pub(crate) fn parent_of(&self, index: usize) -> Option<usize> {
        self.units[index].parent
    }

    pub(crate) fn children_of(&self, index: usize) -> &[usize] {
        &self.units[index].children
    }

    /// Unit indices, each parent followed by its children in discovery order.
    pub(crate) fn preorder(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.units.len());
        let mut stack = vec![0];
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.units[index].children.iter().rev());
        }
        order
    }
}

impl fmt::Debug for Deployment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.units()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{subunit_service_name, unit_service_name, Deployment};
    use crate::{attachment::Attachments, container::ServiceContainer};

    #[test]
    fn test_service_names() {
        assert_eq!(
            "jboss.deployment.unit.\"app.ear\"",
            unit_service_name("app.ear").to_string()
        );
        assert_eq!(
            "jboss.deployment.subunit.\"app.ear\".\"client.jar\"",
            subunit_service_name("app.ear", "client.jar").to_string()
        );
    }

    #[test]
    fn test_preorder_follows_discovery() {
        let container = ServiceContainer::new();
        let mut deployment = Deployment::new("app.ear", Attachments::new(), &container);
        let a = deployment.add_child(0, "a.jar".to_string(), Attachments::new());
        deployment.add_child(0, "b.war".to_string(), Attachments::new());
        deployment.add_child(a, "nested.rar".to_string(), Attachments::new());
        let names: Vec<_> = deployment.units().map(|u| u.name().to_string()).collect();
        assert_eq!(vec!["app.ear", "a.jar", "nested.rar", "b.war"], names);
        assert_eq!(
            Some("app.ear"),
            deployment.unit("b.war").and_then(|u| u.parent_name())
        );
    }
}
