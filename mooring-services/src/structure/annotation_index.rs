use std::collections::BTreeMap;

use mooring_core::deployment::{
    AttachmentContract, DeploymentPhaseContext, DeploymentUnit, DeploymentUnitProcessingError,
    DeploymentUnitProcessor,
};
use serde::Deserialize;
use tracing::debug;

use crate::keys::{ANNOTATION_INDEX, DEPLOYMENT_ROOT};

pub const ANNOTATION_INDEX_PATH: &str = "META-INF/annotation-index.toml";

/// One annotation on one class, as recorded in the index file:
///
/// ```toml
/// [[annotation]]
/// name = "javax.annotation.ManagedBean"
/// target = "org.acme.Greeter"
/// values = { value = "greeter" }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AnnotationInstance {
    pub name: String,
    pub target: String,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
}

impl AnnotationInstance {
    /// The annotation name without its package.
    pub fn simple_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }

    pub fn value(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }
}

/// Annotations found in a unit, in file order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AnnotationIndex {
    #[serde(default, rename = "annotation")]
    annotations: Vec<AnnotationInstance>,
}

impl AnnotationIndex {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Instances of the annotation `name`, matched on the simple name when
    /// `name` has no package.
    pub fn annotations<'a>(
        &'a self,
        name: &'a str,
    ) -> impl Iterator<Item = &'a AnnotationInstance> + 'a {
        self.annotations.iter().filter(move |a| {
            if name.contains('.') {
                a.name == name
            } else {
                a.simple_name() == name
            }
        })
    }

    /// Every annotation on the class `target`.
    pub fn on_class<'a>(
        &'a self,
        target: &'a str,
    ) -> impl Iterator<Item = &'a AnnotationInstance> + 'a {
        self.annotations.iter().filter(move |a| a.target == target)
    }

    pub fn len(&self) -> usize {
        self.annotations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.annotations.is_empty()
    }
}

/// Loads the unit's annotation index.
pub struct AnnotationIndexProcessor;

impl DeploymentUnitProcessor for AnnotationIndexProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let Some(root) = ctx.attachments().get(&DEPLOYMENT_ROOT) else {
            return Ok(());
        };
        let content = root.read_to_string(ANNOTATION_INDEX_PATH).map_err(|e| {
            DeploymentUnitProcessingError::with_cause(
                format!("cannot read {ANNOTATION_INDEX_PATH} of {}", root.name()),
                e,
            )
        })?;
        let Some(content) = content else {
            return Ok(());
        };
        let index = AnnotationIndex::parse(&content).map_err(|e| {
            DeploymentUnitProcessingError::with_cause(
                format!(
                    "malformed {ANNOTATION_INDEX_PATH} in {}",
                    ctx.unit().name()
                ),
                e,
            )
        })?;
        debug!(
            unit = ctx.unit().name(),
            annotations = index.len(),
            "annotation index loaded"
        );
        ctx.attachments_mut().put(&ANNOTATION_INDEX, index);
        Ok(())
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        unit.attachments_mut().remove(&ANNOTATION_INDEX);
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(
            AttachmentContract::new()
                .reads(&DEPLOYMENT_ROOT)
                .writes(&ANNOTATION_INDEX),
        )
    }
}

/// Drops the index once every phase that reads it is done.
pub struct AnnotationIndexCleanupProcessor;

impl DeploymentUnitProcessor for AnnotationIndexCleanupProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        ctx.attachments_mut().remove(&ANNOTATION_INDEX);
        Ok(())
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(AttachmentContract::new().writes(&ANNOTATION_INDEX))
    }
}
