use std::collections::BTreeMap;

use mooring_core::deployment::{
    AttachmentContract, DeploymentPhaseContext, DeploymentUnit, DeploymentUnitProcessingError,
    DeploymentUnitProcessor,
};
use tracing::debug;

use crate::{
    archive::ResourceRoot,
    keys::{DEPLOYMENT_ROOT, MANIFEST},
};

pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";
pub const MAIN_CLASS: &str = "Main-Class";

/// Main section attributes of a JAR manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Manifest {
    attributes: BTreeMap<String, String>,
}

impl Manifest {
    /// Parse the main section. Continuation lines start with one space;
    /// the main section ends at the first blank line.
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut attributes: BTreeMap<String, String> = BTreeMap::new();
        let mut last: Option<String> = None;
        for (number, line) in content.lines().enumerate() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                break;
            }
            if let Some(continued) = line.strip_prefix(' ') {
                let Some(value) = last.as_ref().and_then(|k| attributes.get_mut(k)) else {
                    return Err(format!("line {}: continuation without attribute", number + 1));
                };
                value.push_str(continued);
                continue;
            }
            let Some((key, value)) = line.split_once(':') else {
                return Err(format!("line {}: expected `Name: value`", number + 1));
            };
            let key = key.trim().to_string();
            attributes.insert(key.clone(), value.trim_start().to_string());
            last = Some(key);
        }
        Ok(Self { attributes })
    }

    /// Read the manifest of `root`, if it has one.
    pub fn read(root: &ResourceRoot) -> Result<Option<Self>, DeploymentUnitProcessingError> {
        let content = root.read_to_string(MANIFEST_PATH).map_err(|e| {
            DeploymentUnitProcessingError::with_cause(
                format!("cannot read {MANIFEST_PATH} of {}", root.name()),
                e,
            )
        })?;
        content
            .map(|c| {
                Self::parse(&c).map_err(|e| {
                    DeploymentUnitProcessingError::new(format!(
                        "malformed {MANIFEST_PATH} in {}: {e}",
                        root.name()
                    ))
                })
            })
            .transpose()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    pub fn main_class(&self) -> Option<&str> {
        self.get(MAIN_CLASS).filter(|c| !c.is_empty())
    }
}

/// Attaches the unit's manifest, when it has one.
pub struct ManifestProcessor;

impl DeploymentUnitProcessor for ManifestProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let Some(root) = ctx.attachments().get(&DEPLOYMENT_ROOT) else {
            return Ok(());
        };
        let Some(manifest) = Manifest::read(root)? else {
            return Ok(());
        };
        debug!(unit = ctx.unit().name(), "manifest attached");
        ctx.attachments_mut().put(&MANIFEST, manifest);
        Ok(())
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        unit.attachments_mut().remove(&MANIFEST);
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(
            AttachmentContract::new()
                .reads(&DEPLOYMENT_ROOT)
                .writes(&MANIFEST),
        )
    }
}
