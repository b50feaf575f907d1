//! EE module metadata and the managed bean processors built on it.
use std::collections::BTreeMap;

use mooring_core::deployment::{
    priority, AttachmentContract, ChainError, DeployerChainsBuilder, DeploymentPhaseContext,
    DeploymentUnit, DeploymentUnitProcessingError, DeploymentUnitProcessor, Phase,
};

mod managed_bean;

pub use managed_bean::{
    ManagedBeanAnnotationProcessor, ManagedBeanContext, ManagedBeanInstallProcessor,
    MANAGED_BEAN, RESOURCE,
};

use crate::{
    archive::ArchiveKind,
    keys::{DeploymentType, DEPLOYMENT_TYPE, EE_MODULE_DESCRIPTION},
};

/// A resource reference of a component: `binding` resolves to `source`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceInjection {
    pub binding: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBeanDescription {
    pub name: String,
    pub class_name: String,
    pub resource_injections: Vec<ResourceInjection>,
}

/// Outcome of registering a module level resource binding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    Added,
    /// Already bound to the same source.
    Duplicate,
    /// Already bound to another source, carried here.
    Conflict(String),
}

/// Components and bindings of one EE module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EeModuleDescription {
    application_name: String,
    module_name: String,
    beans: BTreeMap<String, ManagedBeanDescription>,
    bindings: BTreeMap<String, String>,
}

impl EeModuleDescription {
    pub fn new(application_name: impl Into<String>, module_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            module_name: module_name.into(),
            beans: BTreeMap::new(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    pub fn bean(&self, name: &str) -> Option<&ManagedBeanDescription> {
        self.beans.get(name)
    }

    /// Beans sorted by name.
    pub fn beans(&self) -> impl Iterator<Item = &ManagedBeanDescription> {
        self.beans.values()
    }

    /// Add a bean. A bean with the same name is handed back untouched.
    pub fn add_bean(
        &mut self,
        bean: ManagedBeanDescription,
    ) -> Result<(), ManagedBeanDescription> {
        if self.beans.contains_key(&bean.name) {
            return Err(bean);
        }
        self.beans.insert(bean.name.clone(), bean);
        Ok(())
    }

    pub fn clear_beans(&mut self) {
        self.beans.clear();
        self.bindings.clear();
    }

    pub fn add_binding(&mut self, binding: &str, source: &str) -> Binding {
        match self.bindings.get(binding) {
            Some(existing) if existing == source => Binding::Duplicate,
            Some(existing) => Binding::Conflict(existing.clone()),
            None => {
                self.bindings
                    .insert(binding.to_string(), source.to_string());
                Binding::Added
            }
        }
    }

    pub fn binding(&self, binding: &str) -> Option<&str> {
        self.bindings.get(binding).map(String::as_str)
    }

    /// The global name of a component of this module.
    pub fn global_name(&self, component: &str) -> String {
        if self.application_name == self.module_name {
            format!("java:global/{}/{component}", self.module_name)
        } else {
            format!(
                "java:global/{}/{}/{component}",
                self.application_name, self.module_name
            )
        }
    }
}

/// `app.ear` → `app`; names that are not archives stay as they are.
pub fn strip_archive_extension(name: &str) -> &str {
    match (ArchiveKind::of(name), name.rsplit_once('.')) {
        (ArchiveKind::Other, _) | (_, None) => name,
        (_, Some((stem, _))) => stem,
    }
}

/// Gives every module unit its [`EeModuleDescription`].
pub struct EeModuleInitialProcessor;

impl DeploymentUnitProcessor for EeModuleInitialProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        if ctx.attachments().get(&DEPLOYMENT_TYPE) == Some(&DeploymentType::Ear) {
            return Ok(());
        }
        let unit = ctx.unit();
        let module_name = strip_archive_extension(unit.name()).to_string();
        let application_name = unit
            .parent_name()
            .map(|p| strip_archive_extension(p).to_string())
            .unwrap_or_else(|| module_name.clone());
        ctx.attachments_mut().put(
            &EE_MODULE_DESCRIPTION,
            EeModuleDescription::new(application_name, module_name),
        );
        Ok(())
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        unit.attachments_mut().remove(&EE_MODULE_DESCRIPTION);
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(
            AttachmentContract::new()
                .reads(&DEPLOYMENT_TYPE)
                .writes(&EE_MODULE_DESCRIPTION),
        )
    }
}

/// Register the module and managed bean processors. Needs the structure
/// processors in the same chains.
pub fn register(builder: &mut DeployerChainsBuilder) -> Result<(), ChainError> {
    builder
        .add(
            Phase::Parse,
            priority::PARSE_EE_MODULE_NAME,
            EeModuleInitialProcessor,
        )?
        .add(
            Phase::Parse,
            priority::PARSE_MANAGED_BEAN_ANNOTATION,
            ManagedBeanAnnotationProcessor,
        )?
        .add(
            Phase::Install,
            priority::INSTALL_EE_COMPONENT,
            ManagedBeanInstallProcessor,
        )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{strip_archive_extension, Binding, EeModuleDescription, ManagedBeanDescription};

    fn bean(name: &str, class_name: &str) -> ManagedBeanDescription {
        ManagedBeanDescription {
            name: name.to_string(),
            class_name: class_name.to_string(),
            resource_injections: Vec::new(),
        }
    }

    #[test]
    fn test_names() {
        assert_eq!("app", strip_archive_extension("app.ear"));
        assert_eq!("web", strip_archive_extension("web.war"));
        assert_eq!("lib", strip_archive_extension("lib"));
        assert_eq!("notes.txt", strip_archive_extension("notes.txt"));

        let standalone = EeModuleDescription::new("beans", "beans");
        assert_eq!("java:global/beans/Greeter", standalone.global_name("Greeter"));
        let nested = EeModuleDescription::new("app", "beans");
        assert_eq!("java:global/app/beans/Greeter", nested.global_name("Greeter"));
    }

    #[test]
    fn test_duplicate_rules() {
        let mut module = EeModuleDescription::new("app", "beans");
        module.add_bean(bean("greeter", "a.Greeter")).unwrap();
        let rejected = module.add_bean(bean("greeter", "b.Greeter")).unwrap_err();
        assert_eq!("b.Greeter", rejected.class_name);
        assert_eq!("a.Greeter", module.bean("greeter").unwrap().class_name);

        assert_eq!(Binding::Added, module.add_binding("env/ds", "java:/ds"));
        assert_eq!(Binding::Duplicate, module.add_binding("env/ds", "java:/ds"));
        assert_eq!(
            Binding::Conflict("java:/ds".to_string()),
            module.add_binding("env/ds", "java:/other")
        );
        assert_eq!(Some("java:/ds"), module.binding("env/ds"));
    }
}
