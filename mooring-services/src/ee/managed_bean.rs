use mooring_core::{
    container::{ServiceTarget, ValueService},
    deployment::{
        AttachmentContract, DeploymentPhaseContext, DeploymentUnit, DeploymentUnitProcessingError,
        DeploymentUnitProcessor,
    },
    ServiceName,
};
use tracing::{debug, info};

use super::{Binding, EeModuleDescription, ManagedBeanDescription, ResourceInjection};
use crate::{
    keys::{ANNOTATION_INDEX, EE_MODULE_DESCRIPTION},
    naming::{module_binder_name, naming_registry_name, BinderService},
    structure::{AnnotationIndex, AnnotationInstance},
};

pub const MANAGED_BEAN: &str = "ManagedBean";
pub const RESOURCE: &str = "Resource";

/// The runtime view of a managed bean, published by its context service and
/// bound under the bean's global name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedBeanContext {
    pub bean_name: String,
    pub class_name: String,
    pub resources: Vec<ResourceInjection>,
}

/// Collects `ManagedBean` classes and their `Resource` references from the
/// annotation index into the module description.
pub struct ManagedBeanAnnotationProcessor;

impl ManagedBeanAnnotationProcessor {
    fn describe(
        index: &AnnotationIndex,
        unit: &str,
    ) -> Result<Vec<ManagedBeanDescription>, DeploymentUnitProcessingError> {
        index
            .annotations(MANAGED_BEAN)
            .map(|bean| {
                let class_name = bean.target.clone();
                let name = bean
                    .value("value")
                    .filter(|v| !v.is_empty())
                    .map(str::to_string)
                    .unwrap_or_else(|| simple_class_name(&class_name).to_string());
                let resource_injections = index
                    .on_class(&bean.target)
                    .filter(|a| a.simple_name() == RESOURCE)
                    .map(|a| resource_injection(a, unit))
                    .collect::<Result<_, _>>()?;
                Ok(ManagedBeanDescription {
                    name,
                    class_name,
                    resource_injections,
                })
            })
            .collect()
    }

    /// Add `beans` and their bindings to `module`, all of them or none.
    fn merge(
        module: &mut EeModuleDescription,
        beans: Vec<ManagedBeanDescription>,
        unit: &str,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let mut staged = module.clone();
        for bean in beans {
            for injection in &bean.resource_injections {
                match staged.add_binding(&injection.binding, &injection.source) {
                    Binding::Added => {}
                    Binding::Duplicate => {
                        debug!(%unit, binding = %injection.binding, "binding already declared")
                    }
                    Binding::Conflict(existing) => {
                        return Err(DeploymentUnitProcessingError::new(format!(
                            "{} in {unit} is bound to both {existing} and {}",
                            injection.binding, injection.source
                        )))
                    }
                }
            }
            if let Err(rejected) = staged.add_bean(bean) {
                let existing = staged
                    .bean(&rejected.name)
                    .map(|b| b.class_name.as_str())
                    .unwrap_or_default();
                return Err(DeploymentUnitProcessingError::new(format!(
                    "managed bean name {} in {unit} is used by both {existing} and {}",
                    rejected.name, rejected.class_name
                )));
            }
        }
        *module = staged;
        Ok(())
    }
}

fn simple_class_name(class_name: &str) -> &str {
    class_name.rsplit('.').next().unwrap_or(class_name)
}

fn resource_injection(
    annotation: &AnnotationInstance,
    unit: &str,
) -> Result<ResourceInjection, DeploymentUnitProcessingError> {
    let binding = match (annotation.value("name"), annotation.value("field")) {
        (Some(name), _) if !name.is_empty() => name.to_string(),
        (_, Some(field)) if !field.is_empty() => format!("{}/{field}", annotation.target),
        _ => {
            return Err(DeploymentUnitProcessingError::new(format!(
                "@Resource on {} in {unit} has neither a name nor a field",
                annotation.target
            )))
        }
    };
    let source = annotation
        .value("lookup")
        .or_else(|| annotation.value("mapped-name"))
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            DeploymentUnitProcessingError::new(format!(
                "@Resource {binding} on {} in {unit} has no lookup",
                annotation.target
            ))
        })?;
    Ok(ResourceInjection {
        binding,
        source: source.to_string(),
    })
}

impl DeploymentUnitProcessor for ManagedBeanAnnotationProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let unit = ctx.unit().name().to_string();
        let beans = match ctx.attachments().get(&ANNOTATION_INDEX) {
            Some(index) => Self::describe(index, &unit)?,
            None => return Ok(()),
        };
        let Some(module) = ctx.attachments_mut().get_mut(&EE_MODULE_DESCRIPTION) else {
            return Ok(());
        };
        Self::merge(module, beans, &unit)
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        if let Some(module) = unit.attachments_mut().get_mut(&EE_MODULE_DESCRIPTION) {
            module.clear_beans();
        }
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(
            AttachmentContract::new()
                .reads(&ANNOTATION_INDEX)
                .reads(&EE_MODULE_DESCRIPTION)
                .writes(&EE_MODULE_DESCRIPTION),
        )
    }
}

/// Installs, for every managed bean of the module, a context service and a
/// binder publishing it under the bean's global name.
pub struct ManagedBeanInstallProcessor;

impl ManagedBeanInstallProcessor {
    pub fn context_service_name(unit: &ServiceName, bean: &str) -> ServiceName {
        unit.append(["component", bean, "context"])
    }
}

impl DeploymentUnitProcessor for ManagedBeanInstallProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let Some(module) = ctx.attachments().get(&EE_MODULE_DESCRIPTION) else {
            return Ok(());
        };
        let target = ctx.service_target();
        for bean in module.beans() {
            let context_name = Self::context_service_name(ctx.unit().service_name(), &bean.name);
            let context = ManagedBeanContext {
                bean_name: bean.name.clone(),
                class_name: bean.class_name.clone(),
                resources: bean.resource_injections.clone(),
            };
            target
                .add_service(context_name.clone(), ValueService::new(context))
                .install()
                .map_err(|e| {
                    DeploymentUnitProcessingError::with_cause(
                        format!("cannot install the context of managed bean {}", bean.name),
                        e,
                    )
                })?;

            let global_name = module.global_name(&bean.name);
            let binder = BinderService::<ManagedBeanContext>::new(global_name.clone());
            let registry = binder.registry().clone();
            let value = binder.value_injector().clone();
            target
                .add_service(
                    module_binder_name(module.application_name(), module.module_name(), &bean.name),
                    binder,
                )
                .add_injected_dependency(naming_registry_name(), &registry)
                .add_injected_dependency(context_name, &value)
                .install()
                .map_err(|e| {
                    DeploymentUnitProcessingError::with_cause(
                        format!("cannot bind managed bean {} as {global_name}", bean.name),
                        e,
                    )
                })?;
            info!(
                unit = ctx.unit().name(),
                bean = %bean.name,
                "managed bean installed as {global_name}"
            );
        }
        Ok(())
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(AttachmentContract::new().reads(&EE_MODULE_DESCRIPTION))
    }
}
