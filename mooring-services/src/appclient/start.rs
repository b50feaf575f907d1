use std::{convert::Infallible, sync::Arc};

use mooring_core::{
    container::{Service, ServiceTarget, StartContext, StartException, StopContext},
    deployment::{
        AttachmentContract, DeploymentPhaseContext, DeploymentUnitProcessingError,
        DeploymentUnitProcessor,
    },
    ServiceName,
};
use service_async::{
    layer::{layer_fn, FactoryLayer},
    stack::FactoryStack,
    MakeService, Param,
};
use tracing::info;

use crate::{
    common::{AsyncService, SharedExecutor},
    keys::APPLICATION_CLIENT_MAIN_CLASS,
};

/// What to run: the client's main class and its arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryPoint {
    pub deployment: String,
    pub main_class: String,
    pub args: Vec<String>,
}

/// Runs an application client entry point to completion.
pub trait EntryPointLauncher: Send + Sync {
    fn launch(&self, entry: &EntryPoint) -> anyhow::Result<()>;
}

/// Launches nothing, only logs what would run.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogLauncher;

impl EntryPointLauncher for LogLauncher {
    fn launch(&self, entry: &EntryPoint) -> anyhow::Result<()> {
        info!(
            deployment = %entry.deployment,
            args = ?entry.args,
            "launching {}",
            entry.main_class
        );
        Ok(())
    }
}

/// Everything the start service stack is built from.
#[derive(Clone)]
pub struct LaunchConfig {
    pub entry: EntryPoint,
    pub launcher: Arc<dyn EntryPointLauncher>,
    pub executor: SharedExecutor,
}

impl Param<EntryPoint> for LaunchConfig {
    fn param(&self) -> EntryPoint {
        self.entry.clone()
    }
}

impl Param<Arc<dyn EntryPointLauncher>> for LaunchConfig {
    fn param(&self) -> Arc<dyn EntryPointLauncher> {
        self.launcher.clone()
    }
}

impl Param<SharedExecutor> for LaunchConfig {
    fn param(&self) -> SharedExecutor {
        self.executor.clone()
    }
}

/// Runs the client entry point when started. The launch blocks, so the
/// service is meant to be wrapped in [`AsyncService`].
pub struct ApplicationClientStartService {
    entry: EntryPoint,
    launcher: Arc<dyn EntryPointLauncher>,
}

impl ApplicationClientStartService {
    pub fn service_name(unit: &ServiceName) -> ServiceName {
        unit.append(["ApplicationClientStartService"])
    }

    pub fn layer<C>() -> impl FactoryLayer<C, (), Factory = Self>
    where
        C: Param<EntryPoint> + Param<Arc<dyn EntryPointLauncher>>,
    {
        layer_fn::<C, _>(|c: &C, ()| Self {
            entry: <C as Param<EntryPoint>>::param(c),
            launcher: <C as Param<Arc<dyn EntryPointLauncher>>>::param(c),
        })
    }
}

impl Service for ApplicationClientStartService {
    type Value = EntryPoint;

    fn start(&self, ctx: StartContext) -> Result<(), StartException> {
        self.launcher.launch(&self.entry).map_err(|e| {
            StartException::with_cause(
                format!("application client {} failed", self.entry.main_class),
                e,
            )
        })?;
        info!(
            deployment = %self.entry.deployment,
            elapsed = ?ctx.elapsed(),
            "application client finished"
        );
        Ok(())
    }

    fn stop(&self, _ctx: StopContext) {
        info!(deployment = %self.entry.deployment, "application client stopped");
    }

    fn value(&self) -> Option<Arc<EntryPoint>> {
        Some(Arc::new(self.entry.clone()))
    }
}

impl MakeService for ApplicationClientStartService {
    type Service = Self;
    type Error = Infallible;

    fn make_via_ref(&self, _old: Option<&Self::Service>) -> Result<Self::Service, Self::Error> {
        Ok(Self {
            entry: self.entry.clone(),
            launcher: self.launcher.clone(),
        })
    }
}

/// Installs the start service of the application client unit.
pub struct ApplicationClientStartProcessor {
    args: Vec<String>,
    executor: SharedExecutor,
    launcher: Arc<dyn EntryPointLauncher>,
}

impl ApplicationClientStartProcessor {
    pub fn new(
        args: Vec<String>,
        executor: SharedExecutor,
        launcher: Arc<dyn EntryPointLauncher>,
    ) -> Self {
        Self {
            args,
            executor,
            launcher,
        }
    }
}

impl DeploymentUnitProcessor for ApplicationClientStartProcessor {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let Some(main_class) = ctx.attachments().get(&APPLICATION_CLIENT_MAIN_CLASS) else {
            return Ok(());
        };
        let config = LaunchConfig {
            entry: EntryPoint {
                deployment: ctx.unit().name().to_string(),
                main_class: main_class.clone(),
                args: self.args.clone(),
            },
            launcher: self.launcher.clone(),
            executor: self.executor.clone(),
        };
        let factory = FactoryStack::new(config)
            .push(ApplicationClientStartService::layer())
            .push(AsyncService::layer())
            .into_inner();
        let service = match factory.make() {
            Ok(service) => service,
            Err(e) => match e {},
        };
        let name = ApplicationClientStartService::service_name(ctx.unit().service_name());
        ctx.service_target()
            .add_service(name, service)
            .install()
            .map_err(|e| {
                DeploymentUnitProcessingError::with_cause(
                    format!("cannot install the start service of {}", ctx.unit().name()),
                    e,
                )
            })?;
        Ok(())
    }

    fn contract(&self) -> Option<AttachmentContract> {
        Some(AttachmentContract::new().reads(&APPLICATION_CLIENT_MAIN_CLASS))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use mooring_core::{
        container::{transition, ServiceContainer, ServiceController, ServiceTarget, State},
        orchestrator::{Executor, Rejected, Task},
        ServiceName,
    };
    use service_async::{stack::FactoryStack, MakeService};

    use super::{ApplicationClientStartService, EntryPoint, EntryPointLauncher, LaunchConfig};
    use crate::common::AsyncService;

    struct Inline;

    impl Executor for Inline {
        fn execute(&self, task: Task) -> Result<(), Rejected> {
            task();
            Ok(())
        }
    }

    #[derive(Default)]
    struct Recording {
        launched: Mutex<Vec<EntryPoint>>,
        fail: bool,
    }

    impl EntryPointLauncher for Recording {
        fn launch(&self, entry: &EntryPoint) -> anyhow::Result<()> {
            self.launched.lock().unwrap().push(entry.clone());
            if self.fail {
                anyhow::bail!("exit status 3");
            }
            Ok(())
        }
    }

    fn install(container: &ServiceContainer, launcher: Arc<Recording>) -> ServiceController {
        let config = LaunchConfig {
            entry: EntryPoint {
                deployment: "client.jar".to_string(),
                main_class: "org.acme.Main".to_string(),
                args: vec!["--verbose".to_string()],
            },
            launcher,
            executor: Arc::new(Inline),
        };
        let service = FactoryStack::new(config)
            .push(ApplicationClientStartService::layer())
            .push(AsyncService::layer())
            .into_inner()
            .make()
            .unwrap();
        let name = ApplicationClientStartService::service_name(&ServiceName::of(["client"]));
        container.add_service(name, service).install().unwrap()
    }

    #[test]
    fn test_launches_entry_point() {
        let container = ServiceContainer::new();
        let launcher = Arc::new(Recording::default());
        assert_eq!(State::Up, install(&container, launcher.clone()).state());
        let launched = launcher.launched.lock().unwrap();
        assert_eq!(1, launched.len());
        assert_eq!("org.acme.Main", launched[0].main_class);
        assert_eq!(vec!["--verbose".to_string()], launched[0].args);
    }

    #[test]
    fn test_launch_failure_fails_start() {
        let container = ServiceContainer::new();
        let launcher = Arc::new(Recording {
            fail: true,
            ..Recording::default()
        });
        let controller = install(&container, launcher);
        assert_eq!(State::StartFailed, controller.state());
        let cause = controller.start_exception().unwrap();
        assert!(cause.message().contains("org.acme.Main"));
        transition::remove(&controller).unwrap();
    }
}
