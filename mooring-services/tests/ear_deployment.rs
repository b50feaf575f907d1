use std::{
    fs,
    path::Path,
    sync::{Arc, Mutex},
};

use mooring_core::{
    attachment::Attachments,
    container::{ServiceContainer, ServiceRegistry, State},
    deployment::{
        DeployerChains, DeploymentPhaseContext, DeploymentPipeline, DeploymentUnit,
        DeploymentUnitProcessingError, DeploymentUnitProcessor, Phase,
    },
    orchestrator::{Executor, Rejected, Task},
};
use mooring_services::{
    appclient::{self, AppClientParams, ApplicationClientStartService, EntryPoint, EntryPointLauncher},
    archive::ResourceRoot,
    ee::{self, ManagedBeanContext},
    keys::{DeploymentType, APPLICATION_CLIENT_SELECTION, DEPLOYMENT_ROOT, DEPLOYMENT_TYPE},
    naming::{install_naming_registry, naming_registry_name, NamingRegistry},
    structure,
};
use service_async::Param;
use tempfile::TempDir;

struct Inline;

impl Executor for Inline {
    fn execute(&self, task: Task) -> Result<(), Rejected> {
        task();
        Ok(())
    }
}

#[derive(Default)]
struct Recording(Mutex<Vec<EntryPoint>>);

impl EntryPointLauncher for Recording {
    fn launch(&self, entry: &EntryPoint) -> anyhow::Result<()> {
        self.0.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

struct Boot(AppClientParams);

impl Param<AppClientParams> for Boot {
    fn param(&self) -> AppClientParams {
        self.0.clone()
    }
}

fn write(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

const BEANS: &str = r#"
[[annotation]]
name = "javax.annotation.ManagedBean"
target = "org.acme.Greeter"
values = { value = "greeter" }

[[annotation]]
name = "javax.annotation.Resource"
target = "org.acme.Greeter"
values = { name = "env/ds", lookup = "java:jboss/datasources/Example" }

[[annotation]]
name = "javax.annotation.ManagedBean"
target = "org.acme.Counter"
"#;

/// `app.ear` with a client jar, a bean jar and a plain directory.
fn ear(dir: &TempDir) -> ResourceRoot {
    let root = dir.path().join("app.ear");
    write(&root, "client.jar/META-INF/MANIFEST.MF", "Main-Class: org.acme.Main\n");
    write(&root, "beans.jar/META-INF/annotation-index.toml", BEANS);
    write(&root, "lib/readme.txt", "not a module");
    ResourceRoot::new(root)
}

/// Runs first in STRUCTURE, so its undeploy sees what every later step left
/// behind on the unit.
#[derive(Clone, Default)]
struct Leftovers(Arc<Mutex<Vec<String>>>);

impl DeploymentUnitProcessor for Leftovers {
    fn deploy(
        &self,
        _ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        Ok(())
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        let attachments = unit.attachments();
        if attachments.get(&DEPLOYMENT_TYPE) == Some(&DeploymentType::ApplicationClient)
            || attachments.get(&APPLICATION_CLIENT_SELECTION).is_some()
        {
            self.0.lock().unwrap().push(unit.name().to_string());
        }
    }
}

fn pipeline(params: AppClientParams, launcher: Arc<Recording>) -> DeploymentPipeline {
    observed_pipeline(params, launcher, Leftovers::default())
}

fn observed_pipeline(
    params: AppClientParams,
    launcher: Arc<Recording>,
    leftovers: Leftovers,
) -> DeploymentPipeline {
    let container = ServiceContainer::new();
    install_naming_registry(&container).unwrap();
    let mut builder = DeployerChains::builder();
    builder.add(Phase::Structure, 0x0001, leftovers).unwrap();
    structure::register(&mut builder).unwrap();
    ee::register(&mut builder).unwrap();
    appclient::register(&mut builder, &Boot(params), Arc::new(Inline), launcher).unwrap();
    DeploymentPipeline::new(builder.build().unwrap(), container)
}

fn attachments(root: ResourceRoot) -> Attachments {
    let mut attachments = Attachments::new();
    attachments.put(&DEPLOYMENT_ROOT, root);
    attachments
}

fn registry(pipeline: &DeploymentPipeline) -> Arc<NamingRegistry> {
    pipeline
        .container()
        .get_required_service(&naming_registry_name())
        .unwrap()
        .value::<NamingRegistry>()
        .unwrap()
}

#[test]
fn test_ear_deploys_beans_and_launches_client() {
    let dir = TempDir::new().unwrap();
    let launcher = Arc::new(Recording::default());
    let params = AppClientParams {
        deployment: None,
        args: vec!["--name".to_string(), "world".to_string()],
    };
    let pipeline = pipeline(params, launcher.clone());

    let deployment = pipeline.deploy("app.ear", attachments(ear(&dir))).unwrap();
    let units: Vec<&str> = deployment.units().map(|u| u.name()).collect();
    assert_eq!(vec!["app.ear", "beans.jar", "client.jar"], units);
    let client = deployment.unit("client.jar").unwrap();
    assert_eq!(
        Some(&DeploymentType::ApplicationClient),
        client.attachments().get(&DEPLOYMENT_TYPE)
    );

    let launched = launcher.0.lock().unwrap().clone();
    assert_eq!(1, launched.len());
    assert_eq!("client.jar", launched[0].deployment);
    assert_eq!("org.acme.Main", launched[0].main_class);
    assert_eq!(vec!["--name", "world"], launched[0].args);
    let start = pipeline
        .container()
        .get_required_service(&ApplicationClientStartService::service_name(
            client.service_name(),
        ))
        .unwrap();
    assert_eq!(State::Up, start.state());

    let names = registry(&pipeline);
    assert_eq!(
        vec!["java:global/app/beans/Counter", "java:global/app/beans/greeter"],
        names.names()
    );
    let greeter = names
        .lookup_as::<ManagedBeanContext>("java:global/app/beans/greeter")
        .unwrap();
    assert_eq!("org.acme.Greeter", greeter.class_name);
    assert_eq!("java:jboss/datasources/Example", greeter.resources[0].source);

    pipeline.undeploy(deployment);
    assert!(names.names().is_empty());
    assert_eq!(vec![naming_registry_name()], pipeline.container().service_names());
}

#[test]
fn test_client_selection_needs_a_name_when_ambiguous() {
    let dir = TempDir::new().unwrap();
    let root = ear(&dir);
    write(root.path(), "other.jar/META-INF/application-client.xml", "<application-client/>");
    write(root.path(), "other.jar/META-INF/MANIFEST.MF", "Main-Class: org.acme.Other\n");

    let launcher = Arc::new(Recording::default());
    let failure = pipeline(AppClientParams::default(), launcher.clone())
        .deploy("app.ear", attachments(root.clone()))
        .unwrap_err();
    assert_eq!(Phase::Structure, failure.phase);
    let message = failure.cause.message();
    assert!(message.contains("client.jar"), "{message}");
    assert!(message.contains("other.jar"), "{message}");

    let params = AppClientParams {
        deployment: Some("other.jar".to_string()),
        args: Vec::new(),
    };
    let pipeline = pipeline(params, launcher.clone());
    let deployment = pipeline.deploy("app.ear", attachments(root)).unwrap();
    assert_eq!("org.acme.Other", launcher.0.lock().unwrap()[0].main_class);
    pipeline.undeploy(deployment);
}

#[test]
fn test_unknown_client_name_fails() {
    let dir = TempDir::new().unwrap();
    let params = AppClientParams {
        deployment: Some("missing.jar".to_string()),
        args: Vec::new(),
    };
    let pipeline = pipeline(params, Arc::new(Recording::default()));
    let failure = pipeline.deploy("app.ear", attachments(ear(&dir))).unwrap_err();
    assert!(failure.cause.message().contains("missing.jar"));
    assert_eq!(vec![naming_registry_name()], pipeline.container().service_names());
}

#[test]
fn test_client_without_main_class_fails_and_rolls_back() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("app.ear");
    write(&root, "client.jar/META-INF/application-client.xml", "<application-client/>");
    write(&root, "beans.jar/META-INF/annotation-index.toml", BEANS);

    let launcher = Arc::new(Recording::default());
    let pipeline = pipeline(AppClientParams::default(), launcher.clone());
    let failure = pipeline
        .deploy("app.ear", attachments(ResourceRoot::new(root)))
        .unwrap_err();
    assert_eq!("client.jar", failure.unit);
    assert_eq!(Phase::PostModule, failure.phase);
    assert_eq!(Some("ApplicationClientManifestProcessor"), failure.processor);
    assert!(failure.cause.message().contains("client.jar"));
    assert!(launcher.0.lock().unwrap().is_empty());
    assert!(registry(&pipeline).names().is_empty());
    assert_eq!(vec![naming_registry_name()], pipeline.container().service_names());
}

#[test]
fn test_client_marker_is_cleared_on_rollback_and_undeploy() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("app.ear");
    write(&root, "client.jar/META-INF/application-client.xml", "<application-client/>");

    let leftovers = Leftovers::default();
    let launcher = Arc::new(Recording::default());
    let pipeline =
        observed_pipeline(AppClientParams::default(), launcher.clone(), leftovers.clone());
    let failure = pipeline
        .deploy("app.ear", attachments(ResourceRoot::new(&root)))
        .unwrap_err();
    assert_eq!(Phase::PostModule, failure.phase);
    assert!(leftovers.0.lock().unwrap().is_empty());

    write(&root, "client.jar/META-INF/MANIFEST.MF", "Main-Class: org.acme.Main\n");
    let deployment = pipeline
        .deploy("app.ear", attachments(ResourceRoot::new(&root)))
        .unwrap();
    assert_eq!(
        Some(&"client.jar".to_string()),
        deployment.root().attachments().get(&APPLICATION_CLIENT_SELECTION)
    );
    pipeline.undeploy(deployment);
    assert!(leftovers.0.lock().unwrap().is_empty());
    assert_eq!(1, launcher.0.lock().unwrap().len());
}

#[test]
fn test_module_binding_rules() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("beans.jar");
    let repeated = format!(
        "{BEANS}
[[annotation]]
name = \"javax.annotation.Resource\"
target = \"org.acme.Counter\"
values = {{ name = \"env/ds\", lookup = \"java:jboss/datasources/Example\" }}
"
    );
    write(&root, "META-INF/annotation-index.toml", &repeated);
    let pipeline = pipeline(AppClientParams::default(), Arc::new(Recording::default()));
    let deployment = pipeline
        .deploy("beans.jar", attachments(ResourceRoot::new(&root)))
        .unwrap();
    assert_eq!(
        vec!["java:global/beans/Counter", "java:global/beans/greeter"],
        registry(&pipeline).names()
    );
    pipeline.undeploy(deployment);

    let conflicting = repeated.replace(
        "target = \"org.acme.Counter\"\nvalues = { name = \"env/ds\", lookup = \"java:jboss/datasources/Example\" }",
        "target = \"org.acme.Counter\"\nvalues = { name = \"env/ds\", lookup = \"java:jboss/datasources/Other\" }",
    );
    write(&root, "META-INF/annotation-index.toml", &conflicting);
    let failure = pipeline
        .deploy("beans.jar", attachments(ResourceRoot::new(&root)))
        .unwrap_err();
    assert_eq!(Phase::Parse, failure.phase);
    let message = failure.cause.message();
    assert!(message.contains("java:jboss/datasources/Example"), "{message}");
    assert!(message.contains("java:jboss/datasources/Other"), "{message}");
}

#[test]
fn test_duplicate_bean_name_fails() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("beans.jar");
    write(
        &root,
        "META-INF/annotation-index.toml",
        r#"
[[annotation]]
name = "ManagedBean"
target = "org.acme.Greeter"

[[annotation]]
name = "ManagedBean"
target = "org.acme.other.Greeter"
"#,
    );
    let pipeline = pipeline(AppClientParams::default(), Arc::new(Recording::default()));
    let failure = pipeline
        .deploy("beans.jar", attachments(ResourceRoot::new(&root)))
        .unwrap_err();
    assert_eq!(Some("ManagedBeanAnnotationProcessor"), failure.processor);
    let message = failure.cause.message();
    assert!(message.contains("org.acme.Greeter"), "{message}");
    assert!(message.contains("org.acme.other.Greeter"), "{message}");
}
