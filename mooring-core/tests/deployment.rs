use std::sync::{Arc, Mutex};

use mooring_core::{
    attachment::{AttachmentKey, AttachmentList, Attachments},
    container::{ServiceContainer, ServiceRegistry, ServiceTarget, State, ValueService},
    deployment::{
        unit_service_name, AttachmentContract, DeployerChains, DeploymentPhaseContext,
        DeploymentPipeline, DeploymentStatus, DeploymentUnit, DeploymentUnitProcessingError,
        DeploymentUnitProcessor, Phase,
    },
};

type Log = Arc<Mutex<Vec<String>>>;

const CHILDREN: AttachmentKey<Vec<String>> = AttachmentKey::new("children");
const MARKS: AttachmentKey<AttachmentList<&'static str>> = AttachmentKey::new("marks");

/// Logs every call, optionally failing or panicking on one unit.
struct Step {
    tag: &'static str,
    log: Log,
    fail_on: Option<&'static str>,
    panic_on: Option<&'static str>,
    install: bool,
}

impl Step {
    fn new(tag: &'static str, log: &Log) -> Self {
        Self {
            tag,
            log: log.clone(),
            fail_on: None,
            panic_on: None,
            install: false,
        }
    }

    fn failing_on(mut self, unit: &'static str) -> Self {
        self.fail_on = Some(unit);
        self
    }

    fn panicking_on(mut self, unit: &'static str) -> Self {
        self.panic_on = Some(unit);
        self
    }

    fn installing(mut self) -> Self {
        self.install = true;
        self
    }
}

impl DeploymentUnitProcessor for Step {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let unit = ctx.unit().name().to_string();
        if self.panic_on == Some(unit.as_str()) {
            panic!("{} exploded", self.tag);
        }
        if self.fail_on == Some(unit.as_str()) {
            return Err(DeploymentUnitProcessingError::new(format!(
                "{} rejects {unit}",
                self.tag
            )));
        }
        if self.install {
            let name = ctx.unit().service_name().append([self.tag]);
            ctx.service_target()
                .add_service(name, ValueService::new(self.tag))
                .install()
                .map_err(|e| DeploymentUnitProcessingError::with_cause("install failed", e))?;
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("deploy {} {unit} {}", self.tag, ctx.phase()));
        Ok(())
    }

    fn undeploy(&self, unit: &mut DeploymentUnit) {
        self.log
            .lock()
            .unwrap()
            .push(format!("undeploy {} {}", self.tag, unit.name()));
    }
}

/// Adds the sub-deployments named in the `children` attachment.
struct Expand;

impl DeploymentUnitProcessor for Expand {
    fn deploy(
        &self,
        ctx: &mut DeploymentPhaseContext<'_>,
    ) -> Result<(), DeploymentUnitProcessingError> {
        let Some(children) = ctx.attachments_mut().remove(&CHILDREN) else {
            return Ok(());
        };
        for child in children {
            ctx.add_sub_deployment(child, Attachments::new())?;
        }
        Ok(())
    }
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

#[test]
fn test_units_run_in_preorder_lockstep() {
    let log = Log::default();
    let mut builder = DeployerChains::builder();
    builder
        .add(Phase::Structure, 0x10, Expand)
        .unwrap()
        .add(Phase::Structure, 0x20, Step::new("s", &log))
        .unwrap()
        .add(Phase::Parse, 0x10, Step::new("p", &log))
        .unwrap();
    let container = ServiceContainer::new();
    let pipeline = DeploymentPipeline::new(builder.build().unwrap(), container.clone());

    let mut attachments = Attachments::new();
    attachments.put(&CHILDREN, vec!["a.jar".to_string(), "b.war".to_string()]);
    let deployment = pipeline.deploy("app.ear", attachments).unwrap();

    assert_eq!(
        vec![
            "deploy s app.ear STRUCTURE",
            "deploy s a.jar STRUCTURE",
            "deploy s b.war STRUCTURE",
            "deploy p app.ear PARSE",
            "deploy p a.jar PARSE",
            "deploy p b.war PARSE",
        ],
        entries(&log)
    );
    let names: Vec<&str> = deployment.units().map(|u| u.name()).collect();
    assert_eq!(vec!["app.ear", "a.jar", "b.war"], names);
    assert!(deployment
        .units()
        .all(|u| u.status() == DeploymentStatus::Deployed));

    let root = container
        .get_required_service(&unit_service_name("app.ear"))
        .unwrap();
    assert_eq!(State::Up, root.state());
    let child = deployment.unit("a.jar").unwrap();
    assert_eq!(Some("app.ear"), child.parent_name());
    assert_eq!(
        vec![unit_service_name("app.ear")],
        container
            .get_required_service(child.service_name())
            .unwrap()
            .dependencies()
    );

    pipeline.undeploy(deployment);
    assert!(container.service_names().is_empty());
}

#[test]
fn test_late_child_catches_up() {
    struct LateExpand;

    impl DeploymentUnitProcessor for LateExpand {
        fn deploy(
            &self,
            ctx: &mut DeploymentPhaseContext<'_>,
        ) -> Result<(), DeploymentUnitProcessingError> {
            if ctx.unit().is_top_level() {
                ctx.add_sub_deployment("late.jar", Attachments::new())?;
                assert!(ctx
                    .add_sub_deployment("late.jar", Attachments::new())
                    .is_err());
            }
            Ok(())
        }
    }

    let log = Log::default();
    let mut builder = DeployerChains::builder();
    builder
        .add(Phase::Structure, 0x10, Step::new("s", &log))
        .unwrap()
        .add(Phase::Parse, 0x10, LateExpand)
        .unwrap()
        .add(Phase::Parse, 0x20, Step::new("p", &log))
        .unwrap()
        .add(Phase::Install, 0x10, Step::new("i", &log))
        .unwrap();
    let pipeline = DeploymentPipeline::new(builder.build().unwrap(), ServiceContainer::new());
    pipeline.deploy("root.ear", Attachments::new()).unwrap();

    assert_eq!(
        vec![
            "deploy s root.ear STRUCTURE",
            "deploy p root.ear PARSE",
            "deploy s late.jar STRUCTURE",
            "deploy p late.jar PARSE",
            "deploy i root.ear INSTALL",
            "deploy i late.jar INSTALL",
        ],
        entries(&log)
    );
}

#[test]
fn test_failure_rolls_back_in_reverse() {
    let log = Log::default();
    let mut builder = DeployerChains::builder();
    builder
        .add(Phase::Structure, 0x10, Expand)
        .unwrap()
        .add(Phase::Structure, 0x20, Step::new("s", &log).installing())
        .unwrap()
        .add(Phase::Install, 0x10, Step::new("p1", &log).installing())
        .unwrap()
        .add(Phase::Install, 0x20, Step::new("p2", &log))
        .unwrap()
        .add(Phase::Install, 0x30, Step::new("p3", &log).failing_on("bad.jar"))
        .unwrap()
        .add(Phase::Install, 0x40, Step::new("p4", &log))
        .unwrap();
    let container = ServiceContainer::new();
    let pipeline = DeploymentPipeline::new(builder.build().unwrap(), container.clone());

    let mut attachments = Attachments::new();
    attachments.put(&CHILDREN, vec!["bad.jar".to_string()]);
    let failure = pipeline.deploy("app.ear", attachments).unwrap_err();
    assert_eq!("bad.jar", failure.unit);
    assert_eq!(Phase::Install, failure.phase);
    assert_eq!(Some("Step"), failure.processor);
    assert_eq!("p3 rejects bad.jar", failure.cause.message());

    let log = entries(&log);
    let deployed: Vec<&String> = log.iter().filter(|e| e.starts_with("deploy")).collect();
    let undeployed: Vec<&String> = log.iter().filter(|e| e.starts_with("undeploy")).collect();
    assert_eq!(
        vec![
            "undeploy p2 bad.jar",
            "undeploy p1 bad.jar",
            "undeploy p4 app.ear",
            "undeploy p3 app.ear",
            "undeploy p2 app.ear",
            "undeploy p1 app.ear",
            "undeploy s bad.jar",
            "undeploy s app.ear",
        ],
        undeployed
    );
    // every successful deploy is undone exactly once
    assert_eq!(deployed.len(), undeployed.len());
    assert!(!log.iter().any(|e| e.contains("p4 bad.jar")));
    assert!(container.service_names().is_empty());
}

#[test]
fn test_panicking_processor_fails_deployment() {
    let log = Log::default();
    let mut builder = DeployerChains::builder();
    builder
        .add(Phase::Parse, 0x10, Step::new("ok", &log))
        .unwrap()
        .add(Phase::Parse, 0x20, Step::new("boom", &log).panicking_on("x.war"))
        .unwrap();
    let container = ServiceContainer::new();
    let pipeline = DeploymentPipeline::new(builder.build().unwrap(), container.clone());
    let failure = pipeline.deploy("x.war", Attachments::new()).unwrap_err();
    assert_eq!(Phase::Parse, failure.phase);
    assert!(failure.cause.message().contains("boom exploded"));
    assert_eq!(
        vec!["deploy ok x.war PARSE", "undeploy ok x.war"],
        entries(&log)
    );
    assert!(container.service_names().is_empty());

    // the unit service name is free again once rolled back
    let again = pipeline.deploy("x.war", Attachments::new()).unwrap_err();
    assert_eq!(Some("Step"), again.processor);
    assert!(container.service_names().is_empty());
}

#[test]
fn test_undeclared_write_is_rejected() {
    struct Sneaky;

    impl DeploymentUnitProcessor for Sneaky {
        fn deploy(
            &self,
            ctx: &mut DeploymentPhaseContext<'_>,
        ) -> Result<(), DeploymentUnitProcessingError> {
            ctx.attachments_mut().add_to_list(&MARKS, "declared");
            ctx.attachments_mut().put(&CHILDREN, vec!["x".to_string()]);
            Ok(())
        }

        fn contract(&self) -> Option<AttachmentContract> {
            Some(AttachmentContract::new().writes(&MARKS))
        }
    }

    let mut builder = DeployerChains::builder();
    builder.add(Phase::Structure, 0x10, Sneaky).unwrap();
    let pipeline = DeploymentPipeline::new(builder.build().unwrap(), ServiceContainer::new());
    let failure = pipeline.deploy("s.jar", Attachments::new()).unwrap_err();
    assert_eq!(Some("Sneaky"), failure.processor);
    assert!(failure.cause.message().contains("children"));
}

#[test]
fn test_lenient_contract_allows_writes() {
    struct Marker;

    impl DeploymentUnitProcessor for Marker {
        fn deploy(
            &self,
            ctx: &mut DeploymentPhaseContext<'_>,
        ) -> Result<(), DeploymentUnitProcessingError> {
            ctx.attachments_mut().add_to_list(&MARKS, "one");
            ctx.attachments_mut().add_to_list(&MARKS, "two");
            ctx.attachments_mut().put(&CHILDREN, Vec::new());
            Ok(())
        }

        fn contract(&self) -> Option<AttachmentContract> {
            Some(AttachmentContract::new().writes(&MARKS).lenient())
        }
    }

    let mut builder = DeployerChains::builder();
    builder.add(Phase::Structure, 0x10, Marker).unwrap();
    let pipeline = DeploymentPipeline::new(builder.build().unwrap(), ServiceContainer::new());
    let deployment = pipeline.deploy("m.jar", Attachments::new()).unwrap();
    assert_eq!(
        &["one", "two"],
        deployment.root().attachments().list(&MARKS)
    );
    assert!(deployment.root().attachments().contains(&CHILDREN));
}
