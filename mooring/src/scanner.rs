//! Deploys the exploded archives found in a directory and keeps them in sync
//! with it.
//!
//! Every scan fingerprints each archive directory, diffs the result against
//! what is deployed and applies the patches: new archives are deployed,
//! vanished ones undeployed, changed ones redeployed. A deployment that
//! failed stays recorded with its fingerprint, so it is only retried once its
//! content changes.
use std::{
    collections::{BTreeMap, BTreeSet},
    fs, io,
    path::{Path, PathBuf},
    time::UNIX_EPOCH,
};

use mooring_core::{
    attachment::Attachments,
    deployment::{Deployment, DeploymentPipeline},
    util::hash::Fingerprint,
};
use mooring_services::{
    archive::{ArchiveKind, ResourceRoot},
    keys::DEPLOYMENT_ROOT,
};
use tracing::{debug, error, info};

struct Scanned {
    root: ResourceRoot,
    fingerprint: String,
}

struct Deployed {
    fingerprint: String,
    // None when the last attempt failed
    deployment: Option<Deployment>,
}

enum Patch {
    Deploy { name: String },
    Redeploy { name: String },
    Undeploy { name: String },
}

/// What one scan changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub deployed: Vec<String>,
    pub undeployed: Vec<String>,
    pub failed: Vec<String>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.deployed.is_empty() && self.undeployed.is_empty() && self.failed.is_empty()
    }
}

pub struct DeploymentScanner {
    directory: PathBuf,
    pipeline: DeploymentPipeline,
    deployed: BTreeMap<String, Deployed>,
}

impl DeploymentScanner {
    pub fn new(directory: impl Into<PathBuf>, pipeline: DeploymentPipeline) -> Self {
        Self {
            directory: directory.into(),
            pipeline,
            deployed: BTreeMap::new(),
        }
    }

    pub fn pipeline(&self) -> &DeploymentPipeline {
        &self.pipeline
    }

    /// Names of the archives currently deployed, failed ones excluded.
    pub fn deployments(&self) -> Vec<&str> {
        self.deployed
            .iter()
            .filter(|(_, d)| d.deployment.is_some())
            .map(|(name, _)| name.as_str())
            .collect()
    }

    pub fn scan(&mut self) -> io::Result<ScanReport> {
        let mut scanned = self.read_directory()?;
        let patches = Self::diff(&self.deployed, &scanned);
        let mut report = ScanReport::default();
        for patch in patches {
            match patch {
                Patch::Deploy { name } => {
                    if let Some(archive) = scanned.remove(&name) {
                        self.deploy(name, archive, &mut report);
                    }
                }
                Patch::Redeploy { name } => {
                    info!("{name} changed, redeploying");
                    self.undeploy(&name, &mut report);
                    if let Some(archive) = scanned.remove(&name) {
                        self.deploy(name, archive, &mut report);
                    }
                }
                Patch::Undeploy { name } => self.undeploy(&name, &mut report),
            }
        }
        if !report.is_empty() {
            debug!(?report, "scan of {} applied", self.directory.display());
        }
        Ok(report)
    }

    /// Undeploy everything, last name first.
    pub fn undeploy_all(&mut self) -> ScanReport {
        let names: Vec<String> = self.deployed.keys().rev().cloned().collect();
        let mut report = ScanReport::default();
        for name in names {
            self.undeploy(&name, &mut report);
        }
        report
    }

    fn diff(
        deployed: &BTreeMap<String, Deployed>,
        scanned: &BTreeMap<String, Scanned>,
    ) -> Vec<Patch> {
        let names: BTreeSet<&String> = deployed.keys().chain(scanned.keys()).collect();
        let mut patches = Vec::new();
        for name in names {
            let patch = match (deployed.get(name), scanned.get(name)) {
                (Some(old), Some(new)) if old.fingerprint != new.fingerprint => Patch::Redeploy {
                    name: name.clone(),
                },
                (Some(_), Some(_)) | (None, None) => continue,
                (Some(_), None) => Patch::Undeploy { name: name.clone() },
                (None, Some(_)) => Patch::Deploy { name: name.clone() },
            };
            patches.push(patch);
        }
        patches
    }

    fn deploy(&mut self, name: String, archive: Scanned, report: &mut ScanReport) {
        let mut attachments = Attachments::new();
        attachments.put(&DEPLOYMENT_ROOT, archive.root);
        let deployment = match self.pipeline.deploy(&name, attachments) {
            Ok(deployment) => {
                report.deployed.push(name.clone());
                Some(deployment)
            }
            Err(failure) => {
                error!("{failure}, waiting for {name} to change");
                report.failed.push(name.clone());
                None
            }
        };
        self.deployed.insert(
            name,
            Deployed {
                fingerprint: archive.fingerprint,
                deployment,
            },
        );
    }

    fn undeploy(&mut self, name: &str, report: &mut ScanReport) {
        let Some(deployed) = self.deployed.remove(name) else {
            return;
        };
        if let Some(deployment) = deployed.deployment {
            self.pipeline.undeploy(deployment);
            report.undeployed.push(name.to_string());
        }
    }

    fn read_directory(&self) -> io::Result<BTreeMap<String, Scanned>> {
        let mut scanned = BTreeMap::new();
        for entry in fs::read_dir(&self.directory)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let root = ResourceRoot::new(entry.path());
            if root.kind() == ArchiveKind::Other {
                continue;
            }
            let mut fingerprint = Fingerprint::new();
            fingerprint_tree(root.path(), root.path(), &mut fingerprint)?;
            scanned.insert(
                root.name().to_string(),
                Scanned {
                    root,
                    fingerprint: fingerprint.finish(),
                },
            );
        }
        Ok(scanned)
    }
}

/// Feed relative path, size and modification time of every file below `dir`
/// into `fingerprint`, in path order.
fn fingerprint_tree(base: &Path, dir: &Path, fingerprint: &mut Fingerprint) -> io::Result<()> {
    let mut entries = fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.file_name());
    for entry in entries {
        let path = entry.path();
        let metadata = entry.metadata()?;
        if metadata.is_dir() {
            fingerprint_tree(base, &path, fingerprint)?;
            continue;
        }
        let relative = path.strip_prefix(base).unwrap_or(&path);
        let modified = metadata
            .modified()?
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        fingerprint
            .field(relative.to_string_lossy().as_bytes())
            .field(metadata.len().to_be_bytes())
            .field(modified.to_be_bytes());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, path::Path};

    use mooring_core::{
        container::{ServiceContainer, ServiceRegistry},
        deployment::{DeployerChains, DeploymentPipeline},
    };
    use mooring_services::{
        ee,
        naming::{install_naming_registry, naming_registry_name, NamingRegistry},
        structure,
    };
    use tempfile::TempDir;

    use super::{DeploymentScanner, ScanReport};

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn bean(class_name: &str) -> String {
        format!("[[annotation]]\nname = \"ManagedBean\"\ntarget = \"{class_name}\"\n")
    }

    fn scanner(dir: &TempDir) -> DeploymentScanner {
        let container = ServiceContainer::new();
        install_naming_registry(&container).unwrap();
        let mut builder = DeployerChains::builder();
        structure::register(&mut builder).unwrap();
        ee::register(&mut builder).unwrap();
        let pipeline = DeploymentPipeline::new(builder.build().unwrap(), container);
        DeploymentScanner::new(dir.path(), pipeline)
    }

    fn bound(scanner: &DeploymentScanner) -> Vec<String> {
        scanner
            .pipeline()
            .container()
            .get_required_service(&naming_registry_name())
            .unwrap()
            .value::<NamingRegistry>()
            .unwrap()
            .names()
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_deploy_change_and_remove() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.jar/META-INF/annotation-index.toml", &bean("org.acme.A"));
        write(dir.path(), "b.jar/META-INF/annotation-index.toml", &bean("org.acme.B"));
        write(dir.path(), "notes/readme.txt", "ignored");
        write(dir.path(), "c.jar", "a plain file is no exploded archive");
        let mut scanner = scanner(&dir);

        let report = scanner.scan().unwrap();
        assert_eq!(names(&["a.jar", "b.jar"]), report.deployed);
        assert_eq!(vec!["a.jar", "b.jar"], scanner.deployments());
        assert_eq!(names(&["java:global/a/A", "java:global/b/B"]), bound(&scanner));

        assert!(scanner.scan().unwrap().is_empty());

        write(
            dir.path(),
            "a.jar/META-INF/annotation-index.toml",
            &format!("{}\n{}", bean("org.acme.A"), bean("org.acme.A2")),
        );
        fs::remove_dir_all(dir.path().join("b.jar")).unwrap();
        let report = scanner.scan().unwrap();
        assert_eq!(
            ScanReport {
                deployed: names(&["a.jar"]),
                undeployed: names(&["a.jar", "b.jar"]),
                failed: Vec::new(),
            },
            report
        );
        assert_eq!(names(&["java:global/a/A", "java:global/a/A2"]), bound(&scanner));

        scanner.undeploy_all();
        assert!(bound(&scanner).is_empty());
        assert_eq!(
            vec![naming_registry_name()],
            scanner.pipeline().container().service_names()
        );
    }

    #[test]
    fn test_failed_archive_waits_for_change() {
        let dir = TempDir::new().unwrap();
        let broken = "[[annotation]]\nname = \"ManagedBean\"\n";
        write(dir.path(), "bad.jar/META-INF/annotation-index.toml", broken);
        let mut scanner = scanner(&dir);

        let report = scanner.scan().unwrap();
        assert_eq!(names(&["bad.jar"]), report.failed);
        assert!(scanner.deployments().is_empty());
        assert!(scanner.scan().unwrap().is_empty());

        write(dir.path(), "bad.jar/META-INF/annotation-index.toml", &bean("org.acme.Fixed"));
        let report = scanner.scan().unwrap();
        assert_eq!(names(&["bad.jar"]), report.deployed);
        assert!(report.undeployed.is_empty());
        assert_eq!(vec!["bad.jar"], scanner.deployments());
    }

    #[test]
    fn test_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let pipeline = scanner(&dir).pipeline().clone();
        let mut scanner = DeploymentScanner::new(dir.path().join("missing"), pipeline);
        assert!(scanner.scan().is_err());
    }
}
