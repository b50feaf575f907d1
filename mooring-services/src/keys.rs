//! Attachment keys shared by the processors of this crate.
use mooring_core::attachment::AttachmentKey;

use crate::{
    archive::ResourceRoot, ee::EeModuleDescription, structure::AnnotationIndex,
    structure::Manifest,
};

/// What kind of deployment a unit turned out to be.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeploymentType {
    Ear,
    ApplicationClient,
}

/// The exploded archive a unit was created from. Supplied by whoever starts
/// the deployment for top level units, by the EAR structure for nested ones.
pub const DEPLOYMENT_ROOT: AttachmentKey<ResourceRoot> = AttachmentKey::new("deployment-root");
pub const MANIFEST: AttachmentKey<Manifest> = AttachmentKey::new("manifest");
pub const DEPLOYMENT_TYPE: AttachmentKey<DeploymentType> = AttachmentKey::new("deployment-type");
pub const ANNOTATION_INDEX: AttachmentKey<AnnotationIndex> = AttachmentKey::new("annotation-index");
pub const EE_MODULE_DESCRIPTION: AttachmentKey<EeModuleDescription> =
    AttachmentKey::new("ee-module-description");
pub const APPLICATION_CLIENT_MAIN_CLASS: AttachmentKey<String> =
    AttachmentKey::new("application-client-main-class");
/// Name of the sub-deployment an EAR picked as its application client.
pub const APPLICATION_CLIENT_SELECTION: AttachmentKey<String> =
    AttachmentKey::new("application-client-selection");
