//! STRUCTURE phase processors: what an archive is made of.
use mooring_core::deployment::{priority, ChainError, DeployerChainsBuilder, Phase};

mod annotation_index;
mod ear;
mod manifest;

pub use annotation_index::{
    AnnotationIndex, AnnotationIndexCleanupProcessor, AnnotationIndexProcessor,
    AnnotationInstance, ANNOTATION_INDEX_PATH,
};
pub use ear::EarStructureProcessor;
pub use manifest::{Manifest, ManifestProcessor, MAIN_CLASS, MANIFEST_PATH};

use crate::keys::DEPLOYMENT_ROOT;

/// Register the structure processors. Top level units must carry a
/// [`DEPLOYMENT_ROOT`] in their initial attachments.
pub fn register(builder: &mut DeployerChainsBuilder) -> Result<(), ChainError> {
    builder
        .provide(&DEPLOYMENT_ROOT)
        .add(Phase::Structure, priority::STRUCTURE_MANIFEST, ManifestProcessor)?
        .add(Phase::Structure, priority::STRUCTURE_EAR, EarStructureProcessor)?
        .add(
            Phase::Structure,
            priority::STRUCTURE_ANNOTATION_INDEX,
            AnnotationIndexProcessor,
        )?
        .add(
            Phase::Cleanup,
            priority::CLEANUP_ANNOTATION_INDEX,
            AnnotationIndexCleanupProcessor,
        )?;
    Ok(())
}
