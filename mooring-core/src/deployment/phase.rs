use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered stages of the deployment pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    /// Discover the root structure and nested sub-deployments.
    Structure,
    /// Read descriptors and annotations into metadata attachments.
    Parse,
    Register,
    Dependencies,
    ConfigureModule,
    FirstModuleUse,
    PostModule,
    /// Install runtime services.
    Install,
    Cleanup,
}

impl Phase {
    pub const ALL: [Phase; 9] = [
        Phase::Structure,
        Phase::Parse,
        Phase::Register,
        Phase::Dependencies,
        Phase::ConfigureModule,
        Phase::FirstModuleUse,
        Phase::PostModule,
        Phase::Install,
        Phase::Cleanup,
    ];

    pub const fn next(self) -> Option<Phase> {
        match self {
            Phase::Structure => Some(Phase::Parse),
            Phase::Parse => Some(Phase::Register),
            Phase::Register => Some(Phase::Dependencies),
            Phase::Dependencies => Some(Phase::ConfigureModule),
            Phase::ConfigureModule => Some(Phase::FirstModuleUse),
            Phase::FirstModuleUse => Some(Phase::PostModule),
            Phase::PostModule => Some(Phase::Install),
            Phase::Install => Some(Phase::Cleanup),
            Phase::Cleanup => None,
        }
    }

    pub(crate) const fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Structure => "STRUCTURE",
            Phase::Parse => "PARSE",
            Phase::Register => "REGISTER",
            Phase::Dependencies => "DEPENDENCIES",
            Phase::ConfigureModule => "CONFIGURE_MODULE",
            Phase::FirstModuleUse => "FIRST_MODULE_USE",
            Phase::PostModule => "POST_MODULE",
            Phase::Install => "INSTALL",
            Phase::Cleanup => "CLEANUP",
        };
        f.write_str(s)
    }
}

/// Well-known priorities inside a phase. Lower runs first.
pub mod priority {
    // STRUCTURE
    pub const STRUCTURE_MANIFEST: u32 = 0x0300;
    pub const STRUCTURE_EAR: u32 = 0x0E00;
    pub const STRUCTURE_APP_CLIENT: u32 = 0x0F00;
    pub const STRUCTURE_ANNOTATION_INDEX: u32 = 0x1100;

    // PARSE
    pub const PARSE_EE_MODULE_NAME: u32 = 0x0100;
    pub const PARSE_MANAGED_BEAN_ANNOTATION: u32 = 0x2900;

    // POST_MODULE
    pub const POST_MODULE_APPLICATION_CLIENT_MANIFEST: u32 = 0x1F00;

    // INSTALL
    pub const INSTALL_EE_COMPONENT: u32 = 0x1230;
    pub const INSTALL_APPLICATION_CLIENT: u32 = 0x2010;

    // CLEANUP
    pub const CLEANUP_ANNOTATION_INDEX: u32 = 0x0400;
}
