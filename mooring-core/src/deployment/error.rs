use std::fmt;

use thiserror::Error;

use super::Phase;
use crate::AnyError;

/// A unit scoped, recoverable deployment failure. The message is shown to
/// whoever deployed the archive, so it names the offending resource.
#[derive(Error, Debug)]
#[error("{message}")]
pub struct DeploymentUnitProcessingError {
    message: String,
    #[source]
    cause: Option<AnyError>,
}

impl DeploymentUnitProcessingError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<AnyError>) -> Self {
        Self {
            message: message.into(),
            cause: Some(cause.into()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&AnyError> {
        self.cause.as_ref()
    }
}

/// The report of a failed, rolled back deployment.
#[derive(Debug)]
pub struct DeploymentFailure {
    pub unit: String,
    pub phase: Phase,
    pub processor: Option<&'static str>,
    pub cause: DeploymentUnitProcessingError,
}

impl fmt::Display for DeploymentFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "deployment of {} failed in phase {}", self.unit, self.phase)?;
        if let Some(processor) = self.processor {
            write!(f, " at {processor}")?;
        }
        write!(f, ": {}", self.cause)
    }
}

impl std::error::Error for DeploymentFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.cause)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("{added} and {existing} are both registered at {phase} priority {priority:#06x}")]
    DuplicatePriority {
        phase: Phase,
        priority: u32,
        existing: &'static str,
        added: &'static str,
    },
    #[error("{processor} at {phase} priority {priority:#06x} reads {input}, which no earlier processor writes")]
    UnsatisfiedInput {
        processor: &'static str,
        phase: Phase,
        priority: u32,
        input: String,
    },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectionError {
    #[error("no candidate named {0}")]
    NotFound(String),
    #[error("more than one candidate and none was requested: {}", .0.join(", "))]
    Ambiguous(Vec<String>),
    #[error("no candidate found")]
    Absent,
}
