use thiserror::Error;

use super::{State, StartException};
use crate::ServiceName;

#[derive(Error, Debug, Clone)]
pub enum ContainerError {
    #[error("service {0} is already registered")]
    DuplicateService(ServiceName),
    #[error("service {0} not found")]
    ServiceNotFound(ServiceName),
    #[error("installing {service} would create a dependency cycle: {}", render_cycle(.cycle))]
    CircularDependency {
        service: ServiceName,
        cycle: Vec<ServiceName>,
    },
    #[error("illegal state for service {service}: {reason}")]
    IllegalState {
        service: ServiceName,
        reason: &'static str,
    },
    #[error("service container is shut down")]
    ShutDown,
    #[error("value is not of the requested type {0}")]
    WrongValueType(&'static str),
    #[error("no value of type {0} is available")]
    NoValue(&'static str),
}

fn render_cycle(cycle: &[ServiceName]) -> String {
    cycle
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Failure of a synchronous state-forcing transition.
#[derive(Error, Debug, Clone)]
pub enum TransitionError {
    #[error(transparent)]
    Start(#[from] StartException),
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("service {service} settled in {actual} instead of {target}")]
    NotReached {
        service: ServiceName,
        target: State,
        actual: State,
    },
    #[error("service {0} is being removed and cannot be brought {1}")]
    ModeRemoved(ServiceName, State),
}
