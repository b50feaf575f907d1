use std::{panic::AssertUnwindSafe, sync::Arc};

use tracing::error;

use super::{Mode, Substate};
use crate::ServiceName;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    ModeChanged {
        service: ServiceName,
        from: Mode,
        to: Mode,
    },
    Transition {
        service: ServiceName,
        from: Substate,
        to: Substate,
    },
}

impl LifecycleEvent {
    pub fn service(&self) -> &ServiceName {
        match self {
            LifecycleEvent::ModeChanged { service, .. }
            | LifecycleEvent::Transition { service, .. } => service,
        }
    }
}

/// Observer of controller changes. Invoked outside the container lock, in the
/// order the changes were decided.
pub trait ServiceListener: Send + Sync {
    fn handle(&self, event: &LifecycleEvent);
}

impl<F> ServiceListener for F
where
    F: Fn(&LifecycleEvent) + Send + Sync,
{
    fn handle(&self, event: &LifecycleEvent) {
        self(event)
    }
}

pub(crate) struct Notification {
    pub(crate) listeners: Vec<Arc<dyn ServiceListener>>,
    pub(crate) event: LifecycleEvent,
}

impl Notification {
    pub(crate) fn deliver(self) {
        for listener in self.listeners.iter() {
            let delivered =
                std::panic::catch_unwind(AssertUnwindSafe(|| listener.handle(&self.event)));
            if delivered.is_err() {
                error!("service listener panicked on {:?}", self.event);
            }
        }
    }
}
