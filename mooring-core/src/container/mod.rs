//! The service container.
//!
//! A [`ServiceContainer`] owns a registry of named services. Each service has
//! a [`ServiceController`] tracking its [`Mode`] and [`Substate`]; the
//! container starts a service only once all of its required dependencies are
//! up, and stops dependents before the services they depend on.
use std::{
    collections::VecDeque,
    panic::AssertUnwindSafe,
    sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError},
    time::{Duration, Instant},
};

use tracing::{error, info, warn};

mod builder;
mod controller;
mod error;
mod inject;
mod listener;
mod mode;
mod registry;
mod service;
mod stability;
pub mod transition;

pub use builder::{ServiceBuilder, ServiceRegistry, ServiceTarget, TrackingServiceTarget};
pub use controller::ServiceController;
pub use error::{ContainerError, TransitionError};
pub use inject::InjectedValue;
pub use listener::{LifecycleEvent, ServiceListener};
pub use mode::{Mode, State, Substate};
pub use service::{Service, StartContext, StartException, StopContext, ValueService};
pub use stability::{Interrupted, StabilityMonitor, StabilityStatistics};

pub(crate) use self::service::panic_message;
use self::{
    registry::{Dependency, Effects, Entry, Registry, Task},
    service::{ErasedService, ErasedValue},
};
use crate::ServiceName;

/// Registry of services and their controllers. Cheap to clone.
#[derive(Clone, Default)]
pub struct ServiceContainer {
    pub(crate) inner: Arc<ContainerInner>,
}

#[derive(Default)]
pub(crate) struct ContainerInner {
    registry: Mutex<Registry>,
    changed: Condvar,
}

impl ServiceContainer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener for every controller, present and future.
    pub fn add_listener(&self, listener: impl ServiceListener + 'static) {
        self.inner.lock().listeners.push(Arc::new(listener));
    }

    /// Set every service to [`Mode::Remove`] and reject further installs.
    pub fn shutdown(&self) {
        self.inner.apply(|reg, fx| {
            if reg.shutdown {
                return;
            }
            reg.shutdown = true;
            info!(services = reg.entries.len(), "service container shutting down");
            let names: Vec<ServiceName> = reg.entries.keys().cloned().collect();
            for name in names {
                reg.set_mode(&name, Mode::Remove, fx);
            }
        });
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.lock().shutdown
    }

    /// Wait until every registration is gone. Returns false on timeout.
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut reg = self.inner.lock();
        while !reg.entries.is_empty() {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            reg = self
                .inner
                .changed
                .wait_timeout(reg, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
        true
    }
}

impl ContainerInner {
    pub(crate) fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait<'a>(&self, guard: MutexGuard<'a, Registry>) -> MutexGuard<'a, Registry> {
        self.changed
            .wait(guard)
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn wait_timeout<'a>(
        &self,
        guard: MutexGuard<'a, Registry>,
        timeout: Duration,
    ) -> MutexGuard<'a, Registry> {
        self.changed
            .wait_timeout(guard, timeout)
            .unwrap_or_else(PoisonError::into_inner)
            .0
    }

    pub(crate) fn wake_all(&self) {
        self.changed.notify_all();
    }

    /// Mutate the registry under the lock, then deliver notifications and run
    /// service bodies on the calling thread.
    pub(crate) fn apply<R>(
        self: &Arc<Self>,
        f: impl FnOnce(&mut Registry, &mut Effects) -> R,
    ) -> R {
        let (out, fx) = self.decide(f);
        self.dispatch(fx);
        out
    }

    fn decide<R>(&self, f: impl FnOnce(&mut Registry, &mut Effects) -> R) -> (R, Effects) {
        let mut fx = Effects::default();
        let out = {
            let mut reg = self.lock();
            f(&mut reg, &mut fx)
        };
        self.changed.notify_all();
        (out, fx)
    }

    fn dispatch(self: &Arc<Self>, fx: Effects) {
        let mut pending = VecDeque::from([fx]);
        while let Some(fx) = pending.pop_front() {
            for notification in fx.notifications {
                notification.deliver();
            }
            for task in fx.tasks {
                if let Some(next) = self.run_task(task) {
                    pending.push_back(next);
                }
            }
        }
    }

    /// Run one service body. Returns the follow-up effects when the body
    /// finished synchronously.
    fn run_task(self: &Arc<Self>, task: Task) -> Option<Effects> {
        match task {
            Task::Start {
                name,
                ticket,
                service,
                injections,
            } => {
                for (injector, value) in injections {
                    if let Err(e) = injector.inject(value) {
                        let cause = StartException::with_cause("dependency injection failed", e);
                        let (_, fx) =
                            self.decide(|reg, fx| reg.finish_start(&name, ticket, Err(cause), fx));
                        return Some(fx);
                    }
                }
                let ctx = self.start_context(&name, ticket, &service);
                let outcome =
                    match std::panic::catch_unwind(AssertUnwindSafe(|| service.start(ctx.clone())))
                    {
                        Ok(Ok(())) if ctx.is_asynchronous() || ctx.is_signaled() => return None,
                        Ok(Ok(())) => Ok(service.value()),
                        Ok(Err(e)) => Err(e),
                        Err(panic) => Err(StartException::from_panic(panic)),
                    };
                let (accepted, fx) =
                    self.decide(|reg, fx| reg.finish_start(&name, ticket, outcome, fx));
                if !accepted {
                    warn!(service = %name, "start outcome arrived after the start was already signaled");
                }
                Some(fx)
            }
            Task::Stop {
                name,
                ticket,
                service,
            } => {
                let ctx = self.stop_context(&name, ticket);
                match std::panic::catch_unwind(AssertUnwindSafe(|| service.stop(ctx.clone()))) {
                    Ok(()) if ctx.is_asynchronous() || ctx.is_signaled() => return None,
                    Ok(()) => {}
                    Err(panic) => {
                        error!(
                            service = %name,
                            "service panicked while stopping: {}",
                            panic_message(&*panic)
                        );
                        if ctx.is_signaled() {
                            return None;
                        }
                    }
                }
                let (_, fx) = self.decide(|reg, fx| reg.finish_stop(&name, ticket, fx));
                Some(fx)
            }
        }
    }

    fn start_context(
        self: &Arc<Self>,
        name: &ServiceName,
        ticket: u64,
        service: &Arc<dyn ErasedService>,
    ) -> StartContext {
        let weak = Arc::downgrade(self);
        let signaled_name = name.clone();
        let service = service.clone();
        StartContext::new(name.clone(), move |outcome| {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let outcome: Result<Option<ErasedValue>, StartException> =
                outcome.map(|()| service.value());
            let accepted = inner
                .apply(|reg, fx| reg.finish_start(&signaled_name, ticket, outcome, fx));
            if !accepted {
                warn!(service = %signaled_name, "ignoring late or duplicate start signal");
            }
        })
    }

    fn stop_context(self: &Arc<Self>, name: &ServiceName, ticket: u64) -> StopContext {
        let weak = Arc::downgrade(self);
        let signaled_name = name.clone();
        StopContext::new(name.clone(), move || {
            let Some(inner) = weak.upgrade() else {
                return;
            };
            let accepted = inner.apply(|reg, fx| reg.finish_stop(&signaled_name, ticket, fx));
            if !accepted {
                warn!(service = %signaled_name, "ignoring late or duplicate stop signal");
            }
        })
    }

    pub(crate) fn install(
        self: &Arc<Self>,
        name: ServiceName,
        service: Arc<dyn ErasedService>,
        mode: Mode,
        dependencies: Vec<Dependency>,
        listeners: Vec<Arc<dyn ServiceListener>>,
    ) -> Result<ServiceController, ContainerError> {
        if mode == Mode::Remove {
            return Err(ContainerError::IllegalState {
                service: name,
                reason: "cannot install a service in REMOVE mode",
            });
        }
        let mut fx = Effects::default();
        let id = {
            let mut reg = self.lock();
            loop {
                if reg.shutdown {
                    return Err(ContainerError::ShutDown);
                }
                match reg.entries.get(&name) {
                    None => break,
                    // the previous registration is on its way out
                    Some(entry) if entry.mode == Mode::Remove => reg = self.wait(reg),
                    Some(_) => return Err(ContainerError::DuplicateService(name)),
                }
            }
            let names: Vec<ServiceName> = dependencies.iter().map(|d| d.name.clone()).collect();
            if let Some(cycle) = reg.find_cycle(&name, &names) {
                return Err(ContainerError::CircularDependency {
                    service: name,
                    cycle,
                });
            }
            let id = reg.next_id();
            let entry = Entry::new(id, service, mode, dependencies, listeners);
            reg.insert(name.clone(), entry, &mut fx);
            id
        };
        self.changed.notify_all();
        self.dispatch(fx);
        Ok(ServiceController::new(self.clone(), name, id))
    }
}
