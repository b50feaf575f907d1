use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError,
    },
    time::{Duration, Instant},
};

use thiserror::Error;

use super::{ContainerInner, ServiceController, Substate};

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("wait for stability was interrupted")]
pub struct Interrupted;

/// Counts of monitored controllers per substate.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StabilityStatistics {
    pub up: usize,
    pub down: usize,
    pub waiting: usize,
    pub problem: usize,
    pub failed: usize,
    pub removed: usize,
    pub unstable: usize,
}

/// Waits until a set of controllers stops transitioning.
///
/// All monitored controllers must belong to the same container.
#[derive(Default)]
pub struct StabilityMonitor {
    controllers: Mutex<Vec<ServiceController>>,
    interrupted: AtomicBool,
}

impl StabilityMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_controller(&self, controller: &ServiceController) {
        let mut controllers = self.controllers();
        if !controllers.contains(controller) {
            controllers.push(controller.clone());
        }
    }

    pub fn remove_controller(&self, controller: &ServiceController) {
        self.controllers().retain(|c| c != controller);
    }

    /// Block until every monitored controller is in a stable substate.
    pub fn await_stability(&self) -> Result<(), Interrupted> {
        self.await_until(None).map(|_| ())
    }

    /// Like [`await_stability`](Self::await_stability); returns false on timeout.
    pub fn await_stability_timeout(&self, timeout: Duration) -> Result<bool, Interrupted> {
        self.await_until(Some(Instant::now() + timeout))
    }

    /// Wake every waiter with [`Interrupted`]. The flag stays set until cleared.
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::Release);
        if let Some(inner) = self.container() {
            // taking the lock orders the flag before a waiter's next check
            drop(inner.lock());
            inner.wake_all();
        }
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    pub fn clear_interrupt(&self) {
        self.interrupted.store(false, Ordering::Release);
    }

    pub fn statistics(&self) -> StabilityStatistics {
        let controllers = self.controllers().clone();
        let mut stats = StabilityStatistics::default();
        let Some(first) = controllers.first() else {
            return stats;
        };
        let reg = first.inner().lock();
        for controller in controllers.iter() {
            match reg.substate_of(controller.name(), controller.id()) {
                Substate::Up => stats.up += 1,
                Substate::Down => stats.down += 1,
                Substate::Waiting => stats.waiting += 1,
                Substate::Problem => stats.problem += 1,
                Substate::StartFailed => stats.failed += 1,
                Substate::Removed => stats.removed += 1,
                Substate::Starting | Substate::StopRequested | Substate::Stopping => {
                    stats.unstable += 1
                }
            }
        }
        stats
    }

    fn controllers(&self) -> std::sync::MutexGuard<'_, Vec<ServiceController>> {
        self.controllers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn container(&self) -> Option<Arc<ContainerInner>> {
        self.controllers().first().map(|c| c.inner().clone())
    }

    fn await_until(&self, deadline: Option<Instant>) -> Result<bool, Interrupted> {
        let controllers = self.controllers().clone();
        let Some(inner) = controllers.first().map(|c| c.inner().clone()) else {
            return if self.is_interrupted() {
                Err(Interrupted)
            } else {
                Ok(true)
            };
        };
        let mut reg = inner.lock();
        loop {
            if self.is_interrupted() {
                return Err(Interrupted);
            }
            let stable = controllers
                .iter()
                .all(|c| reg.substate_of(c.name(), c.id()).is_stable());
            if stable {
                return Ok(true);
            }
            reg = match deadline {
                None => inner.wait(reg),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    inner.wait_timeout(reg, deadline - now)
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{mpsc, Arc, Mutex},
        time::Duration,
    };

    use super::{Interrupted, StabilityMonitor};
    use crate::{
        container::{Service, ServiceContainer, ServiceTarget, StartContext, StartException},
        ServiceName,
    };

    /// Parks its start context until the test completes it.
    struct Parked(Arc<Mutex<Option<StartContext>>>);

    impl Service for Parked {
        type Value = ();

        fn start(&self, ctx: StartContext) -> Result<(), StartException> {
            ctx.asynchronous();
            *self.0.lock().unwrap() = Some(ctx);
            Ok(())
        }

        fn value(&self) -> Option<Arc<()>> {
            Some(Arc::new(()))
        }
    }

    #[test]
    fn test_timeout_interrupt_and_statistics() {
        let slot = Arc::new(Mutex::new(None));
        let container = ServiceContainer::new();
        let controller = container
            .add_service(ServiceName::of(["parked"]), Parked(slot.clone()))
            .install()
            .unwrap();
        let monitor = Arc::new(StabilityMonitor::new());
        monitor.add_controller(&controller);
        assert_eq!(1, monitor.statistics().unstable);
        assert_eq!(
            Ok(false),
            monitor.await_stability_timeout(Duration::from_millis(20))
        );

        let (tx, rx) = mpsc::channel();
        let waiter = monitor.clone();
        let handle = std::thread::spawn(move || {
            tx.send(()).unwrap();
            waiter.await_stability()
        });
        rx.recv().unwrap();
        monitor.interrupt();
        assert_eq!(Err(Interrupted), handle.join().unwrap());
        monitor.clear_interrupt();

        let ctx = slot.lock().unwrap().take().unwrap();
        ctx.complete();
        assert_eq!(Ok(()), monitor.await_stability());
        assert_eq!(1, monitor.statistics().up);
    }
}
