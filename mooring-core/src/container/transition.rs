//! Synchronous state forcing on top of the asynchronous controller API.
//!
//! Forcing a controller maps the target state and the current mode to a new
//! mode, applies it atomically with `compare_and_set_mode`, then waits for the
//! controller to settle:
//!
//! | target  | current mode | new mode  |
//! |---------|--------------|-----------|
//! | UP      | NEVER        | ACTIVE    |
//! | UP      | ON_DEMAND    | PASSIVE   |
//! | DOWN    | ACTIVE       | NEVER     |
//! | DOWN    | PASSIVE      | ON_DEMAND |
//! | REMOVED | anything else| REMOVE    |
//!
//! Other pairs leave the mode alone and only wait. If the controller then
//! settles somewhere else than the target, the call fails with
//! [`TransitionError::NotReached`].
use std::{any::type_name, sync::Arc};

use super::{
    ContainerError, Mode, ServiceController, StabilityMonitor, State, TransitionError,
};

/// Force `controller` into `target` and wait for it to settle.
pub fn transition(controller: &ServiceController, target: State) -> Result<(), TransitionError> {
    transition_with(&StabilityMonitor::new(), controller, target)
}

/// Like [`transition`], waiting through a caller supplied monitor so the wait
/// can be interrupted. An interrupted wait returns `Ok(())` and leaves the
/// monitor's interrupt flag set.
pub fn transition_with(
    monitor: &StabilityMonitor,
    controller: &ServiceController,
    target: State,
) -> Result<(), TransitionError> {
    if controller.state() == target {
        return Ok(());
    }
    let mode = controller.mode();
    if mode == Mode::Remove && target != State::Removed {
        return Err(TransitionError::ModeRemoved(controller.name().clone(), target));
    }

    monitor.add_controller(controller);
    let result = force(monitor, controller, target, mode);
    monitor.remove_controller(controller);
    result
}

fn force(
    monitor: &StabilityMonitor,
    controller: &ServiceController,
    target: State,
    mode: Mode,
) -> Result<(), TransitionError> {
    if let Some(new_mode) = target_mode(target, mode) {
        controller.compare_and_set_mode(mode, new_mode)?;
    }
    if monitor.await_stability().is_err() {
        return Ok(());
    }
    if target == State::Up {
        if let Some(e) = controller.start_exception() {
            return Err(e.into());
        }
    }
    let actual = controller.state();
    if actual != target {
        return Err(TransitionError::NotReached {
            service: controller.name().clone(),
            target,
            actual,
        });
    }
    Ok(())
}

fn target_mode(target: State, current: Mode) -> Option<Mode> {
    match (target, current) {
        (State::Up, Mode::Never) => Some(Mode::Active),
        (State::Up, Mode::OnDemand) => Some(Mode::Passive),
        (State::Down, Mode::Active) => Some(Mode::Never),
        (State::Down, Mode::Passive) => Some(Mode::OnDemand),
        (State::Removed, mode) if mode != Mode::Remove => Some(Mode::Remove),
        _ => None,
    }
}

pub fn start(controller: &ServiceController) -> Result<(), TransitionError> {
    transition(controller, State::Up)
}

pub fn stop(controller: &ServiceController) -> Result<(), TransitionError> {
    transition(controller, State::Down)
}

pub fn remove(controller: &ServiceController) -> Result<(), TransitionError> {
    transition(controller, State::Removed)
}

/// Bring the controller up and return its value.
pub fn get_value<T: Send + Sync + 'static>(
    controller: &ServiceController,
) -> Result<Arc<T>, TransitionError> {
    start(controller)?;
    controller
        .value::<T>()
        .ok_or(ContainerError::NoValue(type_name::<T>()).into())
}
