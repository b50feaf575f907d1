use std::fmt;

use serde::{Deserialize, Serialize};

/// The desired activation policy of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Mode {
    /// Start as soon as possible and demand every dependency.
    Active,
    /// Start only while some dependent demands it.
    OnDemand,
    /// Start opportunistically once all dependencies are up, without demanding them.
    Passive,
    /// Do not start; stop if running.
    Never,
    /// Stop if running, then discard the registration.
    Remove,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Mode::Active => "ACTIVE",
            Mode::OnDemand => "ON_DEMAND",
            Mode::Passive => "PASSIVE",
            Mode::Never => "NEVER",
            Mode::Remove => "REMOVE",
        };
        f.write_str(s)
    }
}

/// Coarse lifecycle state of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum State {
    Down,
    Starting,
    StartFailed,
    Up,
    Stopping,
    Removed,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Down => "DOWN",
            State::Starting => "STARTING",
            State::StartFailed => "START_FAILED",
            State::Up => "UP",
            State::Stopping => "STOPPING",
            State::Removed => "REMOVED",
        };
        f.write_str(s)
    }
}

/// Fine grained controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Substate {
    Down,
    /// Wants to start; some dependency is installed but not up yet.
    Waiting,
    /// Wants to start; a required dependency is missing or failed.
    Problem,
    Starting,
    StartFailed,
    Up,
    /// Must stop as soon as every dependent is down.
    StopRequested,
    Stopping,
    Removed,
}

impl Substate {
    pub const fn state(self) -> State {
        match self {
            Substate::Down | Substate::Waiting | Substate::Problem => State::Down,
            Substate::Starting => State::Starting,
            Substate::StartFailed => State::StartFailed,
            Substate::Up | Substate::StopRequested => State::Up,
            Substate::Stopping => State::Stopping,
            Substate::Removed => State::Removed,
        }
    }

    /// A stable substate has no transition pending.
    pub const fn is_stable(self) -> bool {
        !matches!(
            self,
            Substate::Starting | Substate::StopRequested | Substate::Stopping
        )
    }

    /// True while the service body is running or about to be stopped.
    pub(crate) const fn is_active(self) -> bool {
        matches!(
            self,
            Substate::Starting | Substate::Up | Substate::StopRequested | Substate::Stopping
        )
    }
}

impl fmt::Display for Substate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::{State, Substate};

    #[test]
    fn test_substate_stability() {
        assert!(Substate::Up.is_stable());
        assert!(Substate::Problem.is_stable());
        assert!(!Substate::StopRequested.is_stable());
        assert_eq!(State::Up, Substate::StopRequested.state());
        assert_eq!(State::Down, Substate::Waiting.state());
    }
}
