use std::{num::NonZeroUsize, time::Duration};

use serde::{Deserialize, Serialize};

// Default iouring/epoll entries: 32k
const DEFAULT_ENTRIES: u32 = 32768;
// Pending tasks per worker before submissions are rejected
const DEFAULT_QUEUE_CAPACITY: usize = 128;
const DEFAULT_SHUTDOWN_TIMEOUT_SEC: u64 = 30;

pub const MIN_SQPOLL_IDLE_TIME: u32 = 1000; // 1s idle time.
pub const FALLBACK_PARALLELISM: NonZeroUsize = NonZeroUsize::MIN;

#[macro_export]
macro_rules! define_const {
    ($name: ident, $val: expr, $type: ty) => {
        const fn $name() -> $type {
            $val
        }
    };
}

/// Runtime of the worker threads that run asynchronous service bodies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    #[serde(default = "default_workers")]
    pub worker_threads: usize,
    #[serde(default = "default_entries")]
    pub entries: u32,
    pub sqpoll_idle: Option<u32>,
    #[serde(default)]
    pub runtime_type: RuntimeType,
    #[serde(default = "default_cpu_affinity")]
    pub cpu_affinity: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_threads: default_workers(),
            entries: default_entries(),
            sqpoll_idle: None,
            runtime_type: Default::default(),
            cpu_affinity: default_cpu_affinity(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .unwrap_or(FALLBACK_PARALLELISM)
        .into()
}

define_const!(default_entries, DEFAULT_ENTRIES, u32);
define_const!(default_cpu_affinity, true, bool);
define_const!(default_queue_capacity, DEFAULT_QUEUE_CAPACITY, usize);

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuntimeType {
    #[cfg(target_os = "linux")]
    IoUring,
    Legacy,
}

impl Default for RuntimeType {
    #[cfg(target_os = "linux")]
    fn default() -> Self {
        Self::IoUring
    }
    #[cfg(not(target_os = "linux"))]
    fn default() -> Self {
        Self::Legacy
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    #[serde(default = "default_shutdown_timeout_sec")]
    pub shutdown_timeout_sec: u64,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            shutdown_timeout_sec: default_shutdown_timeout_sec(),
        }
    }
}

define_const!(
    default_shutdown_timeout_sec,
    DEFAULT_SHUTDOWN_TIMEOUT_SEC,
    u64
);

impl ContainerConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::{ContainerConfig, RuntimeConfig, RuntimeType};

    #[test]
    fn test_defaults_fill_missing_fields() {
        let runtime: RuntimeConfig = serde_json::from_str(r#"{"worker_threads": 2}"#).unwrap();
        assert_eq!(2, runtime.worker_threads);
        assert_eq!(32768, runtime.entries);
        assert_eq!(128, runtime.queue_capacity);
        assert!(runtime.cpu_affinity);
        assert!(runtime.sqpoll_idle.is_none());
        assert_eq!(RuntimeType::default(), runtime.runtime_type);

        let container: ContainerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(30, container.shutdown_timeout().as_secs());
    }

    #[test]
    fn test_runtime_type_is_snake_case() {
        let runtime: RuntimeConfig =
            serde_json::from_str(r#"{"runtime_type": "legacy", "queue_capacity": 4}"#).unwrap();
        assert_eq!(RuntimeType::Legacy, runtime.runtime_type);
        assert_eq!(4, runtime.queue_capacity);
    }
}
