//! Worker threads for service bodies that must not block the thread driving
//! a container transition.
//!
//! An [`Executor`] accepts boxed closures. [`WorkerPool`] is the production
//! executor: a fixed fleet of named threads, each running its own monoio
//! runtime and draining a bounded queue. A full queue rejects the task and
//! hands it back to the caller inside [`Rejected`].
use std::{fmt, sync::Arc};

mod runtime;
mod worker_pool;

pub use runtime::RuntimeWrapper;
pub use worker_pool::WorkerPool;

pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// A task the executor refused. The caller gets it back to run elsewhere.
pub struct Rejected(pub Task);

impl Rejected {
    pub fn into_task(self) -> Task {
        self.0
    }
}

impl fmt::Debug for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Rejected(..)")
    }
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("task rejected by executor")
    }
}

pub trait Executor: Send + Sync {
    fn execute(&self, task: Task) -> Result<(), Rejected>;
}

impl<E: Executor + ?Sized> Executor for Arc<E> {
    fn execute(&self, task: Task) -> Result<(), Rejected> {
        (**self).execute(task)
    }
}
