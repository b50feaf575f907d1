use std::{
    io,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Mutex, MutexGuard,
    },
    thread::JoinHandle,
};

use futures_channel::mpsc::{channel, Receiver, Sender};
use futures_util::StreamExt;
use monoio::utils::bind_to_cpu_set;
use tracing::{debug, error, warn};

use super::{Executor, Rejected, RuntimeWrapper, Task};
use crate::{config::RuntimeConfig, container::panic_message};

/// A fixed fleet of worker threads, each bound to its own bounded queue.
///
/// Tasks are handed out round robin. When the chosen queue is full the next
/// worker is tried; when every queue is full or closed the task is rejected.
/// A panicking task is logged and the worker keeps draining.
pub struct WorkerPool {
    workers: Mutex<Vec<Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    next: AtomicUsize,
}

impl WorkerPool {
    /// Spawn `worker_threads` workers. Fails if a thread or its runtime
    /// cannot be created; workers already spawned are shut down.
    pub fn spawn(config: &RuntimeConfig) -> io::Result<Self> {
        let pool = Self {
            workers: Mutex::new(Vec::with_capacity(config.worker_threads)),
            handles: Mutex::new(Vec::with_capacity(config.worker_threads)),
            next: AtomicUsize::new(0),
        };
        let cores = if config.cpu_affinity {
            std::thread::available_parallelism().ok()
        } else {
            None
        };

        for worker_id in 0..config.worker_threads.max(1) {
            let (tx, rx) = channel(config.queue_capacity.max(1));
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);
            let runtime_config = config.clone();
            let handle = std::thread::Builder::new()
                .name(format!("mooring-worker-{worker_id}"))
                .spawn(move || {
                    // bind thread to cpu core
                    if let Some(cores) = cores {
                        let core = worker_id % cores;
                        if let Err(e) = bind_to_cpu_set([core]) {
                            warn!("bind thread {worker_id} to core {core} failed: {e}");
                        }
                    }
                    let mut runtime = match RuntimeWrapper::try_from(&runtime_config) {
                        Ok(runtime) => {
                            let _ = ready_tx.send(Ok(()));
                            runtime
                        }
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    runtime.block_on(drain(worker_id, rx));
                });
            let started = match handle {
                Ok(handle) => {
                    pool.lock_handles().push(handle);
                    ready_rx.recv().unwrap_or_else(|_| {
                        Err(io::Error::other(format!(
                            "worker {worker_id} exited during startup"
                        )))
                    })
                }
                Err(e) => Err(e),
            };
            if let Err(e) = started {
                error!("start worker thread {worker_id} failed: {e}");
                pool.shutdown();
                return Err(e);
            }
            pool.lock_workers().push(tx);
        }
        debug!(workers = pool.lock_workers().len(), "worker pool started");
        Ok(pool)
    }

    pub fn workers(&self) -> usize {
        self.lock_workers().len()
    }

    /// Close every queue and wait for the workers to drain what was queued.
    /// Later submissions are rejected. Calling it from a worker skips the
    /// join of that worker.
    pub fn shutdown(&self) {
        for sender in self.lock_workers().iter_mut() {
            sender.close_channel();
        }
        let handles = std::mem::take(&mut *self.lock_handles());
        let current = std::thread::current().id();
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                error!("worker thread exited by panic");
            }
        }
    }

    fn lock_workers(&self) -> MutexGuard<'_, Vec<Sender<Task>>> {
        self.workers.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.handles.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Executor for WorkerPool {
    fn execute(&self, task: Task) -> Result<(), Rejected> {
        let mut workers = self.lock_workers();
        let count = workers.len();
        let start = self.next.fetch_add(1, Ordering::Relaxed);
        let mut task = task;
        for offset in 0..count {
            match workers[(start + offset) % count].try_send(task) {
                Ok(()) => return Ok(()),
                Err(e) => task = e.into_inner(),
            }
        }
        Err(Rejected(task))
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

async fn drain(worker_id: usize, mut rx: Receiver<Task>) {
    while let Some(task) = rx.next().await {
        if let Err(panic) = std::panic::catch_unwind(AssertUnwindSafe(task)) {
            error!(
                "task on worker {worker_id} panicked: {}",
                panic_message(&*panic)
            );
        }
    }
    debug!("worker {worker_id} drained");
}
