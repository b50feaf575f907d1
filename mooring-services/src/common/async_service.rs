//! Runs a service's start and stop bodies on an [`Executor`].
//!
//! [`AsyncService`] marks the lifecycle context asynchronous, then hands the
//! inner body to the executor. Whatever the inner body does, the outer
//! context is signalled exactly once for every body the wrapper owns:
//!
//! - a start that returns `Ok` completes, an `Err` fails with that exception,
//!   a panic fails with a [`StartException`] carrying the panic message;
//! - a stop always completes, also when it panics.
//!
//! An inner body that signals on its own, or goes asynchronous, keeps the
//! duty to signal; the wrapper then adds nothing.
//! If the executor rejects the task, it runs on the calling thread.
//!
//! The wrapper is also a [`MakeService`], so it stacks over a service
//! factory through [`AsyncService::layer`]:
//!
//! ```ignore
//! let factory = FactoryStack::new(config)
//!     .push(MyService::layer())
//!     .push(AsyncService::layer())
//!     .into_inner();
//! ```
use std::{panic::AssertUnwindSafe, sync::Arc};

use mooring_core::{
    container::{Service, StartContext, StartException, StopContext},
    orchestrator::{Executor, Task},
};
use service_async::{
    layer::{layer_fn, FactoryLayer},
    MakeService, Param,
};
use tracing::{error, warn};

/// The executor asynchronous bodies are handed to.
pub type SharedExecutor = Arc<dyn Executor>;

pub struct AsyncService<S> {
    inner: Arc<S>,
    executor: SharedExecutor,
}

impl<S> AsyncService<S> {
    pub fn new(inner: S, executor: SharedExecutor) -> Self {
        Self {
            inner: Arc::new(inner),
            executor,
        }
    }

    pub fn inner(&self) -> &S {
        &self.inner
    }

    fn dispatch(&self, task: Task) {
        if let Err(rejected) = self.executor.execute(task) {
            warn!("executor rejected a lifecycle task, running it inline");
            (rejected.into_task())();
        }
    }
}

impl<F> AsyncService<F> {
    pub fn layer<C>() -> impl FactoryLayer<C, F, Factory = Self>
    where
        C: Param<SharedExecutor>,
    {
        layer_fn(|c: &C, inner| AsyncService::new(inner, c.param()))
    }
}

impl<S: Service> Service for AsyncService<S> {
    type Value = S::Value;

    fn start(&self, ctx: StartContext) -> Result<(), StartException> {
        ctx.asynchronous();
        let inner = self.inner.clone();
        self.dispatch(Box::new(move || {
            let outer = ctx.clone();
            let inner_ctx = StartContext::new(ctx.name().clone(), move |outcome| match outcome {
                Ok(()) => outer.complete(),
                Err(e) => outer.failed(e),
            });
            let started =
                std::panic::catch_unwind(AssertUnwindSafe(|| inner.start(inner_ctx.clone())));
            // a signal from the inner body has already reached the outer context
            let signaled = inner_ctx.is_signaled();
            match started {
                Ok(Ok(())) if signaled || inner_ctx.is_asynchronous() => {}
                Ok(Ok(())) => ctx.complete(),
                Ok(Err(_)) if signaled => {}
                Ok(Err(e)) => ctx.failed(e),
                Err(panic) => {
                    let e = StartException::from_panic(panic);
                    error!("start of {} panicked: {}", ctx.name(), e.message());
                    if !signaled {
                        ctx.failed(e);
                    }
                }
            }
        }));
        Ok(())
    }

    fn stop(&self, ctx: StopContext) {
        ctx.asynchronous();
        let inner = self.inner.clone();
        self.dispatch(Box::new(move || {
            let outer = ctx.clone();
            let inner_ctx = StopContext::new(ctx.name().clone(), move || outer.complete());
            let stopped = std::panic::catch_unwind(AssertUnwindSafe(|| inner.stop(inner_ctx.clone())));
            if stopped.is_err() {
                error!("stop of {} panicked", ctx.name());
            } else if inner_ctx.is_asynchronous() {
                return;
            }
            if !inner_ctx.is_signaled() {
                ctx.complete();
            }
        }));
    }

    fn value(&self) -> Option<Arc<S::Value>> {
        self.inner.value()
    }
}

impl<F: MakeService> MakeService for AsyncService<F> {
    type Service = AsyncService<F::Service>;
    type Error = F::Error;

    fn make_via_ref(&self, old: Option<&Self::Service>) -> Result<Self::Service, Self::Error> {
        Ok(AsyncService {
            inner: Arc::new(self.inner.make_via_ref(old.map(|o| o.inner.as_ref()))?),
            executor: self.executor.clone(),
        })
    }
}
