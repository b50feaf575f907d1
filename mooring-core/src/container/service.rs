use std::{
    any::Any,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

use crate::{AnyError, ServiceName};

/// A unit of runtime behavior managed by the container.
///
/// `start` is only invoked once every required dependency is up, and `stop` is
/// invoked before any dependency is stopped. Either body may hand its work to
/// another thread by calling `asynchronous()` on the context; it must then
/// signal the context exactly once.
pub trait Service: Send + Sync + 'static {
    /// The value published to dependents once the service is up.
    type Value: Send + Sync + 'static;

    fn start(&self, ctx: StartContext) -> Result<(), StartException> {
        let _ = ctx;
        Ok(())
    }

    fn stop(&self, ctx: StopContext) {
        let _ = ctx;
    }

    fn value(&self) -> Option<Arc<Self::Value>>;
}

pub(crate) type ErasedValue = Arc<dyn Any + Send + Sync>;

pub(crate) trait ErasedService: Send + Sync {
    fn start(&self, ctx: StartContext) -> Result<(), StartException>;
    fn stop(&self, ctx: StopContext);
    fn value(&self) -> Option<ErasedValue>;
}

impl<S: Service> ErasedService for S {
    fn start(&self, ctx: StartContext) -> Result<(), StartException> {
        Service::start(self, ctx)
    }

    fn stop(&self, ctx: StopContext) {
        Service::stop(self, ctx)
    }

    fn value(&self) -> Option<ErasedValue> {
        Service::value(self).map(|v| v as ErasedValue)
    }
}

/// Failure of a service start. Clonable so the controller can keep it for
/// introspection while it is also reported to callers.
#[derive(Clone)]
pub struct StartException {
    service: Option<ServiceName>,
    message: String,
    cause: Option<Arc<AnyError>>,
}

impl StartException {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            service: None,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_cause(message: impl Into<String>, cause: impl Into<AnyError>) -> Self {
        Self {
            service: None,
            message: message.into(),
            cause: Some(Arc::new(cause.into())),
        }
    }

    /// Wrap any unexpected error escaping a service body.
    pub fn unexpected(cause: impl Into<AnyError>) -> Self {
        let cause = cause.into();
        Self {
            service: None,
            message: format!("unexpected failure: {cause}"),
            cause: Some(Arc::new(cause)),
        }
    }

    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::new(format!("service panicked: {}", panic_message(&*payload)))
    }

    pub(crate) fn for_service(mut self, name: &ServiceName) -> Self {
        if self.service.is_none() {
            self.service = Some(name.clone());
        }
        self
    }

    pub fn service(&self) -> Option<&ServiceName> {
        self.service.as_ref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn cause(&self) -> Option<&AnyError> {
        self.cause.as_deref()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

impl fmt::Display for StartException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.service {
            Some(name) => write!(f, "failed to start service {name}: {}", self.message)?,
            None => write!(f, "failed to start service: {}", self.message)?,
        }
        if let Some(cause) = &self.cause {
            write!(f, " (caused by: {cause})")?;
        }
        Ok(())
    }
}

impl fmt::Debug for StartException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StartException")
            .field("service", &self.service)
            .field("message", &self.message)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish()
    }
}

impl std::error::Error for StartException {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.cause.as_deref().map(|cause| {
            let cause: &(dyn std::error::Error + Send + Sync + 'static) = cause.as_ref();
            cause as &(dyn std::error::Error + 'static)
        })
    }
}

struct LifecycleContext<O> {
    name: ServiceName,
    asynchronous: AtomicBool,
    signaled: AtomicBool,
    started: Instant,
    signal: Box<dyn Fn(O) + Send + Sync>,
}

impl<O> LifecycleContext<O> {
    fn new(name: ServiceName, signal: Box<dyn Fn(O) + Send + Sync>) -> Arc<Self> {
        Arc::new(Self {
            name,
            asynchronous: AtomicBool::new(false),
            signaled: AtomicBool::new(false),
            started: Instant::now(),
            signal,
        })
    }

    fn fire(&self, outcome: O) {
        self.signaled.store(true, Ordering::Release);
        (self.signal)(outcome);
    }
}

/// Handle given to [`Service::start`].
///
/// Every call to [`complete`](Self::complete) or [`failed`](Self::failed) is
/// forwarded; the container ignores all but the first signal of a transition.
#[derive(Clone)]
pub struct StartContext(Arc<LifecycleContext<Result<(), StartException>>>);

impl StartContext {
    /// Build a detached context that forwards every signal to `on_signal`.
    pub fn new(
        name: ServiceName,
        on_signal: impl Fn(Result<(), StartException>) + Send + Sync + 'static,
    ) -> Self {
        Self(LifecycleContext::new(name, Box::new(on_signal)))
    }

    pub fn name(&self) -> &ServiceName {
        &self.0.name
    }

    /// Declare that the start completes later through `complete` or `failed`.
    pub fn asynchronous(&self) {
        self.0.asynchronous.store(true, Ordering::Release);
    }

    pub fn is_asynchronous(&self) -> bool {
        self.0.asynchronous.load(Ordering::Acquire)
    }

    /// Whether `complete` or `failed` was called on this context.
    pub fn is_signaled(&self) -> bool {
        self.0.signaled.load(Ordering::Acquire)
    }

    pub fn complete(&self) {
        self.0.fire(Ok(()));
    }

    pub fn failed(&self, cause: StartException) {
        self.0.fire(Err(cause));
    }

    pub fn elapsed(&self) -> Duration {
        self.0.started.elapsed()
    }
}

/// Handle given to [`Service::stop`].
#[derive(Clone)]
pub struct StopContext(Arc<LifecycleContext<()>>);

impl StopContext {
    pub fn new(name: ServiceName, on_complete: impl Fn() + Send + Sync + 'static) -> Self {
        Self(LifecycleContext::new(
            name,
            Box::new(move |()| on_complete()),
        ))
    }

    pub fn name(&self) -> &ServiceName {
        &self.0.name
    }

    pub fn asynchronous(&self) {
        self.0.asynchronous.store(true, Ordering::Release);
    }

    pub fn is_asynchronous(&self) -> bool {
        self.0.asynchronous.load(Ordering::Acquire)
    }

    pub fn is_signaled(&self) -> bool {
        self.0.signaled.load(Ordering::Acquire)
    }

    pub fn complete(&self) {
        self.0.fire(());
    }
}

/// A service whose value is fixed at construction.
pub struct ValueService<T> {
    value: Arc<T>,
}

impl<T> ValueService<T> {
    pub fn new(value: T) -> Self {
        Self {
            value: Arc::new(value),
        }
    }
}

impl<T: Send + Sync + 'static> Service for ValueService<T> {
    type Value = T;

    fn value(&self) -> Option<Arc<T>> {
        Some(self.value.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    };

    use super::{StartContext, StartException};
    use crate::ServiceName;

    #[test]
    fn test_context_forwards_every_signal() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        let ctx = StartContext::new(ServiceName::of(["a"]), move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        assert!(!ctx.is_asynchronous());
        ctx.asynchronous();
        assert!(ctx.is_asynchronous());
        ctx.complete();
        ctx.failed(StartException::new("late"));
        assert_eq!(2, count.load(Ordering::SeqCst));
        assert!(ctx.is_signaled());
    }

    #[test]
    fn test_start_exception_display() {
        let e = StartException::with_cause("cannot bind", anyhow::anyhow!("port in use"))
            .for_service(&ServiceName::of(["jboss", "web"]));
        assert_eq!(
            "failed to start service jboss.web: cannot bind (caused by: port in use)",
            e.to_string()
        );
        assert!(std::error::Error::source(&e).is_some());
    }
}
