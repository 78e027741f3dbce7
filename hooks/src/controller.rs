//! Request lifecycle for a single data resource.
//!
//! ```text
//! fetch(args) --> token += 1, abort previous --> loading = true
//!                        |
//!                 producer(args).await
//!                        |
//!          token still current? -- no --> discard (Superseded)
//!                        | yes
//!      success --> transform --> data, loading = false --> on_success
//!      failure ----------------> error, loading = false --> on_error
//! ```

use std::any::Any;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use futures::FutureExt;
use futures::future::BoxFuture;
use payloads::Envelope;
use tokio::sync::watch;
use tokio::task::{AbortHandle, JoinHandle};

use crate::error::{FetchError, FetchOutcome};
use crate::state::{FetchState, RequestState};
use crate::telemetry::spawn_with_tracing;

/// Asynchronous data source for a controller.
pub type Producer<A, T> = Arc<
    dyn Fn(A) -> BoxFuture<'static, anyhow::Result<Envelope<T>>> + Send + Sync,
>;

type Transform<T, U> = Arc<dyn Fn(T) -> anyhow::Result<U> + Send + Sync>;
type SuccessCallback<U> = Arc<dyn Fn(&U) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&FetchError) + Send + Sync>;

/// Box a closure returning a future into a [`Producer`].
///
/// # Example
///
/// ```rust,ignore
/// let api = api.clone();
/// let stats = producer(move |()| {
///     let api = api.clone();
///     async move { api.stats().await }
/// });
/// ```
pub fn producer<A, T, F, Fut>(f: F) -> Producer<A, T>
where
    F: Fn(A) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Envelope<T>>> + Send + 'static,
{
    Arc::new(move |args| f(args).boxed())
}

/// Construction options for a [`RequestController`].
pub struct FetchOptions<T, U = T> {
    immediate: bool,
    abort_superseded: bool,
    transform: Transform<T, U>,
    on_success: Option<SuccessCallback<U>>,
    on_error: Option<ErrorCallback>,
}

impl<T: 'static> Default for FetchOptions<T, T> {
    fn default() -> Self {
        Self::with_transform(Ok)
    }
}

impl<T, U> FetchOptions<T, U> {
    /// Options whose published data is `transform(data)`.
    ///
    /// The transform runs after a successful response and before anything
    /// is published. An error (or a panic) fails the fetch instead of
    /// publishing partial data.
    pub fn with_transform<F>(transform: F) -> Self
    where
        F: Fn(T) -> anyhow::Result<U> + Send + Sync + 'static,
    {
        Self {
            immediate: true,
            abort_superseded: true,
            transform: Arc::new(transform),
            on_success: None,
            on_error: None,
        }
    }

    /// Fetch once with default arguments when the controller is created.
    /// Defaults to true.
    pub fn immediate(mut self, immediate: bool) -> Self {
        self.immediate = immediate;
        self
    }

    /// Abort the task of a superseded request in addition to ignoring its
    /// result. Defaults to true; turn it off for producers that must run
    /// to completion.
    pub fn abort_superseded(mut self, abort: bool) -> Self {
        self.abort_superseded = abort;
        self
    }

    pub fn on_success<F>(mut self, f: F) -> Self
    where
        F: Fn(&U) + Send + Sync + 'static,
    {
        self.on_success = Some(Arc::new(f));
        self
    }

    pub fn on_error<F>(mut self, f: F) -> Self
    where
        F: Fn(&FetchError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(f));
        self
    }
}

/// Owns the lifecycle of one logical resource fetched through a producer.
///
/// Only the most recently issued fetch may publish: every fetch takes a new
/// ownership token, and a resolution whose token is no longer current is
/// dropped without touching state or invoking callbacks. Dropping the
/// controller disposes it.
///
/// Spawns onto the ambient Tokio runtime, so it must be created and used
/// from within one.
pub struct RequestController<A, T, U = T> {
    inner: Arc<Inner<A, T, U>>,
}

struct Inner<A, T, U> {
    slot: Mutex<Slot<A, T>>,
    state: watch::Sender<RequestState<U>>,
    transform: Transform<T, U>,
    on_success: Option<SuccessCallback<U>>,
    on_error: Option<ErrorCallback>,
    immediate: bool,
    abort_superseded: bool,
}

/// Everything a resolution must check atomically before it may publish.
struct Slot<A, T> {
    producer: Producer<A, T>,
    token: u64,
    in_flight: Option<AbortHandle>,
    disposed: bool,
}

impl<A, T> Slot<A, T> {
    /// Invalidate the current token. Returns whether a request was in
    /// flight.
    fn supersede(&mut self, abort: bool) -> bool {
        self.token = self.token.wrapping_add(1);
        match self.in_flight.take() {
            Some(handle) => {
                if abort {
                    handle.abort();
                }
                true
            }
            None => false,
        }
    }
}

impl<A, T, U> RequestController<A, T, U>
where
    A: Send + 'static,
    T: Send + 'static,
    U: Clone + Send + Sync + 'static,
{
    pub fn new(producer: Producer<A, T>, options: FetchOptions<T, U>) -> Self
    where
        A: Default,
    {
        let (state, _) = watch::channel(RequestState::new(options.immediate));
        let controller = Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot {
                    producer,
                    token: 0,
                    in_flight: None,
                    disposed: false,
                }),
                state,
                transform: options.transform,
                on_success: options.on_success,
                on_error: options.on_error,
                immediate: options.immediate,
                abort_superseded: options.abort_superseded,
            }),
        };
        if controller.inner.immediate {
            let _ = controller.fetch(A::default());
        }
        controller
    }

    /// Issue a request, superseding any request still in flight.
    ///
    /// The returned task may be awaited for the outcome, or dropped; the
    /// request continues either way.
    pub fn fetch(&self, args: A) -> FetchTask {
        self.inner.fetch(args)
    }

    /// Same as [`Self::fetch`]; for manual refreshes that await completion.
    pub fn refetch(&self, args: A) -> FetchTask {
        self.inner.fetch(args)
    }

    /// Stop the in-flight request, if any, without disposing.
    pub fn cancel(&self) {
        let mut slot = self.inner.lock_slot();
        if slot.disposed {
            return;
        }
        if slot.supersede(self.inner.abort_superseded) {
            tracing::debug!(token = slot.token, "cancelled in-flight request");
            self.inner.state.send_modify(|state| state.loading = false);
        }
    }

    /// Replace the producer, e.g. when the inputs it captures changed.
    ///
    /// In-flight work is superseded. Controllers created with `immediate`
    /// fetch again right away and return that task.
    pub fn reconfigure(&self, producer: Producer<A, T>) -> Option<FetchTask>
    where
        A: Default,
    {
        {
            let mut slot = self.inner.lock_slot();
            if slot.disposed {
                return None;
            }
            slot.producer = producer;
            let was_in_flight = slot.supersede(self.inner.abort_superseded);
            tracing::debug!(token = slot.token, "reconfigured producer");
            if was_in_flight && !self.inner.immediate {
                self.inner.state.send_modify(|state| state.loading = false);
            }
        }
        self.inner.immediate.then(|| self.inner.fetch(A::default()))
    }

    /// Cancel in-flight work and stop all further state changes.
    pub fn dispose(&self) {
        let mut slot = self.inner.lock_slot();
        if slot.disposed {
            return;
        }
        slot.disposed = true;
        if slot.supersede(true) {
            tracing::debug!("cancelled in-flight request on dispose");
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.lock_slot().disposed
    }

    /// A snapshot of the current state.
    pub fn state(&self) -> RequestState<U> {
        self.inner.state.borrow().clone()
    }

    /// Watch state transitions. Each fetch publishes at most two: entering
    /// loading and resolving.
    pub fn subscribe(&self) -> watch::Receiver<RequestState<U>> {
        self.inner.state.subscribe()
    }

    /// A cloneable trigger for [`Self::fetch`] that does not keep the
    /// controller alive and does nothing once it is gone.
    pub fn refetch_handle(&self) -> Refetch<A> {
        let weak = Arc::downgrade(&self.inner);
        Refetch {
            trigger: Arc::new(move |args| {
                weak.upgrade().map(|inner| inner.fetch(args))
            }),
        }
    }
}

impl<A, T, U> Drop for RequestController<A, T, U> {
    fn drop(&mut self) {
        let mut slot = self.inner.lock_slot();
        slot.disposed = true;
        slot.supersede(true);
    }
}

impl<A, T, U> Inner<A, T, U> {
    fn lock_slot(&self) -> MutexGuard<'_, Slot<A, T>> {
        // the slot holds no invariants a panicking holder could break
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<A, T, U> Inner<A, T, U>
where
    A: Send + 'static,
    T: Send + 'static,
    U: Clone + Send + Sync + 'static,
{
    fn fetch(self: &Arc<Self>, args: A) -> FetchTask {
        let mut slot = self.lock_slot();
        if slot.disposed {
            return FetchTask::discarded();
        }
        if slot.supersede(self.abort_superseded) {
            tracing::debug!(
                token = slot.token,
                "superseding in-flight request"
            );
        }
        let token = slot.token;
        let producer = Arc::clone(&slot.producer);

        self.state.send_modify(|state| {
            state.loading = true;
            state.error = None;
        });

        let inner = Arc::clone(self);
        let handle = spawn_with_tracing(async move {
            inner.resolve(token, producer, args).await
        });
        // still holding the slot, so the task cannot publish before this
        slot.in_flight = Some(handle.abort_handle());
        FetchTask::new(handle)
    }

    async fn resolve(
        self: Arc<Self>,
        token: u64,
        producer: Producer<A, T>,
        args: A,
    ) -> FetchOutcome {
        let produced = AssertUnwindSafe(async move { producer(args).await })
            .catch_unwind()
            .await;

        let result = match produced {
            Ok(Ok(envelope)) => FetchError::check(envelope)
                .and_then(|data| self.apply_transform(data)),
            Ok(Err(fault)) => Err(FetchError::Unexpected(format!("{fault:#}"))),
            Err(payload) => Err(FetchError::Unexpected(format!(
                "producer panicked: {}",
                panic_message(payload.as_ref())
            ))),
        };

        if !self.publish(token, &result) {
            tracing::debug!(token, "discarding superseded response");
            return FetchOutcome::Superseded;
        }

        match result {
            Ok(data) => {
                if let Some(on_success) = &self.on_success {
                    run_callback("on_success", || on_success(&data));
                }
                FetchOutcome::Success
            }
            Err(error) => {
                let kind = error.kind();
                if error.is_unexpected() {
                    tracing::error!(kind, "request failed: {error}");
                } else {
                    tracing::warn!(kind, "request failed: {error}");
                }
                if let Some(on_error) = &self.on_error {
                    run_callback("on_error", || on_error(&error));
                }
                FetchOutcome::Failed(error)
            }
        }
    }

    fn apply_transform(&self, data: T) -> Result<U, FetchError> {
        match panic::catch_unwind(AssertUnwindSafe(|| (self.transform)(data)))
        {
            Ok(Ok(view)) => Ok(view),
            Ok(Err(e)) => Err(FetchError::Transform(format!("{e:#}"))),
            Err(payload) => Err(FetchError::Transform(format!(
                "transform panicked: {}",
                panic_message(payload.as_ref())
            ))),
        }
    }

    /// Publish a resolution if `token` is still current. Loading and the
    /// result land in a single state replacement.
    fn publish(&self, token: u64, result: &Result<U, FetchError>) -> bool {
        let mut slot = self.lock_slot();
        if slot.disposed || slot.token != token {
            return false;
        }
        slot.in_flight = None;
        self.state.send_modify(|state| {
            state.loading = false;
            match result {
                Ok(data) => {
                    state.data = FetchState::Fetched(data.clone());
                    state.error = None;
                }
                Err(error) => state.error = Some(error.to_string()),
            }
        });
        true
    }
}

/// Run a caller callback after the result is published. A panic is logged
/// and goes no further, so the outcome still matches the published state.
fn run_callback(name: &'static str, callback: impl FnOnce()) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(callback)) {
        tracing::error!(
            callback = name,
            "callback panicked: {}",
            panic_message(payload.as_ref())
        );
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Awaitable handle to an issued fetch.
pub struct FetchTask {
    handle: Option<JoinHandle<FetchOutcome>>,
}

impl FetchTask {
    fn new(handle: JoinHandle<FetchOutcome>) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// A task for a fetch that was never issued.
    fn discarded() -> Self {
        Self { handle: None }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Future for FetchTask {
    type Output = FetchOutcome;

    fn poll(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Self::Output> {
        let Some(handle) = self.handle.as_mut() else {
            return Poll::Ready(FetchOutcome::Superseded);
        };
        Pin::new(handle).poll(cx).map(|joined| match joined {
            Ok(outcome) => outcome,
            Err(e) if e.is_cancelled() => FetchOutcome::Superseded,
            Err(e) => FetchOutcome::Failed(FetchError::Unexpected(format!(
                "fetch task failed: {e}"
            ))),
        })
    }
}

/// Type-erased, weak refetch trigger. See
/// [`RequestController::refetch_handle`].
pub struct Refetch<A> {
    trigger: Arc<dyn Fn(A) -> Option<FetchTask> + Send + Sync>,
}

impl<A> Clone for Refetch<A> {
    fn clone(&self) -> Self {
        Self {
            trigger: Arc::clone(&self.trigger),
        }
    }
}

impl<A> Refetch<A> {
    /// Returns `None` if the controller has been dropped.
    pub fn call(&self, args: A) -> Option<FetchTask> {
        (self.trigger)(args)
    }
}
