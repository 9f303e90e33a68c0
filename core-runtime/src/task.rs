//! # Tasks
//!
//! Work submitted to the worker is tracked by a shared completion slot that
//! is resolved exactly once: with the task's value, with its failure, or as
//! cancelled. The submitting side holds a [`TaskHandle`] onto that slot; the
//! worker side holds a resolver that settles it.
//!
//! ## Outcomes
//!
//! - `Completed(value)` - the work returned `Ok(value)`
//! - `Failed(error)` - the work returned `Err`, or panicked
//! - `Cancelled` - the task was cancelled before it produced a result, or was
//!   dropped without ever running (for example because it was still queued
//!   when the worker shut down)
//!
//! ## Cancellation
//!
//! Cancellation is cooperative. A task cancelled before its first step never
//! runs and reports `Cancelled`. Once started, its future is polled first on
//! every wake-up, so a task that observes
//! [`LoopContext::cancelled`](crate::LoopContext::cancelled) and returns
//! immediately reports its own value or error. Otherwise it is dropped at
//! its next suspension point and reports `Cancelled`.

use crate::context::LoopContext;
use core_async::sync::CancellationToken;
use core_async::task::{FutureExt, LocalBoxFuture};
use parking_lot::{Condvar, Mutex};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll, Waker};
use std::time::{Duration, Instant};
use tracing::{error, trace};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique task identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        Self(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// Failure of a task, callback or done-callback.
///
/// Cloneable so the same failure can be handed to the exception handler,
/// to done-callbacks and to the task's owner.
#[derive(Debug, Clone)]
pub enum TaskError {
    /// The work returned an error
    Failed(Arc<anyhow::Error>),
    /// The work panicked
    Panicked(Arc<TaskPanic>),
}

impl TaskError {
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        Self::Panicked(Arc::new(TaskPanic::new(payload)))
    }

    /// The caught panic, if the work panicked.
    pub fn panic(&self) -> Option<&TaskPanic> {
        match self {
            Self::Panicked(panic) => Some(panic),
            Self::Failed(_) => None,
        }
    }

    /// The original error value, if the work failed with an `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        match self {
            Self::Failed(error) => error.downcast_ref::<E>(),
            Self::Panicked(_) => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, Self::Panicked(_))
    }
}

impl From<anyhow::Error> for TaskError {
    fn from(error: anyhow::Error) -> Self {
        Self::Failed(Arc::new(error))
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(error) => write!(f, "{:#}", error),
            Self::Panicked(panic) => write!(f, "panicked: {}", panic.message()),
        }
    }
}

impl std::error::Error for TaskError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Failed(error) => Some(&***error),
            Self::Panicked(_) => None,
        }
    }
}

/// A panic caught while running a task or callback.
///
/// Keeps the original payload so the owner can inspect it or resume the
/// unwind with [`std::panic::resume_unwind`].
pub struct TaskPanic {
    message: String,
    payload: Mutex<Option<Box<dyn Any + Send>>>,
}

impl TaskPanic {
    fn new(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            message,
            payload: Mutex::new(Some(payload)),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Take the original payload. Only the first caller gets it; clones of
    /// the same [`TaskError`] share it.
    pub fn take_payload(&self) -> Option<Box<dyn Any + Send>> {
        self.payload.lock().take()
    }
}

impl fmt::Debug for TaskPanic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskPanic")
            .field("message", &self.message)
            .field("payload_taken", &self.payload.lock().is_none())
            .finish()
    }
}

/// Final state of a task, including its value.
#[derive(Debug)]
pub enum TaskOutcome<T> {
    Completed(T),
    Failed(TaskError),
    Cancelled,
}

impl<T> TaskOutcome<T> {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The value, if the task completed.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            _ => None,
        }
    }

    pub fn resolution(&self) -> TaskResolution {
        match self {
            Self::Completed(_) => TaskResolution::Completed,
            Self::Failed(error) => TaskResolution::Failed(error.clone()),
            Self::Cancelled => TaskResolution::Cancelled,
        }
    }
}

/// Final state of a task without its value, as seen by done-callbacks.
#[derive(Debug, Clone)]
pub enum TaskResolution {
    Completed,
    Failed(TaskError),
    Cancelled,
}

impl TaskResolution {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    pub fn error(&self) -> Option<&TaskError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Per-task submission options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskOptions {
    /// Report failures of this task to the exception handler
    pub log_exceptions: bool,
}

impl Default for TaskOptions {
    fn default() -> Self {
        Self {
            log_exceptions: true,
        }
    }
}

impl TaskOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_exceptions(mut self, enabled: bool) -> Self {
        self.log_exceptions = enabled;
        self
    }
}

type DoneCallback = Box<dyn FnOnce(&TaskResolution) + Send>;

struct Slot<T> {
    resolution: Option<TaskResolution>,
    outcome: Option<TaskOutcome<T>>,
    waker: Option<Waker>,
    callbacks: Vec<DoneCallback>,
}

/// Shared completion slot between a [`TaskHandle`] and its resolver.
pub(crate) struct Completion<T> {
    id: TaskId,
    token: CancellationToken,
    slot: Mutex<Slot<T>>,
    ready: Condvar,
}

impl<T> Completion<T> {
    pub(crate) fn new(id: TaskId, token: CancellationToken) -> Arc<Self> {
        Arc::new(Self {
            id,
            token,
            slot: Mutex::new(Slot {
                resolution: None,
                outcome: None,
                waker: None,
                callbacks: Vec::new(),
            }),
            ready: Condvar::new(),
        })
    }

    /// Settle the slot. Returns `None` if it was already settled.
    fn resolve(&self, outcome: TaskOutcome<T>) -> Option<TaskResolution> {
        let resolution = outcome.resolution();
        let (waker, callbacks) = {
            let mut slot = self.slot.lock();
            if slot.resolution.is_some() {
                return None;
            }
            slot.resolution = Some(resolution.clone());
            slot.outcome = Some(outcome);
            (slot.waker.take(), std::mem::take(&mut slot.callbacks))
        };

        self.ready.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
        for callback in callbacks {
            run_done_callback(self.id, callback, &resolution);
        }
        Some(resolution)
    }
}

fn run_done_callback(id: TaskId, callback: DoneCallback, resolution: &TaskResolution) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(resolution))) {
        error!(
            task = %id,
            error = %TaskError::from_panic(payload),
            "Done callback panicked"
        );
    }
}

/// Worker-side half of a completion slot.
///
/// Dropping an unused resolver settles the task as cancelled, so a task that
/// never runs still resolves.
pub(crate) struct Resolver<T> {
    completion: Arc<Completion<T>>,
}

impl<T> Resolver<T> {
    pub(crate) fn new(completion: Arc<Completion<T>>) -> Self {
        Self { completion }
    }

    pub(crate) fn resolve(self, outcome: TaskOutcome<T>) -> TaskResolution {
        let fallback = outcome.resolution();
        self.completion.resolve(outcome).unwrap_or(fallback)
    }
}

impl<T> Drop for Resolver<T> {
    fn drop(&mut self) {
        if self.completion.resolve(TaskOutcome::Cancelled).is_some() {
            trace!(task = %self.completion.id, "Task dropped before completion");
        }
    }
}

/// Type-erased entry point of a task, run on the worker thread.
pub(crate) type TaskStart =
    Box<dyn FnOnce(LoopContext) -> LocalBoxFuture<'static, TaskResolution>>;

/// Bind `work` to a completion slot.
///
/// The returned closure is `Send` whenever `work` and `T` are, which lets the
/// submission gate move it across threads before it runs. If the task's
/// token is already cancelled when the closure's future is first polled,
/// `work` is never called.
pub(crate) fn bind<F, Fut, T>(
    work: F,
    completion: &Arc<Completion<T>>,
) -> impl FnOnce(LoopContext) -> LocalBoxFuture<'static, TaskResolution>
where
    F: FnOnce(LoopContext) -> Fut + 'static,
    Fut: Future<Output = anyhow::Result<T>> + 'static,
    T: 'static,
{
    let resolver = Resolver::new(Arc::clone(completion));
    move |ctx: LoopContext| {
        async move {
            let token = ctx.token().clone();
            if token.is_cancelled() {
                trace!(task = %resolver.completion.id, "Task cancelled before its first step");
                return resolver.resolve(TaskOutcome::Cancelled);
            }
            let outcome = match panic::catch_unwind(AssertUnwindSafe(move || work(ctx))) {
                Ok(future) => drive(token, future).await,
                Err(payload) => TaskOutcome::Failed(TaskError::from_panic(payload)),
            };
            resolver.resolve(outcome)
        }
        .boxed_local()
    }
}

async fn drive<T, Fut>(token: CancellationToken, future: Fut) -> TaskOutcome<T>
where
    Fut: Future<Output = anyhow::Result<T>>,
{
    tokio::select! {
        biased;
        result = AssertUnwindSafe(future).catch_unwind() => match result {
            Ok(Ok(value)) => TaskOutcome::Completed(value),
            Ok(Err(error)) => TaskOutcome::Failed(error.into()),
            Err(payload) => TaskOutcome::Failed(TaskError::from_panic(payload)),
        },
        _ = token.cancelled() => TaskOutcome::Cancelled,
    }
}

/// Handle to a submitted task.
///
/// The handle may be polled, blocked on, awaited or simply dropped; dropping
/// it does not cancel the task.
///
/// Blocking methods must not be called on the worker thread itself, where
/// they would wait for work that can never run.
pub struct TaskHandle<T> {
    completion: Arc<Completion<T>>,
}

impl<T> TaskHandle<T> {
    pub(crate) fn new(completion: Arc<Completion<T>>) -> Self {
        Self { completion }
    }

    pub fn id(&self) -> TaskId {
        self.completion.id
    }

    pub fn is_finished(&self) -> bool {
        self.completion.slot.lock().resolution.is_some()
    }

    /// How the task ended, once it has.
    pub fn resolution(&self) -> Option<TaskResolution> {
        self.completion.slot.lock().resolution.clone()
    }

    /// Request cancellation.
    ///
    /// Returns `false` if the task had already finished. The task resolves
    /// as cancelled at its next suspension point, or immediately if it has
    /// not started yet.
    pub fn cancel(&self) -> bool {
        if self.is_finished() {
            return false;
        }
        self.completion.token.cancel();
        true
    }

    /// Run `callback` once the task resolves.
    ///
    /// Callbacks run on the worker thread in registration order. If the task
    /// already resolved, `callback` runs immediately on the calling thread.
    pub fn add_done_callback<F>(&self, callback: F)
    where
        F: FnOnce(&TaskResolution) + Send + 'static,
    {
        let resolution = {
            let mut slot = self.completion.slot.lock();
            match slot.resolution.clone() {
                Some(resolution) => resolution,
                None => {
                    slot.callbacks.push(Box::new(callback));
                    return;
                }
            }
        };
        run_done_callback(self.completion.id, Box::new(callback), &resolution);
    }

    /// Block until the task resolves.
    pub fn wait(self) -> TaskOutcome<T> {
        let mut slot = self.completion.slot.lock();
        while slot.resolution.is_none() {
            self.completion.ready.wait(&mut slot);
        }
        slot.outcome.take().unwrap_or(TaskOutcome::Cancelled)
    }

    /// Block until the task resolves or `timeout` elapses.
    ///
    /// On timeout the handle is handed back.
    pub fn wait_timeout(self, timeout: Duration) -> Result<TaskOutcome<T>, Self> {
        let deadline = Instant::now() + timeout;
        {
            let mut slot = self.completion.slot.lock();
            while slot.resolution.is_none() {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    drop(slot);
                    return Err(self);
                }
                self.completion.ready.wait_for(&mut slot, remaining);
            }
        }
        self.try_outcome()
    }

    /// Take the outcome without blocking, or get the handle back.
    pub fn try_outcome(self) -> Result<TaskOutcome<T>, Self> {
        let outcome = {
            let mut slot = self.completion.slot.lock();
            if slot.resolution.is_none() {
                None
            } else {
                Some(slot.outcome.take().unwrap_or(TaskOutcome::Cancelled))
            }
        };
        outcome.ok_or(self)
    }
}

impl<T> Future for TaskHandle<T> {
    type Output = TaskOutcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut slot = self.completion.slot.lock();
        if let Some(outcome) = slot.outcome.take() {
            return Poll::Ready(outcome);
        }
        if slot.resolution.is_some() {
            panic!("TaskHandle polled after its outcome was taken");
        }
        slot.waker = Some(cx.waker().clone());
        Poll::Pending
    }
}

impl<T> fmt::Debug for TaskHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.completion.id)
            .field("resolution", &self.resolution())
            .finish()
    }
}
