//! Worker-thread side of the loop: the state shared by everything running on
//! the cooperative loop, and the [`LoopContext`] handed to tasks and
//! callbacks.

use crate::error::Result;
use crate::events::{Notification, SealedRegistry, Value};
use crate::exception::{self, ExceptionContext, ExceptionHandler, ExceptionOrigin};
use crate::task::{self, Completion, TaskError, TaskHandle, TaskId, TaskResolution, TaskStart};
use core_async::sync::{CancellationToken, Notify, WaitForCancellationFuture};
use core_async::task::{spawn_blocking, spawn_local, JoinHandle, TaskTracker};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use tracing::{debug, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Running,
    ShuttingDown,
}

/// Scheduled callback, run on the worker thread.
pub(crate) type Callback = Box<dyn FnOnce(&LoopContext) + Send>;

/// State owned by the worker thread for the lifetime of the loop.
pub(crate) struct LoopShared {
    pub(crate) worker: Arc<str>,
    pub(crate) registry: SealedRegistry,
    pub(crate) tracker: TaskTracker,
    pub(crate) root: CancellationToken,
    pub(crate) stop: Notify,
    live: RefCell<BTreeMap<TaskId, CancellationToken>>,
    phase: Cell<Phase>,
    shutdown_failures: RefCell<Vec<(TaskId, TaskError)>>,
    handler: Arc<dyn ExceptionHandler>,
    log_exceptions: bool,
}

impl LoopShared {
    pub(crate) fn new(
        worker: Arc<str>,
        registry: SealedRegistry,
        root: CancellationToken,
        handler: Arc<dyn ExceptionHandler>,
        log_exceptions: bool,
    ) -> Rc<Self> {
        Rc::new(Self {
            worker,
            registry,
            tracker: TaskTracker::new(),
            root,
            stop: Notify::new(),
            live: RefCell::new(BTreeMap::new()),
            phase: Cell::new(Phase::Running),
            shutdown_failures: RefCell::new(Vec::new()),
            handler,
            log_exceptions,
        })
    }

    pub(crate) fn phase(&self) -> Phase {
        self.phase.get()
    }

    pub(crate) fn enter_shutdown(&self) {
        self.phase.set(Phase::ShuttingDown);
    }

    /// Cancellation tokens of every task that has started and not finished,
    /// oldest first.
    pub(crate) fn live_tokens(&self) -> Vec<(TaskId, CancellationToken)> {
        self.live
            .borrow()
            .iter()
            .map(|(id, token)| (*id, token.clone()))
            .collect()
    }

    pub(crate) fn take_shutdown_failures(&self) -> Vec<(TaskId, TaskError)> {
        std::mem::take(&mut *self.shutdown_failures.borrow_mut())
    }

    pub(crate) fn report(&self, origin: ExceptionOrigin, task: Option<TaskId>, error: TaskError) {
        exception::report(
            self.handler.as_ref(),
            ExceptionContext::new(origin, self.worker.as_ref(), task, error),
        );
    }

    fn settle(&self, id: TaskId, log_exceptions: bool, resolution: TaskResolution) {
        self.live.borrow_mut().remove(&id);
        match resolution {
            TaskResolution::Completed => trace!(task = %id, "Task completed"),
            TaskResolution::Cancelled => debug!(task = %id, "Task cancelled"),
            TaskResolution::Failed(error) => {
                if self.phase.get() == Phase::ShuttingDown {
                    self.shutdown_failures.borrow_mut().push((id, error));
                } else if log_exceptions {
                    self.report(ExceptionOrigin::Task, Some(id), error);
                } else {
                    debug!(task = %id, error = %error, "Task failed, reporting disabled");
                }
            }
        }
    }
}

/// Start a task on the current `LocalSet`.
///
/// A task whose token is already cancelled is dropped unstarted and resolves
/// as cancelled.
pub(crate) fn start_task(
    shared: &Rc<LoopShared>,
    id: TaskId,
    token: CancellationToken,
    log_exceptions: bool,
    start: TaskStart,
) {
    if token.is_cancelled() {
        debug!(task = %id, "Task cancelled before start");
        drop(start);
        return;
    }

    let ctx = LoopContext {
        shared: Rc::clone(shared),
        task: Some(id),
        token: token.clone(),
    };
    shared.live.borrow_mut().insert(id, token);

    let owner = Rc::clone(shared);
    spawn_local(shared.tracker.track_future(async move {
        let resolution = start(ctx).await;
        owner.settle(id, log_exceptions, resolution);
    }));
}

/// Run a scheduled callback inline, reporting a panic.
pub(crate) fn run_callback(shared: &Rc<LoopShared>, callback: Callback) {
    let ctx = LoopContext {
        shared: Rc::clone(shared),
        task: None,
        token: shared.root.clone(),
    };
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| callback(&ctx))) {
        shared.report(ExceptionOrigin::Callback, None, TaskError::from_panic(payload));
    }
}

/// Access to the running loop, given to every task and callback.
///
/// `LoopContext` cannot leave the worker thread, so anything that needs it
/// (emitting notifications, spawning local tasks) is only reachable from code
/// running inside the loop.
#[derive(Clone)]
pub struct LoopContext {
    shared: Rc<LoopShared>,
    task: Option<TaskId>,
    token: CancellationToken,
}

impl LoopContext {
    pub fn worker_name(&self) -> &str {
        &self.shared.worker
    }

    /// Id of the task this context belongs to, `None` inside callbacks.
    pub fn task_id(&self) -> Option<TaskId> {
        self.task
    }

    /// Queue `payload` to every subscriber of `notification`.
    ///
    /// Returns the number of subscribers reached. Emitting a notification
    /// that nobody subscribed to is a no-op, whatever the payload.
    ///
    /// # Errors
    ///
    /// Checked in this order, only for names that have subscribers:
    ///
    /// - [`Error::DuplicateName`](crate::Error::DuplicateName) if a different
    ///   descriptor was registered under the same name
    /// - [`Error::PayloadMismatch`](crate::Error::PayloadMismatch) if the
    ///   payload does not match the descriptor's shape
    pub fn emit(&self, notification: &Notification, payload: Vec<Value>) -> Result<usize> {
        self.shared.registry.emit(notification, payload)
    }

    /// Spawn a tracked task on this loop.
    ///
    /// Unlike submitted work, `work` and its output do not need to be `Send`.
    /// The task is cancelled by shutdown like any other.
    pub fn spawn<F, Fut, T>(&self, work: F) -> TaskHandle<T>
    where
        F: FnOnce(LoopContext) -> Fut + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
        T: 'static,
    {
        let id = TaskId::next();
        let token = self.shared.root.child_token();
        let completion = Completion::new(id, token.clone());
        start_task(
            &self.shared,
            id,
            token,
            self.shared.log_exceptions,
            Box::new(task::bind(work, &completion)),
        );
        TaskHandle::new(completion)
    }

    /// Run blocking work on the worker's blocking pool.
    ///
    /// Shutdown waits for running blocking jobs, up to the configured
    /// timeout, before the worker reports `finished`.
    pub fn spawn_blocking<F, R>(&self, work: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        spawn_blocking(work)
    }

    /// Ask the loop to leave run mode after the current step.
    pub fn stop(&self) {
        debug!(worker = %self.shared.worker, "Stop requested from inside the loop");
        self.shared.stop.notify_one();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once this task is cancelled or the loop shuts down.
    pub fn cancelled(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.phase() == Phase::ShuttingDown
    }

    pub(crate) fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl fmt::Debug for LoopContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopContext")
            .field("worker", &self.shared.worker)
            .field("task", &self.task)
            .field("cancelled", &self.token.is_cancelled())
            .finish()
    }
}
