//! # Submission Gate
//!
//! The only way into the loop from other threads. Every request passes
//! through one mutex that guards the enqueue step and nothing else:
//!
//! ```text
//!  caller threads                 worker thread
//!  ──────────────                 ─────────────
//!  submit_task ─┐
//!  schedule_cb ─┼─▶ [mutex: check open, send] ─▶ unbounded channel ─▶ loop
//!  request_stop ┘
//! ```
//!
//! Work is executed on the worker thread in the order it was enqueued, so
//! everything submitted from one thread runs in that thread's submission
//! order. Once the loop leaves run mode the gate closes and further
//! submissions fail with [`Error::InactiveWorker`].

use crate::context::{Callback, LoopContext};
use crate::error::{Error, Result};
use crate::state::{StateCell, WorkerState};
use crate::task::{self, Completion, TaskHandle, TaskId, TaskOptions, TaskResolution};
use core_async::sync::{mpsc::UnboundedSender, CancellationToken};
use core_async::task::LocalBoxFuture;
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, trace};

/// A task in transit to the worker thread.
pub(crate) struct TaskEnvelope {
    pub(crate) id: TaskId,
    pub(crate) token: CancellationToken,
    pub(crate) log_exceptions: bool,
    pub(crate) start:
        Box<dyn FnOnce(LoopContext) -> LocalBoxFuture<'static, TaskResolution> + Send>,
}

pub(crate) enum Command {
    Task(TaskEnvelope),
    Callback(Callback),
    Stop,
}

struct GateInner {
    worker: Arc<str>,
    sender: Mutex<Option<UnboundedSender<Command>>>,
    root: CancellationToken,
    log_exceptions: bool,
    state: Arc<StateCell>,
}

/// Cloneable handle for submitting work to a worker from any thread.
#[derive(Clone)]
pub struct Submitter {
    inner: Arc<GateInner>,
}

impl Submitter {
    pub(crate) fn new(
        worker: Arc<str>,
        sender: UnboundedSender<Command>,
        root: CancellationToken,
        log_exceptions: bool,
        state: Arc<StateCell>,
    ) -> Self {
        Self {
            inner: Arc::new(GateInner {
                worker,
                sender: Mutex::new(Some(sender)),
                root,
                log_exceptions,
                state,
            }),
        }
    }

    /// Submit `work` with the worker's default options.
    ///
    /// `work` is moved to the worker thread and called there with a
    /// [`LoopContext`]; the future it returns runs on the cooperative loop
    /// and does not need to be `Send`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InactiveWorker`] once the worker has stopped
    /// accepting work.
    pub fn submit_task<F, Fut, T>(&self, work: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(LoopContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        let options = TaskOptions {
            log_exceptions: self.inner.log_exceptions,
        };
        self.submit_task_with(options, work)
    }

    /// Submit `work` with explicit options.
    pub fn submit_task_with<F, Fut, T>(&self, options: TaskOptions, work: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(LoopContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        let id = TaskId::next();
        let token = self.inner.root.child_token();
        let completion = Completion::new(id, token.clone());
        let envelope = TaskEnvelope {
            id,
            token,
            log_exceptions: options.log_exceptions,
            start: Box::new(task::bind(work, &completion)),
        };

        self.enqueue(Command::Task(envelope))?;
        trace!(worker = %self.inner.worker, task = %id, "Task submitted");
        Ok(TaskHandle::new(completion))
    }

    /// Run `callback` on the worker thread. Fire-and-forget.
    ///
    /// A panicking callback is reported to the exception handler.
    pub fn schedule_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&LoopContext) + Send + 'static,
    {
        self.enqueue(Command::Callback(Box::new(callback)))
    }

    /// Ask the loop to stop after the work already queued.
    ///
    /// Never waits. Requesting a stop from a worker that is already stopping
    /// or stopped is a no-op; requesting one before `start` makes the loop
    /// stop as soon as it has run what was queued before.
    pub fn request_stop(&self) -> Result<()> {
        let guard = self.inner.sender.lock();
        let Some(sender) = guard.as_ref() else {
            debug!(worker = %self.inner.worker, "Stop requested on inactive worker");
            return Ok(());
        };
        if !self.inner.state.get().accepts_work() {
            debug!(worker = %self.inner.worker, "Stop already requested");
            return Ok(());
        }

        let _ = self
            .inner
            .state
            .advance(&[WorkerState::Starting, WorkerState::Running], WorkerState::Stopping);
        if sender.send(Command::Stop).is_err() {
            debug!(worker = %self.inner.worker, "Worker loop already gone");
        }
        Ok(())
    }

    /// Whether submissions are currently accepted.
    pub fn is_active(&self) -> bool {
        self.inner.sender.lock().is_some() && self.inner.state.get().accepts_work()
    }

    /// Close the gate. Later submissions fail.
    pub(crate) fn close(&self) {
        self.inner.sender.lock().take();
    }

    fn enqueue(&self, command: Command) -> Result<()> {
        let rejected = {
            let guard = self.inner.sender.lock();
            match guard.as_ref() {
                Some(sender) if self.inner.state.get().accepts_work() => {
                    sender.send(command).err().map(|error| error.0)
                }
                _ => Some(command),
            }
        };

        match rejected {
            None => Ok(()),
            Some(command) => {
                drop(command);
                Err(Error::InactiveWorker {
                    worker: self.inner.worker.to_string(),
                    state: self.inner.state.get(),
                })
            }
        }
    }
}

impl fmt::Debug for Submitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Submitter")
            .field("worker", &self.inner.worker)
            .field("active", &self.is_active())
            .finish()
    }
}
