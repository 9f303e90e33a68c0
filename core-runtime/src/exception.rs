//! # Exception Handling
//!
//! Failures that nobody awaits still have to go somewhere. Every unhandled
//! failure on the worker thread is routed to exactly one injected
//! [`ExceptionHandler`], tagged with where it came from:
//!
//! | Origin     | Message                                      |
//! |------------|----------------------------------------------|
//! | `Task`     | `unhandled exception in task`                |
//! | `Callback` | `unhandled exception in scheduled callback`  |
//! | `Shutdown` | `unhandled exception during shutdown`        |
//!
//! Failures are never raised on the submitting thread. Cancellation is not a
//! failure and never reaches the handler.

use crate::task::{TaskError, TaskId};
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

pub const TASK_EXCEPTION_MESSAGE: &str = "unhandled exception in task";
pub const CALLBACK_EXCEPTION_MESSAGE: &str = "unhandled exception in scheduled callback";
pub const SHUTDOWN_EXCEPTION_MESSAGE: &str = "unhandled exception during shutdown";

/// Where an unhandled failure was raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionOrigin {
    /// A submitted or spawned task failed while the loop was running
    Task,
    /// A scheduled callback panicked
    Callback,
    /// A task failed while the shutdown sequencer was draining the loop
    Shutdown,
}

impl ExceptionOrigin {
    pub fn message(self) -> &'static str {
        match self {
            Self::Task => TASK_EXCEPTION_MESSAGE,
            Self::Callback => CALLBACK_EXCEPTION_MESSAGE,
            Self::Shutdown => SHUTDOWN_EXCEPTION_MESSAGE,
        }
    }
}

/// Everything known about an unhandled failure.
#[derive(Debug, Clone)]
pub struct ExceptionContext {
    pub message: &'static str,
    pub origin: ExceptionOrigin,
    /// Name of the worker the failure happened on
    pub worker: String,
    /// Failing task, absent for callbacks
    pub task: Option<TaskId>,
    pub error: TaskError,
}

impl ExceptionContext {
    pub fn new(
        origin: ExceptionOrigin,
        worker: impl Into<String>,
        task: Option<TaskId>,
        error: TaskError,
    ) -> Self {
        Self {
            message: origin.message(),
            origin,
            worker: worker.into(),
            task,
            error,
        }
    }
}

/// Receiver of unhandled failures.
///
/// Called on the worker thread. A handler that panics is logged and does not
/// affect the loop.
pub trait ExceptionHandler: Send + Sync {
    fn handle(&self, context: &ExceptionContext);
}

/// Default handler: logs every failure at error level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingExceptionHandler;

impl ExceptionHandler for LoggingExceptionHandler {
    fn handle(&self, context: &ExceptionContext) {
        match context.task {
            Some(task) => error!(
                worker = %context.worker,
                task = %task,
                origin = ?context.origin,
                error = %context.error,
                "{}",
                context.message
            ),
            None => error!(
                worker = %context.worker,
                origin = ?context.origin,
                error = %context.error,
                "{}",
                context.message
            ),
        }
    }
}

pub(crate) fn report(handler: &dyn ExceptionHandler, context: ExceptionContext) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&context))) {
        error!(
            worker = %context.worker,
            error = %context.error,
            handler_error = %TaskError::from_panic(payload),
            "Exception handler panicked while reporting: {}",
            context.message
        );
    }
}
