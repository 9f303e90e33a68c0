//! # Core Runtime
//!
//! A worker thread that owns a single-threaded cooperative task loop, bridged
//! to the host's own threads:
//! - Thread-safe submission of tasks and callbacks ([`Submitter`])
//! - Named notifications re-broadcast to subscriber threads ([`events`])
//! - Deterministic teardown ([`shutdown`])
//! - Logging, configuration and error infrastructure
//!
//! ## Overview
//!
//! ```text
//! caller thread ──▶ Submission Gate ──▶ Cooperative Loop (worker thread)
//!                                              │
//!                                              ▼ emit
//! subscriber thread ◀── queued dispatch ◀── Notification Registry
//! ```
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::{AsyncWorker, WorkerConfig};
//!
//! let worker = AsyncWorker::new(WorkerConfig::default())?;
//! worker.start()?;
//!
//! let handle = worker.submit_task(|ctx| async move {
//!     Ok(format!("hello from {}", ctx.worker_name()))
//! })?;
//! let greeting = handle.wait().completed();
//!
//! worker.quit()?;
//! assert!(worker.wait(None));
//! ```

pub mod config;
mod context;
pub mod error;
pub mod events;
pub mod exception;
mod gate;
pub mod logging;
pub mod shutdown;
mod state;
pub mod task;
mod worker;

pub use config::{WorkerConfig, WorkerConfigBuilder};
pub use context::LoopContext;
pub use error::{Error, Result};
pub use events::{Notification, Subscriber, Value, ValueType};
pub use exception::{
    ExceptionContext, ExceptionHandler, ExceptionOrigin, LoggingExceptionHandler,
    CALLBACK_EXCEPTION_MESSAGE, SHUTDOWN_EXCEPTION_MESSAGE, TASK_EXCEPTION_MESSAGE,
};
pub use gate::Submitter;
pub use shutdown::ShutdownReport;
pub use state::WorkerState;
pub use task::{
    TaskError, TaskHandle, TaskId, TaskOptions, TaskOutcome, TaskPanic, TaskResolution,
};
pub use worker::AsyncWorker;
