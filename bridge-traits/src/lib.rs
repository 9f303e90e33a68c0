//! # Host Bridge Traits
//!
//! Capabilities the host application must provide to the worker core.
//!
//! ## Overview
//!
//! The worker core owns its own thread and its own cooperative loop, but it
//! cannot know how the host's threads process events. Everything it needs
//! from the host is expressed as a trait in this crate and injected at
//! construction time.
//!
//! ## Traits
//!
//! - [`ThreadDispatcher`](dispatch::ThreadDispatcher) - Queue a job onto a
//!   specific thread's own message loop (thread-affine delivery)
//! - [`LoggerSink`](logging::LoggerSink) - Mirror structured logs into the
//!   host logging pipeline
//!
//! ## Implementations
//!
//! | Host     | Implementation Crate |
//! |----------|----------------------|
//! | Desktop  | `bridge-desktop`     |
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). A dispatcher
//! whose thread has stopped processing events reports
//! `BridgeError::DispatcherClosed`; the core logs it and moves on instead of
//! failing the emitting task.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync`: the worker thread calls them.

pub mod dispatch;
pub mod error;
pub mod logging;

pub use error::BridgeError;

// Re-export commonly used types
pub use dispatch::{DispatchJob, ThreadDispatcher};
pub use logging::{ConsoleLogger, LogEntry, LogLevel, LoggerSink};
