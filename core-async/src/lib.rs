//! Async runtime building blocks for Desk Worker.
//!
//! This crate is the single place where the workspace touches the executor.
//! Every other crate reaches Tokio through the re-exports below, so the
//! runtime flavour used by worker threads is decided here and nowhere else.
//!
//! # Architecture
//!
//! Worker threads own a *current-thread* runtime and a [`task::LocalSet`].
//! Work submitted from other threads is turned into `!Send` local tasks on
//! that thread, which gives run-to-completion semantics: nothing preempts a
//! task between two suspension points.
//!
//! # Modules
//!
//! - `runtime`: Builders for the single-threaded runtime
//! - `task`: Local task spawning, join handles and task tracking
//! - `time`: Time-related operations (sleep, timeout, instant)
//! - `sync`: Synchronization primitives (channels, notify, cancellation)
//!
//! # Examples
//!
//! ```rust
//! use core_async::runtime;
//! use core_async::task::{spawn_local, LocalSet};
//!
//! let rt = runtime::current_thread(1).unwrap();
//! let local = LocalSet::new();
//! let value = local.block_on(&rt, async {
//!     spawn_local(async { 21 * 2 }).await.unwrap()
//! });
//! assert_eq!(value, 42);
//! ```

pub mod runtime;
pub mod sync;
pub mod task;
pub mod time;

// Re-export commonly used types at crate root for convenience
pub use task::{spawn_local, LocalSet};
pub use time::{sleep, Duration, Instant};
