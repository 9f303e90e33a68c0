//! Task spawning and execution abstractions.
//!
//! Worker threads run `!Send` futures on a [`LocalSet`]. Local tasks are
//! polled in the order they were woken, which is what gives submitted work
//! its FIFO start order.
//!
//! [`TaskTracker`] is re-exported so the owner of a loop can wait for every
//! task it spawned, including tasks spawned while it is already waiting.
//!
//! # Examples
//!
//! ```rust
//! use core_async::runtime;
//! use core_async::task::{spawn_local, LocalSet, TaskTracker};
//!
//! let rt = runtime::current_thread(1).unwrap();
//! let local = LocalSet::new();
//! let tracker = TaskTracker::new();
//!
//! local.block_on(&rt, async {
//!     spawn_local(tracker.track_future(async { /* work */ }));
//!     tracker.close();
//!     tracker.wait().await;
//! });
//! ```

pub use tokio::task::{
    spawn_blocking, spawn_local, yield_now, JoinError, JoinHandle, LocalSet,
};
pub use tokio_util::task::TaskTracker;

pub use futures::future::{FutureExt, LocalBoxFuture};

/// Result type for task operations.
pub type Result<T> = std::result::Result<T, JoinError>;
