//! Synchronization primitives.
//!
//! All primitives are `Send + Sync` and may be shared across threads. The
//! unbounded `mpsc` channel is the thread-safe enqueue primitive worker
//! threads read their commands from; [`CancellationToken`] carries the
//! cooperative cancellation flag of a task.
//!
//! # Examples
//!
//! ```rust
//! use core_async::sync::CancellationToken;
//!
//! let root = CancellationToken::new();
//! let child = root.child_token();
//! root.cancel();
//! assert!(child.is_cancelled());
//! ```

pub use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex, Notify, RwLock};
pub use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
