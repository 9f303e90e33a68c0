//! Thread-Affine Queued Dispatch
//!
//! The worker never calls subscriber code directly. It hands a job to the
//! dispatcher that belongs to the subscriber's thread, and that thread runs
//! the job from its own message loop. This is the host's equivalent of
//! posting an event to a thread's run loop.

use crate::error::Result;

/// A unit of work queued onto another thread's message loop.
pub type DispatchJob = Box<dyn FnOnce() + Send + 'static>;

/// Queued-dispatch primitive supplied by the host.
///
/// Implementations must run posted jobs on the thread they are bound to, one
/// at a time, in the order they were posted. Two guarantees follow for
/// subscribers reached through the same dispatcher:
/// - deliveries arrive in posting order (FIFO)
/// - a subscriber never executes concurrently with itself
///
/// # Platform Notes
///
/// - **Desktop GUI toolkits**: wrap the toolkit's "invoke on main thread" call
/// - **Headless hosts**: use `bridge_desktop::EventLoop`
/// - **Direct delivery**: `bridge_desktop::DirectDispatcher` runs jobs inline on
///   the posting thread
///
/// # Example
///
/// ```ignore
/// use bridge_traits::dispatch::ThreadDispatcher;
///
/// fn notify(dispatcher: &dyn ThreadDispatcher) {
///     dispatcher
///         .post(Box::new(|| println!("running on the subscriber's thread")))
///         .ok();
/// }
/// ```
pub trait ThreadDispatcher: Send + Sync {
    /// Queue `job` for execution on the bound thread.
    ///
    /// Must not block waiting for the job to run.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::DispatcherClosed`](crate::BridgeError::DispatcherClosed)
    /// once the bound thread's loop no longer accepts work.
    fn post(&self, job: DispatchJob) -> Result<()>;

    /// Human-readable label used in diagnostics.
    fn label(&self) -> String {
        "dispatcher".to_string()
    }
}
