//! Runtime utilities that abstract over the underlying async executor.
//!
//! Downstream crates never build Tokio runtimes themselves. Dedicated loop
//! threads call [`current_thread`], everything else that merely needs to
//! drive a future to completion calls [`block_on`].

use std::io;

pub use tokio::runtime::{Builder, Handle, Runtime};

/// Builds the single-threaded runtime a worker thread drives.
///
/// The runtime has timers and I/O enabled. `max_blocking_threads` bounds the
/// pool used by `spawn_blocking`, which plays the role of the loop's default
/// background executor.
///
/// # Errors
///
/// Returns the I/O error reported by Tokio when the runtime's drivers cannot
/// be created.
pub fn current_thread(max_blocking_threads: usize) -> io::Result<Runtime> {
    Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(max_blocking_threads)
        .build()
}

/// Runs the provided future to completion on the calling thread.
///
/// Uses the lightweight executor from `futures`, so it is safe to call from
/// any thread, including one that is already inside a Tokio runtime. The
/// future must not depend on Tokio's timer or I/O drivers.
pub fn block_on<F>(future: F) -> F::Output
where
    F: std::future::Future,
{
    futures::executor::block_on(future)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_thread_runtime_runs_futures() {
        let rt = current_thread(2).unwrap();
        let value = rt.block_on(async {
            tokio::time::sleep(std::time::Duration::from_millis(1)).await;
            7
        });
        assert_eq!(value, 7);
    }

    #[test]
    fn test_block_on_inside_runtime_thread() {
        let rt = current_thread(1).unwrap();
        let value = rt.block_on(async { block_on(async { 5 }) });
        assert_eq!(value, 5);
    }
}
