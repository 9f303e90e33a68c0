//! Host application: a main-thread event loop plus one worker.
//!
//! The host thread calls [`Application::exec`], which starts the worker and
//! runs the event loop until the application quits. Quitting stops the
//! worker first; the host loop only returns once the worker has reported
//! `finished`, so every notification the worker emitted on the way down has
//! been delivered by the time `exec` returns.

use crate::error::{CoreError, Result};
use bridge_desktop::{EventLoop, LoopDispatcher};
use core_runtime::{AsyncWorker, WorkerConfig};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, info};

const HOST_LOOP_LABEL: &str = "main";

/// Owns the host event loop and the worker it serves.
///
/// Create it on the thread that will call [`exec`](Self::exec).
pub struct Application {
    event_loop: EventLoop,
    worker: Arc<AsyncWorker>,
    quit: QuitHandle,
}

impl Application {
    /// Create an application whose worker uses `config`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Runtime`] if the worker configuration is invalid.
    pub fn new(config: WorkerConfig) -> Result<Self> {
        let event_loop = EventLoop::new(HOST_LOOP_LABEL);
        let worker = Arc::new(AsyncWorker::new(config)?);
        let quit = QuitHandle {
            worker: Arc::clone(&worker),
            host: event_loop.dispatcher(),
            armed: Arc::new(AtomicBool::new(false)),
        };

        Ok(Self {
            event_loop,
            worker,
            quit,
        })
    }

    pub fn worker(&self) -> &Arc<AsyncWorker> {
        &self.worker
    }

    /// Dispatcher that delivers onto the host loop.
    ///
    /// Use it when subscribing host-side code to worker notifications.
    pub fn dispatcher(&self) -> LoopDispatcher {
        self.event_loop.dispatcher()
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.event_loop
    }

    /// Cloneable handle that quits the application from any thread.
    pub fn quit_handle(&self) -> QuitHandle {
        self.quit.clone()
    }

    /// Stop the worker, then the host loop. See [`QuitHandle::quit`].
    pub fn quit(&self) -> Result<()> {
        self.quit.quit()
    }

    /// Quit the application when the process receives Ctrl-C.
    ///
    /// The signal is awaited on a dedicated thread with its own runtime.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InitializationFailed`] if the listener thread or
    /// its runtime cannot be created.
    pub fn quit_on_interrupt(&self) -> Result<()> {
        let runtime = core_async::runtime::current_thread(1)
            .map_err(|e| CoreError::InitializationFailed(format!("signal runtime: {}", e)))?;
        let quit = self.quit_handle();

        thread::Builder::new()
            .name("interrupt-listener".to_string())
            .spawn(move || match runtime.block_on(tokio::signal::ctrl_c()) {
                Ok(()) => {
                    info!("Interrupt received, quitting");
                    if let Err(e) = quit.quit() {
                        error!(error = %e, "Failed to quit after interrupt");
                    }
                }
                Err(e) => error!(error = %e, "Unable to listen for interrupts"),
            })
            .map_err(|e| CoreError::InitializationFailed(format!("signal listener: {}", e)))?;
        Ok(())
    }

    /// Start the worker and run the host loop until the application quits.
    ///
    /// Returns the host loop's exit code. If the loop was quit directly
    /// (through [`LoopDispatcher::quit`]) while the worker was still running,
    /// the worker is stopped and joined before returning.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Runtime`] if the worker cannot be started,
    /// including when `exec` is called a second time.
    pub fn exec(&self) -> Result<i32> {
        self.worker.start()?;
        info!(worker = %self.worker.name(), "Application running");

        let code = self.event_loop.run();

        if !self.worker.is_finished() {
            debug!("Host loop left before the worker finished");
            self.worker.quit()?;
        }
        self.worker.wait(None);
        let flushed = self.event_loop.process_pending();
        if flushed > 0 {
            debug!(flushed, "Delivered late notifications");
        }

        info!(code, "Application exited");
        Ok(code)
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("event_loop", &self.event_loop)
            .field("worker", &self.worker)
            .finish()
    }
}

/// Quits an [`Application`] from any thread, including the worker.
#[derive(Clone)]
pub struct QuitHandle {
    worker: Arc<AsyncWorker>,
    host: LoopDispatcher,
    armed: Arc<AtomicBool>,
}

impl QuitHandle {
    /// Stop the worker and quit the host loop with code 0 once the worker
    /// has finished.
    ///
    /// Repeated calls are no-ops. Quitting before `exec` makes `exec`
    /// return as soon as the worker has started and stopped again.
    pub fn quit(&self) -> Result<()> {
        if self.armed.swap(true, Ordering::SeqCst) {
            debug!("Quit already requested");
            return Ok(());
        }

        let host = self.host.clone();
        self.worker
            .on_finished(Arc::new(self.host.clone()), move || {
                host.quit(0);
            });
        self.worker.quit()?;
        Ok(())
    }
}

impl fmt::Debug for QuitHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QuitHandle")
            .field("worker", &self.worker.name())
            .field("armed", &self.armed.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quit_before_exec_returns_promptly() {
        let app = Application::new(WorkerConfig::default()).unwrap();
        app.quit().unwrap();
        app.quit().unwrap();

        assert_eq!(app.exec().unwrap(), 0);
        assert!(app.worker().is_finished());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = WorkerConfig {
            max_blocking_threads: 0,
            ..WorkerConfig::default()
        };
        assert!(matches!(Application::new(config), Err(CoreError::Runtime(_))));
    }
}
