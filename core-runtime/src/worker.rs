//! # Async Worker
//!
//! A dedicated OS thread that owns a single-threaded cooperative loop (a
//! current-thread Tokio runtime driving a `LocalSet`) for its whole life.
//!
//! ## Lifecycle
//!
//! 1. Construct with a [`WorkerConfig`] and register notifications.
//! 2. [`AsyncWorker::start`] seals the registry and spawns the thread.
//! 3. Submit tasks and callbacks from any thread.
//! 4. [`AsyncWorker::quit`] asks the loop to stop; the worker thread runs the
//!    shutdown sequence and fires `finished`.
//! 5. [`AsyncWorker::wait`] joins the thread.
//!
//! A stopped worker cannot be restarted.

use crate::config::WorkerConfig;
use crate::context::{self, LoopShared};
use crate::error::{Error, Result};
use crate::events::{FinishedSignal, Notification, Registry, SealedRegistry, Subscriber};
use crate::gate::{Command, Submitter};
use crate::shutdown::ShutdownSequencer;
use crate::state::{StateCell, WorkerState};
use crate::task::{TaskHandle, TaskOptions};
use crate::LoopContext;
use bridge_traits::dispatch::ThreadDispatcher;
use core_async::runtime::{self, Runtime};
use core_async::sync::{mpsc, CancellationToken};
use core_async::task::LocalSet;
use std::fmt;
use std::future::Future;
use parking_lot::Mutex;
use std::rc::Rc;
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;
use tracing::{debug, error, info, info_span, warn};

/// Handle to a worker thread and its cooperative loop.
///
/// `AsyncWorker` is `Send + Sync`; share it behind an `Arc` or hand out
/// [`Submitter`]s to code that only needs to submit work.
pub struct AsyncWorker {
    name: Arc<str>,
    config: WorkerConfig,
    state: Arc<StateCell>,
    submitter: Submitter,
    receiver: Mutex<Option<mpsc::UnboundedReceiver<Command>>>,
    root: CancellationToken,
    registry: Registry,
    finished: Arc<FinishedSignal>,
    thread: Mutex<Option<JoinHandle<()>>>,
    thread_id: OnceLock<ThreadId>,
}

impl AsyncWorker {
    /// Create an idle worker.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `config` does not validate.
    pub fn new(config: WorkerConfig) -> Result<Self> {
        config.validate()?;

        let name: Arc<str> = Arc::from(config.thread_name.as_str());
        let state = Arc::new(StateCell::new());
        let root = CancellationToken::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        let submitter = Submitter::new(
            Arc::clone(&name),
            sender,
            root.clone(),
            config.log_exceptions,
            Arc::clone(&state),
        );

        Ok(Self {
            name,
            config,
            state,
            submitter,
            receiver: Mutex::new(Some(receiver)),
            root,
            registry: Registry::new(),
            finished: Arc::new(FinishedSignal::new()),
            thread: Mutex::new(None),
            thread_id: OnceLock::new(),
        })
    }

    /// Name of the worker thread.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> WorkerState {
        self.state.get()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Subscribe to `notification`. Only allowed before [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// - [`Error::RegistrySealed`] once the worker has started
    /// - [`Error::DuplicateName`] if another descriptor uses the same name
    /// - [`Error::InvalidNotification`] if the descriptor has no name
    pub fn register(&self, notification: &Notification, subscriber: Subscriber) -> Result<()> {
        self.registry.register(notification, subscriber)
    }

    /// Seal the registry and spawn the worker thread.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyStarted`] on any call after the first
    /// - [`Error::Runtime`] / [`Error::Spawn`] if the runtime or thread
    ///   cannot be created; the worker is then stopped
    pub fn start(&self) -> Result<()> {
        self.state
            .advance(&[WorkerState::Idle], WorkerState::Starting)
            .map_err(|state| Error::AlreadyStarted {
                worker: self.name.to_string(),
                state,
            })?;

        let registry = self.registry.seal();
        let receiver = self.receiver.lock().take().ok_or_else(|| {
            self.abort_start();
            Error::Internal("command receiver already taken".to_string())
        })?;

        let runtime = runtime::current_thread(self.config.max_blocking_threads).map_err(|e| {
            self.abort_start();
            Error::Runtime(e)
        })?;

        let notifications = registry.len();
        let worker_loop = WorkerLoop {
            name: Arc::clone(&self.name),
            state: Arc::clone(&self.state),
            submitter: self.submitter.clone(),
            finished: Arc::clone(&self.finished),
            root: self.root.clone(),
            config: self.config.clone(),
            registry,
            receiver,
            runtime,
        };

        let handle = thread::Builder::new()
            .name(self.config.thread_name.clone())
            .spawn(move || worker_loop.run())
            .map_err(|e| {
                self.abort_start();
                Error::Spawn(e)
            })?;

        let _ = self.thread_id.set(handle.thread().id());
        *self.thread.lock() = Some(handle);

        info!(worker = %self.name, notifications, "Worker started");
        Ok(())
    }

    fn abort_start(&self) {
        self.submitter.close();
        let _ = self.state.advance(
            &[WorkerState::Starting, WorkerState::Stopping],
            WorkerState::Stopped,
        );
        error!(worker = %self.name, "Worker failed to start");
    }

    /// Cloneable submission handle for other threads.
    pub fn submitter(&self) -> Submitter {
        self.submitter.clone()
    }

    /// See [`Submitter::submit_task`].
    pub fn submit_task<F, Fut, T>(&self, work: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(LoopContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        self.submitter.submit_task(work)
    }

    /// See [`Submitter::submit_task_with`].
    pub fn submit_task_with<F, Fut, T>(&self, options: TaskOptions, work: F) -> Result<TaskHandle<T>>
    where
        F: FnOnce(LoopContext) -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<T>> + 'static,
        T: Send + 'static,
    {
        self.submitter.submit_task_with(options, work)
    }

    /// See [`Submitter::schedule_callback`].
    pub fn schedule_callback<F>(&self, callback: F) -> Result<()>
    where
        F: FnOnce(&LoopContext) + Send + 'static,
    {
        self.submitter.schedule_callback(callback)
    }

    /// See [`Submitter::request_stop`].
    pub fn request_stop(&self) -> Result<()> {
        self.submitter.request_stop()
    }

    /// Stop the worker. Same as [`request_stop`](Self::request_stop).
    pub fn quit(&self) -> Result<()> {
        info!(worker = %self.name, "Quitting worker");
        self.request_stop()
    }

    /// Block until the worker thread has exited.
    ///
    /// Returns `true` once the thread is gone (or was never started) and
    /// `false` if `timeout` elapsed first. Calling it from the worker thread
    /// itself returns `false` immediately.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        if self.state.get() == WorkerState::Idle {
            return true;
        }
        if self.thread_id.get() == Some(&thread::current().id()) {
            error!(worker = %self.name, "Worker cannot wait for itself");
            return false;
        }

        debug!(worker = %self.name, ?timeout, "Waiting for worker");
        if !self.state.wait_for(WorkerState::Stopped, timeout) {
            warn!(worker = %self.name, ?timeout, "Timed out waiting for worker");
            return false;
        }

        if let Some(handle) = self.thread.lock().take() {
            if handle.join().is_err() {
                error!(worker = %self.name, "Worker thread panicked");
            }
        }
        true
    }

    /// Run `callback` through `dispatcher` once the worker has finished.
    ///
    /// Allowed at any time. If the worker already finished, `callback` is
    /// posted immediately. Each callback runs exactly once.
    pub fn on_finished<F>(&self, dispatcher: Arc<dyn ThreadDispatcher>, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.finished.subscribe(dispatcher, Box::new(callback));
    }

    /// Whether `finished` has fired.
    pub fn is_finished(&self) -> bool {
        self.finished.has_fired()
    }
}

impl fmt::Debug for AsyncWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncWorker")
            .field("name", &self.name)
            .field("state", &self.state.get())
            .finish()
    }
}

impl Drop for AsyncWorker {
    fn drop(&mut self) {
        if self.state.get().accepts_work() && self.state.get() != WorkerState::Idle {
            warn!(worker = %self.name, "Worker dropped while running; requesting stop");
            let _ = self.submitter.request_stop();
        }
    }
}

/// Everything the worker thread takes ownership of.
struct WorkerLoop {
    name: Arc<str>,
    state: Arc<StateCell>,
    submitter: Submitter,
    finished: Arc<FinishedSignal>,
    root: CancellationToken,
    config: WorkerConfig,
    registry: SealedRegistry,
    receiver: mpsc::UnboundedReceiver<Command>,
    runtime: Runtime,
}

impl WorkerLoop {
    fn run(self) {
        let span = info_span!("worker", name = %self.name);
        let _entered = span.enter();

        let Self {
            name,
            state,
            submitter,
            finished,
            root,
            config,
            registry,
            mut receiver,
            runtime,
        } = self;

        let _ = state.advance(&[WorkerState::Starting], WorkerState::Running);
        debug!("Worker loop running");

        let shared = LoopShared::new(
            Arc::clone(&name),
            registry,
            root,
            Arc::clone(&config.exception_handler),
            config.log_exceptions,
        );
        let local = LocalSet::new();
        local.block_on(&runtime, run_loop(&shared, &mut receiver));

        submitter.close();
        let _ = state.advance(
            &[WorkerState::Starting, WorkerState::Running],
            WorkerState::Stopping,
        );
        debug!("Worker loop left run mode");

        let report = ShutdownSequencer::new(
            shared,
            local,
            runtime,
            receiver,
            config.blocking_shutdown_timeout,
        )
        .run();

        finished.fire();
        let _ = state.advance(&[WorkerState::Stopping], WorkerState::Stopped);
        info!(
            cancelled = report.cancelled_tasks,
            dropped = report.dropped_tasks,
            failures = report.failures,
            "Worker finished"
        );
    }
}

async fn run_loop(shared: &Rc<LoopShared>, receiver: &mut mpsc::UnboundedReceiver<Command>) {
    loop {
        let command = tokio::select! {
            biased;
            _ = shared.stop.notified() => break,
            command = receiver.recv() => command,
        };

        match command {
            Some(Command::Task(envelope)) => context::start_task(
                shared,
                envelope.id,
                envelope.token,
                envelope.log_exceptions,
                envelope.start,
            ),
            Some(Command::Callback(callback)) => context::run_callback(shared, callback),
            Some(Command::Stop) => {
                debug!("Stop request received");
                break;
            }
            None => break,
        }
    }
}
