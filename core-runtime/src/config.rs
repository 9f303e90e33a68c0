//! # Worker Configuration
//!
//! Builder-based configuration for [`AsyncWorker`](crate::AsyncWorker).
//!
//! ## Overview
//!
//! `WorkerConfig` carries everything the worker needs before its thread
//! exists: the thread name shown in logs, the default exception-logging
//! policy for submitted tasks, the injected [`ExceptionHandler`], and the
//! sizing of the blocking pool attached to the worker's runtime.
//! [`WorkerConfigBuilder::build`] validates eagerly so that bad settings
//! surface at construction time rather than on the worker thread.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::WorkerConfig;
//! use std::time::Duration;
//!
//! let config = WorkerConfig::builder()
//!     .thread_name("IndexerThread")
//!     .max_blocking_threads(2)
//!     .blocking_shutdown_timeout(Duration::from_secs(5))
//!     .build()?;
//! ```

use crate::error::{Error, Result};
use crate::exception::{ExceptionHandler, LoggingExceptionHandler};
use std::sync::Arc;
use std::time::Duration;

/// Thread name used when none is configured.
pub const DEFAULT_THREAD_NAME: &str = "AsyncWorkerThread";

/// Upper bound on threads in the worker's blocking pool.
pub const DEFAULT_MAX_BLOCKING_THREADS: usize = 16;

/// How long shutdown waits for blocking jobs before abandoning them.
pub const DEFAULT_BLOCKING_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for a single worker.
///
/// Use [`WorkerConfig::builder`] for validated construction; the `Default`
/// value is always valid.
#[derive(Clone)]
pub struct WorkerConfig {
    /// Name given to the worker's OS thread
    pub thread_name: String,

    /// Whether task failures reach the exception handler unless overridden
    /// per task
    pub log_exceptions: bool,

    /// Receives every unhandled failure from tasks, callbacks and shutdown
    pub exception_handler: Arc<dyn ExceptionHandler>,

    /// Maximum number of threads in the blocking pool
    pub max_blocking_threads: usize,

    /// Grace period for blocking jobs when the runtime is closed
    pub blocking_shutdown_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            thread_name: DEFAULT_THREAD_NAME.to_string(),
            log_exceptions: true,
            exception_handler: Arc::new(LoggingExceptionHandler),
            max_blocking_threads: DEFAULT_MAX_BLOCKING_THREADS,
            blocking_shutdown_timeout: DEFAULT_BLOCKING_SHUTDOWN_TIMEOUT,
        }
    }
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("thread_name", &self.thread_name)
            .field("log_exceptions", &self.log_exceptions)
            .field("exception_handler", &"ExceptionHandler { ... }")
            .field("max_blocking_threads", &self.max_blocking_threads)
            .field("blocking_shutdown_timeout", &self.blocking_shutdown_timeout)
            .finish()
    }
}

impl WorkerConfig {
    /// Creates a new builder for constructing a `WorkerConfig`.
    ///
    /// # Examples
    ///
    /// ```
    /// use core_runtime::config::WorkerConfig;
    ///
    /// let config = WorkerConfig::builder()
    ///     .thread_name("ScannerThread")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.thread_name, "ScannerThread");
    /// ```
    pub fn builder() -> WorkerConfigBuilder {
        WorkerConfigBuilder::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if the thread name is empty or contains a
    /// NUL byte, or if the blocking pool is sized to zero threads.
    pub fn validate(&self) -> Result<()> {
        if self.thread_name.trim().is_empty() {
            return Err(Error::Config(
                "Worker thread name must not be empty".to_string(),
            ));
        }

        if self.thread_name.contains('\0') {
            return Err(Error::Config(format!(
                "Worker thread name must not contain NUL bytes: {:?}",
                self.thread_name
            )));
        }

        if self.max_blocking_threads == 0 {
            return Err(Error::Config(
                "max_blocking_threads must be greater than zero. \
                 The worker needs at least one thread for blocking jobs."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

/// Builder for constructing [`WorkerConfig`] instances.
#[derive(Default)]
pub struct WorkerConfigBuilder {
    thread_name: Option<String>,
    log_exceptions: Option<bool>,
    exception_handler: Option<Arc<dyn ExceptionHandler>>,
    max_blocking_threads: Option<usize>,
    blocking_shutdown_timeout: Option<Duration>,
}

impl WorkerConfigBuilder {
    /// Sets the worker thread name.
    ///
    /// Default: `"AsyncWorkerThread"`
    pub fn thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    /// Sets whether task failures are reported by default.
    ///
    /// Individual tasks can override this through
    /// [`TaskOptions`](crate::task::TaskOptions).
    pub fn log_exceptions(mut self, enabled: bool) -> Self {
        self.log_exceptions = Some(enabled);
        self
    }

    /// Sets the handler for unhandled failures.
    ///
    /// Default: [`LoggingExceptionHandler`], which logs through `tracing`.
    pub fn exception_handler(mut self, handler: Arc<dyn ExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    /// Sets the maximum number of blocking-pool threads.
    pub fn max_blocking_threads(mut self, threads: usize) -> Self {
        self.max_blocking_threads = Some(threads);
        self
    }

    /// Sets how long shutdown waits for running blocking jobs.
    pub fn blocking_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.blocking_shutdown_timeout = Some(timeout);
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when validation fails.
    pub fn build(self) -> Result<WorkerConfig> {
        let defaults = WorkerConfig::default();
        let config = WorkerConfig {
            thread_name: self.thread_name.unwrap_or(defaults.thread_name),
            log_exceptions: self.log_exceptions.unwrap_or(defaults.log_exceptions),
            exception_handler: self
                .exception_handler
                .unwrap_or(defaults.exception_handler),
            max_blocking_threads: self
                .max_blocking_threads
                .unwrap_or(defaults.max_blocking_threads),
            blocking_shutdown_timeout: self
                .blocking_shutdown_timeout
                .unwrap_or(defaults.blocking_shutdown_timeout),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exception::ExceptionContext;

    struct SilentHandler;

    impl ExceptionHandler for SilentHandler {
        fn handle(&self, _context: &ExceptionContext) {}
    }

    #[test]
    fn test_defaults() {
        let config = WorkerConfig::builder().build().unwrap();
        assert_eq!(config.thread_name, DEFAULT_THREAD_NAME);
        assert!(config.log_exceptions);
        assert_eq!(config.max_blocking_threads, DEFAULT_MAX_BLOCKING_THREADS);
        assert_eq!(
            config.blocking_shutdown_timeout,
            DEFAULT_BLOCKING_SHUTDOWN_TIMEOUT
        );
    }

    #[test]
    fn test_builder_overrides() {
        let config = WorkerConfig::builder()
            .thread_name("ScannerThread")
            .log_exceptions(false)
            .exception_handler(Arc::new(SilentHandler))
            .max_blocking_threads(2)
            .blocking_shutdown_timeout(Duration::from_millis(250))
            .build()
            .unwrap();

        assert_eq!(config.thread_name, "ScannerThread");
        assert!(!config.log_exceptions);
        assert_eq!(config.max_blocking_threads, 2);
        assert_eq!(config.blocking_shutdown_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_empty_thread_name_rejected() {
        let result = WorkerConfig::builder().thread_name("  ").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_nul_in_thread_name_rejected() {
        let result = WorkerConfig::builder().thread_name("bad\0name").build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("NUL")));
    }

    #[test]
    fn test_zero_blocking_threads_rejected() {
        let result = WorkerConfig::builder().max_blocking_threads(0).build();
        assert!(matches!(result, Err(Error::Config(msg)) if msg.contains("max_blocking_threads")));
    }

    #[test]
    fn test_debug_hides_handler() {
        let rendered = format!("{:?}", WorkerConfig::default());
        assert!(rendered.contains("ExceptionHandler { ... }"));
        assert!(rendered.contains(DEFAULT_THREAD_NAME));
    }
}
