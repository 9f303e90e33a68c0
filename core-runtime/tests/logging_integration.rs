//! Integration tests for the logging system.
//!
//! A global subscriber can only be installed once per process, so everything
//! that needs one lives in a single test.

use async_trait::async_trait;
use bridge_traits::error::Result as SinkResult;
use bridge_traits::logging::{LogEntry, LogLevel, LoggerSink};
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::{AsyncWorker, WorkerConfig};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

#[derive(Default)]
struct RecordingSink {
    entries: Mutex<Vec<LogEntry>>,
}

#[async_trait]
impl LoggerSink for RecordingSink {
    async fn log(&self, entry: LogEntry) -> SinkResult<()> {
        self.entries.lock().push(entry);
        Ok(())
    }
}

#[test]
fn test_config_builder_chaining() {
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Warn)
        .with_filter("core_runtime=trace")
        .with_thread_info(false);

    assert_eq!(config.format, LogFormat::Compact);
    assert_eq!(config.level, LogLevel::Warn);
    assert_eq!(config.filter.as_deref(), Some("core_runtime=trace"));
    assert!(!config.display_thread_info);
    assert!(!config.enable_spans);
}

#[test]
fn test_worker_events_reach_sink_with_thread_names() {
    let sink = Arc::new(RecordingSink::default());
    let config = LoggingConfig::default()
        .with_format(LogFormat::Compact)
        .with_level(LogLevel::Debug)
        .with_logger_sink(sink.clone());
    init_logging(config).unwrap();

    let second = init_logging(LoggingConfig::default());
    assert!(second.is_err());

    let worker = AsyncWorker::new(
        WorkerConfig::builder()
            .thread_name("LoggedWorker")
            .build()
            .unwrap(),
    )
    .unwrap();
    worker.start().unwrap();
    worker.quit().unwrap();
    assert!(worker.wait(Some(Duration::from_secs(10))));

    let entries = sink.entries.lock();
    let started = entries
        .iter()
        .find(|entry| entry.message == "Worker started")
        .unwrap();
    assert_eq!(started.level, LogLevel::Info);
    assert_eq!(started.fields.get("worker").map(String::as_str), Some("LoggedWorker"));

    let finished = entries
        .iter()
        .find(|entry| entry.message == "Worker finished")
        .unwrap();
    assert_eq!(finished.thread.as_deref(), Some("LoggedWorker"));
    assert_eq!(finished.span.as_deref(), Some("worker"));
    assert!(entries.iter().all(|entry| entry.level >= LogLevel::Info));
}
