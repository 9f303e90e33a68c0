#![allow(dead_code)]

use bridge_desktop::{DirectDispatcher, EventLoop, LoopDispatcher};
use core_runtime::{
    AsyncWorker, ExceptionContext, ExceptionHandler, ExceptionOrigin, WorkerConfig,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Exception handler that keeps every report.
#[derive(Default)]
pub struct RecordingHandler {
    reports: Mutex<Vec<ExceptionContext>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reports(&self) -> Vec<ExceptionContext> {
        self.reports.lock().clone()
    }

    pub fn origins(&self) -> Vec<ExceptionOrigin> {
        self.reports().iter().map(|report| report.origin).collect()
    }
}

impl ExceptionHandler for RecordingHandler {
    fn handle(&self, context: &ExceptionContext) {
        self.reports.lock().push(context.clone());
    }
}

pub fn worker_with(handler: Arc<RecordingHandler>) -> AsyncWorker {
    let config = WorkerConfig::builder()
        .thread_name("TestWorker")
        .exception_handler(handler)
        .build()
        .unwrap();
    AsyncWorker::new(config).unwrap()
}

/// Counts `finished` deliveries, run inline on the worker thread.
pub fn count_finished(worker: &AsyncWorker) -> Arc<AtomicUsize> {
    let count = Arc::new(AtomicUsize::new(0));
    let counter = count.clone();
    worker.on_finished(Arc::new(DirectDispatcher::new()), move || {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    count
}

pub fn stop_and_wait(worker: &AsyncWorker) {
    worker.quit().unwrap();
    assert!(worker.wait(Some(TIMEOUT)), "worker did not stop in time");
}

/// A thread running its own event loop, standing in for a GUI thread.
pub struct LoopThread {
    pub dispatcher: LoopDispatcher,
    handle: JoinHandle<i32>,
}

impl LoopThread {
    pub fn spawn(name: &str) -> Self {
        let (tx, rx) = mpsc::channel();
        let label = name.to_string();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                let event_loop = EventLoop::new(label);
                tx.send(event_loop.dispatcher()).unwrap();
                event_loop.run()
            })
            .unwrap();
        let dispatcher = rx.recv().unwrap();
        Self { dispatcher, handle }
    }

    /// Quit after everything already posted has run.
    pub fn finish(self) -> i32 {
        self.dispatcher.quit(0);
        self.handle.join().unwrap()
    }
}
