//! Thread-affine message loop for desktop hosts.
//!
//! [`EventLoop`] is the host-side counterpart of the worker: a queue of jobs
//! drained by whichever thread calls [`EventLoop::run`]. Its
//! [`LoopDispatcher`] is the `ThreadDispatcher` handed to the worker so that
//! notifications land on that thread.

use bridge_traits::{
    dispatch::{DispatchJob, ThreadDispatcher},
    error::{BridgeError, Result},
};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error};

enum LoopMessage {
    Job(DispatchJob),
    Quit(i32),
}

/// A message loop bound to the thread that runs it.
///
/// Jobs posted through a [`LoopDispatcher`] are executed one at a time, in
/// posting order, by the thread currently inside [`run`](Self::run),
/// [`run_for`](Self::run_for), [`run_until`](Self::run_until) or
/// [`process_pending`](Self::process_pending). A panicking job is logged and
/// does not stop the loop.
///
/// The loop can be created on one thread and moved to the thread that will
/// run it; it cannot be shared between threads.
pub struct EventLoop {
    label: Arc<str>,
    sender: Sender<LoopMessage>,
    receiver: Receiver<LoopMessage>,
    pending_quit: Cell<Option<i32>>,
}

impl EventLoop {
    /// Create a loop identified by `label` in diagnostics.
    pub fn new(label: impl Into<String>) -> Self {
        let (sender, receiver) = unbounded();
        Self {
            label: Arc::from(label.into()),
            sender,
            receiver,
            pending_quit: Cell::new(None),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Handle that queues work onto this loop from any thread.
    pub fn dispatcher(&self) -> LoopDispatcher {
        LoopDispatcher {
            label: Arc::clone(&self.label),
            sender: self.sender.clone(),
        }
    }

    /// Run until a quit request is processed and return its exit code.
    pub fn run(&self) -> i32 {
        debug!(event_loop = %self.label, "Event loop running");
        if let Some(code) = self.pending_quit.take() {
            return code;
        }
        loop {
            // The loop owns a sender, so the channel cannot disconnect here.
            match self.receiver.recv() {
                Ok(LoopMessage::Job(job)) => self.execute(job),
                Ok(LoopMessage::Quit(code)) => {
                    debug!(event_loop = %self.label, code, "Event loop quit");
                    return code;
                }
                Err(_) => return 0,
            }
        }
    }

    /// Run for at most `timeout`.
    ///
    /// Returns the exit code if a quit request was processed in time.
    pub fn run_for(&self, timeout: Duration) -> Option<i32> {
        if let Some(code) = self.pending_quit.take() {
            return Some(code);
        }
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(LoopMessage::Job(job)) => self.execute(job),
                Ok(LoopMessage::Quit(code)) => return Some(code),
                Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => {
                    return None
                }
            }
        }
    }

    /// Process jobs until `done` returns true or `timeout` elapses.
    ///
    /// `done` is checked before waiting and after every job. A quit request
    /// ends the run early and is kept for the next call to `run`.
    pub fn run_until<F>(&self, timeout: Duration, mut done: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + timeout;
        loop {
            if done() {
                return true;
            }
            if self.pending_quit.get().is_some() {
                return false;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.receiver.recv_timeout(remaining) {
                Ok(LoopMessage::Job(job)) => self.execute(job),
                Ok(LoopMessage::Quit(code)) => {
                    self.pending_quit.set(Some(code));
                    return done();
                }
                Err(_) => return done(),
            }
        }
    }

    /// Run every job that is already queued without waiting for more.
    ///
    /// Returns the number of jobs executed. A quit request stops processing
    /// and is kept for the next call to `run`.
    pub fn process_pending(&self) -> usize {
        let mut executed = 0;
        while self.pending_quit.get().is_none() {
            match self.receiver.try_recv() {
                Ok(LoopMessage::Job(job)) => {
                    self.execute(job);
                    executed += 1;
                }
                Ok(LoopMessage::Quit(code)) => self.pending_quit.set(Some(code)),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        executed
    }

    fn execute(&self, job: DispatchJob) {
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job)) {
            error!(
                event_loop = %self.label,
                "Dispatched job panicked: {}",
                panic_message(payload.as_ref())
            );
        }
    }
}

impl std::fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLoop")
            .field("label", &self.label)
            .finish()
    }
}

/// Cloneable handle that posts jobs to an [`EventLoop`].
#[derive(Clone)]
pub struct LoopDispatcher {
    label: Arc<str>,
    sender: Sender<LoopMessage>,
}

impl LoopDispatcher {
    /// Ask the loop to return from `run` with `code` once earlier jobs ran.
    ///
    /// Returns `false` if the loop no longer exists.
    pub fn quit(&self, code: i32) -> bool {
        self.sender.send(LoopMessage::Quit(code)).is_ok()
    }
}

impl ThreadDispatcher for LoopDispatcher {
    fn post(&self, job: DispatchJob) -> Result<()> {
        self.sender
            .send(LoopMessage::Job(job))
            .map_err(|_| BridgeError::DispatcherClosed(self.label.to_string()))
    }

    fn label(&self) -> String {
        self.label.to_string()
    }
}

impl std::fmt::Debug for LoopDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoopDispatcher")
            .field("label", &self.label)
            .finish()
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::thread;

    #[test]
    fn test_jobs_run_on_loop_thread_in_order() {
        let event_loop = EventLoop::new("subscriber");
        let dispatcher = event_loop.dispatcher();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let runner = thread::Builder::new()
            .name("subscriber".to_string())
            .spawn(move || event_loop.run())
            .unwrap();

        for i in 0..5 {
            let seen = seen.clone();
            dispatcher
                .post(Box::new(move || {
                    let name = thread::current().name().map(str::to_string);
                    seen.lock().unwrap().push((i, name));
                }))
                .unwrap();
        }
        assert!(dispatcher.quit(3));

        assert_eq!(runner.join().unwrap(), 3);
        let seen = seen.lock().unwrap();
        let order: Vec<_> = seen.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(seen
            .iter()
            .all(|(_, name)| name.as_deref() == Some("subscriber")));
    }

    #[test]
    fn test_post_after_loop_dropped_fails() {
        let event_loop = EventLoop::new("gone");
        let dispatcher = event_loop.dispatcher();
        drop(event_loop);

        let result = dispatcher.post(Box::new(|| {}));
        assert!(matches!(result, Err(BridgeError::DispatcherClosed(label)) if label == "gone"));
        assert!(!dispatcher.quit(0));
    }

    #[test]
    fn test_process_pending_keeps_quit_for_run() {
        let event_loop = EventLoop::new("main");
        let dispatcher = event_loop.dispatcher();
        dispatcher.post(Box::new(|| {})).unwrap();
        dispatcher.quit(7);
        dispatcher.post(Box::new(|| {})).unwrap();

        assert_eq!(event_loop.process_pending(), 1);
        assert_eq!(event_loop.run(), 7);
        assert_eq!(event_loop.process_pending(), 1);
    }

    #[test]
    fn test_run_for_times_out_without_quit() {
        let event_loop = EventLoop::new("idle");
        assert_eq!(event_loop.run_for(Duration::from_millis(20)), None);
    }

    #[test]
    fn test_run_for_wakes_on_post_from_other_thread() {
        let event_loop = EventLoop::new("main");
        let dispatcher = event_loop.dispatcher();
        let ran = Arc::new(Mutex::new(false));

        let poster = {
            let ran = ran.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                dispatcher
                    .post(Box::new(move || *ran.lock().unwrap() = true))
                    .unwrap();
                dispatcher.quit(5)
            })
        };

        assert_eq!(event_loop.run_for(Duration::from_secs(5)), Some(5));
        assert!(poster.join().unwrap());
        assert!(*ran.lock().unwrap());
    }

    #[test]
    fn test_run_until_observes_condition() {
        let event_loop = EventLoop::new("main");
        let dispatcher = event_loop.dispatcher();
        let counter = Arc::new(Mutex::new(0));

        let worker = {
            let counter = counter.clone();
            thread::spawn(move || {
                for _ in 0..3 {
                    let counter = counter.clone();
                    dispatcher
                        .post(Box::new(move || *counter.lock().unwrap() += 1))
                        .unwrap();
                }
            })
        };
        worker.join().unwrap();

        let reached = event_loop.run_until(Duration::from_secs(5), || *counter.lock().unwrap() == 3);
        assert!(reached);
    }

    #[test]
    fn test_panicking_job_does_not_stop_loop() {
        let event_loop = EventLoop::new("main");
        let dispatcher = event_loop.dispatcher();
        let ran = Arc::new(Mutex::new(false));

        dispatcher.post(Box::new(|| panic!("boom"))).unwrap();
        {
            let ran = ran.clone();
            dispatcher
                .post(Box::new(move || *ran.lock().unwrap() = true))
                .unwrap();
        }

        assert_eq!(event_loop.process_pending(), 2);
        assert!(*ran.lock().unwrap());
    }
}
