//! # Shutdown Sequencer
//!
//! Fixed teardown run once on the worker thread after the loop leaves run
//! mode:
//!
//! 1. Cancel every started task, oldest first, then everything else through
//!    the root token.
//! 2. Drain the command queue: queued tasks are dropped and resolve as
//!    cancelled, queued callbacks still run.
//! 3. Wait, without a timeout, until every tracked task has resolved.
//! 4. Report each failure raised while draining as
//!    "unhandled exception during shutdown".
//! 5. Drop the local task set, then close the runtime, giving running
//!    blocking jobs up to the configured grace period.
//!
//! Firing `finished` is left to the caller, after this returns.

use crate::context::{self, LoopShared};
use crate::exception::ExceptionOrigin;
use crate::gate::Command;
use core_async::runtime::Runtime;
use core_async::sync::mpsc::UnboundedReceiver;
use core_async::task::LocalSet;
use std::rc::Rc;
use std::time::Duration;
use tracing::debug;

/// What the sequencer did, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Started tasks that were still running and got cancelled
    pub cancelled_tasks: usize,
    /// Queued tasks dropped before they started
    pub dropped_tasks: usize,
    /// Queued callbacks run while draining
    pub drained_callbacks: usize,
    /// Failures routed to the exception handler
    pub failures: usize,
}

pub(crate) struct ShutdownSequencer {
    shared: Rc<LoopShared>,
    local: LocalSet,
    runtime: Runtime,
    receiver: UnboundedReceiver<Command>,
    blocking_timeout: Duration,
}

impl ShutdownSequencer {
    pub(crate) fn new(
        shared: Rc<LoopShared>,
        local: LocalSet,
        runtime: Runtime,
        receiver: UnboundedReceiver<Command>,
        blocking_timeout: Duration,
    ) -> Self {
        Self {
            shared,
            local,
            runtime,
            receiver,
            blocking_timeout,
        }
    }

    pub(crate) fn run(self) -> ShutdownReport {
        let Self {
            shared,
            local,
            runtime,
            mut receiver,
            blocking_timeout,
        } = self;

        shared.enter_shutdown();
        let mut report = ShutdownReport::default();

        local.block_on(&runtime, async {
            let live = shared.live_tokens();
            report.cancelled_tasks = live.len();
            for (id, token) in live {
                debug!(task = %id, "Cancelling task for shutdown");
                token.cancel();
            }
            shared.root.cancel();

            receiver.close();
            while let Ok(command) = receiver.try_recv() {
                match command {
                    Command::Task(envelope) => {
                        debug!(task = %envelope.id, "Dropping queued task");
                        report.dropped_tasks += 1;
                        drop(envelope);
                    }
                    Command::Callback(callback) => {
                        report.drained_callbacks += 1;
                        context::run_callback(&shared, callback);
                    }
                    Command::Stop => {}
                }
            }

            shared.tracker.close();
            shared.tracker.wait().await;
        });

        let failures = shared.take_shutdown_failures();
        report.failures = failures.len();
        for (id, error) in failures {
            shared.report(ExceptionOrigin::Shutdown, Some(id), error);
        }

        drop(local);
        drop(shared);
        runtime.shutdown_timeout(blocking_timeout);

        debug!(?report, "Shutdown sequence complete");
        report
    }
}
