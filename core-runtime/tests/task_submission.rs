mod common;

use common::{stop_and_wait, worker_with, RecordingHandler, TIMEOUT};
use core_runtime::{
    ExceptionOrigin, LoopContext, TaskOptions, TaskOutcome, TaskPanic, TaskResolution,
    CALLBACK_EXCEPTION_MESSAGE, TASK_EXCEPTION_MESSAGE,
};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;

#[derive(Debug, thiserror::Error)]
#[error("quota exceeded: {used}/{limit}")]
struct QuotaExceeded {
    used: u32,
    limit: u32,
}

#[test]
fn test_tasks_from_one_thread_run_in_order() {
    let worker = worker_with(RecordingHandler::new());
    let order = Arc::new(Mutex::new(Vec::new()));
    worker.start().unwrap();

    let handles: Vec<_> = (0..50)
        .map(|i| {
            let order = order.clone();
            worker
                .submit_task(move |_| async move {
                    order.lock().push(i);
                    anyhow::Ok(())
                })
                .unwrap()
        })
        .collect();
    for handle in handles {
        assert!(handle.wait().is_completed());
    }

    assert_eq!(*order.lock(), (0..50).collect::<Vec<_>>());
    stop_and_wait(&worker);
}

#[test]
fn test_failure_reaches_handler_with_original_error() {
    let handler = RecordingHandler::new();
    let worker = worker_with(handler.clone());
    worker.start().unwrap();

    let handle = worker
        .submit_task(|_| async {
            Err::<(), _>(QuotaExceeded { used: 11, limit: 10 }.into())
        })
        .unwrap();
    let id = handle.id();

    match handle.wait() {
        TaskOutcome::Failed(error) => {
            let quota = error.downcast_ref::<QuotaExceeded>().unwrap();
            assert_eq!((quota.used, quota.limit), (11, 10));
        }
        other => panic!("expected failure, got {:?}", other),
    }
    stop_and_wait(&worker);

    let reports = handler.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].origin, ExceptionOrigin::Task);
    assert_eq!(reports[0].message, TASK_EXCEPTION_MESSAGE);
    assert_eq!(reports[0].task, Some(id));
    assert_eq!(reports[0].worker, "TestWorker");
    assert!(reports[0].error.downcast_ref::<QuotaExceeded>().is_some());
}

#[test]
fn test_panicking_task_is_reported() {
    let handler = RecordingHandler::new();
    let worker = worker_with(handler.clone());
    worker.start().unwrap();

    let handle = worker
        .submit_task(|_| async {
            if thread::current().name().is_some() {
                panic!("index out of range");
            }
            anyhow::Ok(())
        })
        .unwrap();
    assert!(matches!(handle.wait(), TaskOutcome::Failed(ref e) if e.is_panic()));

    let follow_up = worker.submit_task(|_| async { anyhow::Ok("still running") }).unwrap();
    assert_eq!(follow_up.wait().completed(), Some("still running"));
    stop_and_wait(&worker);

    let reports = handler.reports();
    assert_eq!(reports.len(), 1);
    assert!(reports[0].error.to_string().contains("index out of range"));
}

#[test]
fn test_panic_payload_reaches_handler_intact() {
    #[derive(Debug, PartialEq)]
    struct ErrorCode(u16);

    let handler = RecordingHandler::new();
    let worker = worker_with(handler.clone());
    worker.start().unwrap();

    let handle = worker
        .submit_task(|_| async {
            if thread::current().name().is_some() {
                std::panic::panic_any(ErrorCode(503));
            }
            anyhow::Ok(())
        })
        .unwrap();
    let outcome = handle.wait();
    stop_and_wait(&worker);

    let reports = handler.reports();
    assert_eq!(reports.len(), 1);
    let payload = reports[0]
        .error
        .panic()
        .and_then(TaskPanic::take_payload)
        .unwrap();
    assert_eq!(payload.downcast_ref::<ErrorCode>(), Some(&ErrorCode(503)));

    // The handle's error shares the payload the handler already took.
    match outcome {
        TaskOutcome::Failed(error) => assert!(error.panic().unwrap().take_payload().is_none()),
        other => panic!("expected failure, got {:?}", other),
    }
}

#[test]
fn test_disabled_reporting_skips_handler() {
    let handler = RecordingHandler::new();
    let worker = worker_with(handler.clone());
    worker.start().unwrap();

    let handle = worker
        .submit_task_with(TaskOptions::new().log_exceptions(false), |_| async {
            Err::<(), _>(anyhow::anyhow!("expected failure"))
        })
        .unwrap();
    assert!(matches!(handle.wait(), TaskOutcome::Failed(_)));
    stop_and_wait(&worker);

    assert!(handler.reports().is_empty());
}

#[test]
fn test_concurrent_submitters() {
    let worker = worker_with(RecordingHandler::new());
    let resolved = Arc::new(AtomicUsize::new(0));
    let seen_at_finish = Arc::new(AtomicUsize::new(usize::MAX));
    {
        let resolved = resolved.clone();
        let seen_at_finish = seen_at_finish.clone();
        worker.on_finished(Arc::new(bridge_desktop::DirectDispatcher::new()), move || {
            seen_at_finish.store(resolved.load(Ordering::SeqCst), Ordering::SeqCst);
        });
    }
    worker.start().unwrap();

    let submitters: Vec<_> = (0..10)
        .map(|t| {
            let submitter = worker.submitter();
            let resolved = resolved.clone();
            thread::spawn(move || {
                (0..10)
                    .map(|i| {
                        let handle = submitter
                            .submit_task(move |_| async move { anyhow::Ok(t * 10 + i) })
                            .unwrap();
                        let resolved = resolved.clone();
                        handle.add_done_callback(move |_| {
                            resolved.fetch_add(1, Ordering::SeqCst);
                        });
                        handle
                    })
                    .collect::<Vec<_>>()
            })
        })
        .collect();

    let handles: Vec<_> = submitters
        .into_iter()
        .flat_map(|submitter| submitter.join().unwrap())
        .collect();
    stop_and_wait(&worker);

    // Tasks still unpolled when the stop lands resolve as cancelled.
    let mut values = Vec::new();
    for handle in handles {
        match handle.try_outcome() {
            Ok(TaskOutcome::Completed(value)) => values.push(value),
            Ok(TaskOutcome::Cancelled) => {}
            Ok(TaskOutcome::Failed(error)) => panic!("unexpected failure: {}", error),
            Err(handle) => panic!("{} still pending after finished", handle.id()),
        }
    }
    let count = values.len();
    values.sort_unstable();
    values.dedup();
    assert_eq!(values.len(), count);
    assert!(values.iter().all(|value| (0..100).contains(value)));
    assert_eq!(seen_at_finish.load(Ordering::SeqCst), 100);
}

#[test]
fn test_cancel_running_task() {
    let handler = RecordingHandler::new();
    let worker = worker_with(handler.clone());
    worker.start().unwrap();

    let (started_tx, started_rx) = mpsc::channel();
    let handle = worker
        .submit_task(move |_| async move {
            started_tx.send(()).unwrap();
            std::future::pending::<()>().await;
            anyhow::Ok(())
        })
        .unwrap();
    started_rx.recv_timeout(TIMEOUT).unwrap();

    assert!(handle.cancel());
    assert!(handle.wait().is_cancelled());
    stop_and_wait(&worker);
    assert!(handler.reports().is_empty());
}

#[test]
fn test_handle_can_be_awaited_elsewhere() {
    let worker = worker_with(RecordingHandler::new());
    worker.start().unwrap();

    let handle = worker
        .submit_task(|_| async { anyhow::Ok(String::from("payload")) })
        .unwrap();
    let runtime = core_async::runtime::current_thread(1).unwrap();
    let outcome = runtime.block_on(handle);

    assert_eq!(outcome.completed().as_deref(), Some("payload"));
    stop_and_wait(&worker);
}

#[test]
fn test_done_callback_sees_resolution() {
    let worker = worker_with(RecordingHandler::new());
    let (tx, rx) = mpsc::channel();

    let handle = worker
        .submit_task(|_| async { Err::<(), _>(anyhow::anyhow!("bad input")) })
        .unwrap();
    handle.add_done_callback(move |resolution| {
        tx.send(resolution.clone()).unwrap();
    });
    worker.start().unwrap();

    match rx.recv_timeout(TIMEOUT).unwrap() {
        TaskResolution::Failed(error) => assert_eq!(error.to_string(), "bad input"),
        other => panic!("expected failure, got {:?}", other),
    }
    stop_and_wait(&worker);
}

#[test]
fn test_callback_can_spawn_local_work() {
    let worker = worker_with(RecordingHandler::new());
    worker.start().unwrap();

    let (tx, rx) = mpsc::channel();
    worker
        .schedule_callback(move |ctx: &LoopContext| {
            assert!(ctx.task_id().is_none());
            let local = std::rc::Rc::new(7);
            ctx.spawn(move |ctx| async move {
                tx.send((*local, ctx.task_id().is_some())).unwrap();
                anyhow::Ok(())
            });
        })
        .unwrap();

    assert_eq!(rx.recv_timeout(TIMEOUT).unwrap(), (7, true));
    stop_and_wait(&worker);
}

#[test]
fn test_panicking_callback_is_reported() {
    let handler = RecordingHandler::new();
    let worker = worker_with(handler.clone());
    worker.start().unwrap();

    worker
        .schedule_callback(|_: &LoopContext| panic!("callback exploded"))
        .unwrap();
    let handle = worker.submit_task(|_| async { anyhow::Ok(1) }).unwrap();
    assert!(handle.wait().is_completed());
    stop_and_wait(&worker);

    let reports = handler.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].origin, ExceptionOrigin::Callback);
    assert_eq!(reports[0].message, CALLBACK_EXCEPTION_MESSAGE);
    assert_eq!(reports[0].task, None);
}

#[test]
fn test_blocking_work_off_the_loop() {
    let worker = worker_with(RecordingHandler::new());
    worker.start().unwrap();

    let handle = worker
        .submit_task(|ctx| async move {
            let loop_thread = thread::current().id();
            let blocking_thread = ctx.spawn_blocking(|| thread::current().id()).await?;
            anyhow::Ok(loop_thread != blocking_thread)
        })
        .unwrap();

    assert_eq!(handle.wait().completed(), Some(true));
    stop_and_wait(&worker);
}
