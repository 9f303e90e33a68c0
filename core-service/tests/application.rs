use core_runtime::{Notification, Subscriber, Value, ValueType, WorkerConfig, WorkerState};
use core_service::{Application, CoreError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

fn app() -> Application {
    let config = WorkerConfig::builder()
        .thread_name("AppWorker")
        .build()
        .unwrap();
    Application::new(config).unwrap()
}

#[test]
fn test_quit_from_task_exits_with_zero() {
    let app = app();
    let quit = app.quit_handle();
    app.worker()
        .submit_task(move |_| async move {
            quit.quit()?;
            anyhow::Ok(())
        })
        .unwrap();

    assert_eq!(app.exec().unwrap(), 0);
    assert_eq!(app.worker().state(), WorkerState::Stopped);
}

#[test]
fn test_quit_from_other_thread() {
    let app = app();
    let quit = app.quit_handle();
    let quitter = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        quit.quit().unwrap();
    });

    assert_eq!(app.exec().unwrap(), 0);
    quitter.join().unwrap();
    assert!(app.worker().is_finished());
}

#[test]
fn test_notifications_delivered_on_host_thread_before_exit() {
    let app = app();
    let host_thread = thread::current().id();
    let received = Arc::new(Mutex::new(Vec::new()));

    let progress = Notification::new("progress", [ValueType::Int]);
    {
        let received = received.clone();
        app.worker()
            .register(
                &progress,
                Subscriber::new(Arc::new(app.dispatcher()), move |payload| {
                    received
                        .lock()
                        .unwrap()
                        .push((thread::current().id(), payload[0].as_int().unwrap()));
                }),
            )
            .unwrap();
    }

    let quit = app.quit_handle();
    app.worker()
        .submit_task(move |ctx| async move {
            for step in 0..4 {
                ctx.emit(&progress, vec![Value::from(step)])?;
            }
            quit.quit()?;
            anyhow::Ok(())
        })
        .unwrap();

    assert_eq!(app.exec().unwrap(), 0);

    let received = received.lock().unwrap();
    assert_eq!(
        *received,
        (0..4).map(|step| (host_thread, step)).collect::<Vec<_>>()
    );
}

#[test]
fn test_host_loop_quit_directly_stops_worker() {
    let app = app();
    let host = app.dispatcher();
    app.worker()
        .schedule_callback(move |_| {
            host.quit(3);
        })
        .unwrap();

    assert_eq!(app.exec().unwrap(), 3);
    assert_eq!(app.worker().state(), WorkerState::Stopped);
}

#[test]
fn test_exec_twice_fails() {
    let app = app();
    app.quit().unwrap();
    assert_eq!(app.exec().unwrap(), 0);

    assert!(matches!(app.exec(), Err(CoreError::Runtime(_))));
}
