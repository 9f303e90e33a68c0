//! Worker demonstration
//!
//! Starts a worker, streams progress notifications back to the main thread's
//! event loop and shuts everything down once the worker has finished.
//!
//! Run with:
//! ```bash
//! cargo run -p core-runtime --example worker_demo
//!
//! # JSON logs with loop internals
//! cargo run -p core-runtime --example worker_demo -- json "core_runtime=trace"
//! ```

use bridge_desktop::EventLoop;
use bridge_traits::logging::LogLevel;
use core_runtime::logging::{init_logging, LogFormat, LoggingConfig};
use core_runtime::{AsyncWorker, Notification, Subscriber, Value, ValueType, WorkerConfig};
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let format = match args.get(1).map(String::as_str) {
        Some("json") => LogFormat::Json,
        Some("compact") => LogFormat::Compact,
        _ => LogFormat::Pretty,
    };

    let mut config = LoggingConfig::default()
        .with_format(format)
        .with_level(LogLevel::Debug);
    if let Some(filter) = args.get(2) {
        config = config.with_filter(filter.clone());
    }
    init_logging(config)?;

    let host = EventLoop::new("main");
    let worker = Arc::new(AsyncWorker::new(
        WorkerConfig::builder().thread_name("DemoWorker").build()?,
    )?);

    let progress = Notification::new("progress", [ValueType::Int, ValueType::Text]);
    worker.register(
        &progress,
        Subscriber::new(Arc::new(host.dispatcher()), |payload| {
            info!(
                step = payload[0].as_int().unwrap_or_default(),
                label = payload[1].as_text().unwrap_or_default(),
                "Progress"
            );
        }),
    )?;

    let quit_host = host.dispatcher();
    worker.on_finished(Arc::new(host.dispatcher()), move || {
        info!("Worker finished, leaving host loop");
        quit_host.quit(0);
    });
    worker.start()?;

    for step in 0..3 {
        let progress = progress.clone();
        worker.submit_task(move |ctx| async move {
            let label = ctx
                .spawn_blocking(move || format!("chunk {} hashed", step))
                .await?;
            tokio::time::sleep(Duration::from_millis(50)).await;
            ctx.emit(&progress, vec![Value::from(step), Value::from(label)])?;
            anyhow::Ok(())
        })?;
    }

    let stopper = Arc::clone(&worker);
    worker.submit_task(move |_| async move {
        tokio::time::sleep(Duration::from_millis(300)).await;
        stopper.quit()?;
        anyhow::Ok(())
    })?;

    let code = host.run();
    if !worker.wait(Some(Duration::from_secs(5))) {
        warn!("Worker did not stop in time");
    }
    info!(code, "Demo complete");
    Ok(())
}
