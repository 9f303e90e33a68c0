//! Application facade and bootstrap helpers.
//!
//! This crate pairs an [`AsyncWorker`](core_runtime::AsyncWorker) with the
//! host loop that receives its notifications. Desktop apps enable the
//! `desktop-shims` feature (on by default), which brings in the
//! `bridge-desktop` event loop and the [`Application`] type built on it.
//!
//! ```ignore
//! use core_runtime::{Notification, Subscriber, ValueType, WorkerConfig};
//! use core_service::Application;
//! use std::sync::Arc;
//!
//! let app = Application::new(WorkerConfig::default())?;
//! let progress = Notification::new("progress", [ValueType::Int]);
//! app.worker().register(
//!     &progress,
//!     Subscriber::new(Arc::new(app.dispatcher()), |payload| println!("{:?}", payload)),
//! )?;
//! app.quit_on_interrupt()?;
//! let code = app.exec()?;
//! ```

pub mod error;

#[cfg(feature = "desktop-shims")]
mod application;

pub use error::{CoreError, Result};

#[cfg(feature = "desktop-shims")]
pub use application::{Application, QuitHandle};
