//! Workspace placeholder crate.
//!
//! This crate exposes the feature flags that map to the individual workspace
//! crates (`core-service`, `core-runtime`). Host applications can depend on
//! `deskworker-workspace` and enable `desktop-shims` to get the application
//! facade together with the desktop host loop, without wiring each crate.

#[cfg(feature = "desktop-shims")]
pub use core_runtime::{AsyncWorker, LoopContext, Notification, Subscriber, Value, ValueType};
#[cfg(feature = "desktop-shims")]
pub use core_service::{Application, QuitHandle};
