//! # Desktop Bridge Implementations
//!
//! Default implementations of the host bridge traits for desktop processes
//! (macOS, Windows, Linux) that do not bring their own GUI toolkit loop.
//!
//! ## Overview
//!
//! - [`EventLoop`] / [`LoopDispatcher`] - a thread-affine message loop and the
//!   `ThreadDispatcher` that posts into it
//! - [`DirectDispatcher`] - runs jobs inline on the posting thread
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::EventLoop;
//! use bridge_traits::ThreadDispatcher;
//! use std::sync::Arc;
//!
//! let event_loop = EventLoop::new("main");
//! let dispatcher: Arc<dyn ThreadDispatcher> = Arc::new(event_loop.dispatcher());
//! // hand `dispatcher` to subscribers, then block on the loop
//! let code = event_loop.run();
//! ```

mod direct;
mod event_loop;

pub use direct::DirectDispatcher;
pub use event_loop::{EventLoop, LoopDispatcher};
