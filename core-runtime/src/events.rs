//! # Named Notification Registry
//!
//! Re-broadcasts events raised on the worker thread to subscribers that live
//! on other threads.
//!
//! ## Overview
//!
//! A [`Notification`] is a named descriptor with a payload shape (an ordered
//! list of [`ValueType`]s). Subscribers pair a callback with the
//! [`ThreadDispatcher`] of the thread that must run it. Registration happens
//! before the worker starts; starting the worker seals the registry, after
//! which the name → subscribers table is read-only and owned by the loop.
//!
//! ## Architecture
//!
//! ```text
//!                     ┌──────────────────┐   post    ┌───────────────────┐
//!  ctx.emit(progress) │                  ├──────────>│ GUI thread loop   │
//! ───────────────────>│ SealedRegistry   │           └───────────────────┘
//!   (worker thread)   │ "progress" → [..]│   post    ┌───────────────────┐
//!                     │                  ├──────────>│ Log thread loop   │
//!                     └──────────────────┘           └───────────────────┘
//! ```
//!
//! ## Ordering
//!
//! Deliveries for one (notification, subscriber) pair arrive in emission
//! order because they are posted from the single worker thread through a
//! FIFO dispatcher. There is no ordering guarantee across notifications.
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::events::{Notification, Subscriber, Value, ValueType};
//!
//! let progress = Notification::new("progress", [ValueType::Int]);
//! worker.register(&progress, Subscriber::new(gui_dispatcher, |payload| {
//!     println!("progress: {:?}", payload[0].as_int());
//! }))?;
//! worker.start()?;
//!
//! worker.submit_task(move |ctx| async move {
//!     for step in 0..5 {
//!         ctx.emit(&progress, vec![Value::from(step)])?;
//!     }
//!     Ok(())
//! })?;
//! ```

use crate::error::{Error, Result};
use bridge_traits::dispatch::{DispatchJob, ThreadDispatcher};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

// ============================================================================
// Payload values
// ============================================================================

/// Type of one payload slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueType {
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    Json,
}

/// One payload value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
}

impl Value {
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Bool(_) => ValueType::Bool,
            Self::Int(_) => ValueType::Int,
            Self::Float(_) => ValueType::Float,
            Self::Text(_) => ValueType::Text,
            Self::Bytes(_) => ValueType::Bytes,
            Self::Json(_) => ValueType::Json,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Self::Json(value) => Some(value),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<u32> for Value {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Self::Bytes(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

// ============================================================================
// Descriptors and subscribers
// ============================================================================

static NEXT_DESCRIPTOR_ID: AtomicU64 = AtomicU64::new(1);

struct Descriptor {
    id: u64,
    name: String,
    shape: Vec<ValueType>,
}

/// A named notification descriptor.
///
/// Clones share identity: registering a clone appends to the same entry,
/// while a separately constructed descriptor with the same name conflicts.
#[derive(Clone)]
pub struct Notification {
    inner: Arc<Descriptor>,
}

impl Notification {
    pub fn new(name: impl Into<String>, shape: impl Into<Vec<ValueType>>) -> Self {
        Self {
            inner: Arc::new(Descriptor {
                id: NEXT_DESCRIPTOR_ID.fetch_add(1, Ordering::Relaxed),
                name: name.into(),
                shape: shape.into(),
            }),
        }
    }

    /// Descriptor named `"{owner}_{field}"`, for notifications declared as
    /// fields of a component.
    pub fn scoped(owner: &str, field: &str, shape: impl Into<Vec<ValueType>>) -> Self {
        Self::new(format!("{}_{}", owner, field), shape)
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn shape(&self) -> &[ValueType] {
        &self.inner.shape
    }

    /// Whether `other` is this descriptor (not merely one with the same name).
    pub fn same_as(&self, other: &Notification) -> bool {
        self.inner.id == other.inner.id
    }

    /// Check that `payload` matches the declared shape.
    pub fn check_payload(&self, payload: &[Value]) -> Result<()> {
        if payload.len() != self.inner.shape.len() {
            return Err(Error::PayloadMismatch {
                name: self.inner.name.clone(),
                message: format!(
                    "expected {} value(s), got {}",
                    self.inner.shape.len(),
                    payload.len()
                ),
            });
        }

        for (index, (value, expected)) in payload.iter().zip(&self.inner.shape).enumerate() {
            if value.value_type() != *expected {
                return Err(Error::PayloadMismatch {
                    name: self.inner.name.clone(),
                    message: format!(
                        "slot {} expected {:?}, got {:?}",
                        index,
                        expected,
                        value.value_type()
                    ),
                });
            }
        }

        Ok(())
    }
}

impl fmt::Debug for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notification")
            .field("name", &self.inner.name)
            .field("shape", &self.inner.shape)
            .finish()
    }
}

type SubscriberCallback = dyn Fn(&[Value]) + Send + Sync;

/// A callback bound to the thread that must run it.
#[derive(Clone)]
pub struct Subscriber {
    dispatcher: Arc<dyn ThreadDispatcher>,
    callback: Arc<SubscriberCallback>,
}

impl Subscriber {
    pub fn new<F>(dispatcher: Arc<dyn ThreadDispatcher>, callback: F) -> Self
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        Self {
            dispatcher,
            callback: Arc::new(callback),
        }
    }

    fn deliver(&self, payload: &Arc<[Value]>) -> bridge_traits::error::Result<()> {
        let callback = Arc::clone(&self.callback);
        let payload = Arc::clone(payload);
        self.dispatcher.post(Box::new(move || callback(&payload)))
    }
}

impl fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscriber")
            .field("dispatcher", &self.dispatcher.label())
            .finish()
    }
}

// ============================================================================
// Registry
// ============================================================================

struct Channel {
    notification: Notification,
    subscribers: Vec<Subscriber>,
}

#[derive(Default)]
struct RegistryState {
    sealed: bool,
    channels: HashMap<String, Channel>,
}

/// Registration-phase registry, shared by the worker handle.
#[derive(Default)]
pub(crate) struct Registry {
    state: Mutex<RegistryState>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add `subscriber` to `notification`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidNotification`] if the descriptor has no name
    /// - [`Error::RegistrySealed`] once the worker has started
    /// - [`Error::DuplicateName`] if the name belongs to another descriptor
    pub(crate) fn register(&self, notification: &Notification, subscriber: Subscriber) -> Result<()> {
        if notification.name().trim().is_empty() {
            return Err(Error::InvalidNotification(
                "Notification must have a name".to_string(),
            ));
        }

        let mut state = self.state.lock();
        if state.sealed {
            return Err(Error::RegistrySealed(
                "All notifications must be connected before starting the worker".to_string(),
            ));
        }

        match state.channels.get_mut(notification.name()) {
            Some(channel) if !channel.notification.same_as(notification) => {
                Err(Error::DuplicateName {
                    name: notification.name().to_string(),
                })
            }
            Some(channel) => {
                channel.subscribers.push(subscriber);
                trace!(
                    notification = notification.name(),
                    subscribers = channel.subscribers.len(),
                    "Subscriber appended"
                );
                Ok(())
            }
            None => {
                state.channels.insert(
                    notification.name().to_string(),
                    Channel {
                        notification: notification.clone(),
                        subscribers: vec![subscriber],
                    },
                );
                debug!(notification = notification.name(), "Notification registered");
                Ok(())
            }
        }
    }

    /// Close registration and hand the table to the loop.
    ///
    /// Only the first call receives the registrations.
    pub(crate) fn seal(&self) -> SealedRegistry {
        let mut state = self.state.lock();
        state.sealed = true;
        SealedRegistry {
            channels: std::mem::take(&mut state.channels),
        }
    }

    #[cfg(test)]
    fn is_sealed(&self) -> bool {
        self.state.lock().sealed
    }
}

/// Read-only name → subscribers table owned by the running loop.
pub(crate) struct SealedRegistry {
    channels: HashMap<String, Channel>,
}

impl SealedRegistry {
    /// Queue `payload` to every subscriber of `notification`.
    ///
    /// Returns the number of subscribers the delivery was posted to. A
    /// dispatcher that refuses the job is logged and skipped. A name nobody
    /// subscribed to is ignored before the payload is checked.
    pub(crate) fn emit(&self, notification: &Notification, payload: Vec<Value>) -> Result<usize> {
        let Some(channel) = self.channels.get(notification.name()) else {
            trace!(
                notification = notification.name(),
                "Emit without subscribers ignored"
            );
            return Ok(0);
        };

        if !channel.notification.same_as(notification) {
            return Err(Error::DuplicateName {
                name: notification.name().to_string(),
            });
        }
        notification.check_payload(&payload)?;

        let payload: Arc<[Value]> = payload.into();
        let mut delivered = 0;
        for subscriber in &channel.subscribers {
            match subscriber.deliver(&payload) {
                Ok(()) => delivered += 1,
                Err(error) => warn!(
                    notification = notification.name(),
                    dispatcher = %subscriber.dispatcher.label(),
                    error = %error,
                    "Notification could not be delivered"
                ),
            }
        }
        Ok(delivered)
    }

    pub(crate) fn len(&self) -> usize {
        self.channels.len()
    }
}

// ============================================================================
// Finished signal
// ============================================================================

#[derive(Default)]
struct FinishedState {
    fired: bool,
    listeners: Vec<(Arc<dyn ThreadDispatcher>, DispatchJob)>,
}

/// One-shot notification fired when the worker thread has shut down.
///
/// Unlike registry notifications it accepts listeners at any time; late
/// listeners are delivered immediately.
#[derive(Default)]
pub(crate) struct FinishedSignal {
    state: Mutex<FinishedState>,
}

impl FinishedSignal {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn subscribe(&self, dispatcher: Arc<dyn ThreadDispatcher>, job: DispatchJob) {
        {
            let mut state = self.state.lock();
            if !state.fired {
                state.listeners.push((dispatcher, job));
                return;
            }
        }
        Self::deliver(dispatcher.as_ref(), job);
    }

    /// Deliver to every listener. Returns `false` if already fired.
    pub(crate) fn fire(&self) -> bool {
        let listeners = {
            let mut state = self.state.lock();
            if state.fired {
                return false;
            }
            state.fired = true;
            std::mem::take(&mut state.listeners)
        };

        for (dispatcher, job) in listeners {
            Self::deliver(dispatcher.as_ref(), job);
        }
        true
    }

    pub(crate) fn has_fired(&self) -> bool {
        self.state.lock().fired
    }

    fn deliver(dispatcher: &dyn ThreadDispatcher, job: DispatchJob) {
        if let Err(error) = dispatcher.post(job) {
            warn!(
                dispatcher = %dispatcher.label(),
                error = %error,
                "Finished notification could not be delivered"
            );
        }
    }
}
