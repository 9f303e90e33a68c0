use thiserror::Error;

use crate::state::WorkerState;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Notification registry is sealed: {0}")]
    RegistrySealed(String),

    #[error("Notification name is not globally unique: {name}")]
    DuplicateName { name: String },

    #[error("Invalid notification: {0}")]
    InvalidNotification(String),

    #[error("Payload for '{name}' does not match its shape: {message}")]
    PayloadMismatch { name: String, message: String },

    #[error("Worker '{worker}' is not accepting work (state: {state})")]
    InactiveWorker { worker: String, state: WorkerState },

    #[error("Worker '{worker}' was already started (state: {state})")]
    AlreadyStarted { worker: String, state: WorkerState },

    #[error("Failed to build worker runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] bridge_traits::BridgeError),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, Error>;
