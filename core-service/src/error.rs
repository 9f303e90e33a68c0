use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Core initialization failed: {0}")]
    InitializationFailed(String),

    #[error("Worker error: {0}")]
    Runtime(#[from] core_runtime::Error),
}

pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use core_runtime::WorkerState;

    #[test]
    fn test_runtime_errors_convert() {
        let error: CoreError = core_runtime::Error::AlreadyStarted {
            worker: "Main".to_string(),
            state: WorkerState::Running,
        }
        .into();
        assert!(matches!(error, CoreError::Runtime(_)));
        assert!(error.to_string().starts_with("Worker error:"));
    }
}
