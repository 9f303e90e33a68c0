use bridge_traits::{
    dispatch::{DispatchJob, ThreadDispatcher},
    error::Result,
};

/// Dispatcher that runs every job immediately on the posting thread.
///
/// Useful for subscribers that are themselves thread-safe and do not care
/// which thread they run on. Delivery happens on the worker thread, so a
/// slow subscriber stalls the worker loop.
#[derive(Debug, Clone, Default)]
pub struct DirectDispatcher;

impl DirectDispatcher {
    pub fn new() -> Self {
        Self
    }
}

impl ThreadDispatcher for DirectDispatcher {
    fn post(&self, job: DispatchJob) -> Result<()> {
        job();
        Ok(())
    }

    fn label(&self) -> String {
        "direct".to_string()
    }
}
