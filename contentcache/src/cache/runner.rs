//! Background task runner for disk I/O.
//!
//! All disk work the coordinator offloads (write-behind, asynchronous loads,
//! startup initialization) runs on tokio's blocking pool through
//! `spawn_blocking`, so it never occupies async worker threads. The runner
//! either owns a small runtime whose blocking pool is capped at the configured
//! worker count, or borrows the handle of a runtime the caller already has.

use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::{CacheError, CacheResult};

/// Thread name prefix for owned runtimes.
const THREAD_NAME: &str = "contentcache-io";

/// Executes blocking cache tasks in the background.
pub struct TaskRunner {
    handle: Handle,
    /// Present when the runner created its own runtime.
    owned: Option<Runtime>,
}

impl TaskRunner {
    /// Create a runner with its own runtime.
    ///
    /// # Arguments
    ///
    /// * `worker_threads` - Maximum number of concurrent blocking tasks
    pub fn new(worker_threads: usize) -> CacheResult<Self> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .max_blocking_threads(worker_threads.max(1))
            .thread_name(THREAD_NAME)
            .build()
            .map_err(|e| CacheError::Runtime(e.to_string()))?;

        debug!(worker_threads, "Created cache worker runtime");

        Ok(Self {
            handle: runtime.handle().clone(),
            owned: Some(runtime),
        })
    }

    /// Create a runner on an existing runtime.
    pub fn from_handle(handle: Handle) -> Self {
        Self {
            handle,
            owned: None,
        }
    }

    /// Create a runner on the runtime of the current context, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::from_handle)
    }

    /// Whether this runner owns its runtime.
    pub fn is_owned(&self) -> bool {
        self.owned.is_some()
    }

    /// Submit a blocking task.
    pub fn spawn<F, R>(&self, task: F) -> JoinHandle<R>
    where
        F: FnOnce() -> R + Send + 'static,
        R: Send + 'static,
    {
        self.handle.spawn_blocking(task)
    }
}

impl Drop for TaskRunner {
    fn drop(&mut self) {
        // Dropping a runtime blocks; shutdown_background is safe from async code.
        if let Some(runtime) = self.owned.take() {
            runtime.shutdown_background();
        }
    }
}
