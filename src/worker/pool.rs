//! Bounded background task pool
//!
//! Every fire-and-forget operation (connect, request, file write) runs here:
//! - A semaphore caps how many run at once
//! - A task tracker lets callers wait for in-flight work
//! - A cancellation token stops queued tasks and pending waits on shutdown

use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{Mutex, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info};

use crate::error::{Result, SyncError};

#[derive(Clone)]
pub struct TaskPool {
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    cancel: CancellationToken,
    handle: Handle,
    /// Serializes close/wait/reopen across clones
    draining: Arc<Mutex<()>>,
}

impl TaskPool {
    /// Create a pool on an explicit runtime.
    pub fn new(handle: Handle, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        info!(max_concurrent, "Task pool created");
        Self {
            permits: Arc::new(Semaphore::new(max_concurrent)),
            tracker: TaskTracker::new(),
            cancel: CancellationToken::new(),
            handle,
            draining: Arc::new(Mutex::new(())),
        }
    }

    /// Create a pool on the runtime we are currently running in.
    pub fn current(max_concurrent: usize) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|e| SyncError::Config(format!("no tokio runtime: {e}")))?;
        Ok(Self::new(handle, max_concurrent))
    }

    /// Token cancelled when the pool shuts down.
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_shut_down(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Run `task` in the background once a permit is free.
    ///
    /// The task is dropped without running if the pool shuts down first, and
    /// aborted at its next await point if it shuts down mid-run.
    pub fn spawn<F>(&self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        let cancel = self.cancel.clone();
        self.tracker.spawn_on(
            async move {
                let _permit = tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!(task = name, "Task dropped before start (pool shut down)");
                        return;
                    }
                    permit = permits.acquire_owned() => match permit {
                        Ok(permit) => permit,
                        Err(_) => return,
                    },
                };
                debug!(task = name, "Task started");
                tokio::select! {
                    _ = cancel.cancelled() => debug!(task = name, "Task cancelled"),
                    _ = task => debug!(task = name, "Task finished"),
                }
            },
            &self.handle,
        );
    }

    /// Wait until every task spawned so far has finished.
    ///
    /// Concurrent drains run one after another, so none of them can reopen
    /// the tracker while another is still waiting on it.
    pub async fn drain(&self) {
        let _draining = self.draining.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
        self.tracker.reopen();
    }

    /// Cancel outstanding work and wait for tasks to wind down.
    pub async fn shutdown(&self) {
        info!(in_flight = self.tracker.len(), "Shutting down task pool");
        self.cancel.cancel();
        let _draining = self.draining.lock().await;
        self.tracker.close();
        self.tracker.wait().await;
    }

    /// Number of tasks queued or running.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }
}
