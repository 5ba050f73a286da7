use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::AbortHandle;
use crate::error::{Error, Result};
use crate::types::ids::RequestId;
use tracing::{info, error, warn};

/// Task Supervisor - Tracks the background task driving each activation
///
/// ## Purpose
/// Every activation runs its countdown, fan-out and finalize on one spawned
/// task. The supervisor keeps the handle until the task ends, so callers can
/// wait for an activation to settle while `is_running` still reports it, and
/// so shutdown can abort whatever is still running.
///
/// ## Usage
/// ```rust,ignore
/// let supervisor = TaskSupervisor::new();
///
/// supervisor.spawn(request_id, async move {
///     // countdown, dispatch, finalize
/// });
///
/// supervisor.wait_for(request_id).await?;
/// ```
pub struct TaskSupervisor {
    tasks: DashMap<RequestId, TrackedTask>,
}

/// Resolves once the task ends; any number of waiters may clone it.
type TaskDone = Shared<BoxFuture<'static, std::result::Result<(), String>>>;

struct TrackedTask {
    abort: AbortHandle,
    done: TaskDone,
}

impl TaskSupervisor {
    pub fn new() -> Self {
        TaskSupervisor {
            tasks: DashMap::new(),
        }
    }

    /// Spawn the task for `request_id` and register it
    pub fn spawn<F>(&self, request_id: RequestId, future: F)
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        self.prune_finished();

        let handle = tokio::spawn(future);
        let task = TrackedTask {
            abort: handle.abort_handle(),
            done: handle.map(|joined| joined.map_err(|e| e.to_string())).boxed().shared(),
        };

        if let Some(previous) = self.tasks.insert(request_id, task) {
            // A second driver for one request would double-dispatch
            warn!("Replacing task for {}, aborting the previous one", request_id);
            previous.abort.abort();
        }
        info!("Spawned activation task for {}", request_id);
    }

    /// Drop handles of tasks that already ended
    pub fn prune_finished(&self) -> usize {
        let before = self.tasks.len();
        self.tasks.retain(|_, task| !task.abort.is_finished());
        before - self.tasks.len()
    }

    /// Get count of tasks still running
    pub fn active_count(&self) -> usize {
        self.tasks.iter().filter(|t| !t.value().abort.is_finished()).count()
    }

    pub fn is_running(&self, request_id: RequestId) -> bool {
        self.tasks
            .get(&request_id)
            .map(|task| !task.abort.is_finished())
            .unwrap_or(false)
    }

    /// Wait for the task of `request_id` to complete.
    ///
    /// The task stays tracked until it ends, so concurrent waiters all see
    /// the same result. A request with no tracked task returns immediately.
    pub async fn wait_for(&self, request_id: RequestId) -> Result<()> {
        let Some(done) = self.tasks.get(&request_id).map(|task| task.done.clone()) else {
            return Ok(());
        };

        let result = done.await;
        self.tasks.remove_if(&request_id, |_, task| task.abort.is_finished());

        result.map_err(|e| {
            error!("Activation task for {} failed: {}", request_id, e);
            Error::TaskFailed(format!("{}: {}", request_id, e))
        })
    }

    /// Abort every tracked task
    pub async fn shutdown_all(&self) {
        info!("Shutting down {} activation tasks", self.tasks.len());

        let ids: Vec<RequestId> = self.tasks.iter().map(|t| *t.key()).collect();
        for id in ids {
            if let Some((_, task)) = self.tasks.remove(&id) {
                task.abort.abort();
                // Let the abort land so nothing writes after shutdown returns
                let _ = task.done.await;
                info!("Aborted task for {}", id);
            }
        }
    }
}

impl Default for TaskSupervisor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_completes_task() {
        let supervisor = TaskSupervisor::new();
        let id = RequestId::new();

        supervisor.spawn(id, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        });
        assert!(supervisor.is_running(id));

        supervisor.wait_for(id).await.unwrap();
        assert!(!supervisor.is_running(id));
        // Nothing left to wait on
        supervisor.wait_for(id).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_task_stays_running_while_awaited() {
        let supervisor = std::sync::Arc::new(TaskSupervisor::new());
        let id = RequestId::new();

        supervisor.spawn(id, async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let waiter = {
            let supervisor = supervisor.clone();
            tokio::spawn(async move { supervisor.wait_for(id).await })
        };
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(supervisor.is_running(id));
        assert_eq!(supervisor.active_count(), 1);
        // A second waiter shares the same completion
        supervisor.wait_for(id).await.unwrap();
        waiter.await.unwrap().unwrap();

        assert!(!supervisor.is_running(id));
        assert_eq!(supervisor.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_panicking_task_is_reported() {
        let supervisor = TaskSupervisor::new();
        let id = RequestId::new();

        supervisor.spawn(id, async { panic!("boom") });

        assert!(matches!(supervisor.wait_for(id).await, Err(Error::TaskFailed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_aborts_running_tasks() {
        let supervisor = TaskSupervisor::new();
        for _ in 0..3 {
            supervisor.spawn(RequestId::new(), std::future::pending());
        }
        assert_eq!(supervisor.active_count(), 3);

        supervisor.shutdown_all().await;
        assert_eq!(supervisor.active_count(), 0);
    }
}
