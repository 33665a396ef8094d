//! Background sweeps over the task store.
//!
//! Three repair loops run inside the API process:
//! - reconciliation: `pending` rows that never got a transport handle
//!   are marked failed after a grace period (the submit path crashed
//!   between create and enqueue, or its failure write was lost)
//! - stale-running: `running` rows with no update past the type's
//!   hard limit plus grace are marked failed (worker died mid-attempt
//!   and nobody claimed the delivery)
//! - stale-retry: `retry` rows with no update past the type's maximum
//!   backoff plus grace are marked failed (the worker acked the failed
//!   delivery and died during the backoff wait, so the next attempt
//!   was never enqueued and no redelivery will come)
//! - retention: terminal rows older than the retention age are deleted

use std::sync::Arc;

use chrono::Utc;
use tokio::time::interval;
use tracing::{error, info, warn};

use vidgen_models::{Task, TaskPatch, TaskStatus};
use vidgen_store::TaskStore;

use crate::config::ApiConfig;

const SWEEP_BATCH: usize = 100;

/// Store repair loops.
pub struct TaskSweeper {
    store: Arc<dyn TaskStore>,
    config: ApiConfig,
    enabled: bool,
}

impl TaskSweeper {
    pub fn new(store: Arc<dyn TaskStore>, config: ApiConfig) -> Self {
        let enabled = std::env::var("ENABLE_SWEEPS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(true);

        Self {
            store,
            config,
            enabled,
        }
    }

    /// Run the sweep loops until the process exits. Spawn as a
    /// background task.
    pub async fn run(&self) {
        if !self.enabled {
            info!("Task sweeps are disabled");
            return;
        }

        info!(
            interval_secs = self.config.sweep_interval.as_secs(),
            "Starting task sweeper"
        );

        let mut repair_ticker = interval(self.config.sweep_interval);
        let mut retention_ticker = interval(self.config.retention_interval);
        // Don't fire retention at startup.
        retention_ticker.tick().await;

        loop {
            tokio::select! {
                _ = repair_ticker.tick() => {
                    if let Err(e) = self.reconcile_undispatched().await {
                        error!("Reconciliation sweep error: {e}");
                    }
                    if let Err(e) = self.fail_stale_running().await {
                        error!("Stale-running sweep error: {e}");
                    }
                    if let Err(e) = self.fail_stale_retry().await {
                        error!("Stale-retry sweep error: {e}");
                    }
                }
                _ = retention_ticker.tick() => {
                    match self.store.delete_older_than(
                        chrono::Duration::from_std(self.config.retention_age)
                            .unwrap_or_else(|_| chrono::Duration::days(30)),
                    ).await {
                        Ok(0) => {}
                        Ok(n) => info!(deleted = n, "Retention sweep removed old tasks"),
                        Err(e) => error!("Retention sweep error: {e}"),
                    }
                }
            }
        }
    }

    /// Repair `pending` rows that were never dispatched.
    async fn reconcile_undispatched(&self) -> anyhow::Result<()> {
        let pending = self
            .store
            .list_by_status(TaskStatus::Pending, SWEEP_BATCH)
            .await?;

        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.config.dispatch_grace)
                .unwrap_or_else(|_| chrono::Duration::seconds(120));

        for task in pending {
            if task.transport_handle.is_none() && task.created_at < cutoff {
                warn!(
                    task_id = %task.id,
                    age_secs = (Utc::now() - task.created_at).num_seconds(),
                    "Pending task was never dispatched, marking failed"
                );
                self.fail_task(&task, "transport_unavailable", "task was never dispatched")
                    .await;
            }
        }
        Ok(())
    }

    /// Fail `running` rows whose worker has gone silent.
    async fn fail_stale_running(&self) -> anyhow::Result<()> {
        let running = self
            .store
            .list_by_status(TaskStatus::Running, SWEEP_BATCH)
            .await?;

        let now = Utc::now();
        for task in running {
            let bound = chrono::Duration::seconds(
                (task.task_type.hard_limit_secs() + self.config.stale_grace.as_secs()) as i64,
            );
            if now - task.updated_at > bound {
                warn!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    silent_secs = (now - task.updated_at).num_seconds(),
                    "Running task went silent past its hard limit, marking failed"
                );
                self.fail_task(&task, "timeout", "worker went silent past the hard limit")
                    .await;
                metrics::counter!("vidgen_sweeper_stale_total").increment(1);
            }
        }
        Ok(())
    }

    /// Fail `retry` rows whose next attempt was never re-dispatched.
    ///
    /// A row parked in `retry` longer than its type's largest backoff
    /// delay plus grace means the re-dispatching worker died during
    /// the backoff wait. The original delivery is already acked at
    /// that point, so the claim ticker cannot recover it.
    async fn fail_stale_retry(&self) -> anyhow::Result<()> {
        let parked = self
            .store
            .list_by_status(TaskStatus::Retry, SWEEP_BATCH)
            .await?;

        let now = Utc::now();
        for task in parked {
            let ty = task.task_type;
            let max_backoff =
                ty.backoff_base_secs() << ty.max_retries().saturating_sub(1).min(8);
            let bound = chrono::Duration::seconds(
                (max_backoff + self.config.stale_grace.as_secs()) as i64,
            );
            if now - task.updated_at > bound {
                warn!(
                    task_id = %task.id,
                    task_type = %task.task_type,
                    parked_secs = (now - task.updated_at).num_seconds(),
                    "Retry was never re-dispatched, marking failed"
                );
                self.fail_task(&task, "timeout", "retry was never re-dispatched")
                    .await;
                metrics::counter!("vidgen_sweeper_stale_total").increment(1);
            }
        }
        Ok(())
    }

    async fn fail_task(&self, task: &Task, error_type: &str, message: &str) {
        let patch = TaskPatch::new()
            .status(TaskStatus::Failed)
            .error(error_type, message)
            .completed_at(Utc::now());
        if let Err(e) = self.store.update(&task.id, patch).await {
            error!(task_id = %task.id, "Sweep repair write failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidgen_models::{FrameExtractParams, Task, TaskParams};
    use vidgen_store::MemoryTaskStore;

    fn frame_task(owner: &str) -> Task {
        Task::new(
            owner,
            TaskParams::FrameExtract(FrameExtractParams {
                video_path: "uploads/in.mp4".to_string(),
                frame_count: 6,
            }),
        )
    }

    fn sweeper(store: Arc<MemoryTaskStore>) -> TaskSweeper {
        TaskSweeper {
            store,
            config: ApiConfig::default(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn undispatched_pending_past_grace_is_failed() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut old = frame_task("owner-1");
        old.created_at = Utc::now() - chrono::Duration::seconds(600);
        let old = store.create(old).await.unwrap();
        let fresh = store.create(frame_task("owner-1")).await.unwrap();

        sweeper(store.clone()).reconcile_undispatched().await.unwrap();

        let repaired = store.get(&old.id).await.unwrap().unwrap();
        assert_eq!(repaired.status, TaskStatus::Failed);
        assert_eq!(
            repaired.error_type.as_deref(),
            Some("transport_unavailable")
        );

        let untouched = store.get(&fresh.id).await.unwrap().unwrap();
        assert_eq!(untouched.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn dispatched_pending_is_left_alone() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut task = frame_task("owner-1");
        task.created_at = Utc::now() - chrono::Duration::seconds(600);
        task.transport_handle = Some("default/1".to_string());
        let task = store.create(task).await.unwrap();

        sweeper(store.clone()).reconcile_undispatched().await.unwrap();

        let after = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn silent_running_past_hard_limit_is_failed() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut task = frame_task("owner-1");
        task.status = TaskStatus::Running;
        // frame_extract hard limit 180s + 60s grace
        task.updated_at = Utc::now() - chrono::Duration::seconds(300);
        let task = store.create(task).await.unwrap();

        sweeper(store.clone()).fail_stale_running().await.unwrap();

        let after = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Failed);
        assert_eq!(after.error_type.as_deref(), Some("timeout"));
        assert!(after.completed_at.is_some());
    }

    #[tokio::test]
    async fn retry_never_redispatched_is_failed() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut task = frame_task("owner-1");
        task.status = TaskStatus::Retry;
        task.retry_count = 1;
        // frame_extract max backoff 60s + 60s grace; the worker that
        // acked the failed attempt died during the backoff wait.
        task.updated_at = Utc::now() - chrono::Duration::seconds(300);
        let task = store.create(task).await.unwrap();

        sweeper(store.clone()).fail_stale_retry().await.unwrap();

        let after = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Failed);
        assert_eq!(after.error_type.as_deref(), Some("timeout"));
        assert!(after.completed_at.is_some());
    }

    #[tokio::test]
    async fn retry_within_backoff_window_is_left_alone() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut task = frame_task("owner-1");
        task.status = TaskStatus::Retry;
        task.retry_count = 1;
        task.updated_at = Utc::now() - chrono::Duration::seconds(45);
        let task = store.create(task).await.unwrap();

        sweeper(store.clone()).fail_stale_retry().await.unwrap();

        let after = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Retry);
        assert!(after.completed_at.is_none());
    }

    #[tokio::test]
    async fn active_running_is_left_alone() {
        let store = Arc::new(MemoryTaskStore::new());
        let mut task = frame_task("owner-1");
        task.status = TaskStatus::Running;
        task.updated_at = Utc::now() - chrono::Duration::seconds(60);
        let task = store.create(task).await.unwrap();

        sweeper(store.clone()).fail_stale_running().await.unwrap();

        let after = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(after.status, TaskStatus::Running);
    }
}
