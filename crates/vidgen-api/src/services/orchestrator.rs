//! Task orchestration service.
//!
//! Submission, retrieval, listing, cancellation and stats. The only
//! component that both creates rows and talks to the transport; the
//! worker owns everything after dispatch.

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use tracing::{info, warn};

use vidgen_models::{Task, TaskId, TaskParams, TaskPatch, TaskStatus};
use vidgen_queue::{route_for, DeliveryHandle, QueueTransport, WorkItem};
use vidgen_store::{StatusCounts, TaskStore};

use crate::error::{ApiError, ApiResult};

/// Orchestrates the task lifecycle between store and transport.
#[derive(Clone)]
pub struct TaskOrchestrator {
    store: Arc<dyn TaskStore>,
    transport: Arc<dyn QueueTransport>,
}

impl TaskOrchestrator {
    pub fn new(store: Arc<dyn TaskStore>, transport: Arc<dyn QueueTransport>) -> Self {
        Self { store, transport }
    }

    pub fn store(&self) -> &Arc<dyn TaskStore> {
        &self.store
    }

    pub fn transport(&self) -> &Arc<dyn QueueTransport> {
        &self.transport
    }

    /// Validate, persist and dispatch a new task.
    ///
    /// Validation failures create no row. Once the row exists, a
    /// transport outage marks it `failed` best-effort so it cannot
    /// hang in `pending` forever; the reconciliation sweep catches
    /// the rows where even that write was lost.
    pub async fn submit(
        &self,
        owner_id: &str,
        task_type: &str,
        params: &serde_json::Value,
    ) -> ApiResult<Task> {
        let params = TaskParams::from_parts(task_type, params)?;

        let task = self.store.create(Task::new(owner_id, params)).await?;
        let item = WorkItem::first_attempt(task.id.clone(), owner_id, task.params.clone());
        let route = route_for(task.task_type);

        let handle = match self.transport.enqueue(&route, &item).await {
            Ok(handle) => handle,
            Err(e) => {
                warn!(task_id = %task.id, "Dispatch failed, marking task failed: {e}");
                let patch = TaskPatch::new()
                    .status(TaskStatus::Failed)
                    .error("transport_unavailable", e.to_string())
                    .completed_at(Utc::now());
                if let Err(mark) = self.store.update(&task.id, patch).await {
                    warn!(task_id = %task.id, "Could not mark undispatched task failed: {mark}");
                }
                return Err(ApiError::TransportUnavailable(e.to_string()));
            }
        };

        let task = self
            .store
            .update(
                &task.id,
                TaskPatch::new().transport_handle(handle.encode()),
            )
            .await?;

        info!(
            task_id = %task.id,
            task_type = %task.task_type,
            queue = route.queue,
            "Task submitted"
        );
        metrics::counter!("vidgen_tasks_submitted_total", "task_type" => task.task_type.as_str())
            .increment(1);

        Ok(task)
    }

    /// Fetch one task.
    pub async fn get(&self, id: &TaskId) -> ApiResult<Task> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| ApiError::not_found(format!("task {id}")))
    }

    /// Owner's tasks, newest-first.
    pub async fn list(
        &self,
        owner_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> ApiResult<Vec<Task>> {
        Ok(self.store.list(owner_id, status, limit).await?)
    }

    /// Request cancellation.
    ///
    /// Terminal tasks conflict. For the rest: revoke the pending
    /// delivery and raise the cancel flag, then mark the row
    /// cancelled. A running attempt observes the flag and stops
    /// cooperatively; the race with a finishing attempt is settled by
    /// the store, whichever terminal state lands first sticks.
    pub async fn cancel(&self, id: &TaskId) -> ApiResult<Task> {
        let task = self.get(id).await?;
        if task.is_terminal() {
            return Err(ApiError::already_terminal(format!(
                "task {id} is already {}",
                task.status
            )));
        }

        if let Some(encoded) = task.transport_handle.as_deref() {
            match DeliveryHandle::decode(encoded) {
                Some(handle) => {
                    if let Err(e) = self.transport.revoke_and_terminate(&handle, id).await {
                        // The row still goes terminal; a running
                        // attempt that misses the flag loses the
                        // terminal race and its write is dropped.
                        warn!(task_id = %id, "Revoke failed: {e}");
                    }
                }
                None => warn!(task_id = %id, handle = encoded, "Unparseable transport handle"),
            }
        }

        let patch = TaskPatch::new()
            .status(TaskStatus::Cancelled)
            .completed_at(Utc::now());
        let task = self.store.update(id, patch).await?;

        info!(task_id = %id, status = %task.status, "Cancellation requested");
        metrics::counter!("vidgen_tasks_cancelled_total").increment(1);
        Ok(task)
    }

    /// Per-status counts over a trailing window of days.
    pub async fn stats(&self, owner_id: Option<&str>, days: i64) -> ApiResult<StatusCounts> {
        let since = Utc::now() - ChronoDuration::days(days);
        Ok(self.store.count_by_status(owner_id, since).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use vidgen_queue::MemoryTransport;
    use vidgen_store::MemoryTaskStore;

    fn orchestrator() -> (TaskOrchestrator, Arc<MemoryTaskStore>, Arc<MemoryTransport>) {
        let store = Arc::new(MemoryTaskStore::new());
        let transport = Arc::new(MemoryTransport::new());
        (
            TaskOrchestrator::new(store.clone(), transport.clone()),
            store,
            transport,
        )
    }

    #[tokio::test]
    async fn submit_creates_pending_row_and_enqueues() {
        let (orch, store, transport) = orchestrator();

        let task = orch
            .submit(
                "owner-1",
                "frame_extract",
                &json!({"video_path": "uploads/in.mp4"}),
            )
            .await
            .unwrap();

        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.transport_handle.is_some());
        assert_eq!(transport.queue_len("default"), 1);

        let stored = store.get(&task.id).await.unwrap().unwrap();
        assert_eq!(stored.transport_handle, task.transport_handle);
    }

    #[tokio::test]
    async fn submit_rejects_missing_required_field_without_row() {
        let (orch, store, transport) = orchestrator();

        let err = orch
            .submit("owner-1", "veo_generate", &json!({"image_path": "in.png"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));

        assert_eq!(transport.queue_len("veo"), 0);
        let listed = store.list("owner-1", None, 10).await.unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn submit_rejects_unknown_task_type() {
        let (orch, _, _) = orchestrator();
        let err = orch
            .submit("owner-1", "make_coffee", &json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::UnknownTaskType(_)));
    }

    #[tokio::test]
    async fn cancel_pending_revokes_delivery() {
        let (orch, _, transport) = orchestrator();

        let task = orch
            .submit(
                "owner-1",
                "frame_extract",
                &json!({"video_path": "uploads/in.mp4"}),
            )
            .await
            .unwrap();

        let cancelled = orch.cancel(&task.id).await.unwrap();
        assert_eq!(cancelled.status, TaskStatus::Cancelled);
        assert!(cancelled.completed_at.is_some());
        assert!(transport
            .consume("default", "test", std::time::Duration::ZERO, 5)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn cancel_terminal_task_conflicts() {
        let (orch, _, _) = orchestrator();

        let task = orch
            .submit(
                "owner-1",
                "frame_extract",
                &json!({"video_path": "uploads/in.mp4"}),
            )
            .await
            .unwrap();

        orch.cancel(&task.id).await.unwrap();
        let err = orch.cancel(&task.id).await.unwrap_err();
        assert!(matches!(err, ApiError::AlreadyTerminal(_)));
    }

    #[tokio::test]
    async fn cancel_unknown_task_is_not_found() {
        let (orch, _, _) = orchestrator();
        let err = orch.cancel(&TaskId::new()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_filters_by_status_newest_first() {
        let (orch, _, _) = orchestrator();

        let a = orch
            .submit(
                "owner-1",
                "frame_extract",
                &json!({"video_path": "a.mp4"}),
            )
            .await
            .unwrap();
        let b = orch
            .submit(
                "owner-1",
                "frame_extract",
                &json!({"video_path": "b.mp4"}),
            )
            .await
            .unwrap();
        orch.submit(
            "owner-2",
            "frame_extract",
            &json!({"video_path": "c.mp4"}),
        )
        .await
        .unwrap();
        orch.cancel(&a.id).await.unwrap();

        let pending = orch
            .list("owner-1", Some(TaskStatus::Pending), 50)
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, b.id);

        let all = orch.list("owner-1", None, 50).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn stats_counts_by_status() {
        let (orch, _, _) = orchestrator();

        let a = orch
            .submit(
                "owner-1",
                "frame_extract",
                &json!({"video_path": "a.mp4"}),
            )
            .await
            .unwrap();
        orch.submit(
            "owner-1",
            "frame_extract",
            &json!({"video_path": "b.mp4"}),
        )
        .await
        .unwrap();
        orch.cancel(&a.id).await.unwrap();

        let counts = orch.stats(Some("owner-1"), 7).await.unwrap();
        assert_eq!(counts.get(&TaskStatus::Pending), Some(&1));
        assert_eq!(counts.get(&TaskStatus::Cancelled), Some(&1));
    }
}
