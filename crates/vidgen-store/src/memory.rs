//! In-memory task store.
//!
//! Used when store credentials are absent (local dev) and in tests.
//! Applies the same patch guards as the REST backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use vidgen_models::{Task, TaskId, TaskPatch, TaskStatus};

use crate::error::{StoreError, StoreResult};
use crate::patch;
use crate::store::{StatusCounts, TaskStore};

/// In-memory task store.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: RwLock<HashMap<String, Task>>,
}

impl MemoryTaskStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently held (test helper).
    pub fn len(&self) -> usize {
        self.tasks.read().expect("store lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl TaskStore for MemoryTaskStore {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, task: Task) -> StoreResult<Task> {
        let mut tasks = self.tasks.write().expect("store lock poisoned");
        if tasks.contains_key(task.id.as_str()) {
            return Err(StoreError::AlreadyExists(task.id.to_string()));
        }
        tasks.insert(task.id.to_string(), task.clone());
        Ok(task)
    }

    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>> {
        let tasks = self.tasks.read().expect("store lock poisoned");
        Ok(tasks.get(id.as_str()).cloned())
    }

    async fn update(&self, id: &TaskId, patch: TaskPatch) -> StoreResult<Task> {
        let mut tasks = self.tasks.write().expect("store lock poisoned");
        let current = tasks
            .get(id.as_str())
            .ok_or_else(|| StoreError::not_found(id.to_string()))?;

        let sanitized = patch::sanitize(current, patch);
        let updated = patch::apply(current, sanitized);
        tasks.insert(id.to_string(), updated.clone());
        Ok(updated)
    }

    async fn list(
        &self,
        owner_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Task>> {
        let tasks = self.tasks.read().expect("store lock poisoned");
        let mut matching: Vec<Task> = tasks
            .values()
            .filter(|t| t.owner_id == owner_id)
            .filter(|t| status.map(|s| t.status == s).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn list_by_status(&self, status: TaskStatus, limit: usize) -> StoreResult<Vec<Task>> {
        let tasks = self.tasks.read().expect("store lock poisoned");
        let mut matching: Vec<Task> = tasks
            .values()
            .filter(|t| t.status == status)
            .cloned()
            .collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn count_by_status(
        &self,
        owner_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> StoreResult<StatusCounts> {
        let tasks = self.tasks.read().expect("store lock poisoned");
        let mut counts = StatusCounts::new();
        for task in tasks.values() {
            if task.created_at < since {
                continue;
            }
            if let Some(owner) = owner_id {
                if task.owner_id != owner {
                    continue;
                }
            }
            *counts.entry(task.status).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn delete_older_than(&self, age: Duration) -> StoreResult<u64> {
        let cutoff = Utc::now() - age;
        let mut tasks = self.tasks.write().expect("store lock poisoned");
        let before = tasks.len();
        tasks.retain(|_, t| t.created_at >= cutoff);
        Ok((before - tasks.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidgen_models::{FrameExtractParams, TaskParams};

    fn task(owner: &str) -> Task {
        Task::new(
            owner,
            TaskParams::FrameExtract(FrameExtractParams {
                video_path: "v.mp4".to_string(),
                frame_count: 6,
            }),
        )
    }

    #[tokio::test]
    async fn create_get_roundtrip() {
        let store = MemoryTaskStore::new();
        let created = store.create(task("owner-1")).await.unwrap();

        let fetched = store.get(&created.id).await.unwrap().expect("task exists");
        assert_eq!(fetched.id, created.id);
        assert_eq!(fetched.status, TaskStatus::Pending);

        let missing = store.get(&TaskId::new()).await.unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn duplicate_create_rejected() {
        let store = MemoryTaskStore::new();
        let t = store.create(task("owner-1")).await.unwrap();
        let err = store.create(t).await.unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn update_applies_legal_transition_only() {
        let store = MemoryTaskStore::new();
        let t = store.create(task("owner-1")).await.unwrap();

        // pending -> success is not a legal edge; status is kept.
        let updated = store
            .update(&t.id, TaskPatch::new().status(TaskStatus::Success))
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Pending);

        let updated = store
            .update(
                &t.id,
                TaskPatch::new()
                    .status(TaskStatus::Running)
                    .started_at(Utc::now()),
            )
            .await
            .unwrap();
        assert_eq!(updated.status, TaskStatus::Running);
    }

    #[tokio::test]
    async fn update_missing_task_is_not_found() {
        let store = MemoryTaskStore::new();
        let err = store
            .update(&TaskId::new(), TaskPatch::new().retry_count(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn cancel_racing_success_keeps_first_terminal_state() {
        let store = MemoryTaskStore::new();
        let t = store.create(task("owner-1")).await.unwrap();
        store
            .update(
                &t.id,
                TaskPatch::new()
                    .status(TaskStatus::Running)
                    .started_at(Utc::now()),
            )
            .await
            .unwrap();

        // Worker commits success.
        let after_success = store
            .update(
                &t.id,
                TaskPatch::new()
                    .status(TaskStatus::Success)
                    .progress(100, 0, 10)
                    .completed_at(Utc::now()),
            )
            .await
            .unwrap();
        assert_eq!(after_success.status, TaskStatus::Success);

        // Late cancel arrives; it must neither crash nor flip the state.
        let after_cancel = store
            .update(
                &t.id,
                TaskPatch::new()
                    .status(TaskStatus::Cancelled)
                    .completed_at(Utc::now()),
            )
            .await
            .unwrap();
        assert_eq!(after_cancel.status, TaskStatus::Success);
        assert_eq!(after_cancel.completed_at, after_success.completed_at);
    }

    #[tokio::test]
    async fn list_is_newest_first_filtered_and_capped() {
        let store = MemoryTaskStore::new();
        let mut ids = Vec::new();
        for _ in 0..5 {
            let mut t = task("owner-1");
            // Spread creation times so ordering is deterministic.
            t.created_at = Utc::now() - Duration::seconds(5 - ids.len() as i64);
            ids.push(store.create(t).await.unwrap().id);
        }
        store.create(task("owner-2")).await.unwrap();

        // Move the two oldest to success.
        for id in &ids[..2] {
            store
                .update(id, TaskPatch::new().status(TaskStatus::Running))
                .await
                .unwrap();
            store
                .update(
                    id,
                    TaskPatch::new()
                        .status(TaskStatus::Success)
                        .completed_at(Utc::now()),
                )
                .await
                .unwrap();
        }

        let all = store.list("owner-1", None, 10).await.unwrap();
        assert_eq!(all.len(), 5);
        assert!(all.windows(2).all(|w| w[0].created_at >= w[1].created_at));

        let successes = store
            .list("owner-1", Some(TaskStatus::Success), 10)
            .await
            .unwrap();
        assert_eq!(successes.len(), 2);
        assert!(successes.iter().all(|t| t.status == TaskStatus::Success));

        let capped = store.list("owner-1", None, 3).await.unwrap();
        assert_eq!(capped.len(), 3);
    }

    #[tokio::test]
    async fn delete_older_than_prunes_by_age() {
        let store = MemoryTaskStore::new();
        let mut old = task("owner-1");
        old.created_at = Utc::now() - Duration::days(40);
        store.create(old).await.unwrap();
        store.create(task("owner-1")).await.unwrap();

        let deleted = store.delete_older_than(Duration::days(30)).await.unwrap();
        assert_eq!(deleted, 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn count_by_status_windows_and_scopes() {
        let store = MemoryTaskStore::new();
        store.create(task("owner-1")).await.unwrap();
        store.create(task("owner-1")).await.unwrap();
        store.create(task("owner-2")).await.unwrap();

        let counts = store
            .count_by_status(Some("owner-1"), Utc::now() - Duration::days(7))
            .await
            .unwrap();
        assert_eq!(counts.get(&TaskStatus::Pending), Some(&2));

        let counts = store
            .count_by_status(None, Utc::now() + Duration::seconds(5))
            .await
            .unwrap();
        assert!(counts.is_empty());
    }
}
