//! Task store capability interface.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tracing::info;

use vidgen_models::{Task, TaskId, TaskPatch, TaskStatus};

use crate::error::StoreResult;
use crate::memory::MemoryTaskStore;
use crate::rest::{RestConfig, RestTaskStore};

/// Per-status task counts for a time window.
pub type StatusCounts = HashMap<TaskStatus, u64>;

/// Durable record per task: create/get/update/list/delete-older-than.
///
/// `update` applies field-level partial patches with the guards of
/// [`crate::patch`]; it never fails on a racing writer, it drops the
/// offending fields instead. The two `list_by_status`/`count_by_status`
/// extensions serve the background sweeps and the stats endpoint.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Which backend this store talks to ("rest" or "memory").
    fn backend(&self) -> &'static str;

    /// Insert a new task row. Fails if the id already exists.
    async fn create(&self, task: Task) -> StoreResult<Task>;

    /// Fetch one task.
    async fn get(&self, id: &TaskId) -> StoreResult<Option<Task>>;

    /// Apply a partial update and return the resulting row.
    async fn update(&self, id: &TaskId, patch: TaskPatch) -> StoreResult<Task>;

    /// Owner's tasks, newest-first, optionally filtered by status.
    async fn list(
        &self,
        owner_id: &str,
        status: Option<TaskStatus>,
        limit: usize,
    ) -> StoreResult<Vec<Task>>;

    /// All tasks in a given status, oldest-first (sweep input).
    async fn list_by_status(&self, status: TaskStatus, limit: usize) -> StoreResult<Vec<Task>>;

    /// Per-status counts for tasks created after `since`.
    async fn count_by_status(
        &self,
        owner_id: Option<&str>,
        since: DateTime<Utc>,
    ) -> StoreResult<StatusCounts>;

    /// Retention sweep: delete rows older than `age`. Returns count.
    async fn delete_older_than(&self, age: Duration) -> StoreResult<u64>;
}

/// Construct the task store from the environment, exactly once at
/// startup.
///
/// Uses the REST row store when `SUPABASE_URL` and
/// `SUPABASE_SERVICE_KEY` are set, the in-memory store otherwise.
pub fn store_from_env() -> StoreResult<Arc<dyn TaskStore>> {
    match RestConfig::from_env() {
        Some(config) => {
            info!("Task store: REST backend at {}", config.base_url);
            Ok(Arc::new(RestTaskStore::new(config)?))
        }
        None => {
            info!("Task store: credentials not configured, using in-memory backend");
            Ok(Arc::new(MemoryTaskStore::new()))
        }
    }
}
