//! Task record and field-level partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::params::TaskParams;
use crate::status::TaskStatus;
use crate::task_type::TaskType;

/// Unique identifier for a task. Assigned at creation, never reassigned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub String);

impl TaskId {
    /// Generate a new random task ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Persisted task record.
///
/// Mutated by two independent writers: the orchestrator (create,
/// cancel) and the running worker (progress, terminal update), always
/// via field-level [`TaskPatch`] updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique task ID
    pub id: TaskId,

    /// Owner (session/user) ID
    pub owner_id: String,

    /// Task type
    pub task_type: TaskType,

    /// Lifecycle status
    #[serde(default)]
    pub status: TaskStatus,

    /// Validated submission params
    pub params: TaskParams,

    /// Progress (0-100), non-decreasing within one attempt
    #[serde(default)]
    pub progress: u8,

    /// Current step label
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,

    /// Attempt number the last progress write belonged to
    #[serde(default)]
    pub progress_attempt: u32,

    /// Per-attempt progress sequence number (stale-write guard)
    #[serde(default)]
    pub progress_seq: u64,

    /// Transport delivery handle, null until dispatched
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_handle: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    /// When the first attempt started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When a terminal state was entered (set exactly once)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Derived: completed_at - started_at, seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_seconds: Option<f64>,

    /// Result artifact path (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,

    /// Result URL (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,

    /// Result metadata (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_metadata: Option<serde_json::Value>,

    /// Error class (failure only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,

    /// Error message (failure only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,

    /// Number of retry attempts consumed
    #[serde(default)]
    pub retry_count: u32,
}

impl Task {
    /// Create a new pending task row for a validated submission.
    pub fn new(owner_id: impl Into<String>, params: TaskParams) -> Self {
        let now = Utc::now();
        Self {
            id: TaskId::new(),
            owner_id: owner_id.into(),
            task_type: params.task_type(),
            status: TaskStatus::Pending,
            params,
            progress: 0,
            current_step: None,
            progress_attempt: 0,
            progress_seq: 0,
            transport_handle: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
            duration_seconds: None,
            result_path: None,
            result_url: None,
            result_metadata: None,
            error_type: None,
            error_message: None,
            retry_count: 0,
        }
    }

    /// Check if the task is in a terminal state.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Field-level partial update against a task row.
///
/// Only the fields that are `Some` are written; the store applies its
/// own transition and stale-progress guards on top.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TaskPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_attempt: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress_seq: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transport_handle: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_metadata: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_count: Option<u32>,
}

impl TaskPatch {
    /// Empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no field is set.
    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| v.as_object().map(|o| o.is_empty()).unwrap_or(true))
            .unwrap_or(true)
    }

    pub fn status(mut self, status: TaskStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Progress write with its per-attempt sequence number.
    pub fn progress(mut self, percent: u8, attempt: u32, seq: u64) -> Self {
        self.progress = Some(percent.min(100));
        self.progress_attempt = Some(attempt);
        self.progress_seq = Some(seq);
        self
    }

    pub fn current_step(mut self, step: impl Into<String>) -> Self {
        self.current_step = Some(step.into());
        self
    }

    pub fn transport_handle(mut self, handle: impl Into<String>) -> Self {
        self.transport_handle = Some(handle.into());
        self
    }

    pub fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn completed_at(mut self, at: DateTime<Utc>) -> Self {
        self.completed_at = Some(at);
        self
    }

    /// Success artifact fields. Absent parts stay unset.
    pub fn result(
        mut self,
        path: Option<String>,
        url: Option<String>,
        metadata: Option<serde_json::Value>,
    ) -> Self {
        self.result_path = path;
        self.result_url = url;
        self.result_metadata = metadata;
        self
    }

    pub fn error(mut self, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        self.error_type = Some(error_type.into());
        self.error_message = Some(message.into());
        self
    }

    pub fn retry_count(mut self, count: u32) -> Self {
        self.retry_count = Some(count);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::FrameExtractParams;

    fn sample_task() -> Task {
        Task::new(
            "owner-1",
            TaskParams::FrameExtract(FrameExtractParams {
                video_path: "v.mp4".to_string(),
                frame_count: 6,
            }),
        )
    }

    #[test]
    fn new_task_is_pending() {
        let task = sample_task();
        assert_eq!(task.status, TaskStatus::Pending);
        assert_eq!(task.task_type, TaskType::FrameExtract);
        assert_eq!(task.progress, 0);
        assert!(task.transport_handle.is_none());
        assert!(task.completed_at.is_none());
    }

    #[test]
    fn patch_serializes_only_set_fields() {
        let patch = TaskPatch::new()
            .status(TaskStatus::Running)
            .started_at(Utc::now());
        let value = serde_json::to_value(&patch).unwrap();
        let obj = value.as_object().unwrap();
        assert_eq!(obj.len(), 2);
        assert_eq!(obj["status"], "running");
    }

    #[test]
    fn empty_patch_detected() {
        assert!(TaskPatch::new().is_empty());
        assert!(!TaskPatch::new().retry_count(1).is_empty());
    }

    #[test]
    fn progress_clamped() {
        let patch = TaskPatch::new().progress(150, 0, 1);
        assert_eq!(patch.progress, Some(100));
    }
}
