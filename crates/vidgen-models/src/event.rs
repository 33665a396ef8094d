//! Live progress event schemas.
//!
//! Events are published on the progress channel keyed by task ID.
//! Progress events carry `(attempt, seq)` so consumers can drop
//! out-of-order deliveries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::task::TaskId;

/// Event envelope published on the live progress channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TaskEvent {
    /// Progress update within one attempt.
    Progress {
        task_id: TaskId,
        attempt: u32,
        seq: u64,
        percent: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        step: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Attempt failed transiently, re-dispatch scheduled.
    Retrying {
        task_id: TaskId,
        attempt: u32,
        delay_seconds: u64,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Task completed successfully.
    Completed {
        task_id: TaskId,
        #[serde(skip_serializing_if = "Option::is_none")]
        result_url: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// Task failed terminally.
    Failed {
        task_id: TaskId,
        error_type: String,
        message: String,
        timestamp: DateTime<Utc>,
    },

    /// Task was cancelled.
    Cancelled {
        task_id: TaskId,
        timestamp: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn progress(
        task_id: &TaskId,
        attempt: u32,
        seq: u64,
        percent: u8,
        step: Option<String>,
    ) -> Self {
        TaskEvent::Progress {
            task_id: task_id.clone(),
            attempt,
            seq,
            percent: percent.min(100),
            step,
            timestamp: Utc::now(),
        }
    }

    pub fn retrying(task_id: &TaskId, attempt: u32, delay_seconds: u64, message: impl Into<String>) -> Self {
        TaskEvent::Retrying {
            task_id: task_id.clone(),
            attempt,
            delay_seconds,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn completed(task_id: &TaskId, result_url: Option<String>) -> Self {
        TaskEvent::Completed {
            task_id: task_id.clone(),
            result_url,
            timestamp: Utc::now(),
        }
    }

    pub fn failed(task_id: &TaskId, error_type: impl Into<String>, message: impl Into<String>) -> Self {
        TaskEvent::Failed {
            task_id: task_id.clone(),
            error_type: error_type.into(),
            message: message.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn cancelled(task_id: &TaskId) -> Self {
        TaskEvent::Cancelled {
            task_id: task_id.clone(),
            timestamp: Utc::now(),
        }
    }

    /// The task this event belongs to.
    pub fn task_id(&self) -> &TaskId {
        match self {
            TaskEvent::Progress { task_id, .. }
            | TaskEvent::Retrying { task_id, .. }
            | TaskEvent::Completed { task_id, .. }
            | TaskEvent::Failed { task_id, .. }
            | TaskEvent::Cancelled { task_id, .. } => task_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn progress_event_serde_roundtrip() {
        let id = TaskId::new();
        let event = TaskEvent::progress(&id, 1, 7, 42, Some("extracting".to_string()));
        let json = serde_json::to_string(&event).expect("serialize TaskEvent");
        let decoded: TaskEvent = serde_json::from_str(&json).expect("deserialize TaskEvent");
        match decoded {
            TaskEvent::Progress { task_id, attempt, seq, percent, step, .. } => {
                assert_eq!(task_id, id);
                assert_eq!(attempt, 1);
                assert_eq!(seq, 7);
                assert_eq!(percent, 42);
                assert_eq!(step.as_deref(), Some("extracting"));
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn percent_clamped_at_100() {
        let id = TaskId::new();
        match TaskEvent::progress(&id, 0, 1, 120, None) {
            TaskEvent::Progress { percent, .. } => assert_eq!(percent, 100),
            other => panic!("unexpected variant: {other:?}"),
        }
    }
}
