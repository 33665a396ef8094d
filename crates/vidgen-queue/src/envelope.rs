//! Work item envelope and delivery handles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use vidgen_models::{TaskId, TaskParams, TaskType};

/// Payload enqueued on a task queue, one per execution attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    /// Task row this attempt belongs to
    pub task_id: TaskId,
    /// Task type (redundant with params, kept for cheap routing)
    pub task_type: TaskType,
    /// Owner ID
    pub owner_id: String,
    /// Validated params
    pub params: TaskParams,
    /// Attempt number, 0 for the first dispatch
    #[serde(default)]
    pub attempt: u32,
    /// When this item was enqueued
    pub enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    /// Envelope for the first attempt of a task.
    pub fn first_attempt(task_id: TaskId, owner_id: impl Into<String>, params: TaskParams) -> Self {
        Self {
            task_id,
            task_type: params.task_type(),
            owner_id: owner_id.into(),
            params,
            attempt: 0,
            enqueued_at: Utc::now(),
        }
    }

    /// Envelope for the re-dispatch after a transient failure.
    pub fn next_attempt(&self) -> Self {
        Self {
            task_id: self.task_id.clone(),
            task_type: self.task_type,
            owner_id: self.owner_id.clone(),
            params: self.params.clone(),
            attempt: self.attempt + 1,
            enqueued_at: Utc::now(),
        }
    }
}

/// Opaque handle to an enqueued delivery, recorded on the task row so
/// the orchestrator can later revoke it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryHandle {
    /// Queue the item was placed on
    pub queue: String,
    /// Transport message ID within that queue
    pub message_id: String,
}

impl DeliveryHandle {
    pub fn new(queue: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            message_id: message_id.into(),
        }
    }

    /// Encode for storage on the task row.
    pub fn encode(&self) -> String {
        format!("{}/{}", self.queue, self.message_id)
    }

    /// Decode a stored handle.
    pub fn decode(s: &str) -> Option<Self> {
        let (queue, message_id) = s.split_once('/')?;
        if queue.is_empty() || message_id.is_empty() {
            return None;
        }
        Some(Self::new(queue, message_id))
    }
}

impl fmt::Display for DeliveryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

/// One consumed delivery: the handle to ack plus the work item.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub handle: DeliveryHandle,
    pub item: WorkItem,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vidgen_models::{FrameExtractParams, TaskParams};

    #[test]
    fn handle_encode_decode() {
        let handle = DeliveryHandle::new("veo", "1700000000000-0");
        let decoded = DeliveryHandle::decode(&handle.encode()).expect("decodes");
        assert_eq!(decoded, handle);

        assert!(DeliveryHandle::decode("no-separator").is_none());
        assert!(DeliveryHandle::decode("/empty-queue").is_none());
    }

    #[test]
    fn next_attempt_increments_and_keeps_identity() {
        let item = WorkItem::first_attempt(
            TaskId::new(),
            "owner-1",
            TaskParams::FrameExtract(FrameExtractParams {
                video_path: "v.mp4".to_string(),
                frame_count: 6,
            }),
        );
        let retry = item.next_attempt();
        assert_eq!(retry.attempt, 1);
        assert_eq!(retry.task_id, item.task_id);
        assert_eq!(retry.task_type, item.task_type);
    }
}
