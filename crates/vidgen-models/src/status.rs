//! Task lifecycle state machine.

use serde::{Deserialize, Serialize};

/// Task lifecycle status.
///
/// Legal edges:
/// `pending -> running`, `running -> {success, failed, retry, cancelled}`,
/// `retry -> running`. A task that never reached a worker may also go
/// `pending -> cancelled` (user cancel) or `pending -> failed`
/// (submission-time transport failure repaired by the reconciliation
/// sweep). Terminal states admit no further transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task row created, not yet picked up by a worker
    #[default]
    Pending,
    /// A worker is executing an attempt
    Running,
    /// Last attempt failed with a transient error, re-dispatch scheduled
    Retry,
    /// Task completed successfully
    Success,
    /// Task failed permanently
    Failed,
    /// Task was cancelled
    Cancelled,
}

impl TaskStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Retry => "retry",
            TaskStatus::Success => "success",
            TaskStatus::Failed => "failed",
            TaskStatus::Cancelled => "cancelled",
        }
    }

    /// Parse from the persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "running" => Some(TaskStatus::Running),
            "retry" => Some(TaskStatus::Retry),
            "success" => Some(TaskStatus::Success),
            "failed" => Some(TaskStatus::Failed),
            "cancelled" => Some(TaskStatus::Cancelled),
            _ => None,
        }
    }

    /// Check if this is a terminal state (no more transitions permitted).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check whether a transition to `next` follows a legal edge.
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        match (self, next) {
            (Pending, Running) | (Pending, Cancelled) | (Pending, Failed) => true,
            (Running, Success) | (Running, Failed) | (Running, Retry) | (Running, Cancelled) => {
                true
            }
            (Retry, Running) | (Retry, Cancelled) | (Retry, Failed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_admit_no_edges() {
        for terminal in [TaskStatus::Success, TaskStatus::Failed, TaskStatus::Cancelled] {
            assert!(terminal.is_terminal());
            for next in [
                TaskStatus::Pending,
                TaskStatus::Running,
                TaskStatus::Retry,
                TaskStatus::Success,
                TaskStatus::Failed,
                TaskStatus::Cancelled,
            ] {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal} -> {next} should be illegal"
                );
            }
        }
    }

    #[test]
    fn lifecycle_edges() {
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Success));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Retry));
        assert!(TaskStatus::Retry.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Cancelled));
        assert!(TaskStatus::Pending.can_transition_to(TaskStatus::Cancelled));

        assert!(!TaskStatus::Pending.can_transition_to(TaskStatus::Success));
        assert!(!TaskStatus::Running.can_transition_to(TaskStatus::Pending));
        assert!(!TaskStatus::Retry.can_transition_to(TaskStatus::Success));
    }

    #[test]
    fn serde_snake_case() {
        let json = serde_json::to_string(&TaskStatus::Cancelled).unwrap();
        assert_eq!(json, "\"cancelled\"");
        assert_eq!(TaskStatus::parse("retry"), Some(TaskStatus::Retry));
        assert_eq!(TaskStatus::parse("bogus"), None);
    }
}
