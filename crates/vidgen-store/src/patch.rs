//! Patch sanitization and application.
//!
//! The store row is mutated by two independent writers (orchestrator
//! and worker) with field-level patches. This module is the single
//! place where the row invariants are enforced:
//!
//! - status changes only along legal edges; terminal states are sticky
//! - `completed_at` is written at most once, on entering a terminal
//!   state, and `duration_seconds` is derived when both timestamps
//!   exist
//! - progress writes are dropped on terminal rows, and when their
//!   `(attempt, seq)` is not newer than what the row holds, and when
//!   they would make progress regress within the same attempt
//!
//! Offending fields are dropped from the patch and the rest applied;
//! a racing cancel and success never crash, whichever terminal state
//! landed first wins.

use chrono::Utc;
use tracing::debug;

use vidgen_models::{Task, TaskPatch};

/// Strip fields that would violate row invariants given the current row.
pub fn sanitize(current: &Task, mut patch: TaskPatch) -> TaskPatch {
    if let Some(next) = patch.status {
        if next == current.status {
            // No-op transition under redelivery; keep the rest of the patch.
            patch.status = None;
        } else if !current.status.can_transition_to(next) {
            debug!(
                task_id = %current.id,
                from = %current.status,
                to = %next,
                "Dropping illegal status transition"
            );
            patch.status = None;
            // The fields that ride along with a terminal transition make
            // no sense without it.
            patch.completed_at = None;
            patch.result_path = None;
            patch.result_url = None;
            patch.result_metadata = None;
            patch.error_type = None;
            patch.error_message = None;
        }
    }

    // completed_at is set exactly once.
    if current.completed_at.is_some() {
        patch.completed_at = None;
    }

    if patch.progress.is_some() {
        let stale = if current.status.is_terminal() {
            true
        } else {
            let attempt = patch.progress_attempt.unwrap_or(current.progress_attempt);
            let seq = patch.progress_seq.unwrap_or(0);
            match attempt.cmp(&current.progress_attempt) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Equal => {
                    seq <= current.progress_seq && current.progress_seq > 0
                        || patch.progress.unwrap_or(0) < current.progress
                }
                std::cmp::Ordering::Greater => false,
            }
        };

        if stale {
            debug!(
                task_id = %current.id,
                row_attempt = current.progress_attempt,
                row_seq = current.progress_seq,
                "Dropping stale progress write"
            );
            patch.progress = None;
            patch.current_step = None;
            patch.progress_attempt = None;
            patch.progress_seq = None;
        }
    }

    patch
}

/// Apply a sanitized patch to a row, stamping `updated_at` and deriving
/// `duration_seconds`.
pub fn apply(current: &Task, patch: TaskPatch) -> Task {
    let mut task = current.clone();

    if let Some(status) = patch.status {
        task.status = status;
    }
    if let Some(progress) = patch.progress {
        task.progress = progress.min(100);
    }
    if let Some(step) = patch.current_step {
        task.current_step = Some(step);
    }
    if let Some(attempt) = patch.progress_attempt {
        task.progress_attempt = attempt;
    }
    if let Some(seq) = patch.progress_seq {
        task.progress_seq = seq;
    }
    if let Some(handle) = patch.transport_handle {
        task.transport_handle = Some(handle);
    }
    if let Some(at) = patch.started_at {
        task.started_at = Some(at);
    }
    if let Some(at) = patch.completed_at {
        task.completed_at = Some(at);
    }
    if let Some(path) = patch.result_path {
        task.result_path = Some(path);
    }
    if let Some(url) = patch.result_url {
        task.result_url = Some(url);
    }
    if let Some(meta) = patch.result_metadata {
        task.result_metadata = Some(meta);
    }
    if let Some(ty) = patch.error_type {
        task.error_type = Some(ty);
    }
    if let Some(msg) = patch.error_message {
        task.error_message = Some(msg);
    }
    if let Some(count) = patch.retry_count {
        task.retry_count = count;
    }

    if let (Some(started), Some(completed)) = (task.started_at, task.completed_at) {
        if task.duration_seconds.is_none() {
            task.duration_seconds = Some((completed - started).num_milliseconds() as f64 / 1000.0);
        }
    }

    task.updated_at = Utc::now();
    task
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use vidgen_models::{FrameExtractParams, TaskParams, TaskStatus};

    fn running_task() -> Task {
        let mut task = Task::new(
            "owner-1",
            TaskParams::FrameExtract(FrameExtractParams {
                video_path: "v.mp4".to_string(),
                frame_count: 6,
            }),
        );
        task.status = TaskStatus::Running;
        task.started_at = Some(Utc::now() - Duration::seconds(10));
        task
    }

    #[test]
    fn illegal_transition_dropped_terminal_sticky() {
        let mut task = running_task();
        task.status = TaskStatus::Cancelled;
        task.completed_at = Some(Utc::now());

        // A success commit racing an already-applied cancel.
        let patch = TaskPatch::new()
            .status(TaskStatus::Success)
            .completed_at(Utc::now())
            .result(
                Some("out.mp4".to_string()),
                Some("/outputs/out.mp4".to_string()),
                Some(serde_json::json!({})),
            );
        let sanitized = sanitize(&task, patch);
        assert!(sanitized.status.is_none());
        assert!(sanitized.completed_at.is_none());
        assert!(sanitized.result_path.is_none());

        let updated = apply(&task, sanitized);
        assert_eq!(updated.status, TaskStatus::Cancelled);
    }

    #[test]
    fn terminal_row_rejects_progress() {
        let mut task = running_task();
        task.status = TaskStatus::Cancelled;

        let sanitized = sanitize(&task, TaskPatch::new().progress(50, 0, 3));
        assert!(sanitized.progress.is_none());
    }

    #[test]
    fn stale_seq_dropped() {
        let mut task = running_task();
        task.progress = 40;
        task.progress_attempt = 1;
        task.progress_seq = 5;

        // Redelivered older write from the same attempt.
        let sanitized = sanitize(&task, TaskPatch::new().progress(30, 1, 4));
        assert!(sanitized.progress.is_none());

        // Newer seq from the same attempt is kept.
        let sanitized = sanitize(&task, TaskPatch::new().progress(55, 1, 6));
        assert_eq!(sanitized.progress, Some(55));

        // A new attempt restarts the sequence.
        let sanitized = sanitize(&task, TaskPatch::new().progress(10, 2, 1));
        assert_eq!(sanitized.progress, Some(10));
    }

    #[test]
    fn progress_never_regresses_within_attempt() {
        let mut task = running_task();
        task.progress = 60;
        task.progress_attempt = 0;
        task.progress_seq = 0;

        let sanitized = sanitize(&task, TaskPatch::new().progress(20, 0, 1));
        assert!(sanitized.progress.is_none());
    }

    #[test]
    fn duration_derived_once() {
        let task = running_task();
        let completed = Utc::now();
        let patch = TaskPatch::new()
            .status(TaskStatus::Success)
            .progress(100, 0, 99)
            .completed_at(completed);
        let updated = apply(&task, sanitize(&task, patch));
        assert_eq!(updated.status, TaskStatus::Success);
        let duration = updated.duration_seconds.expect("duration derived");
        assert!(duration >= 9.0 && duration <= 12.0, "duration {duration}");

        // completed_at may not be rewritten afterwards.
        let later = sanitize(&updated, TaskPatch::new().completed_at(Utc::now()));
        assert!(later.completed_at.is_none());
    }
}
