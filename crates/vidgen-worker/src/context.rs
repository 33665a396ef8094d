//! Worker execution context.
//!
//! One context per attempt. Handlers report progress through it; the
//! executor funnels every exit path through a single terminal commit,
//! so one run produces exactly one terminal write.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use vidgen_models::{TaskEvent, TaskId, TaskPatch};
use vidgen_queue::{ProgressSink, QueueTransport};
use vidgen_store::TaskStore;

use crate::error::{WorkerError, WorkerResult};
use crate::policy::RetryPolicy;

/// Per-attempt execution context handed to task handlers.
pub struct ExecutionContext {
    task_id: TaskId,
    attempt: u32,
    policy: RetryPolicy,
    store: Arc<dyn TaskStore>,
    transport: Arc<dyn QueueTransport>,
    progress: Arc<dyn ProgressSink>,
    started: Instant,
    seq: AtomicU64,
    last_percent: AtomicU8,
    cancel_seen: AtomicBool,
}

impl ExecutionContext {
    pub fn new(
        task_id: TaskId,
        attempt: u32,
        policy: RetryPolicy,
        store: Arc<dyn TaskStore>,
        transport: Arc<dyn QueueTransport>,
        progress: Arc<dyn ProgressSink>,
    ) -> Self {
        Self {
            task_id,
            attempt,
            policy,
            store,
            transport,
            progress,
            started: Instant::now(),
            seq: AtomicU64::new(0),
            last_percent: AtomicU8::new(0),
            cancel_seen: AtomicBool::new(false),
        }
    }

    pub fn task_id(&self) -> &TaskId {
        &self.task_id
    }

    /// Attempt number, 0-based.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Highest sequence number issued so far in this attempt.
    pub fn current_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }

    /// Whether the soft deadline has passed. Handlers poll this
    /// between steps; crossing it means clean up and return a
    /// `Timeout` error.
    pub fn soft_limit_exceeded(&self) -> bool {
        self.started.elapsed() >= self.policy.soft_limit
    }

    /// Check the transport-side cancel flag. Once seen, the result is
    /// cached so later checks are free.
    pub async fn cancel_requested(&self) -> bool {
        if self.cancel_seen.load(Ordering::SeqCst) {
            return true;
        }
        match self.transport.is_cancel_requested(&self.task_id).await {
            Ok(true) => {
                self.cancel_seen.store(true, Ordering::SeqCst);
                true
            }
            Ok(false) => false,
            Err(e) => {
                // A flaky flag check must not kill a healthy attempt.
                warn!(task_id = %self.task_id, "Cancel flag check failed: {e}");
                false
            }
        }
    }

    /// Report progress for this attempt.
    ///
    /// Clamps to [0, 99] and never regresses within the attempt; 100
    /// is reserved for the terminal success commit, so a task that
    /// later fails is never left looking complete. The write carries
    /// `(attempt, seq)` so the store can drop it if a newer attempt or
    /// a later write already landed. Returns `Cancelled` once
    /// cancellation has been requested, letting a cooperative handler
    /// stop early.
    pub async fn update_progress(&self, percent: u8, step: Option<&str>) -> WorkerResult<()> {
        if self.cancel_requested().await {
            return Err(WorkerError::cancelled("cancel requested mid-attempt"));
        }

        let percent = percent.min(99).max(self.last_percent.load(Ordering::SeqCst));
        self.last_percent.store(percent, Ordering::SeqCst);
        let seq = self.seq.fetch_add(1, Ordering::SeqCst) + 1;

        let mut patch = TaskPatch::new().progress(percent, self.attempt, seq);
        if let Some(step) = step {
            patch = patch.current_step(step);
        }
        if let Err(e) = self.store.update(&self.task_id, patch).await {
            // Progress writes are best-effort, the attempt continues.
            warn!(task_id = %self.task_id, "Progress write failed: {e}");
        }

        let event = TaskEvent::progress(
            &self.task_id,
            self.attempt,
            seq,
            percent,
            step.map(String::from),
        );
        if let Err(e) = self.progress.publish(&event).await {
            debug!(task_id = %self.task_id, "Progress event publish failed: {e}");
        }

        Ok(())
    }
}
