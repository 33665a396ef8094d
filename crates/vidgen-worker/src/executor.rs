//! Task executor.
//!
//! Consumes deliveries from the routed queues, runs one handler
//! attempt per bounded slot, and commits exactly one terminal state
//! per run. Retries re-dispatch a fresh envelope after backoff; the
//! claim ticker recovers deliveries stuck on dead consumers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use vidgen_models::{TaskEvent, TaskPatch, TaskStatus};
use vidgen_queue::{route_for, Delivery, ProgressSink, QueueTransport, WorkItem, ALL_QUEUES};
use vidgen_store::TaskStore;

use crate::config::WorkerConfig;
use crate::context::ExecutionContext;
use crate::error::{WorkerError, WorkerResult};
use crate::handlers::{HandlerRegistry, TaskOutcome};
use crate::policy::RetryPolicy;

/// Shared executor state, cloned into spawned attempt tasks.
struct Inner {
    config: WorkerConfig,
    store: Arc<dyn TaskStore>,
    transport: Arc<dyn QueueTransport>,
    progress: Arc<dyn ProgressSink>,
    registry: Arc<HandlerRegistry>,
    consumer_name: String,
}

/// Task executor that processes deliveries from the routed queues.
pub struct TaskExecutor {
    inner: Arc<Inner>,
    slots: HashMap<&'static str, Arc<Semaphore>>,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl TaskExecutor {
    pub fn new(
        config: WorkerConfig,
        store: Arc<dyn TaskStore>,
        transport: Arc<dyn QueueTransport>,
        progress: Arc<dyn ProgressSink>,
        registry: Arc<HandlerRegistry>,
    ) -> Self {
        let slots = ALL_QUEUES
            .iter()
            .map(|&q| (q, Arc::new(Semaphore::new(config.slots_for(q)))))
            .collect();
        let (shutdown, _) = tokio::sync::watch::channel(false);
        let consumer_name = format!("worker-{}", Uuid::new_v4());

        Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport,
                progress,
                registry,
                consumer_name,
            }),
            slots,
            shutdown,
        }
    }

    /// Run consume loops and claim tickers for every routed queue
    /// until shutdown is signalled.
    pub async fn run(&self) -> WorkerResult<()> {
        info!(
            consumer = %self.inner.consumer_name,
            "Starting task executor"
        );

        self.inner.transport.init().await?;

        let mut loops = Vec::new();
        for &queue in &ALL_QUEUES {
            let slots = Arc::clone(&self.slots[queue]);

            let inner = Arc::clone(&self.inner);
            let slots_consume = Arc::clone(&slots);
            let mut shutdown_rx = self.shutdown.subscribe();
            loops.push(tokio::spawn(async move {
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        result = Self::consume_once(&inner, queue, &slots_consume) => {
                            if let Err(e) = result {
                                error!(queue, "Error consuming deliveries: {e}");
                                tokio::time::sleep(Duration::from_secs(5)).await;
                            }
                        }
                    }
                }
            }));

            let inner = Arc::clone(&self.inner);
            let slots_claim = Arc::clone(&slots);
            let mut shutdown_rx = self.shutdown.subscribe();
            loops.push(tokio::spawn(async move {
                let mut interval = tokio::time::interval(inner.config.claim_interval);
                interval.tick().await;
                loop {
                    tokio::select! {
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                        _ = interval.tick() => {
                            if let Err(e) = Self::claim_once(&inner, queue, &slots_claim).await {
                                warn!(queue, "Failed to claim pending deliveries: {e}");
                            }
                        }
                    }
                }
            }));
        }

        let mut shutdown_rx = self.shutdown.subscribe();
        while shutdown_rx.changed().await.is_ok() {
            if *shutdown_rx.borrow() {
                break;
            }
        }

        info!("Shutdown signalled, waiting for in-flight attempts");
        let _ = tokio::time::timeout(self.inner.config.shutdown_timeout, async {
            for task in loops {
                task.await.ok();
            }
            self.wait_for_slots().await;
        })
        .await;

        info!("Task executor stopped");
        Ok(())
    }

    /// Signal shutdown.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send(true);
    }

    async fn wait_for_slots(&self) {
        for (&queue, slots) in &self.slots {
            let total = self.inner.config.slots_for(queue);
            while slots.available_permits() < total {
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }

    async fn consume_once(
        inner: &Arc<Inner>,
        queue: &'static str,
        slots: &Arc<Semaphore>,
    ) -> WorkerResult<()> {
        let available = slots.available_permits();
        if available == 0 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        let deliveries = inner
            .transport
            .consume(
                queue,
                &inner.consumer_name,
                Duration::from_secs(1),
                available.min(5),
            )
            .await?;

        if deliveries.is_empty() {
            tokio::time::sleep(Duration::from_millis(100)).await;
            return Ok(());
        }

        debug!(queue, count = deliveries.len(), "Consumed deliveries");
        Self::spawn_deliveries(inner, slots, deliveries).await;
        Ok(())
    }

    async fn claim_once(
        inner: &Arc<Inner>,
        queue: &'static str,
        slots: &Arc<Semaphore>,
    ) -> WorkerResult<()> {
        let deliveries = inner
            .transport
            .claim_pending(
                queue,
                &inner.consumer_name,
                inner.config.claim_min_idle,
                5,
            )
            .await?;

        if !deliveries.is_empty() {
            info!(queue, count = deliveries.len(), "Claimed pending deliveries");
            Self::spawn_deliveries(inner, slots, deliveries).await;
        }
        Ok(())
    }

    async fn spawn_deliveries(inner: &Arc<Inner>, slots: &Arc<Semaphore>, deliveries: Vec<Delivery>) {
        for delivery in deliveries {
            let permit = match Arc::clone(slots).acquire_owned().await {
                Ok(p) => p,
                Err(_) => break,
            };
            let inner = Arc::clone(inner);
            tokio::spawn(async move {
                let _permit = permit;
                execute_delivery(&inner, delivery).await;
            });
        }
    }
}

/// Run one delivered attempt end to end.
async fn execute_delivery(inner: &Arc<Inner>, delivery: Delivery) {
    let Delivery { handle, item } = delivery;
    let task_id = item.task_id.clone();

    let task = match inner.store.get(&task_id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!(task_id = %task_id, "Delivery for unknown task, discarding");
            ack_quiet(inner, &handle).await;
            return;
        }
        Err(e) => {
            // Leave the delivery unacked; redelivery will retry once
            // the store is reachable again.
            error!(task_id = %task_id, "Store unreachable, leaving delivery pending: {e}");
            return;
        }
    };

    // Terminal row means a duplicate or revoked delivery.
    if task.is_terminal() {
        debug!(task_id = %task_id, status = %task.status, "Task already terminal, discarding delivery");
        ack_quiet(inner, &handle).await;
        return;
    }

    // Cancel requested before the attempt started.
    if inner
        .transport
        .is_cancel_requested(&task_id)
        .await
        .unwrap_or(false)
    {
        commit_cancelled(inner, &item).await;
        ack_quiet(inner, &handle).await;
        return;
    }

    let policy = RetryPolicy::for_task_type(item.task_type);

    let mut running = TaskPatch::new()
        .status(TaskStatus::Running)
        .retry_count(item.attempt);
    if item.attempt == 0 {
        running = running.started_at(Utc::now());
    }
    if let Err(e) = inner.store.update(&task_id, running).await {
        error!(task_id = %task_id, "Failed to mark task running, leaving delivery pending: {e}");
        return;
    }

    info!(
        task_id = %task_id,
        task_type = %item.task_type,
        attempt = item.attempt,
        "Executing attempt"
    );
    metrics::counter!("vidgen_worker_attempts_total", "task_type" => item.task_type.as_str())
        .increment(1);

    let ctx = ExecutionContext::new(
        task_id.clone(),
        item.attempt,
        policy,
        Arc::clone(&inner.store),
        Arc::clone(&inner.transport),
        Arc::clone(&inner.progress),
    );

    let handler = match inner.registry.get(item.task_type) {
        Some(h) => h,
        None => {
            commit_failed(
                inner,
                &item,
                &WorkerError::permanent(format!("no handler for {}", item.task_type)),
            )
            .await;
            ack_quiet(inner, &handle).await;
            return;
        }
    };

    let outcome = tokio::time::timeout(policy.hard_limit, handler.run(&ctx, &item.params)).await;

    match outcome {
        Err(_) => {
            warn!(task_id = %task_id, "Hard time limit exceeded");
            commit_failed(inner, &item, &WorkerError::timeout("hard time limit exceeded")).await;
            ack_quiet(inner, &handle).await;
        }
        Ok(Ok(result)) => {
            commit_success(inner, &item, &ctx, result).await;
            ack_quiet(inner, &handle).await;
        }
        Ok(Err(WorkerError::Cancelled(_))) => {
            info!(task_id = %task_id, "Attempt stopped on cancel request");
            commit_cancelled(inner, &item).await;
            ack_quiet(inner, &handle).await;
        }
        Ok(Err(e)) if policy.should_retry(&e, item.attempt) => {
            ack_quiet(inner, &handle).await;
            redispatch(inner, &item, &policy, &e).await;
        }
        Ok(Err(e)) => {
            error!(task_id = %task_id, "Attempt failed permanently: {e}");
            commit_failed(inner, &item, &e).await;
            ack_quiet(inner, &handle).await;
        }
    }
}

/// Mark the row `retry`, wait out the backoff in this slot, then
/// enqueue the next attempt. An unreachable transport downgrades the
/// retry to a terminal failure so the row cannot hang in `retry`.
async fn redispatch(inner: &Arc<Inner>, item: &WorkItem, policy: &RetryPolicy, error: &WorkerError) {
    let next = item.next_attempt();
    let delay = policy.backoff_delay(next.attempt);

    info!(
        task_id = %item.task_id,
        next_attempt = next.attempt,
        delay_secs = delay.as_secs(),
        "Scheduling retry: {error}"
    );
    metrics::counter!("vidgen_worker_retries_total", "task_type" => item.task_type.as_str())
        .increment(1);

    let patch = TaskPatch::new()
        .status(TaskStatus::Retry)
        .retry_count(next.attempt);
    if let Err(e) = inner.store.update(&item.task_id, patch).await {
        warn!(task_id = %item.task_id, "Failed to mark task for retry: {e}");
    }
    publish_quiet(
        inner,
        TaskEvent::retrying(
            &item.task_id,
            next.attempt,
            delay.as_secs(),
            error.to_string(),
        ),
    )
    .await;

    tokio::time::sleep(delay).await;

    // Cancel may have landed during the backoff.
    if inner
        .transport
        .is_cancel_requested(&item.task_id)
        .await
        .unwrap_or(false)
    {
        commit_cancelled(inner, &next).await;
        return;
    }

    let route = route_for(item.task_type);
    match inner.transport.enqueue(&route, &next).await {
        Ok(handle) => {
            let patch = TaskPatch::new().transport_handle(handle.encode());
            if let Err(e) = inner.store.update(&item.task_id, patch).await {
                warn!(task_id = %item.task_id, "Failed to record retry handle: {e}");
            }
        }
        Err(e) => {
            error!(task_id = %item.task_id, "Retry enqueue failed: {e}");
            commit_failed(inner, &next, &WorkerError::Queue(e)).await;
        }
    }
}

async fn commit_success(
    inner: &Arc<Inner>,
    item: &WorkItem,
    ctx: &ExecutionContext,
    outcome: TaskOutcome,
) {
    let patch = TaskPatch::new()
        .status(TaskStatus::Success)
        .progress(100, item.attempt, ctx.current_seq() + 1)
        .completed_at(Utc::now())
        .result(outcome.result_path, outcome.result_url, outcome.result_metadata);

    match inner.store.update(&item.task_id, patch).await {
        Ok(task) if task.status == TaskStatus::Success => {
            info!(task_id = %item.task_id, "Task succeeded");
            metrics::counter!("vidgen_worker_completed_total", "status" => "success").increment(1);
            publish_quiet(inner, TaskEvent::completed(&item.task_id, task.result_url)).await;
        }
        Ok(task) => {
            // A racing cancel won; its terminal state sticks.
            info!(task_id = %item.task_id, status = %task.status, "Success commit lost the race");
        }
        Err(e) => {
            error!(task_id = %item.task_id, "Failed to commit success: {e}");
        }
    }
}

async fn commit_failed(inner: &Arc<Inner>, item: &WorkItem, error: &WorkerError) {
    let patch = TaskPatch::new()
        .status(TaskStatus::Failed)
        .error(error.error_type(), error.to_string())
        .retry_count(item.attempt)
        .completed_at(Utc::now());

    if let Err(e) = inner.store.update(&item.task_id, patch).await {
        error!(task_id = %item.task_id, "Failed to commit failure: {e}");
    }
    metrics::counter!("vidgen_worker_completed_total", "status" => "failed").increment(1);
    publish_quiet(
        inner,
        TaskEvent::failed(&item.task_id, error.error_type(), error.to_string()),
    )
    .await;
}

async fn commit_cancelled(inner: &Arc<Inner>, item: &WorkItem) {
    let patch = TaskPatch::new()
        .status(TaskStatus::Cancelled)
        .completed_at(Utc::now());

    if let Err(e) = inner.store.update(&item.task_id, patch).await {
        error!(task_id = %item.task_id, "Failed to commit cancellation: {e}");
    }
    metrics::counter!("vidgen_worker_completed_total", "status" => "cancelled").increment(1);
    publish_quiet(inner, TaskEvent::cancelled(&item.task_id)).await;
}

async fn ack_quiet(inner: &Arc<Inner>, handle: &vidgen_queue::DeliveryHandle) {
    if let Err(e) = inner.transport.ack(handle).await {
        error!(handle = %handle, "Failed to ack delivery: {e}");
    }
}

async fn publish_quiet(inner: &Arc<Inner>, event: TaskEvent) {
    if let Err(e) = inner.progress.publish(&event).await {
        debug!("Event publish failed: {e}");
    }
}
