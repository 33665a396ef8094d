//! Queue transport capability interface and the in-memory implementation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use vidgen_models::TaskId;

use crate::envelope::{Delivery, DeliveryHandle, WorkItem};
use crate::error::QueueResult;
use crate::redis_transport::{RedisTransport, RedisTransportConfig};
use crate::routing::QueueRoute;

/// Named, prioritized, at-least-once delivery channels plus a
/// revoke/terminate primitive.
///
/// Delivery is at-least-once: consumers must tolerate redelivery and
/// duplicate execution. Revoke is best-effort; an attempt already
/// running is signalled through the cancel flag and stops
/// cooperatively.
#[async_trait]
pub trait QueueTransport: Send + Sync {
    /// Which backend this transport talks to ("redis" or "memory").
    fn backend(&self) -> &'static str;

    /// One-time setup of the consumer-side plumbing (streams, consumer
    /// groups). No-op for backends that need none.
    async fn init(&self) -> QueueResult<()> {
        Ok(())
    }

    /// Place a work item on a queue. Returns the delivery handle.
    async fn enqueue(&self, route: &QueueRoute, item: &WorkItem) -> QueueResult<DeliveryHandle>;

    /// Revoke a pending delivery and raise the cancel flag for the task.
    async fn revoke_and_terminate(
        &self,
        handle: &DeliveryHandle,
        task_id: &TaskId,
    ) -> QueueResult<()>;

    /// Check whether cancellation has been requested for a task.
    async fn is_cancel_requested(&self, task_id: &TaskId) -> QueueResult<bool>;

    /// Consume up to `count` deliveries from a queue, blocking up to
    /// `block` when empty.
    async fn consume(
        &self,
        queue: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;

    /// Acknowledge a processed delivery.
    async fn ack(&self, handle: &DeliveryHandle) -> QueueResult<()>;

    /// Claim deliveries stuck with a crashed consumer (redelivery path).
    async fn claim_pending(
        &self,
        queue: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>>;
}

/// Construct the transport from the environment, exactly once at
/// startup. `VIDGEN_QUEUE=memory` selects the in-process transport
/// (tests, single-process dev); anything else is Redis.
pub fn transport_from_env() -> QueueResult<Arc<dyn QueueTransport>> {
    if std::env::var("VIDGEN_QUEUE").map(|v| v == "memory").unwrap_or(false) {
        info!("Queue transport: in-memory backend");
        return Ok(Arc::new(MemoryTransport::new()));
    }
    let config = RedisTransportConfig::from_env();
    info!("Queue transport: Redis streams at {}", config.redis_url);
    Ok(Arc::new(RedisTransport::new(config)?))
}

#[derive(Default)]
struct MemoryState {
    queues: HashMap<String, VecDeque<(DeliveryHandle, u8, WorkItem)>>,
    revoked: HashSet<String>,
    cancelled: HashSet<String>,
    next_id: u64,
}

/// In-process transport: priority-ordered queues behind a mutex.
///
/// Keeps the trait's at-least-once shape (handles, acks, cancel flags)
/// without a broker; `claim_pending` has nothing to claim because a
/// crashed in-process consumer takes the whole process with it.
#[derive(Default)]
pub struct MemoryTransport {
    state: std::sync::Mutex<MemoryState>,
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raise the cancel flag without a pending delivery (test helper).
    pub fn request_cancel(&self, task_id: &TaskId) {
        let mut state = self.state.lock().expect("transport lock poisoned");
        state.cancelled.insert(task_id.to_string());
    }

    /// Number of items waiting on a queue (test helper).
    pub fn queue_len(&self, queue: &str) -> usize {
        let state = self.state.lock().expect("transport lock poisoned");
        state.queues.get(queue).map(|q| q.len()).unwrap_or(0)
    }
}

#[async_trait]
impl QueueTransport for MemoryTransport {
    fn backend(&self) -> &'static str {
        "memory"
    }

    async fn enqueue(&self, route: &QueueRoute, item: &WorkItem) -> QueueResult<DeliveryHandle> {
        let mut state = self.state.lock().expect("transport lock poisoned");
        state.next_id += 1;
        let handle = DeliveryHandle::new(route.queue, state.next_id.to_string());

        let priority = route.priority;
        let queue = state.queues.entry(route.queue.to_string()).or_default();
        // Honor the priority hint: higher priority jumps ahead, FIFO
        // among equals.
        let pos = queue
            .iter()
            .position(|(_, p, _)| *p < priority)
            .unwrap_or(queue.len());
        queue.insert(pos, (handle.clone(), priority, item.clone()));

        debug!(task_id = %item.task_id, queue = route.queue, "Enqueued work item");
        Ok(handle)
    }

    async fn revoke_and_terminate(
        &self,
        handle: &DeliveryHandle,
        task_id: &TaskId,
    ) -> QueueResult<()> {
        let mut state = self.state.lock().expect("transport lock poisoned");
        state.revoked.insert(handle.encode());
        state.cancelled.insert(task_id.to_string());
        if let Some(queue) = state.queues.get_mut(&handle.queue) {
            queue.retain(|(h, _, _)| h != handle);
        }
        Ok(())
    }

    async fn is_cancel_requested(&self, task_id: &TaskId) -> QueueResult<bool> {
        let state = self.state.lock().expect("transport lock poisoned");
        Ok(state.cancelled.contains(task_id.as_str()))
    }

    async fn consume(
        &self,
        queue: &str,
        _consumer: &str,
        _block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut state = self.state.lock().expect("transport lock poisoned");
        let MemoryState { queues, revoked, .. } = &mut *state;
        let mut out = Vec::new();
        if let Some(q) = queues.get_mut(queue) {
            while out.len() < count {
                match q.pop_front() {
                    Some((handle, _, item)) => {
                        if revoked.contains(&handle.encode()) {
                            continue;
                        }
                        out.push(Delivery { handle, item });
                    }
                    None => break,
                }
            }
        }
        Ok(out)
    }

    async fn ack(&self, handle: &DeliveryHandle) -> QueueResult<()> {
        let mut state = self.state.lock().expect("transport lock poisoned");
        state.revoked.remove(&handle.encode());
        Ok(())
    }

    async fn claim_pending(
        &self,
        _queue: &str,
        _consumer: &str,
        _min_idle: Duration,
        _count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        Ok(Vec::new())
    }
}
