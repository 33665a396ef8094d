//! Task progress events via Redis Pub/Sub.
//!
//! Workers publish [`TaskEvent`]s as attempts run; API-side consumers
//! subscribe per task. Publishing is best-effort: the task row in the
//! store remains the source of truth, the channel only lowers latency
//! for watchers.

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::debug;

use vidgen_models::{TaskEvent, TaskId};

use crate::error::QueueResult;

/// Sink for task lifecycle events.
#[async_trait]
pub trait ProgressSink: Send + Sync {
    /// Publish an event for the task it names.
    async fn publish(&self, event: &TaskEvent) -> QueueResult<()>;
}

/// Progress channel backed by Redis Pub/Sub, one channel per task.
pub struct RedisProgressChannel {
    client: redis::Client,
}

impl RedisProgressChannel {
    /// Create a new progress channel.
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a task.
    pub fn channel_name(task_id: &TaskId) -> String {
        format!("vidgen:progress:{task_id}")
    }

    /// Subscribe to events for a task.
    /// Returns a pinned stream that can be polled with `.next()`.
    pub async fn subscribe(
        &self,
        task_id: &TaskId,
    ) -> QueueResult<std::pin::Pin<Box<dyn futures_util::Stream<Item = TaskEvent> + Send>>> {
        use futures_util::StreamExt;

        let mut pubsub = self.client.get_async_pubsub().await?;
        let channel = Self::channel_name(task_id);

        pubsub.subscribe(&channel).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            serde_json::from_str(&payload).ok()
        });

        Ok(Box::pin(stream))
    }
}

#[async_trait]
impl ProgressSink for RedisProgressChannel {
    async fn publish(&self, event: &TaskEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(event.task_id());
        let payload = serde_json::to_string(event)?;

        debug!("Publishing task event to {}", channel);
        conn.publish::<_, _, ()>(channel, payload).await?;

        Ok(())
    }
}

/// In-memory sink that records events for inspection in tests.
#[derive(Default)]
pub struct MemoryProgress {
    events: Mutex<Vec<TaskEvent>>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// All events published so far, in order.
    pub async fn events(&self) -> Vec<TaskEvent> {
        self.events.lock().await.clone()
    }

    /// Events for a single task, in order.
    pub async fn events_for(&self, task_id: &TaskId) -> Vec<TaskEvent> {
        self.events
            .lock()
            .await
            .iter()
            .filter(|e| e.task_id() == task_id)
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProgressSink for MemoryProgress {
    async fn publish(&self, event: &TaskEvent) -> QueueResult<()> {
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_name_embeds_task_id() {
        let id = TaskId::new();
        assert_eq!(
            RedisProgressChannel::channel_name(&id),
            format!("vidgen:progress:{id}")
        );
    }

    #[tokio::test]
    async fn memory_sink_records_events_in_order() {
        let sink = MemoryProgress::new();
        let id = TaskId::new();
        let other = TaskId::new();

        sink.publish(&TaskEvent::progress(&id, 1, 1, 10, Some("downloading".into())))
            .await
            .unwrap();
        sink.publish(&TaskEvent::progress(&other, 1, 1, 50, Some("encoding".into())))
            .await
            .unwrap();
        sink.publish(&TaskEvent::completed(&id, None)).await.unwrap();

        assert_eq!(sink.events().await.len(), 3);
        let mine = sink.events_for(&id).await;
        assert_eq!(mine.len(), 2);
        assert!(matches!(mine[0], TaskEvent::Progress { percent: 10, .. }));
        assert!(matches!(mine[1], TaskEvent::Completed { .. }));
    }
}
