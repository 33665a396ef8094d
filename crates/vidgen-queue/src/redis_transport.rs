//! Queue transport over Redis Streams.
//!
//! One stream per routed queue, one consumer group shared by all
//! workers. Delivery is at-least-once: unacked entries are redelivered
//! through `claim_pending` after a visibility window. Cancellation is
//! a TTL'd flag key checked cooperatively by running attempts.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tracing::{debug, info, warn};

use vidgen_models::TaskId;

use crate::envelope::{Delivery, DeliveryHandle, WorkItem};
use crate::error::{QueueError, QueueResult};
use crate::routing::{QueueRoute, ALL_QUEUES};
use crate::transport::QueueTransport;

/// Redis transport configuration.
#[derive(Debug, Clone)]
pub struct RedisTransportConfig {
    /// Redis URL
    pub redis_url: String,
    /// Consumer group name shared by all workers
    pub consumer_group: String,
    /// TTL for cancel flag keys
    pub cancel_flag_ttl: Duration,
}

impl Default for RedisTransportConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            consumer_group: "vidgen:workers".to_string(),
            cancel_flag_ttl: Duration::from_secs(86_400),
        }
    }
}

impl RedisTransportConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            redis_url: std::env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or_else(|_| "vidgen:workers".to_string()),
            cancel_flag_ttl: Duration::from_secs(
                std::env::var("QUEUE_CANCEL_FLAG_TTL")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(86_400),
            ),
        }
    }
}

/// XAUTOCLAIM scanning the whole PEL from `0-0`. Entries idle for less
/// than `min_idle` are skipped by Redis, so a fresh scan each tick only
/// picks up deliveries whose consumer has actually gone silent.
fn autoclaim_cmd(
    stream: &str,
    group: &str,
    consumer: &str,
    min_idle: Duration,
    count: usize,
) -> redis::Cmd {
    let mut cmd = redis::cmd("XAUTOCLAIM");
    cmd.arg(stream)
        .arg(group)
        .arg(consumer)
        .arg(min_idle.as_millis() as u64)
        .arg("0-0")
        .arg("COUNT")
        .arg(count);
    cmd
}

/// Redis Streams transport.
pub struct RedisTransport {
    client: redis::Client,
    config: RedisTransportConfig,
}

impl RedisTransport {
    /// Create a new Redis transport.
    pub fn new(config: RedisTransportConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> QueueResult<Self> {
        Self::new(RedisTransportConfig::from_env())
    }

    fn stream_key(queue: &str) -> String {
        format!("vidgen:queue:{queue}")
    }

    fn cancel_key(task_id: &TaskId) -> String {
        format!("vidgen:cancel:{task_id}")
    }

    fn parse_entry(queue: &str, entry: &redis::streams::StreamId) -> Option<Delivery> {
        let payload = match entry.map.get("item") {
            Some(redis::Value::BulkString(bytes)) => String::from_utf8_lossy(bytes).into_owned(),
            _ => return None,
        };
        match serde_json::from_str::<WorkItem>(&payload) {
            Ok(item) => Some(Delivery {
                handle: DeliveryHandle::new(queue, entry.id.clone()),
                item,
            }),
            Err(e) => {
                warn!(queue, message_id = %entry.id, "Failed to parse work item: {e}");
                None
            }
        }
    }
}

#[async_trait]
impl QueueTransport for RedisTransport {
    fn backend(&self) -> &'static str {
        "redis"
    }

    /// Create the stream and consumer group for every routed queue.
    async fn init(&self) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        for queue in ALL_QUEUES {
            let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
                .arg("CREATE")
                .arg(Self::stream_key(queue))
                .arg(&self.config.consumer_group)
                .arg("$")
                .arg("MKSTREAM")
                .query_async(&mut conn)
                .await;

            match result {
                Ok(_) => info!(queue, "Created consumer group"),
                Err(e) if e.to_string().contains("BUSYGROUP") => {
                    debug!(queue, "Consumer group already exists");
                }
                Err(e) => return Err(QueueError::Redis(e)),
            }
        }

        Ok(())
    }

    async fn enqueue(&self, route: &QueueRoute, item: &WorkItem) -> QueueResult<DeliveryHandle> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| QueueError::transport_unavailable(e.to_string()))?;

        let payload = serde_json::to_string(item)?;

        // Streams have no native priority; the hint is forwarded as a
        // field so consumers and operators can see it.
        let message_id: String = redis::cmd("XADD")
            .arg(Self::stream_key(route.queue))
            .arg("*")
            .arg("item")
            .arg(&payload)
            .arg("priority")
            .arg(route.priority)
            .arg("task_id")
            .arg(item.task_id.as_str())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::transport_unavailable(e.to_string()))?;

        info!(
            task_id = %item.task_id,
            queue = route.queue,
            attempt = item.attempt,
            message_id = %message_id,
            "Enqueued work item"
        );

        Ok(DeliveryHandle::new(route.queue, message_id))
    }

    async fn revoke_and_terminate(
        &self,
        handle: &DeliveryHandle,
        task_id: &TaskId,
    ) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        // Raise the cancel flag first so a running attempt sees it even
        // if the pending-entry removal races the consumer.
        conn.set_ex::<_, _, ()>(
            Self::cancel_key(task_id),
            "1",
            self.config.cancel_flag_ttl.as_secs(),
        )
        .await?;

        self.ack(handle).await?;

        info!(task_id = %task_id, handle = %handle, "Revoked delivery");
        Ok(())
    }

    async fn is_cancel_requested(&self, task_id: &TaskId) -> QueueResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let exists: bool = conn.exists(Self::cancel_key(task_id)).await?;
        Ok(exists)
    }

    async fn consume(
        &self,
        queue: &str,
        consumer: &str,
        block: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let result: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(Self::stream_key(queue))
            .arg(">")
            .query_async(&mut conn)
            .await?;

        let mut deliveries = Vec::new();
        for stream_key in result.keys {
            for entry in stream_key.ids {
                match Self::parse_entry(queue, &entry) {
                    Some(delivery) => deliveries.push(delivery),
                    None => {
                        // Ack malformed entries so they are not redelivered.
                        self.ack(&DeliveryHandle::new(queue, entry.id.clone()))
                            .await
                            .ok();
                    }
                }
            }
        }

        Ok(deliveries)
    }

    async fn ack(&self, handle: &DeliveryHandle) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = Self::stream_key(&handle.queue);

        redis::cmd("XACK")
            .arg(&stream)
            .arg(&self.config.consumer_group)
            .arg(&handle.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&stream)
            .arg(&handle.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        debug!(handle = %handle, "Acknowledged delivery");
        Ok(())
    }

    async fn claim_pending(
        &self,
        queue: &str,
        consumer: &str,
        min_idle: Duration,
        count: usize,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let stream = Self::stream_key(queue);

        let result: redis::streams::StreamAutoClaimReply = autoclaim_cmd(
            &stream,
            &self.config.consumer_group,
            consumer,
            min_idle,
            count,
        )
        .query_async(&mut conn)
        .await?;

        let mut deliveries = Vec::new();
        for entry in result.claimed {
            match Self::parse_entry(queue, &entry) {
                Some(delivery) => {
                    info!(
                        task_id = %delivery.item.task_id,
                        queue,
                        "Claimed pending delivery from idle consumer"
                    );
                    deliveries.push(delivery);
                }
                None => {
                    self.ack(&DeliveryHandle::new(queue, entry.id.clone()))
                        .await
                        .ok();
                }
            }
        }

        Ok(deliveries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args_of(cmd: &redis::Cmd) -> Vec<String> {
        cmd.args_iter()
            .map(|a| match a {
                redis::Arg::Simple(bytes) => String::from_utf8_lossy(bytes).into_owned(),
                redis::Arg::Cursor => "<cursor>".to_string(),
            })
            .collect()
    }

    // XAUTOCLAIM takes a scan cursor where XCLAIM takes explicit entry
    // ids; sending COUNT to XCLAIM gets rejected as an invalid stream
    // id. Pin the exact argument order so the claim ticker keeps
    // working against a real backend.
    #[test]
    fn claim_command_is_autoclaim_with_cursor_and_count() {
        let cmd = autoclaim_cmd(
            "vidgen:queue:default",
            "vidgen:workers",
            "worker-1",
            Duration::from_secs(300),
            5,
        );
        assert_eq!(
            args_of(&cmd),
            vec![
                "XAUTOCLAIM",
                "vidgen:queue:default",
                "vidgen:workers",
                "worker-1",
                "300000",
                "0-0",
                "COUNT",
                "5",
            ]
        );
    }

    #[test]
    fn keys_embed_queue_and_task() {
        assert_eq!(RedisTransport::stream_key("veo"), "vidgen:queue:veo");
        let id = TaskId::from_string("t-1");
        assert_eq!(RedisTransport::cancel_key(&id), "vidgen:cancel:t-1");
    }
}
