//! Queue transport for task dispatch.
//!
//! This crate provides:
//! - The [`QueueTransport`] capability interface: named, prioritized,
//!   at-least-once delivery channels plus a revoke/terminate primitive
//! - A Redis Streams implementation with consumer groups and
//!   crash-recovery claiming
//! - An in-memory implementation for tests and single-process dev
//! - Static task-type to queue routing with a 0-10 priority hint
//! - Progress events via Redis Pub/Sub with per-attempt sequencing

pub mod envelope;
pub mod error;
pub mod progress;
pub mod redis_transport;
pub mod routing;
pub mod transport;

pub use envelope::{Delivery, DeliveryHandle, WorkItem};
pub use error::{QueueError, QueueResult};
pub use progress::{MemoryProgress, ProgressSink, RedisProgressChannel};
pub use redis_transport::{RedisTransport, RedisTransportConfig};
pub use routing::{route_for, QueueRoute, ALL_QUEUES, DEFAULT_PRIORITY};
pub use transport::{transport_from_env, MemoryTransport, QueueTransport};
