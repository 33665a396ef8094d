//! Media task worker.
//!
//! This crate provides:
//! - Task executor with bounded per-queue execution slots
//! - Per-attempt execution context with monotonic progress reporting
//! - Per-type retry policy with exponential backoff and time limits
//! - Handler registry for the routed task types
//! - Pluggable media engine interface with a demo implementation

pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod media;
pub mod policy;

pub use config::WorkerConfig;
pub use context::ExecutionContext;
pub use error::{WorkerError, WorkerResult};
pub use executor::TaskExecutor;
pub use handlers::{HandlerRegistry, TaskHandler, TaskOutcome};
pub use media::{DemoEngine, MediaEngine};
pub use policy::RetryPolicy;
