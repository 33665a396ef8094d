//! Axum HTTP API for task orchestration.
//!
//! This crate provides:
//! - Task submission, status, listing, cancellation and stats
//! - Background sweeps repairing undispatched and stale tasks
//! - Prometheus metrics

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod routes;
pub mod services;
pub mod state;

pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::{TaskOrchestrator, TaskSweeper};
pub use state::AppState;
