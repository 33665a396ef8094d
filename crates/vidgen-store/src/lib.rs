//! Persisted task store.
//!
//! This crate provides:
//! - The [`TaskStore`] capability interface (create/get/update/list/
//!   delete) consumed by the orchestrator and the worker
//! - A Supabase-style REST row store backed by reqwest
//! - An in-memory store used when credentials are absent and in tests
//! - Store-side guards: illegal status transitions and stale progress
//!   writes are dropped, never errors
//!
//! The backend is chosen exactly once at construction; business logic
//! never branches on mode.

pub mod error;
pub mod memory;
pub mod patch;
pub mod rest;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryTaskStore;
pub use rest::{RestConfig, RestTaskStore};
pub use store::{store_from_env, StatusCounts, TaskStore};
