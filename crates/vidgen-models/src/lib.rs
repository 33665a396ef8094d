//! Shared data models for the VidGen backend.
//!
//! This crate provides Serde-serializable types for:
//! - Tasks and their lifecycle state machine
//! - Task type routing and per-type parameter payloads
//! - Field-level partial updates against the task store
//! - Progress event schemas for the live channel

pub mod event;
pub mod params;
pub mod status;
pub mod task;
pub mod task_type;

// Re-export common types
pub use event::TaskEvent;
pub use params::{
    FrameExtractParams, GenerateVideoFromImageParams, ParamsError, TaskParams, VeoGenerateParams,
};
pub use status::TaskStatus;
pub use task::{Task, TaskId, TaskPatch};
pub use task_type::TaskType;
