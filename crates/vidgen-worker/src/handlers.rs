//! Task handlers, one per task type.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use vidgen_models::{TaskParams, TaskType};

use crate::context::ExecutionContext;
use crate::error::{WorkerError, WorkerResult};
use crate::media::MediaEngine;

/// Result of a successful handler run, persisted in the terminal
/// success commit.
#[derive(Debug, Clone, Default)]
pub struct TaskOutcome {
    pub result_path: Option<String>,
    pub result_url: Option<String>,
    pub result_metadata: Option<serde_json::Value>,
}

/// A handler executes one attempt of one task type.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    fn task_type(&self) -> TaskType;

    /// Run one attempt. Progress, soft-limit polling and cancellation
    /// go through the context; the artifact must exist before this
    /// returns `Ok`.
    async fn run(&self, ctx: &ExecutionContext, params: &TaskParams) -> WorkerResult<TaskOutcome>;
}

fn check_soft_limit(ctx: &ExecutionContext) -> WorkerResult<()> {
    if ctx.soft_limit_exceeded() {
        Err(WorkerError::timeout("soft time limit exceeded"))
    } else {
        Ok(())
    }
}

/// Billable generation via the external engine. Never retried.
pub struct VeoGenerateHandler {
    engine: Arc<dyn MediaEngine>,
}

impl VeoGenerateHandler {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for VeoGenerateHandler {
    fn task_type(&self) -> TaskType {
        TaskType::VeoGenerate
    }

    async fn run(&self, ctx: &ExecutionContext, params: &TaskParams) -> WorkerResult<TaskOutcome> {
        let TaskParams::VeoGenerate(p) = params else {
            return Err(WorkerError::permanent("params do not match task type"));
        };

        ctx.update_progress(10, Some("preparing input image")).await?;
        check_soft_limit(ctx)?;

        ctx.update_progress(30, Some("generating video")).await?;
        let video = self
            .engine
            .generate_video_from_image(&p.image_path, &p.prompt, p.duration)
            .await?;
        check_soft_limit(ctx)?;

        ctx.update_progress(90, Some("saving result")).await?;
        info!(task_id = %ctx.task_id(), path = %video.path, "Generation finished");

        Ok(TaskOutcome {
            result_url: Some(format!("/{}", video.path)),
            result_path: Some(video.path),
            result_metadata: Some(video.metadata),
        })
    }
}

/// Cheap demo-grade generation.
pub struct VideoFromImageHandler {
    engine: Arc<dyn MediaEngine>,
}

impl VideoFromImageHandler {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for VideoFromImageHandler {
    fn task_type(&self) -> TaskType {
        TaskType::GenerateVideoFromImage
    }

    async fn run(&self, ctx: &ExecutionContext, params: &TaskParams) -> WorkerResult<TaskOutcome> {
        let TaskParams::GenerateVideoFromImage(p) = params else {
            return Err(WorkerError::permanent("params do not match task type"));
        };

        ctx.update_progress(10, Some("preparing input image")).await?;
        check_soft_limit(ctx)?;

        ctx.update_progress(30, Some("generating video")).await?;
        let video = self
            .engine
            .generate_video_from_image(&p.image_path, &p.prompt, 8)
            .await?;
        check_soft_limit(ctx)?;

        ctx.update_progress(90, Some("saving result")).await?;

        Ok(TaskOutcome {
            result_url: Some(format!("/{}", video.path)),
            result_path: Some(video.path),
            result_metadata: Some(video.metadata),
        })
    }
}

/// Frame extraction.
pub struct FrameExtractHandler {
    engine: Arc<dyn MediaEngine>,
}

impl FrameExtractHandler {
    pub fn new(engine: Arc<dyn MediaEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl TaskHandler for FrameExtractHandler {
    fn task_type(&self) -> TaskType {
        TaskType::FrameExtract
    }

    async fn run(&self, ctx: &ExecutionContext, params: &TaskParams) -> WorkerResult<TaskOutcome> {
        let TaskParams::FrameExtract(p) = params else {
            return Err(WorkerError::permanent("params do not match task type"));
        };

        ctx.update_progress(10, Some("loading video")).await?;
        check_soft_limit(ctx)?;

        ctx.update_progress(30, Some(&format!("extracting {} frames", p.frame_count)))
            .await?;
        let frames = self
            .engine
            .extract_frames(&p.video_path, p.frame_count)
            .await?;
        check_soft_limit(ctx)?;

        ctx.update_progress(90, Some("saving frames")).await?;
        info!(
            task_id = %ctx.task_id(),
            frames = frames.frame_paths.len(),
            "Frame extraction finished"
        );

        Ok(TaskOutcome {
            result_path: frames.frame_paths.first().cloned(),
            result_url: None,
            result_metadata: Some(json!({
                "frame_count": frames.frame_paths.len(),
                "frames": frames.frame_paths,
            })),
        })
    }
}

/// Handler lookup by task type.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<TaskType, Arc<dyn TaskHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in handlers wired to one engine.
    pub fn with_engine(engine: Arc<dyn MediaEngine>) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(VeoGenerateHandler::new(engine.clone())));
        registry.register(Arc::new(VideoFromImageHandler::new(engine.clone())));
        registry.register(Arc::new(FrameExtractHandler::new(engine)));
        registry
    }

    pub fn register(&mut self, handler: Arc<dyn TaskHandler>) {
        self.handlers.insert(handler.task_type(), handler);
    }

    pub fn get(&self, task_type: TaskType) -> Option<Arc<dyn TaskHandler>> {
        self.handlers.get(&task_type).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::DemoEngine;

    #[test]
    fn registry_covers_all_task_types() {
        let engine = Arc::new(DemoEngine::new("static/generated"));
        let registry = HandlerRegistry::with_engine(engine);
        for ty in TaskType::ALL {
            assert!(registry.get(ty).is_some(), "missing handler for {ty}");
        }
    }
}
