//! Media engine interface.
//!
//! The actual generation and extraction algorithms are external
//! collaborators behind this trait. The demo engine simulates them
//! with a short wait and preset outputs, like the original demo mode.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use uuid::Uuid;

use crate::error::WorkerResult;

/// A produced video artifact.
#[derive(Debug, Clone)]
pub struct GeneratedVideo {
    /// Artifact path under the output root
    pub path: String,
    /// Engine-specific metadata recorded on the task row
    pub metadata: serde_json::Value,
}

/// Extracted still frames.
#[derive(Debug, Clone)]
pub struct ExtractedFrames {
    /// Paths of the extracted frames, in order
    pub frame_paths: Vec<String>,
}

/// External media operations invoked by task handlers.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Generate a short video clip from a still image and a prompt.
    async fn generate_video_from_image(
        &self,
        image_path: &str,
        prompt: &str,
        duration: u32,
    ) -> WorkerResult<GeneratedVideo>;

    /// Extract evenly spaced frames from a video.
    async fn extract_frames(
        &self,
        video_path: &str,
        frame_count: u32,
    ) -> WorkerResult<ExtractedFrames>;
}

/// Demo engine: simulated latency, preset outputs.
pub struct DemoEngine {
    output_dir: String,
    simulated_latency: Duration,
}

impl DemoEngine {
    pub fn new(output_dir: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            simulated_latency: Duration::from_secs(2),
        }
    }

    /// Override the simulated latency, mainly for tests.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.simulated_latency = latency;
        self
    }
}

#[async_trait]
impl MediaEngine for DemoEngine {
    async fn generate_video_from_image(
        &self,
        image_path: &str,
        prompt: &str,
        duration: u32,
    ) -> WorkerResult<GeneratedVideo> {
        tokio::time::sleep(self.simulated_latency).await;

        let path = format!("{}/demo_{}.mp4", self.output_dir, Uuid::new_v4());
        Ok(GeneratedVideo {
            path,
            metadata: json!({
                "demo_mode": true,
                "source_image": image_path,
                "prompt": prompt,
                "duration": duration,
            }),
        })
    }

    async fn extract_frames(
        &self,
        video_path: &str,
        frame_count: u32,
    ) -> WorkerResult<ExtractedFrames> {
        tokio::time::sleep(self.simulated_latency).await;

        let _ = video_path;
        let stem = Uuid::new_v4();
        let frame_paths = (0..frame_count)
            .map(|i| format!("{}/frames_{}/frame_{:03}.jpg", self.output_dir, stem, i))
            .collect();
        Ok(ExtractedFrames { frame_paths })
    }
}
