//! Task type enum and queue routing hints.

use serde::{Deserialize, Serialize};

/// Type of task. Closed enum: submission with any other string is
/// rejected before a row is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskType {
    /// Veo video generation from an image. Billable external call.
    VeoGenerate,
    /// Demo-grade video generation from an image.
    GenerateVideoFromImage,
    /// Extract still frames from a video.
    FrameExtract,
}

impl TaskType {
    /// All known task types.
    pub const ALL: [TaskType; 3] = [
        TaskType::VeoGenerate,
        TaskType::GenerateVideoFromImage,
        TaskType::FrameExtract,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::VeoGenerate => "veo_generate",
            TaskType::GenerateVideoFromImage => "generate_video_from_image",
            TaskType::FrameExtract => "frame_extract",
        }
    }

    /// Parse from the wire/persisted string form.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "veo_generate" => Some(TaskType::VeoGenerate),
            "generate_video_from_image" => Some(TaskType::GenerateVideoFromImage),
            "frame_extract" => Some(TaskType::FrameExtract),
            _ => None,
        }
    }

    /// True for operations that issue paid external calls and must
    /// never be automatically re-invoked.
    pub fn is_billable(&self) -> bool {
        matches!(self, TaskType::VeoGenerate)
    }

    /// Retries allowed beyond the first attempt.
    pub fn max_retries(&self) -> u32 {
        match self {
            TaskType::VeoGenerate => 0,
            TaskType::GenerateVideoFromImage | TaskType::FrameExtract => 2,
        }
    }

    /// Base backoff delay between attempts, seconds.
    pub fn backoff_base_secs(&self) -> u64 {
        match self {
            TaskType::VeoGenerate => 0,
            TaskType::GenerateVideoFromImage | TaskType::FrameExtract => 30,
        }
    }

    /// Soft time limit, seconds. Polled cooperatively by handlers.
    pub fn soft_limit_secs(&self) -> u64 {
        match self {
            TaskType::VeoGenerate => 900,
            TaskType::GenerateVideoFromImage => 60,
            TaskType::FrameExtract => 120,
        }
    }

    /// Hard time limit, seconds. Enforced by the executor, and used by
    /// the stale-running sweep as the staleness bound.
    pub fn hard_limit_secs(&self) -> u64 {
        match self {
            TaskType::VeoGenerate => 1200,
            TaskType::GenerateVideoFromImage => 120,
            TaskType::FrameExtract => 180,
        }
    }
}

impl std::fmt::Display for TaskType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_roundtrip() {
        for ty in TaskType::ALL {
            assert_eq!(TaskType::parse(ty.as_str()), Some(ty));
        }
        assert_eq!(TaskType::parse("make_coffee"), None);
    }

    #[test]
    fn billable_flag() {
        assert!(TaskType::VeoGenerate.is_billable());
        assert!(!TaskType::FrameExtract.is_billable());
    }
}
