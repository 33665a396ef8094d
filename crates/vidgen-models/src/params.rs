//! Per-task-type parameter payloads.
//!
//! Submission carries a free-form JSON object plus a task type string;
//! both are checked here before a task row is ever created. Each task
//! type has its own variant with validated required/optional fields.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::task_type::TaskType;

/// Parameter validation errors, surfaced as HTTP 400 at submission.
#[derive(Debug, Error)]
pub enum ParamsError {
    #[error("Unknown task type: {0}")]
    UnknownTaskType(String),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Malformed params: {0}")]
    Malformed(String),
}

fn default_duration() -> u32 {
    8
}

fn default_frame_count() -> u32 {
    6
}

/// Params for `veo_generate`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VeoGenerateParams {
    /// Input image path
    pub image_path: String,
    /// Generation prompt
    pub prompt: String,
    /// Clip length in seconds
    #[serde(default = "default_duration")]
    pub duration: u32,
}

/// Params for `generate_video_from_image`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GenerateVideoFromImageParams {
    /// Input image path
    pub image_path: String,
    /// Generation prompt
    pub prompt: String,
}

/// Params for `frame_extract`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrameExtractParams {
    /// Input video path
    pub video_path: String,
    /// Number of frames to extract
    #[serde(default = "default_frame_count")]
    pub frame_count: u32,
}

/// Tagged params payload keyed by task type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "task_type", rename_all = "snake_case")]
pub enum TaskParams {
    VeoGenerate(VeoGenerateParams),
    GenerateVideoFromImage(GenerateVideoFromImageParams),
    FrameExtract(FrameExtractParams),
}

impl TaskParams {
    /// Parse and validate a submission payload.
    ///
    /// `task_type` is the raw string from the request; `params` the
    /// free-form JSON object. Fails without side effects on unknown
    /// types or missing/malformed fields.
    pub fn from_parts(task_type: &str, params: &serde_json::Value) -> Result<Self, ParamsError> {
        let ty = TaskType::parse(task_type)
            .ok_or_else(|| ParamsError::UnknownTaskType(task_type.to_string()))?;

        let mut tagged = match params {
            serde_json::Value::Object(map) => map.clone(),
            serde_json::Value::Null => serde_json::Map::new(),
            other => {
                return Err(ParamsError::Malformed(format!(
                    "params must be an object, got {other}"
                )))
            }
        };
        tagged.insert(
            "task_type".to_string(),
            serde_json::Value::String(ty.as_str().to_string()),
        );

        let parsed: TaskParams = serde_json::from_value(serde_json::Value::Object(tagged))
            .map_err(|e| {
                let msg = e.to_string();
                // Map serde's "missing field `x`" into the taxonomy.
                match msg.split('`').nth(1) {
                    Some("image_path") => ParamsError::MissingField("image_path"),
                    Some("prompt") => ParamsError::MissingField("prompt"),
                    Some("video_path") => ParamsError::MissingField("video_path"),
                    _ => ParamsError::Malformed(msg),
                }
            })?;

        parsed.validate()?;
        Ok(parsed)
    }

    /// The task type this payload belongs to.
    pub fn task_type(&self) -> TaskType {
        match self {
            TaskParams::VeoGenerate(_) => TaskType::VeoGenerate,
            TaskParams::GenerateVideoFromImage(_) => TaskType::GenerateVideoFromImage,
            TaskParams::FrameExtract(_) => TaskType::FrameExtract,
        }
    }

    /// Validate field contents beyond presence.
    pub fn validate(&self) -> Result<(), ParamsError> {
        fn non_empty(field: &'static str, value: &str) -> Result<(), ParamsError> {
            if value.trim().is_empty() {
                Err(ParamsError::MissingField(field))
            } else {
                Ok(())
            }
        }

        match self {
            TaskParams::VeoGenerate(p) => {
                non_empty("image_path", &p.image_path)?;
                non_empty("prompt", &p.prompt)?;
                if p.duration == 0 || p.duration > 60 {
                    return Err(ParamsError::InvalidField {
                        field: "duration",
                        reason: format!("must be 1-60 seconds, got {}", p.duration),
                    });
                }
            }
            TaskParams::GenerateVideoFromImage(p) => {
                non_empty("image_path", &p.image_path)?;
                non_empty("prompt", &p.prompt)?;
            }
            TaskParams::FrameExtract(p) => {
                non_empty("video_path", &p.video_path)?;
                if p.frame_count == 0 {
                    return Err(ParamsError::InvalidField {
                        field: "frame_count",
                        reason: "must be at least 1".to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}
