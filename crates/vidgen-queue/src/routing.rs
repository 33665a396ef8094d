//! Static task-type to queue routing.
//!
//! The mapping is independent of runtime load so operators can scale
//! worker capacity per queue independently: long, billable generation
//! is isolated from cheap extraction. Priority is a secondary 0-10
//! hint forwarded to the transport; ordering within a queue at equal
//! priority is FIFO by enqueue time but is not guaranteed under
//! redelivery, retries, or multiple consuming workers.

use vidgen_models::TaskType;

/// Default priority hint.
pub const DEFAULT_PRIORITY: u8 = 5;

/// All queue names, for consumer-group initialization and workers that
/// consume everything.
pub const ALL_QUEUES: [&str; 3] = ["veo", "video", "default"];

/// Resolved routing for one task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueRoute {
    /// Queue name
    pub queue: &'static str,
    /// Priority hint (0-10)
    pub priority: u8,
}

/// Resolve the queue and priority for a task type.
pub fn route_for(task_type: TaskType) -> QueueRoute {
    match task_type {
        TaskType::VeoGenerate => QueueRoute {
            queue: "veo",
            priority: DEFAULT_PRIORITY,
        },
        TaskType::GenerateVideoFromImage => QueueRoute {
            queue: "video",
            priority: DEFAULT_PRIORITY,
        },
        TaskType::FrameExtract => QueueRoute {
            queue: "default",
            priority: DEFAULT_PRIORITY,
        },
    }
}
