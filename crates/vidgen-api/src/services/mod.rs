//! API-side services.

pub mod orchestrator;
pub mod sweeper;

pub use orchestrator::TaskOrchestrator;
pub use sweeper::TaskSweeper;
