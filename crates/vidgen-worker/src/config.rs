//! Worker configuration.

use std::time::Duration;

/// Worker configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Execution slots for the `veo` queue
    pub veo_slots: usize,
    /// Execution slots for the `video` queue
    pub video_slots: usize,
    /// Execution slots for the `default` queue
    pub default_slots: usize,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often to scan for orphaned pending deliveries
    pub claim_interval: Duration,
    /// Minimum idle time before a pending delivery can be claimed
    pub claim_min_idle: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            veo_slots: 1,
            video_slots: 2,
            default_slots: 4,
            shutdown_timeout: Duration::from_secs(30),
            claim_interval: Duration::from_secs(30),
            claim_min_idle: Duration::from_secs(300),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        fn env_usize(key: &str, default: usize) -> usize {
            std::env::var(key)
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(default)
        }
        fn env_secs(key: &str, default: u64) -> Duration {
            Duration::from_secs(
                std::env::var(key)
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(default),
            )
        }

        Self {
            veo_slots: env_usize("WORKER_VEO_SLOTS", 1),
            video_slots: env_usize("WORKER_VIDEO_SLOTS", 2),
            default_slots: env_usize("WORKER_DEFAULT_SLOTS", 4),
            shutdown_timeout: env_secs("WORKER_SHUTDOWN_TIMEOUT", 30),
            claim_interval: env_secs("WORKER_CLAIM_INTERVAL_SECS", 30),
            claim_min_idle: env_secs("WORKER_CLAIM_MIN_IDLE_SECS", 300),
        }
    }

    /// Slot count for a routed queue.
    pub fn slots_for(&self, queue: &str) -> usize {
        match queue {
            "veo" => self.veo_slots,
            "video" => self.video_slots,
            _ => self.default_slots,
        }
    }
}
