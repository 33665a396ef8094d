//! Worker error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    /// Transient failure of an external collaborator. Eligible for
    /// retry under the task type's policy.
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Permanent failure. Retrying cannot help.
    #[error("Permanent failure: {0}")]
    Permanent(String),

    /// Soft or hard time limit exceeded.
    #[error("Time limit exceeded: {0}")]
    Timeout(String),

    /// Cancellation observed mid-attempt.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    #[error("Store error: {0}")]
    Store(#[from] vidgen_store::StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] vidgen_queue::QueueError),
}

impl WorkerError {
    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::Permanent(msg.into())
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::Timeout(msg.into())
    }

    pub fn cancelled(msg: impl Into<String>) -> Self {
        Self::Cancelled(msg.into())
    }

    /// Whether the retry policy may re-dispatch after this error.
    ///
    /// Timeouts and permanent errors go straight to `failed`;
    /// infrastructure errors against the store or transport are
    /// treated as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkerError::Transient(_) => true,
            WorkerError::Store(e) => e.is_retryable(),
            WorkerError::Queue(_) => true,
            WorkerError::Permanent(_) | WorkerError::Timeout(_) | WorkerError::Cancelled(_) => {
                false
            }
        }
    }

    /// Error class recorded on the task row.
    pub fn error_type(&self) -> &'static str {
        match self {
            WorkerError::Transient(_) => "transient",
            WorkerError::Permanent(_) => "permanent",
            WorkerError::Timeout(_) => "timeout",
            WorkerError::Cancelled(_) => "cancelled",
            WorkerError::Store(_) => "store",
            WorkerError::Queue(_) => "queue",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(WorkerError::transient("engine unreachable").is_retryable());
        assert!(!WorkerError::permanent("bad input").is_retryable());
        assert!(!WorkerError::timeout("soft limit").is_retryable());
        assert!(!WorkerError::cancelled("revoked").is_retryable());
        assert_eq!(WorkerError::timeout("x").error_type(), "timeout");
    }
}
