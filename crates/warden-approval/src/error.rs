// error.rs — Error types for the approval subsystem.

use thiserror::Error;

use crate::task::ApprovalState;

/// Errors that can occur while creating or deciding approval tasks.
#[derive(Debug, Error)]
pub enum ApprovalError {
    /// No task with that id exists.
    #[error("approval task '{task_id}' not found")]
    NotFound { task_id: String },

    /// The task already reached a terminal state. A second decision is a
    /// rejected conflict, not an idempotent retry.
    #[error("approval task '{task_id}' already {state}")]
    AlreadyDecided {
        task_id: String,
        state: ApprovalState,
    },

    /// The task's deadline passed before the decision arrived. The failed
    /// attempt transitions the task to `expired`.
    #[error("approval task '{task_id}' expired before a decision was made")]
    Expired { task_id: String },

    /// The requested time-to-live is zero or negative.
    #[error("invalid approval ttl: {seconds}s (must be positive)")]
    InvalidTtl { seconds: i64 },
}
