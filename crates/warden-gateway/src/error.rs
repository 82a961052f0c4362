// error.rs — Error types for the gateway orchestrator.
//
// Authentication and scope failures are NOT errors here: the gateway
// recovers them into a structured `Denied` outcome so callers can tell "not
// allowed" from "system broken". These variants are the genuinely broken
// cases.

use thiserror::Error;
use warden_approval::ApprovalError;
use warden_audit::AuditError;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// The audit append failed even after retries. The request fails rather
    /// than returning a decision that was never durably recorded.
    #[error("audit append failed after retries")]
    AuditWriteFailed {
        #[source]
        source: AuditError,
    },

    /// An approval operation failed (not found, already decided, expired).
    #[error(transparent)]
    Approval(#[from] ApprovalError),

    /// A chain read or verification failed at the I/O level.
    #[error(transparent)]
    Audit(#[from] AuditError),

    /// The approval task exists but the gateway no longer holds the action
    /// it escalated, so there is nothing to execute or deny.
    #[error("no pending action held for approval task '{task_id}'")]
    PendingActionMissing { task_id: String },
}
