//! # warden-approval
//!
//! Approval state machine for escalated actions.
//!
//! When the policy engine escalates an action, the gateway creates an
//! [`ApprovalTask`] assigned to a role. The task starts `pending` and ends
//! in exactly one of `approved`, `denied`, or `expired`; terminal states are
//! final. Concurrent operator decisions on the same task have exactly one
//! winner; the loser sees `AlreadyDecided`. Expiry is computed on every
//! read, so a task past its deadline reports `expired` even before any
//! sweep has run.
//!
//! ## Quick Example
//!
//! ```rust
//! use chrono::Duration;
//! use uuid::Uuid;
//! use warden_approval::{ApprovalStore, ApprovalState, OperatorDecision};
//!
//! let store = ApprovalStore::new();
//! let task = store
//!     .create("rec-1", Uuid::new_v4(), "finance-approver", Duration::hours(4))
//!     .unwrap();
//! let decided = store
//!     .decide(&task.task_id, "operator-9", OperatorDecision::Approve, Some("looks fine"))
//!     .unwrap();
//! assert_eq!(decided.state, ApprovalState::Approved);
//! ```

pub mod error;
pub mod store;
pub mod task;

pub use error::ApprovalError;
pub use store::ApprovalStore;
pub use task::{ApprovalState, ApprovalTask, OperatorDecision};
