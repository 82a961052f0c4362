// task.rs — Approval task data model.
//
// pending → { approved, denied, expired }. Terminal states are final.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle state of an approval task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalState {
    Pending,
    Approved,
    Denied,
    Expired,
}

impl ApprovalState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ApprovalState::Pending)
    }
}

impl std::fmt::Display for ApprovalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApprovalState::Pending => "pending",
            ApprovalState::Approved => "approved",
            ApprovalState::Denied => "denied",
            ApprovalState::Expired => "expired",
        };
        f.write_str(s)
    }
}

/// The verdict an operator hands down on a pending task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum OperatorDecision {
    Approve,
    Deny,
}

/// One escalated action awaiting (or past) a human decision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApprovalTask {
    /// Unique task identifier ("apr-" + random hex).
    pub task_id: String,
    /// The interaction record that escalated.
    pub record_id: String,
    pub org_id: Uuid,
    /// Role the decision is assigned to, e.g. "finance-approver".
    pub role: String,
    pub state: ApprovalState,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub reason: Option<String>,
}

impl ApprovalTask {
    pub fn fresh_task_id() -> String {
        format!("apr-{}", Uuid::new_v4().simple())
    }

    /// Whether the deadline has passed at `now`. Only meaningful while the
    /// stored state is still pending.
    pub fn is_past_deadline(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn only_pending_is_non_terminal() {
        assert!(!ApprovalState::Pending.is_terminal());
        assert!(ApprovalState::Approved.is_terminal());
        assert!(ApprovalState::Denied.is_terminal());
        assert!(ApprovalState::Expired.is_terminal());
    }

    #[test]
    fn task_round_trips_through_json() {
        let now = Utc::now();
        let task = ApprovalTask {
            task_id: ApprovalTask::fresh_task_id(),
            record_id: "rec-1".to_string(),
            org_id: Uuid::new_v4(),
            role: "finance-approver".to_string(),
            state: ApprovalState::Pending,
            created_at: now,
            expires_at: now + Duration::hours(4),
            decided_by: None,
            decided_at: None,
            reason: None,
        };
        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains("\"pending\""));
        let back: ApprovalTask = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn deadline_check_is_inclusive() {
        let now = Utc::now();
        let task = ApprovalTask {
            task_id: ApprovalTask::fresh_task_id(),
            record_id: "rec-1".to_string(),
            org_id: Uuid::new_v4(),
            role: "ops".to_string(),
            state: ApprovalState::Pending,
            created_at: now - Duration::hours(1),
            expires_at: now,
            decided_by: None,
            decided_at: None,
            reason: None,
        };
        assert!(task.is_past_deadline(now));
        assert!(!task.is_past_deadline(now - Duration::seconds(1)));
    }
}
