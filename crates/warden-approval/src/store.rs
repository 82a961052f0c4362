// store.rs — In-memory approval task store.
//
// Each task lives behind its own Mutex inside a shared map. A decision
// locks only its task, checks the current state, and transitions in one
// critical section, so two concurrent decisions on the same task cannot
// both win and decisions on different tasks never contend.
//
// Expiry is implicit state: every read path recomputes "is this past its
// deadline" from `expires_at`, so callers observe `expired` even if no
// sweep has run. `sweep_expired` exists to make the transition durable in
// bulk.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use chrono::{DateTime, Duration, Utc};
use tracing::info;
use uuid::Uuid;

use crate::error::ApprovalError;
use crate::task::{ApprovalState, ApprovalTask, OperatorDecision};

#[derive(Debug, Default)]
pub struct ApprovalStore {
    tasks: RwLock<HashMap<String, Arc<Mutex<ApprovalTask>>>>,
}

impl ApprovalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a pending task for an escalated interaction record.
    pub fn create(
        &self,
        record_id: &str,
        org_id: Uuid,
        role: &str,
        ttl: Duration,
    ) -> Result<ApprovalTask, ApprovalError> {
        if ttl <= Duration::zero() {
            return Err(ApprovalError::InvalidTtl {
                seconds: ttl.num_seconds(),
            });
        }

        let now = Utc::now();
        let task = ApprovalTask {
            task_id: ApprovalTask::fresh_task_id(),
            record_id: record_id.to_string(),
            org_id,
            role: role.to_string(),
            state: ApprovalState::Pending,
            created_at: now,
            expires_at: now + ttl,
            decided_by: None,
            decided_at: None,
            reason: None,
        };
        info!(
            task_id = %task.task_id,
            record_id,
            role,
            expires_at = %task.expires_at,
            "approval task created"
        );

        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.insert(task.task_id.clone(), Arc::new(Mutex::new(task.clone())));
        Ok(task)
    }

    /// Record an operator decision on a pending task.
    ///
    /// The transition is atomic under the task's own lock: exactly one of
    /// several concurrent calls wins; the rest get `AlreadyDecided`. A
    /// decision arriving after the deadline transitions the task to
    /// `expired` and fails with `Expired`.
    pub fn decide(
        &self,
        task_id: &str,
        operator_id: &str,
        decision: OperatorDecision,
        reason: Option<&str>,
    ) -> Result<ApprovalTask, ApprovalError> {
        self.decide_at(task_id, operator_id, decision, reason, Utc::now())
    }

    /// Like [`decide`](Self::decide) with an explicit "now".
    pub fn decide_at(
        &self,
        task_id: &str,
        operator_id: &str,
        decision: OperatorDecision,
        reason: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<ApprovalTask, ApprovalError> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock().unwrap_or_else(|e| e.into_inner());

        if task.state.is_terminal() {
            return Err(ApprovalError::AlreadyDecided {
                task_id: task.task_id.clone(),
                state: task.state,
            });
        }
        if task.is_past_deadline(now) {
            task.state = ApprovalState::Expired;
            info!(task_id = %task.task_id, "approval task expired on decide");
            return Err(ApprovalError::Expired {
                task_id: task.task_id.clone(),
            });
        }

        task.state = match decision {
            OperatorDecision::Approve => ApprovalState::Approved,
            OperatorDecision::Deny => ApprovalState::Denied,
        };
        task.decided_by = Some(operator_id.to_string());
        task.decided_at = Some(now);
        task.reason = reason.map(str::to_string);
        info!(
            task_id = %task.task_id,
            operator_id,
            state = %task.state,
            "approval task decided"
        );
        Ok(task.clone())
    }

    /// Re-insert a task from durable storage, replacing any copy under the
    /// same id. Expiry still recomputes from the restored `expires_at`.
    pub fn restore(&self, task: ApprovalTask) {
        let mut tasks = self.tasks.write().unwrap_or_else(|e| e.into_inner());
        tasks.insert(task.task_id.clone(), Arc::new(Mutex::new(task)));
    }

    /// Fetch a task, recomputing expiry as of now.
    pub fn get(&self, task_id: &str) -> Result<ApprovalTask, ApprovalError> {
        let entry = self.entry(task_id)?;
        let mut task = entry.lock().unwrap_or_else(|e| e.into_inner());
        Self::settle_expiry(&mut task, Utc::now());
        Ok(task.clone())
    }

    /// All still-pending tasks for an organization, oldest first.
    pub fn list_pending(&self, org_id: Uuid) -> Vec<ApprovalTask> {
        let now = Utc::now();
        let mut pending: Vec<ApprovalTask> = self
            .entries_for(org_id)
            .into_iter()
            .filter_map(|entry| {
                let mut task = entry.lock().unwrap_or_else(|e| e.into_inner());
                Self::settle_expiry(&mut task, now);
                (task.state == ApprovalState::Pending).then(|| task.clone())
            })
            .collect();
        pending.sort_by_key(|t| t.created_at);
        pending
    }

    /// Transition every pending-but-past-deadline task for the organization
    /// to `expired` and return the tasks that transitioned.
    pub fn sweep_expired(&self, org_id: Uuid) -> Vec<ApprovalTask> {
        let now = Utc::now();
        let mut swept = Vec::new();
        for entry in self.entries_for(org_id) {
            let mut task = entry.lock().unwrap_or_else(|e| e.into_inner());
            if Self::settle_expiry(&mut task, now) {
                swept.push(task.clone());
            }
        }
        swept.sort_by_key(|t| t.created_at);
        swept
    }

    fn entry(&self, task_id: &str) -> Result<Arc<Mutex<ApprovalTask>>, ApprovalError> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks.get(task_id).cloned().ok_or(ApprovalError::NotFound {
            task_id: task_id.to_string(),
        })
    }

    fn entries_for(&self, org_id: Uuid) -> Vec<Arc<Mutex<ApprovalTask>>> {
        let tasks = self.tasks.read().unwrap_or_else(|e| e.into_inner());
        tasks
            .values()
            .filter(|entry| {
                let task = entry.lock().unwrap_or_else(|e| e.into_inner());
                task.org_id == org_id
            })
            .cloned()
            .collect()
    }

    /// Persist the expired transition if the deadline has passed. Returns
    /// true if the task transitioned now.
    fn settle_expiry(task: &mut ApprovalTask, now: DateTime<Utc>) -> bool {
        if task.state == ApprovalState::Pending && task.is_past_deadline(now) {
            task.state = ApprovalState::Expired;
            info!(task_id = %task.task_id, "approval task expired");
            true
        } else {
            false
        }
    }
}
