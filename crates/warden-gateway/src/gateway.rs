// gateway.rs — The action-mediation loop.
//
// One entry point per agent action: validate the token, check the agent
// registry, evaluate policy, then execute / deny / escalate. Every branch
// that reaches a trusted identity appends an interaction record BEFORE the
// response goes out; if the append cannot be made durable the request fails
// with `AuditWriteFailed` instead of returning an unrecorded decision.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use chrono::Duration;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use warden_approval::{ApprovalError, ApprovalState, ApprovalStore, ApprovalTask, OperatorDecision};
use warden_audit::hasher;
use warden_audit::{AuditChain, InteractionRecord, RecordDraft, RecordFilter, VerificationResult};
use warden_policy::{PolicyDecision, PolicyEngine, PolicyRequest};
use warden_token::{TokenCodec, TokenError, TokenIdentity};

use crate::directory::{AgentDirectory, AgentStatus};
use crate::error::GatewayError;
use crate::executor::{run_with_timeout, ActionExecutor, ExecutionResult};

/// Transient audit append failures get this many retries before the request
/// fails.
const APPEND_RETRIES: usize = 2;

/// What happens to a held action when its approval task expires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Append an `expired` follow-up record for the unapproved action.
    TreatAsDenied,
    /// Drop the held action without a follow-up record.
    DropSilently,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// How long an escalated action waits for an operator.
    pub approval_ttl: Duration,
    /// Wall-clock limit for a single action execution.
    pub execution_timeout: std::time::Duration,
    pub expiry_policy: ExpiryPolicy,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            approval_ttl: Duration::hours(24),
            execution_timeout: std::time::Duration::from_secs(30),
            expiry_policy: ExpiryPolicy::TreatAsDenied,
        }
    }
}

/// One action an agent wants performed.
#[derive(Debug, Clone)]
pub struct ActionRequest {
    pub action: String,
    pub params: Map<String, Value>,
    /// Free-text caller context. Logged for operators, never audited.
    pub context: Option<String>,
}

impl ActionRequest {
    pub fn new(action: &str) -> Self {
        Self {
            action: action.to_string(),
            params: Map::new(),
            context: None,
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }

    pub fn with_context(mut self, context: &str) -> Self {
        self.context = Some(context.to_string());
        self
    }
}

/// Gateway response to a submitted action.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// The action ran (possibly failing or timing out) and was recorded.
    Executed {
        record_id: String,
        result: ExecutionResult,
    },
    /// The action was refused. `record_id` is absent only when the token
    /// carried no trustworthy identity to attribute a record to.
    Denied {
        record_id: Option<String>,
        reason: String,
    },
    /// The action awaits an operator decision under `task_id`.
    Escalated {
        record_id: String,
        task_id: String,
        role: String,
    },
}

/// Gateway response to an operator decision on an escalated action.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ApprovalOutcome {
    Executed {
        task: ApprovalTask,
        record_id: String,
        result: ExecutionResult,
    },
    Denied {
        task: ApprovalTask,
        record_id: String,
    },
}

/// The escalated action the gateway holds while its task is pending.
#[derive(Debug, Clone)]
struct PendingAction {
    org_id: Uuid,
    agent_id: String,
    action: String,
    params: Map<String, Value>,
    param_hash: String,
    matched_rule_id: Option<Uuid>,
}

/// Composes the token codec, policy engine, approval store, and audit chain
/// into the single mediation surface agents and operators talk to.
pub struct Gateway {
    codec: TokenCodec,
    engine: PolicyEngine,
    approvals: ApprovalStore,
    chain: AuditChain,
    directory: Arc<dyn AgentDirectory + Send + Sync>,
    executor: Arc<dyn ActionExecutor + Send + Sync>,
    config: GatewayConfig,
    pending: RwLock<HashMap<String, PendingAction>>,
}

impl Gateway {
    pub fn new(
        codec: TokenCodec,
        engine: PolicyEngine,
        chain: AuditChain,
        directory: Arc<dyn AgentDirectory + Send + Sync>,
        executor: Arc<dyn ActionExecutor + Send + Sync>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            codec,
            engine,
            approvals: ApprovalStore::new(),
            chain,
            directory,
            executor,
            config,
            pending: RwLock::new(HashMap::new()),
        }
    }

    /// Mediate one agent action end to end.
    pub fn submit_action(
        &self,
        token_wire: &str,
        request: &ActionRequest,
    ) -> Result<SubmitOutcome, GatewayError> {
        if let Some(context) = &request.context {
            debug!(action = %request.action, context, "action submitted with context");
        }
        let param_hash = hasher::hash_json(&Value::Object(request.params.clone()));

        let identity = match self.codec.validate(token_wire, &request.action) {
            Ok(identity) => identity,
            Err(err) => return self.deny_bad_token(token_wire, request, &param_hash, err),
        };

        // The registry outranks policy: an unknown or suspended agent is
        // denied no matter what the rules would say.
        if let Some(outcome) = self.registry_denial(&identity, request, &param_hash)? {
            return Ok(outcome);
        }

        let mut policy_request = PolicyRequest::new(&identity.agent_id, &request.action);
        policy_request.params = request.params.clone();

        match self.engine.evaluate(identity.org_id, &policy_request) {
            PolicyDecision::Allow { rule_id, reason } => {
                debug!(agent_id = %identity.agent_id, action = %request.action, reason, "policy allowed action");
                let result = run_with_timeout(
                    Arc::clone(&self.executor),
                    &request.action,
                    &request.params,
                    self.config.execution_timeout,
                );
                let draft = RecordDraft {
                    agent_id: identity.agent_id.clone(),
                    action: request.action.clone(),
                    param_hash,
                    decision: "allow".to_string(),
                    matched_rule_id: Some(rule_id),
                    result_status: Some(result.status.as_str().to_string()),
                    result_hash: hasher::hash_json(&result.payload),
                };
                let record = self.append_with_retry(identity.org_id, draft)?;
                info!(
                    record_id = %record.record_id,
                    agent_id = %identity.agent_id,
                    action = %request.action,
                    status = result.status.as_str(),
                    "action executed"
                );
                Ok(SubmitOutcome::Executed {
                    record_id: record.record_id,
                    result,
                })
            }
            PolicyDecision::Deny {
                rule_id,
                code,
                reason,
            } => {
                let record = self.append_with_retry(
                    identity.org_id,
                    RecordDraft::decision_only(
                        &identity.agent_id,
                        &request.action,
                        &param_hash,
                        "deny",
                        rule_id,
                    ),
                )?;
                info!(
                    record_id = %record.record_id,
                    agent_id = %identity.agent_id,
                    action = %request.action,
                    code = ?code,
                    reason,
                    "action denied by policy"
                );
                Ok(SubmitOutcome::Denied {
                    record_id: Some(record.record_id),
                    reason,
                })
            }
            PolicyDecision::Escalate {
                rule_id,
                role,
                reason,
            } => {
                let record = self.append_with_retry(
                    identity.org_id,
                    RecordDraft::decision_only(
                        &identity.agent_id,
                        &request.action,
                        &param_hash,
                        "escalate",
                        Some(rule_id),
                    ),
                )?;
                let task = self.approvals.create(
                    &record.record_id,
                    identity.org_id,
                    &role,
                    self.config.approval_ttl,
                )?;
                {
                    let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());
                    pending.insert(
                        task.task_id.clone(),
                        PendingAction {
                            org_id: identity.org_id,
                            agent_id: identity.agent_id.clone(),
                            action: request.action.clone(),
                            params: request.params.clone(),
                            param_hash,
                            matched_rule_id: Some(rule_id),
                        },
                    );
                }
                info!(
                    record_id = %record.record_id,
                    task_id = %task.task_id,
                    agent_id = %identity.agent_id,
                    action = %request.action,
                    role,
                    reason,
                    "action escalated for approval"
                );
                Ok(SubmitOutcome::Escalated {
                    record_id: record.record_id,
                    task_id: task.task_id,
                    role,
                })
            }
        }
    }

    /// Apply an operator decision to an escalated action.
    ///
    /// Approval executes the held action and appends an `approved` record;
    /// denial appends a `denied` record. A decision arriving after the
    /// deadline fails with `Expired` and the held action is resolved under
    /// the configured expiry policy, producing an `expired` record distinct
    /// from an operator denial.
    pub fn decide_approval(
        &self,
        task_id: &str,
        operator_id: &str,
        decision: OperatorDecision,
        reason: Option<&str>,
    ) -> Result<ApprovalOutcome, GatewayError> {
        match self.approvals.decide(task_id, operator_id, decision, reason) {
            Ok(task) => {
                let pending = self.take_pending(&task.task_id)?;
                if task.state == ApprovalState::Approved {
                    let result = run_with_timeout(
                        Arc::clone(&self.executor),
                        &pending.action,
                        &pending.params,
                        self.config.execution_timeout,
                    );
                    let draft = RecordDraft {
                        agent_id: pending.agent_id,
                        action: pending.action,
                        param_hash: pending.param_hash,
                        decision: "approved".to_string(),
                        matched_rule_id: pending.matched_rule_id,
                        result_status: Some(result.status.as_str().to_string()),
                        result_hash: hasher::hash_json(&result.payload),
                    };
                    let record = self.append_with_retry(pending.org_id, draft)?;
                    info!(
                        record_id = %record.record_id,
                        task_id = %task.task_id,
                        operator_id,
                        status = result.status.as_str(),
                        "approved action executed"
                    );
                    Ok(ApprovalOutcome::Executed {
                        task,
                        record_id: record.record_id,
                        result,
                    })
                } else {
                    let record = self.append_with_retry(
                        pending.org_id,
                        RecordDraft::decision_only(
                            &pending.agent_id,
                            &pending.action,
                            &pending.param_hash,
                            "denied",
                            pending.matched_rule_id,
                        ),
                    )?;
                    info!(
                        record_id = %record.record_id,
                        task_id = %task.task_id,
                        operator_id,
                        "escalated action denied by operator"
                    );
                    Ok(ApprovalOutcome::Denied {
                        task,
                        record_id: record.record_id,
                    })
                }
            }
            Err(err @ ApprovalError::Expired { .. }) => {
                // The failed decide persisted the expired state; resolve the
                // held action now rather than waiting for a sweep.
                self.resolve_expired_task(task_id)?;
                Err(GatewayError::Approval(err))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Sweep the organization's expired approval tasks and append their
    /// follow-up records. Returns the records appended.
    ///
    /// Reads may already have persisted the `expired` state before this
    /// runs, so resolution works from the held actions rather than from the
    /// sweep's newly-transitioned list.
    pub fn resolve_expired(&self, org_id: Uuid) -> Result<Vec<InteractionRecord>, GatewayError> {
        self.approvals.sweep_expired(org_id);

        let held: Vec<String> = {
            let pending = self.pending.read().unwrap_or_else(|e| e.into_inner());
            pending
                .iter()
                .filter(|(_, action)| action.org_id == org_id)
                .map(|(task_id, _)| task_id.clone())
                .collect()
        };

        let mut records = Vec::new();
        for task_id in held {
            let expired = match self.approvals.get(&task_id) {
                Ok(task) => task.state == ApprovalState::Expired,
                Err(_) => false,
            };
            if expired {
                if let Some(record) = self.resolve_expired_task(&task_id)? {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    /// Re-arm an escalated action from durable storage, typically after a
    /// restart. The task keeps its identity and deadline; the held action
    /// becomes decidable again.
    pub fn restore_escalation(
        &self,
        task: ApprovalTask,
        agent_id: &str,
        action: &str,
        params: Map<String, Value>,
        matched_rule_id: Option<Uuid>,
    ) {
        let param_hash = hasher::hash_json(&Value::Object(params.clone()));
        let held = PendingAction {
            org_id: task.org_id,
            agent_id: agent_id.to_string(),
            action: action.to_string(),
            params,
            param_hash,
            matched_rule_id,
        };
        {
            let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());
            pending.insert(task.task_id.clone(), held);
        }
        self.approvals.restore(task);
    }

    /// Still-pending approval tasks for an organization, oldest first.
    pub fn list_pending(&self, org_id: Uuid) -> Vec<ApprovalTask> {
        self.approvals.list_pending(org_id)
    }

    /// Fetch one approval task, recomputing expiry as of now.
    pub fn approval_task(&self, task_id: &str) -> Result<ApprovalTask, GatewayError> {
        Ok(self.approvals.get(task_id)?)
    }

    /// Read interaction records back out of an organization's chain.
    pub fn read_records(
        &self,
        org_id: Uuid,
        filter: &RecordFilter,
    ) -> Result<Vec<InteractionRecord>, GatewayError> {
        Ok(self.chain.read_records(org_id, filter)?)
    }

    /// Verify an organization's chain, optionally over a sequence range.
    pub fn verify_chain(
        &self,
        org_id: Uuid,
        from_seq: Option<u64>,
        to_seq: Option<u64>,
    ) -> Result<VerificationResult, GatewayError> {
        Ok(self.chain.verify(org_id, from_seq, to_seq)?)
    }

    /// Ed25519 public key that verifies this gateway's record signatures.
    pub fn audit_public_key(&self) -> Vec<u8> {
        self.chain.public_key()
    }

    /// Where an organization's chain file lives on disk.
    pub fn chain_path(&self, org_id: Uuid) -> PathBuf {
        self.chain.chain_path(org_id)
    }

    /// Deny a request whose token failed validation.
    ///
    /// Malformed or badly signed tokens carry no trustworthy identity, so
    /// nothing is appended for them; a forger must not be able to write
    /// arbitrary agent ids into an organization's chain. Authentic tokens
    /// that are merely unusable (expired, revoked, out of scope) are
    /// attributed and recorded.
    fn deny_bad_token(
        &self,
        token_wire: &str,
        request: &ActionRequest,
        param_hash: &str,
        err: TokenError,
    ) -> Result<SubmitOutcome, GatewayError> {
        let reason = err.to_string();
        if matches!(err, TokenError::Malformed { .. } | TokenError::BadSignature) {
            warn!(action = %request.action, reason, "rejected unauthenticatable token");
            return Ok(SubmitOutcome::Denied {
                record_id: None,
                reason,
            });
        }

        match self.codec.authenticated_identity(token_wire) {
            Some(identity) => {
                let record = self.append_with_retry(
                    identity.org_id,
                    RecordDraft::decision_only(
                        &identity.agent_id,
                        &request.action,
                        param_hash,
                        "deny",
                        None,
                    ),
                )?;
                warn!(
                    record_id = %record.record_id,
                    agent_id = %identity.agent_id,
                    action = %request.action,
                    reason,
                    "rejected unusable token from known identity"
                );
                Ok(SubmitOutcome::Denied {
                    record_id: Some(record.record_id),
                    reason,
                })
            }
            None => Ok(SubmitOutcome::Denied {
                record_id: None,
                reason,
            }),
        }
    }

    fn registry_denial(
        &self,
        identity: &TokenIdentity,
        request: &ActionRequest,
        param_hash: &str,
    ) -> Result<Option<SubmitOutcome>, GatewayError> {
        let reason = match self.directory.lookup_agent(&identity.agent_id) {
            None => Some(format!("agent '{}' is not registered", identity.agent_id)),
            Some(profile) if profile.org_id != identity.org_id => Some(format!(
                "agent '{}' does not belong to organization {}",
                identity.agent_id, identity.org_id
            )),
            Some(profile) if profile.status != AgentStatus::Active => {
                Some(format!("agent '{}' is suspended", identity.agent_id))
            }
            Some(_) => None,
        };

        let Some(reason) = reason else {
            return Ok(None);
        };
        let record = self.append_with_retry(
            identity.org_id,
            RecordDraft::decision_only(
                &identity.agent_id,
                &request.action,
                param_hash,
                "deny",
                None,
            ),
        )?;
        warn!(
            record_id = %record.record_id,
            agent_id = %identity.agent_id,
            action = %request.action,
            reason,
            "agent denied by registry"
        );
        Ok(Some(SubmitOutcome::Denied {
            record_id: Some(record.record_id),
            reason,
        }))
    }

    /// Drop the held action for an expired task, appending its `expired`
    /// record when the policy says so. Idempotent: a task whose action was
    /// already resolved yields `None`.
    fn resolve_expired_task(
        &self,
        task_id: &str,
    ) -> Result<Option<InteractionRecord>, GatewayError> {
        let action = {
            let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());
            pending.remove(task_id)
        };
        let Some(action) = action else {
            return Ok(None);
        };

        match self.config.expiry_policy {
            ExpiryPolicy::TreatAsDenied => {
                let record = self.append_with_retry(
                    action.org_id,
                    RecordDraft::decision_only(
                        &action.agent_id,
                        &action.action,
                        &action.param_hash,
                        "expired",
                        action.matched_rule_id,
                    ),
                )?;
                info!(record_id = %record.record_id, task_id, "expired escalation recorded");
                Ok(Some(record))
            }
            ExpiryPolicy::DropSilently => {
                info!(task_id, "expired escalation dropped");
                Ok(None)
            }
        }
    }

    fn take_pending(&self, task_id: &str) -> Result<PendingAction, GatewayError> {
        let mut pending = self.pending.write().unwrap_or_else(|e| e.into_inner());
        pending
            .remove(task_id)
            .ok_or_else(|| GatewayError::PendingActionMissing {
                task_id: task_id.to_string(),
            })
    }

    fn append_with_retry(
        &self,
        org_id: Uuid,
        draft: RecordDraft,
    ) -> Result<InteractionRecord, GatewayError> {
        let mut attempt = 0;
        loop {
            match self.chain.append(org_id, draft.clone()) {
                Ok(record) => return Ok(record),
                Err(err) if attempt < APPEND_RETRIES => {
                    attempt += 1;
                    warn!(%org_id, attempt, error = %err, "audit append failed, retrying");
                }
                Err(err) => return Err(GatewayError::AuditWriteFailed { source: err }),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;

    use warden_audit::AuditSigner;
    use warden_policy::{PolicyRule, RuleDecision, RuleSet, ZeroUsage};
    use warden_token::{TokenClaims, TokenSigningKey};

    use crate::directory::{AgentProfile, StaticDirectory};
    use crate::executor::{EchoExecutor, ExecutionStatus};

    const KEY: &[u8] = b"gateway-test-key-material";

    struct FailingExecutor;

    impl ActionExecutor for FailingExecutor {
        fn execute(&self, _action: &str, _params: &Map<String, Value>) -> Result<Value, String> {
            Err("downstream unavailable".to_string())
        }
    }

    struct SlowExecutor;

    impl ActionExecutor for SlowExecutor {
        fn execute(&self, _action: &str, _params: &Map<String, Value>) -> Result<Value, String> {
            thread::sleep(std::time::Duration::from_secs(5));
            Ok(json!({}))
        }
    }

    fn build_gateway(
        org: Uuid,
        rules: Vec<PolicyRule>,
        executor: Arc<dyn ActionExecutor + Send + Sync>,
        config: GatewayConfig,
    ) -> (Gateway, Arc<StaticDirectory>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let (signer, _pkcs8) = AuditSigner::generate("audit-key-1").unwrap();
        let chain = AuditChain::open(dir.path(), signer).unwrap();

        let rule_set = Arc::new(RuleSet::new());
        for rule in rules {
            rule_set.register(rule).unwrap();
        }
        let engine = PolicyEngine::new(rule_set, Arc::new(ZeroUsage));

        let directory = Arc::new(StaticDirectory::new());
        directory.register(
            "agent-1",
            AgentProfile {
                org_id: org,
                status: AgentStatus::Active,
            },
        );

        let gateway = Gateway::new(
            TokenCodec::new(TokenSigningKey::from_bytes(KEY)),
            engine,
            chain,
            directory.clone() as Arc<dyn AgentDirectory + Send + Sync>,
            executor,
            config,
        );
        (gateway, directory, dir)
    }

    fn token_for(org: Uuid, scopes: &[&str]) -> String {
        let codec = TokenCodec::new(TokenSigningKey::from_bytes(KEY));
        let scopes: Vec<String> = scopes.iter().map(|s| s.to_string()).collect();
        codec
            .issue("agent-1", org, &scopes, Duration::hours(1))
            .unwrap()
            .encode()
    }

    fn email_request() -> ActionRequest {
        ActionRequest::new("email:send").with_param("to", json!("ops@example.com"))
    }

    #[test]
    fn allowed_action_executes_and_is_recorded() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "email:*", RuleDecision::Allow)],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let outcome = gateway
            .submit_action(&token_for(org, &["email:*"]), &email_request())
            .unwrap();
        let SubmitOutcome::Executed { record_id, result } = outcome else {
            panic!("expected Executed, got {outcome:?}");
        };
        assert_eq!(result.status, ExecutionStatus::Success);

        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_id, record_id);
        assert_eq!(records[0].decision, "allow");
        assert_eq!(records[0].result_status.as_deref(), Some("success"));
        assert!(records[0].matched_rule_id.is_some());
        assert!(gateway.verify_chain(org, None, None).unwrap().is_valid());
    }

    #[test]
    fn denied_action_is_recorded_with_reason() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "email:*", RuleDecision::Deny)],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let outcome = gateway
            .submit_action(&token_for(org, &["email:*"]), &email_request())
            .unwrap();
        let SubmitOutcome::Denied { record_id, .. } = outcome else {
            panic!("expected Denied, got {outcome:?}");
        };
        assert!(record_id.is_some());

        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision, "deny");
        assert!(records[0].result_status.is_none());
    }

    #[test]
    fn unmatched_action_denied_by_default() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            Vec::new(),
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let outcome = gateway
            .submit_action(&token_for(org, &["email:*"]), &email_request())
            .unwrap();
        assert!(matches!(outcome, SubmitOutcome::Denied { record_id: Some(_), .. }));
        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records[0].decision, "deny");
    }

    #[test]
    fn forged_token_leaves_no_audit_trail() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "email:*", RuleDecision::Allow)],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let foreign = TokenCodec::new(TokenSigningKey::from_bytes(b"not-the-gateway-key"));
        let wire = foreign
            .issue("agent-1", org, &["email:*".to_string()], Duration::hours(1))
            .unwrap()
            .encode();

        let outcome = gateway.submit_action(&wire, &email_request()).unwrap();
        assert!(matches!(outcome, SubmitOutcome::Denied { record_id: None, .. }));
        assert!(gateway.read_records(org, &RecordFilter::default()).unwrap().is_empty());
    }

    #[test]
    fn expired_token_denied_and_attributed() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "email:*", RuleDecision::Allow)],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let codec = TokenCodec::new(TokenSigningKey::from_bytes(KEY));
        let now = chrono::Utc::now();
        let token = codec.sign(TokenClaims {
            token_id: TokenClaims::fresh_token_id(),
            kind: "capability_token".to_string(),
            agent_id: "agent-1".to_string(),
            org_id: org,
            scopes: vec!["email:*".to_string()],
            not_before: now - Duration::hours(2),
            expires_at: now - Duration::hours(1),
            issued_at: now - Duration::hours(2),
        });

        let outcome = gateway
            .submit_action(&token.encode(), &email_request())
            .unwrap();
        let SubmitOutcome::Denied { record_id, reason } = outcome else {
            panic!("expected Denied, got {outcome:?}");
        };
        assert!(record_id.is_some());
        assert!(reason.contains("expired"), "reason was {reason:?}");

        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision, "deny");
        assert_eq!(records[0].agent_id, "agent-1");
    }

    #[test]
    fn suspended_agent_denied_before_policy() {
        let org = Uuid::new_v4();
        let (gateway, directory, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "email:*", RuleDecision::Allow)],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );
        directory.set_status("agent-1", AgentStatus::Suspended);

        let outcome = gateway
            .submit_action(&token_for(org, &["email:*"]), &email_request())
            .unwrap();
        let SubmitOutcome::Denied { record_id, reason } = outcome else {
            panic!("expected Denied, got {outcome:?}");
        };
        assert!(record_id.is_some());
        assert!(reason.contains("suspended"), "reason was {reason:?}");
        assert_eq!(
            gateway.read_records(org, &RecordFilter::default()).unwrap()[0].decision,
            "deny"
        );
    }

    #[test]
    fn unregistered_agent_denied() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "email:*", RuleDecision::Allow)],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let codec = TokenCodec::new(TokenSigningKey::from_bytes(KEY));
        let wire = codec
            .issue("agent-9", org, &["email:*".to_string()], Duration::hours(1))
            .unwrap()
            .encode();
        let outcome = gateway.submit_action(&wire, &email_request()).unwrap();
        let SubmitOutcome::Denied { reason, .. } = outcome else {
            panic!("expected Denied, got {outcome:?}");
        };
        assert!(reason.contains("not registered"), "reason was {reason:?}");
    }

    #[test]
    fn escalated_action_executes_after_approval() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "payment:*", RuleDecision::Escalate)
                .with_escalation_role("finance-approver")],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let request = ActionRequest::new("payment:wire").with_param("amount", json!(250.0));
        let outcome = gateway
            .submit_action(&token_for(org, &["payment:*"]), &request)
            .unwrap();
        let SubmitOutcome::Escalated {
            record_id,
            task_id,
            role,
        } = outcome
        else {
            panic!("expected Escalated, got {outcome:?}");
        };
        assert_eq!(role, "finance-approver");

        let pending = gateway.list_pending(org);
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].task_id, task_id);
        assert_eq!(pending[0].record_id, record_id);

        let approval = gateway
            .decide_approval(&task_id, "operator-9", OperatorDecision::Approve, Some("ok"))
            .unwrap();
        let ApprovalOutcome::Executed { task, result, .. } = approval else {
            panic!("expected Executed approval outcome");
        };
        assert_eq!(task.state, ApprovalState::Approved);
        assert_eq!(result.status, ExecutionStatus::Success);

        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].decision, "escalate");
        assert_eq!(records[1].decision, "approved");
        assert_eq!(records[1].result_status.as_deref(), Some("success"));
        assert_eq!(records[1].param_hash, records[0].param_hash);
        assert!(gateway.verify_chain(org, None, None).unwrap().is_valid());
        assert!(gateway.list_pending(org).is_empty());
    }

    #[test]
    fn escalated_action_denied_by_operator() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "payment:*", RuleDecision::Escalate)
                .with_escalation_role("finance-approver")],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let request = ActionRequest::new("payment:wire");
        let outcome = gateway
            .submit_action(&token_for(org, &["payment:*"]), &request)
            .unwrap();
        let SubmitOutcome::Escalated { task_id, .. } = outcome else {
            panic!("expected Escalated");
        };

        let approval = gateway
            .decide_approval(&task_id, "operator-9", OperatorDecision::Deny, Some("too risky"))
            .unwrap();
        assert!(matches!(approval, ApprovalOutcome::Denied { .. }));

        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records[1].decision, "denied");
        assert!(records[1].result_status.is_none());

        // The held action is gone; a second decision conflicts at the store.
        assert!(matches!(
            gateway.decide_approval(&task_id, "operator-9", OperatorDecision::Approve, None),
            Err(GatewayError::Approval(ApprovalError::AlreadyDecided { .. }))
        ));
    }

    #[test]
    fn late_decision_records_expired_not_denied() {
        let org = Uuid::new_v4();
        let config = GatewayConfig {
            approval_ttl: Duration::milliseconds(5),
            ..GatewayConfig::default()
        };
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "payment:*", RuleDecision::Escalate)
                .with_escalation_role("finance-approver")],
            Arc::new(EchoExecutor),
            config,
        );

        let outcome = gateway
            .submit_action(&token_for(org, &["payment:*"]), &ActionRequest::new("payment:wire"))
            .unwrap();
        let SubmitOutcome::Escalated { task_id, .. } = outcome else {
            panic!("expected Escalated");
        };
        thread::sleep(std::time::Duration::from_millis(20));

        assert!(matches!(
            gateway.decide_approval(&task_id, "operator-9", OperatorDecision::Approve, None),
            Err(GatewayError::Approval(ApprovalError::Expired { .. }))
        ));

        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].decision, "expired");
        assert!(gateway.verify_chain(org, None, None).unwrap().is_valid());
    }

    #[test]
    fn resolve_expired_sweeps_and_appends_followups() {
        let org = Uuid::new_v4();
        let config = GatewayConfig {
            approval_ttl: Duration::milliseconds(5),
            ..GatewayConfig::default()
        };
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "payment:*", RuleDecision::Escalate)
                .with_escalation_role("finance-approver")],
            Arc::new(EchoExecutor),
            config,
        );

        let token = token_for(org, &["payment:*"]);
        gateway
            .submit_action(&token, &ActionRequest::new("payment:wire"))
            .unwrap();
        gateway
            .submit_action(&token, &ActionRequest::new("payment:refund"))
            .unwrap();
        thread::sleep(std::time::Duration::from_millis(20));

        let resolved = gateway.resolve_expired(org).unwrap();
        assert_eq!(resolved.len(), 2);
        assert!(resolved.iter().all(|r| r.decision == "expired"));

        // Idempotent: everything already resolved.
        assert!(gateway.resolve_expired(org).unwrap().is_empty());
        assert!(gateway.verify_chain(org, None, None).unwrap().is_valid());
    }

    #[test]
    fn expired_escalations_drop_silently_when_configured() {
        let org = Uuid::new_v4();
        let config = GatewayConfig {
            approval_ttl: Duration::milliseconds(5),
            expiry_policy: ExpiryPolicy::DropSilently,
            ..GatewayConfig::default()
        };
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "payment:*", RuleDecision::Escalate)
                .with_escalation_role("finance-approver")],
            Arc::new(EchoExecutor),
            config,
        );

        gateway
            .submit_action(&token_for(org, &["payment:*"]), &ActionRequest::new("payment:wire"))
            .unwrap();
        thread::sleep(std::time::Duration::from_millis(20));

        assert!(gateway.resolve_expired(org).unwrap().is_empty());
        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].decision, "escalate");
    }

    #[test]
    fn escalation_survives_a_restart_via_restore() {
        let org = Uuid::new_v4();
        let tmp = tempfile::tempdir().unwrap();
        let (signer, pkcs8) = AuditSigner::generate("audit-key-1").unwrap();

        let build = |signer: AuditSigner| {
            let chain = AuditChain::open(tmp.path(), signer).unwrap();
            let rules = Arc::new(RuleSet::new());
            rules
                .register(
                    PolicyRule::new(org, 10, "payment:*", RuleDecision::Escalate)
                        .with_escalation_role("finance-approver"),
                )
                .unwrap();
            let directory = Arc::new(StaticDirectory::new());
            directory.register(
                "agent-1",
                AgentProfile {
                    org_id: org,
                    status: AgentStatus::Active,
                },
            );
            Gateway::new(
                TokenCodec::new(TokenSigningKey::from_bytes(KEY)),
                PolicyEngine::new(rules, Arc::new(ZeroUsage)),
                chain,
                directory as Arc<dyn AgentDirectory + Send + Sync>,
                Arc::new(EchoExecutor),
                GatewayConfig::default(),
            )
        };

        let first = build(signer);
        let request = ActionRequest::new("payment:wire").with_param("amount", json!(900.0));
        let outcome = first
            .submit_action(&token_for(org, &["payment:*"]), &request)
            .unwrap();
        let SubmitOutcome::Escalated { task_id, .. } = outcome else {
            panic!("expected Escalated");
        };
        let task = first.approval_task(&task_id).unwrap();
        drop(first);

        let second = build(AuditSigner::from_pkcs8(&pkcs8, "audit-key-1").unwrap());
        assert!(matches!(
            second.decide_approval(&task_id, "op-1", OperatorDecision::Approve, None),
            Err(GatewayError::Approval(ApprovalError::NotFound { .. }))
        ));

        second.restore_escalation(
            task,
            "agent-1",
            "payment:wire",
            request.params.clone(),
            None,
        );
        let approval = second
            .decide_approval(&task_id, "op-1", OperatorDecision::Approve, None)
            .unwrap();
        assert!(matches!(approval, ApprovalOutcome::Executed { .. }));

        let records = second.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].decision, "escalate");
        assert_eq!(records[1].decision, "approved");
        assert_eq!(records[1].param_hash, records[0].param_hash);
        assert!(second.verify_chain(org, None, None).unwrap().is_valid());
    }

    #[test]
    fn failed_execution_still_recorded() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "email:*", RuleDecision::Allow)],
            Arc::new(FailingExecutor),
            GatewayConfig::default(),
        );

        let outcome = gateway
            .submit_action(&token_for(org, &["email:*"]), &email_request())
            .unwrap();
        let SubmitOutcome::Executed { result, .. } = outcome else {
            panic!("expected Executed, got {outcome:?}");
        };
        assert_eq!(result.status, ExecutionStatus::Failure);

        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records[0].result_status.as_deref(), Some("failure"));
    }

    #[test]
    fn overrunning_execution_recorded_as_timeout() {
        let org = Uuid::new_v4();
        let config = GatewayConfig {
            execution_timeout: std::time::Duration::from_millis(50),
            ..GatewayConfig::default()
        };
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "report:*", RuleDecision::Allow)],
            Arc::new(SlowExecutor),
            config,
        );

        let outcome = gateway
            .submit_action(
                &token_for(org, &["report:*"]),
                &ActionRequest::new("report:generate"),
            )
            .unwrap();
        let SubmitOutcome::Executed { result, .. } = outcome else {
            panic!("expected Executed, got {outcome:?}");
        };
        assert_eq!(result.status, ExecutionStatus::Timeout);
        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records[0].result_status.as_deref(), Some("timeout"));
    }

    #[test]
    fn out_of_scope_token_denied_with_record() {
        let org = Uuid::new_v4();
        let (gateway, _, _tmp) = build_gateway(
            org,
            vec![PolicyRule::new(org, 10, "payment:*", RuleDecision::Allow)],
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );

        let outcome = gateway
            .submit_action(
                &token_for(org, &["email:*"]),
                &ActionRequest::new("payment:wire"),
            )
            .unwrap();
        let SubmitOutcome::Denied { record_id, reason } = outcome else {
            panic!("expected Denied, got {outcome:?}");
        };
        assert!(record_id.is_some());
        assert!(reason.contains("payment:wire"), "reason was {reason:?}");
        let records = gateway.read_records(org, &RecordFilter::default()).unwrap();
        assert_eq!(records[0].decision, "deny");
    }
}
