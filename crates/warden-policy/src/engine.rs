// engine.rs — Policy evaluation.
//
// The engine is the "default deny" chokepoint: every mediated action flows
// through `evaluate()`, which walks the organization's rules sorted by
// (priority ascending, registration order) and lets the first full match
// decide. No match means DENY. An ESCALATE rule without a target role is a
// configuration defect and also resolves to DENY, with a reason code that
// operators can tell apart from a rule that genuinely said no.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use glob::Pattern;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::constraint::ConstraintContext;
use crate::rule::{PolicyRule, RuleDecision, RuleSource};
use crate::usage::UsageSource;

/// An action request as the policy engine sees it.
#[derive(Debug, Clone)]
pub struct PolicyRequest {
    pub agent_id: String,
    /// Action name, e.g. "email:send".
    pub action: String,
    pub params: Map<String, Value>,
}

impl PolicyRequest {
    pub fn new(agent_id: &str, action: &str) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            action: action.to_string(),
            params: Map::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: Value) -> Self {
        self.params.insert(key.to_string(), value);
        self
    }
}

/// Why a DENY happened. Operators need to tell a rule that said no apart
/// from a broken rule and from the default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DenyCode {
    /// A matching rule's decision was Deny.
    RuleDenied,
    /// No rule matched; the fail-closed default applied.
    NoRuleMatched,
    /// A matching ESCALATE rule had no target role.
    MisconfiguredRule,
}

/// The result of a policy evaluation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum PolicyDecision {
    Allow {
        rule_id: Uuid,
        reason: String,
    },
    Deny {
        rule_id: Option<Uuid>,
        code: DenyCode,
        reason: String,
    },
    Escalate {
        rule_id: Uuid,
        role: String,
        reason: String,
    },
}

impl PolicyDecision {
    pub fn is_allow(&self) -> bool {
        matches!(self, PolicyDecision::Allow { .. })
    }

    /// The decision kind as recorded in the audit chain.
    pub fn kind(&self) -> &'static str {
        match self {
            PolicyDecision::Allow { .. } => "allow",
            PolicyDecision::Deny { .. } => "deny",
            PolicyDecision::Escalate { .. } => "escalate",
        }
    }

    pub fn matched_rule_id(&self) -> Option<Uuid> {
        match self {
            PolicyDecision::Allow { rule_id, .. } => Some(*rule_id),
            PolicyDecision::Deny { rule_id, .. } => *rule_id,
            PolicyDecision::Escalate { rule_id, .. } => Some(*rule_id),
        }
    }

    pub fn reason(&self) -> &str {
        match self {
            PolicyDecision::Allow { reason, .. } => reason,
            PolicyDecision::Deny { reason, .. } => reason,
            PolicyDecision::Escalate { reason, .. } => reason,
        }
    }
}

/// The policy engine. Rules and usage totals live behind trait objects so
/// the same engine runs against the in-memory store or an external one.
pub struct PolicyEngine {
    rules: Arc<dyn RuleSource + Send + Sync>,
    usage: Arc<dyn UsageSource + Send + Sync>,
}

impl PolicyEngine {
    pub fn new(
        rules: Arc<dyn RuleSource + Send + Sync>,
        usage: Arc<dyn UsageSource + Send + Sync>,
    ) -> Self {
        Self { rules, usage }
    }

    /// Evaluate a request against the organization's rules.
    pub fn evaluate(&self, org_id: Uuid, request: &PolicyRequest) -> PolicyDecision {
        self.evaluate_at(org_id, request, Utc::now())
    }

    /// Like [`evaluate`](Self::evaluate) with an explicit "now" for
    /// time-window constraints.
    pub fn evaluate_at(
        &self,
        org_id: Uuid,
        request: &PolicyRequest,
        now: DateTime<Utc>,
    ) -> PolicyDecision {
        let mut rules: Vec<PolicyRule> = self
            .rules
            .rules_for(org_id)
            .into_iter()
            .filter(|r| r.enabled)
            .collect();
        // Stable sort: equal priorities keep registration order.
        rules.sort_by_key(|r| r.priority);

        let ctx = ConstraintContext {
            org_id,
            agent_id: &request.agent_id,
            params: &request.params,
            usage: self.usage.as_ref(),
            now,
        };

        for rule in &rules {
            if !pattern_matches(&rule.action_pattern, &request.action) {
                continue;
            }
            if !rule.constraints.iter().all(|c| c.is_satisfied(&ctx)) {
                continue;
            }

            let decision = self.decide(rule, request);
            debug!(
                %org_id,
                agent_id = %request.agent_id,
                action = %request.action,
                rule_id = %rule.rule_id,
                decision = decision.kind(),
                "policy rule matched"
            );
            return decision;
        }

        debug!(
            %org_id,
            agent_id = %request.agent_id,
            action = %request.action,
            "no policy rule matched, default deny"
        );
        PolicyDecision::Deny {
            rule_id: None,
            code: DenyCode::NoRuleMatched,
            reason: format!("no rule matched action '{}'", request.action),
        }
    }

    fn decide(&self, rule: &PolicyRule, request: &PolicyRequest) -> PolicyDecision {
        match rule.decision {
            RuleDecision::Allow => PolicyDecision::Allow {
                rule_id: rule.rule_id,
                reason: format!(
                    "rule '{}' allows action '{}'",
                    rule.action_pattern, request.action
                ),
            },
            RuleDecision::Deny => PolicyDecision::Deny {
                rule_id: Some(rule.rule_id),
                code: DenyCode::RuleDenied,
                reason: format!(
                    "rule '{}' denies action '{}'",
                    rule.action_pattern, request.action
                ),
            },
            RuleDecision::Escalate => match rule
                .escalation_role
                .as_deref()
                .filter(|role| !role.is_empty())
            {
                Some(role) => PolicyDecision::Escalate {
                    rule_id: rule.rule_id,
                    role: role.to_string(),
                    reason: format!(
                        "rule '{}' escalates action '{}' to role '{}'",
                        rule.action_pattern, request.action, role
                    ),
                },
                None => {
                    warn!(
                        rule_id = %rule.rule_id,
                        pattern = %rule.action_pattern,
                        "escalation rule has no target role, denying"
                    );
                    PolicyDecision::Deny {
                        rule_id: Some(rule.rule_id),
                        code: DenyCode::MisconfiguredRule,
                        reason: format!(
                            "rule '{}' escalates but names no target role",
                            rule.action_pattern
                        ),
                    }
                }
            },
        }
    }
}

/// Glob-match an action pattern against an action name.
///
/// Invalid patterns never match (fail-closed, not fail-open).
fn pattern_matches(pattern: &str, action: &str) -> bool {
    match Pattern::new(pattern) {
        Ok(p) => p.matches(action),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::Constraint;
    use crate::rule::RuleSet;
    use crate::usage::{UsageWindow, ZeroUsage};
    use serde_json::json;

    struct FixedUsage {
        total: f64,
    }

    impl UsageSource for FixedUsage {
        fn usage(&self, _org: Uuid, _agent: &str, _window: UsageWindow) -> f64 {
            self.total
        }
        fn action_count(&self, _org: Uuid, _agent: &str, _window: UsageWindow) -> u64 {
            0
        }
    }

    fn engine_with(rules: RuleSet) -> PolicyEngine {
        PolicyEngine::new(Arc::new(rules), Arc::new(ZeroUsage))
    }

    #[test]
    fn empty_rule_set_denies_by_default() {
        let org = Uuid::new_v4();
        let engine = engine_with(RuleSet::new());

        let decision = engine.evaluate(org, &PolicyRequest::new("agent-1", "email:send"));
        assert_eq!(
            decision,
            PolicyDecision::Deny {
                rule_id: None,
                code: DenyCode::NoRuleMatched,
                reason: "no rule matched action 'email:send'".to_string(),
            }
        );
    }

    #[test]
    fn non_matching_rules_fall_through_to_deny() {
        let org = Uuid::new_v4();
        let rules = RuleSet::new();
        rules
            .register(PolicyRule::new(org, 1, "email:*", RuleDecision::Allow))
            .unwrap();
        let engine = engine_with(rules);

        let decision = engine.evaluate(org, &PolicyRequest::new("agent-1", "payment:wire"));
        assert!(matches!(
            decision,
            PolicyDecision::Deny {
                code: DenyCode::NoRuleMatched,
                ..
            }
        ));
    }

    #[test]
    fn lower_priority_evaluates_first() {
        let org = Uuid::new_v4();
        let rules = RuleSet::new();
        // Registered deny-first, but the allow has the lower priority number.
        rules
            .register(PolicyRule::new(org, 10, "email:*", RuleDecision::Deny))
            .unwrap();
        rules
            .register(PolicyRule::new(org, 1, "email:*", RuleDecision::Allow))
            .unwrap();
        let engine = engine_with(rules);

        let decision = engine.evaluate(org, &PolicyRequest::new("agent-1", "email:send"));
        assert!(decision.is_allow());
    }

    #[test]
    fn equal_priority_first_registered_wins() {
        let org = Uuid::new_v4();
        let rules = RuleSet::new();
        let first = rules
            .register(PolicyRule::new(org, 5, "email:*", RuleDecision::Allow))
            .unwrap();
        rules
            .register(PolicyRule::new(org, 5, "email:*", RuleDecision::Deny))
            .unwrap();
        let engine = engine_with(rules);

        let decision = engine.evaluate(org, &PolicyRequest::new("agent-1", "email:send"));
        assert_eq!(decision.matched_rule_id(), Some(first));
        assert!(decision.is_allow());
    }

    #[test]
    fn budget_under_limit_allows_over_limit_falls_through() {
        let org = Uuid::new_v4();
        let rule = || {
            PolicyRule::new(org, 1, "email:send", RuleDecision::Allow).with_constraint(
                Constraint::Budget {
                    limit: 100.0,
                    window: UsageWindow::Day,
                },
            )
        };
        let request = PolicyRequest::new("agent-1", "email:send");

        let rules = RuleSet::new();
        rules.register(rule()).unwrap();
        let engine = PolicyEngine::new(Arc::new(rules), Arc::new(FixedUsage { total: 50.0 }));
        assert!(engine.evaluate(org, &request).is_allow());

        let rules = RuleSet::new();
        rules.register(rule()).unwrap();
        let engine = PolicyEngine::new(Arc::new(rules), Arc::new(FixedUsage { total: 150.0 }));
        assert!(matches!(
            engine.evaluate(org, &request),
            PolicyDecision::Deny {
                code: DenyCode::NoRuleMatched,
                ..
            }
        ));
    }

    #[test]
    fn escalate_carries_the_target_role() {
        let org = Uuid::new_v4();
        let rules = RuleSet::new();
        rules
            .register(
                PolicyRule::new(org, 1, "payment:*", RuleDecision::Escalate)
                    .with_escalation_role("finance-approver"),
            )
            .unwrap();
        let engine = engine_with(rules);

        match engine.evaluate(org, &PolicyRequest::new("agent-1", "payment:wire")) {
            PolicyDecision::Escalate { role, .. } => assert_eq!(role, "finance-approver"),
            other => panic!("expected Escalate, got {other:?}"),
        }
    }

    #[test]
    fn escalate_without_role_denies_as_misconfigured() {
        let org = Uuid::new_v4();
        let rules = RuleSet::new();
        let rule_id = rules
            .register(PolicyRule::new(org, 1, "payment:*", RuleDecision::Escalate))
            .unwrap();
        let engine = engine_with(rules);

        match engine.evaluate(org, &PolicyRequest::new("agent-1", "payment:wire")) {
            PolicyDecision::Deny {
                rule_id: matched,
                code: DenyCode::MisconfiguredRule,
                ..
            } => assert_eq!(matched, Some(rule_id)),
            other => panic!("expected misconfigured deny, got {other:?}"),
        }
    }

    #[test]
    fn param_constraints_gate_the_match() {
        let org = Uuid::new_v4();
        let rules = RuleSet::new();
        rules
            .register(
                PolicyRule::new(org, 1, "payment:wire", RuleDecision::Allow).with_constraint(
                    Constraint::ParamInRange {
                        param: "amount".to_string(),
                        min: None,
                        max: Some(1000.0),
                    },
                ),
            )
            .unwrap();
        let engine = engine_with(rules);

        let small = PolicyRequest::new("agent-1", "payment:wire").with_param("amount", json!(250));
        assert!(engine.evaluate(org, &small).is_allow());

        let large = PolicyRequest::new("agent-1", "payment:wire").with_param("amount", json!(5000));
        assert!(!engine.evaluate(org, &large).is_allow());
    }

    #[test]
    fn disabled_rules_are_skipped() {
        let org = Uuid::new_v4();
        let rules = RuleSet::new();
        let mut rule = PolicyRule::new(org, 1, "email:*", RuleDecision::Allow);
        rule.enabled = false;
        rules.register(rule).unwrap();
        let engine = engine_with(rules);

        assert!(!engine
            .evaluate(org, &PolicyRequest::new("agent-1", "email:send"))
            .is_allow());
    }

    #[test]
    fn rules_from_other_orgs_never_apply() {
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let rules = RuleSet::new();
        rules
            .register(PolicyRule::new(org_a, 1, "*", RuleDecision::Allow))
            .unwrap();
        let engine = engine_with(rules);

        assert!(!engine
            .evaluate(org_b, &PolicyRequest::new("agent-1", "email:send"))
            .is_allow());
    }

    #[test]
    fn decision_serialization() {
        let allow = PolicyDecision::Allow {
            rule_id: Uuid::new_v4(),
            reason: "r".to_string(),
        };
        let json = serde_json::to_string(&allow).unwrap();
        assert!(json.contains("\"decision\":\"allow\""));

        let deny = PolicyDecision::Deny {
            rule_id: None,
            code: DenyCode::NoRuleMatched,
            reason: "r".to_string(),
        };
        let json = serde_json::to_string(&deny).unwrap();
        assert!(json.contains("\"no_rule_matched\""));
    }
}
