// rule.rs — Policy rules and rule storage.
//
// Rules are data: an action pattern, a list of constraints, and the decision
// to hand down when everything matches. Within an organization, rules are
// evaluated in (priority ascending, registration order); the RuleSet keeps
// registration order so equal-priority ties are stable.

use std::sync::RwLock;

use glob::Pattern;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constraint::Constraint;
use crate::error::PolicyError;

/// The outcome a rule hands down when it matches.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleDecision {
    Allow,
    Deny,
    Escalate,
}

/// One policy rule within an organization's rule set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicyRule {
    pub rule_id: Uuid,
    pub org_id: Uuid,
    /// Lower priorities evaluate first. Ties break by registration order.
    pub priority: i32,
    /// Glob pattern over action names, e.g. "email:*" or "payment:wire".
    pub action_pattern: String,
    /// ANDed predicates; the rule matches only if all are satisfied.
    pub constraints: Vec<Constraint>,
    pub decision: RuleDecision,
    /// Role the request is routed to when `decision` is Escalate.
    pub escalation_role: Option<String>,
    pub enabled: bool,
}

impl PolicyRule {
    pub fn new(org_id: Uuid, priority: i32, action_pattern: &str, decision: RuleDecision) -> Self {
        Self {
            rule_id: Uuid::new_v4(),
            org_id,
            priority,
            action_pattern: action_pattern.to_string(),
            constraints: Vec::new(),
            decision,
            escalation_role: None,
            enabled: true,
        }
    }

    pub fn with_constraint(mut self, constraint: Constraint) -> Self {
        self.constraints.push(constraint);
        self
    }

    pub fn with_escalation_role(mut self, role: &str) -> Self {
        self.escalation_role = Some(role.to_string());
        self
    }
}

/// Supplies an organization's rules, already in registration order.
pub trait RuleSource {
    fn rules_for(&self, org_id: Uuid) -> Vec<PolicyRule>;
}

/// In-memory rule store.
///
/// Registration order is the tie-break order for equal priorities, so the
/// store never reorders; `rules_for` returns rules as registered.
#[derive(Debug, Default)]
pub struct RuleSet {
    rules: RwLock<Vec<PolicyRule>>,
}

impl RuleSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule. Rejects action patterns that do not compile as globs;
    /// the engine would fail-closed on them anyway, but catching the typo
    /// at registration beats a rule that silently never matches.
    pub fn register(&self, rule: PolicyRule) -> Result<Uuid, PolicyError> {
        if let Err(e) = Pattern::new(&rule.action_pattern) {
            return Err(PolicyError::InvalidPattern {
                pattern: rule.action_pattern.clone(),
                reason: e.to_string(),
            });
        }
        let rule_id = rule.rule_id;
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        rules.push(rule);
        Ok(rule_id)
    }

    pub fn len(&self) -> usize {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RuleSource for RuleSet {
    fn rules_for(&self, org_id: Uuid) -> Vec<PolicyRule> {
        let rules = self.rules.read().unwrap_or_else(|e| e.into_inner());
        rules.iter().filter(|r| r.org_id == org_id).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_keeps_registration_order() {
        let org = Uuid::new_v4();
        let set = RuleSet::new();
        let first = set
            .register(PolicyRule::new(org, 5, "email:*", RuleDecision::Allow))
            .unwrap();
        let second = set
            .register(PolicyRule::new(org, 5, "email:*", RuleDecision::Deny))
            .unwrap();

        let rules = set.rules_for(org);
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].rule_id, first);
        assert_eq!(rules[1].rule_id, second);
    }

    #[test]
    fn rules_are_scoped_to_their_org() {
        let org_a = Uuid::new_v4();
        let org_b = Uuid::new_v4();
        let set = RuleSet::new();
        set.register(PolicyRule::new(org_a, 1, "email:*", RuleDecision::Allow))
            .unwrap();

        assert_eq!(set.rules_for(org_a).len(), 1);
        assert!(set.rules_for(org_b).is_empty());
    }

    #[test]
    fn invalid_pattern_rejected_at_registration() {
        let set = RuleSet::new();
        let result = set.register(PolicyRule::new(
            Uuid::new_v4(),
            1,
            "email:[unclosed",
            RuleDecision::Allow,
        ));
        assert!(matches!(result, Err(PolicyError::InvalidPattern { .. })));
        assert!(set.is_empty());
    }

    #[test]
    fn rule_round_trips_through_json() {
        let rule = PolicyRule::new(Uuid::new_v4(), 1, "payment:*", RuleDecision::Escalate)
            .with_escalation_role("finance-approver");
        let json = serde_json::to_string(&rule).unwrap();
        let back: PolicyRule = serde_json::from_str(&json).unwrap();
        assert_eq!(back, rule);
    }
}
