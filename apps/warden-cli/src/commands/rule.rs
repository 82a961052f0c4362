// rule.rs — Policy rule subcommands: add, list.

use anyhow::Result;
use clap::Subcommand;
use uuid::Uuid;

use warden_policy::{Constraint, PolicyRule, RuleDecision, RuleSet};

use crate::home::CliHome;

#[derive(Subcommand)]
pub enum RuleCommands {
    /// Add a policy rule to an organization's rule set.
    Add {
        /// Organization the rule applies to.
        #[arg(long)]
        org: Uuid,
        /// Lower priorities evaluate first.
        #[arg(long)]
        priority: i32,
        /// Glob pattern over action names, e.g. "email:*".
        #[arg(long)]
        pattern: String,
        /// One of: allow, deny, escalate.
        #[arg(long)]
        decision: String,
        /// Approver role. Required when --decision is escalate.
        #[arg(long)]
        role: Option<String>,
        /// Constraint as JSON, repeatable. Example:
        /// --constraint '{"type":"param_equals","param":"to","value":"ops@example.com"}'
        #[arg(long = "constraint")]
        constraints: Vec<String>,
    },
    /// List an organization's rules.
    List {
        #[arg(long)]
        org: Uuid,
    },
}

pub fn execute(cmd: &RuleCommands, home: &CliHome) -> Result<()> {
    match cmd {
        RuleCommands::Add {
            org,
            priority,
            pattern,
            decision,
            role,
            constraints,
        } => {
            let decision = match decision.as_str() {
                "allow" => RuleDecision::Allow,
                "deny" => RuleDecision::Deny,
                "escalate" => RuleDecision::Escalate,
                other => anyhow::bail!("unknown decision '{other}', expected allow, deny or escalate"),
            };
            if decision == RuleDecision::Escalate && role.is_none() {
                anyhow::bail!("--role is required when --decision is escalate");
            }

            let mut rule = PolicyRule::new(*org, *priority, pattern, decision);
            if let Some(role) = role {
                rule = rule.with_escalation_role(role);
            }
            for raw in constraints {
                let constraint: Constraint = serde_json::from_str(raw)?;
                rule = rule.with_constraint(constraint);
            }

            // Registering into a throwaway set catches bad glob patterns
            // before the rule lands on disk.
            RuleSet::new().register(rule.clone())?;

            let mut rules = home.rules()?;
            rules.push(rule.clone());
            home.save_rules(&rules)?;
            println!("added rule {}", rule.rule_id);
        }
        RuleCommands::List { org } => {
            let rules: Vec<_> = home
                .rules()?
                .into_iter()
                .filter(|rule| rule.org_id == *org)
                .collect();
            if rules.is_empty() {
                println!("No rules for organization {org}.");
                return Ok(());
            }

            println!(
                "{:<38} {:>8} {:<22} {:<10} {:<18} {:>11} ENABLED",
                "RULE", "PRIORITY", "PATTERN", "DECISION", "ROLE", "CONSTRAINTS"
            );
            println!("{}", "-".repeat(120));
            for rule in rules {
                let decision = match rule.decision {
                    RuleDecision::Allow => "allow",
                    RuleDecision::Deny => "deny",
                    RuleDecision::Escalate => "escalate",
                };
                println!(
                    "{:<38} {:>8} {:<22} {:<10} {:<18} {:>11} {}",
                    rule.rule_id,
                    rule.priority,
                    rule.action_pattern,
                    decision,
                    rule.escalation_role.as_deref().unwrap_or("-"),
                    rule.constraints.len(),
                    rule.enabled,
                );
            }
        }
    }
    Ok(())
}
