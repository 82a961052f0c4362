// approvals.rs — Approval subcommands: pending, decide.

use anyhow::Result;
use uuid::Uuid;

use warden_approval::OperatorDecision;
use warden_gateway::GatewayError;

use crate::home::CliHome;

pub fn pending(home: &CliHome, org_id: Uuid, resolve_expired: bool) -> Result<()> {
    let gateway = home.gateway()?;

    if resolve_expired {
        let resolved = gateway.resolve_expired(org_id)?;
        if !resolved.is_empty() {
            println!("{} expired task(s) resolved and recorded.", resolved.len());
        }
        // Drop held escalations whose task is no longer pending.
        for held in home.escalations()? {
            let settled = match gateway.approval_task(&held.task.task_id) {
                Ok(task) => task.state != warden_approval::ApprovalState::Pending,
                Err(_) => true,
            };
            if settled {
                home.forget_escalation(&held.task.task_id)?;
            }
        }
    }

    let tasks = gateway.list_pending(org_id);
    if tasks.is_empty() {
        println!("No pending approvals.");
        return Ok(());
    }

    println!("{:<38} {:<20} {:<20} ROLE", "TASK", "CREATED", "EXPIRES");
    println!("{}", "-".repeat(96));
    for task in tasks {
        println!(
            "{:<38} {:<20} {:<20} {}",
            task.task_id,
            task.created_at.format("%Y-%m-%d %H:%M:%S"),
            task.expires_at.format("%Y-%m-%d %H:%M:%S"),
            task.role,
        );
    }
    Ok(())
}

pub fn decide(
    home: &CliHome,
    task_id: &str,
    operator_id: &str,
    approve: bool,
    reason: Option<&str>,
) -> Result<()> {
    let gateway = home.gateway()?;
    let decision = if approve {
        OperatorDecision::Approve
    } else {
        OperatorDecision::Deny
    };

    match gateway.decide_approval(task_id, operator_id, decision, reason) {
        Ok(outcome) => {
            home.forget_escalation(task_id)?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
            Ok(())
        }
        Err(err @ GatewayError::Approval(warden_approval::ApprovalError::Expired { .. })) => {
            // The gateway already appended the expired follow-up record.
            home.forget_escalation(task_id)?;
            Err(err.into())
        }
        Err(err) => Err(err.into()),
    }
}
