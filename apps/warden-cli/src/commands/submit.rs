// submit.rs — Submit an action through the in-process gateway.

use anyhow::{anyhow, Context, Result};
use serde_json::{Map, Value};

use warden_audit::RecordFilter;
use warden_gateway::{ActionRequest, SubmitOutcome};

use crate::home::{CliHome, HeldEscalation};

/// Parse a `key=value` parameter. The value is taken as JSON when it parses
/// as JSON, and as a plain string otherwise, so `--param amount=250.0` and
/// `--param to=ops@example.com` both do the obvious thing.
pub fn parse_param(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected key=value, got '{raw}'"))?;
    let parsed = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), parsed))
}

pub fn execute(
    home: &CliHome,
    token: &str,
    action: &str,
    params: Map<String, Value>,
    context: Option<&str>,
) -> Result<()> {
    let gateway = home.gateway()?;
    let mut request = ActionRequest::new(action);
    request.params = params;
    if let Some(context) = context {
        request = request.with_context(context);
    }

    let outcome = gateway.submit_action(token, &request)?;
    println!("{}", serde_json::to_string_pretty(&outcome)?);

    // Escalations outlive this process; persist enough to decide later.
    if let SubmitOutcome::Escalated {
        record_id, task_id, ..
    } = &outcome
    {
        let task = gateway.approval_task(task_id)?;
        let identity = home
            .token_codec()?
            .authenticated_identity(token)
            .context("token validated but its identity could not be re-read")?;
        let matched_rule_id = gateway
            .read_records(identity.org_id, &RecordFilter::default())?
            .into_iter()
            .find(|record| &record.record_id == record_id)
            .and_then(|record| record.matched_rule_id);
        home.remember_escalation(HeldEscalation {
            task,
            agent_id: identity.agent_id,
            action: action.to_string(),
            params: request.params.clone(),
            matched_rule_id,
        })?;
    }
    Ok(())
}
