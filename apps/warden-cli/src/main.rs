//! # warden-cli
//!
//! Command-line interface for the Warden action gateway.
//!
//! Mediates agent actions through policy, approval, and audit:
//! - `warden issue-token` — mint a capability token for an agent
//! - `warden submit` — submit an action through the gateway
//! - `warden pending/decide` — review and settle escalated actions
//! - `warden log/verify` — inspect the tamper-evident audit chain
//! - `warden agent/rule` — manage the agent registry and policy rules

mod commands;
mod home;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde_json::Map;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::home::CliHome;

/// Warden CLI — mediate and audit autonomous agent actions.
#[derive(Parser)]
#[command(name = "warden", version, about)]
struct Cli {
    /// State directory (token secret, audit chains, rules, registry).
    #[arg(long, default_value = ".warden")]
    home: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Issue a capability token for an agent.
    IssueToken {
        /// Agent the token identifies.
        #[arg(long)]
        agent: String,
        /// Organization the token is scoped to.
        #[arg(long)]
        org: Uuid,
        /// Action scope, repeatable. Globs allowed, e.g. "email:*".
        #[arg(long = "scope", required = true)]
        scopes: Vec<String>,
        /// Token lifetime in hours.
        #[arg(long, default_value = "24")]
        ttl_hours: i64,
    },
    /// Submit an action through the gateway.
    Submit {
        /// Wire token, as printed by issue-token.
        #[arg(long)]
        token: String,
        /// Action name, e.g. "email:send".
        #[arg(long)]
        action: String,
        /// Action parameter as key=value, repeatable. Values parse as JSON
        /// when they can, plain strings otherwise.
        #[arg(long = "param")]
        params: Vec<String>,
        /// Free-form context recorded alongside the action.
        #[arg(long)]
        context: Option<String>,
    },
    /// List pending approval tasks.
    Pending {
        #[arg(long)]
        org: Uuid,
        /// Settle expired tasks and record their follow-ups first.
        #[arg(long)]
        resolve_expired: bool,
    },
    /// Approve or deny a pending task.
    Decide {
        #[arg(long)]
        task: String,
        /// Operator identity recorded with the decision.
        #[arg(long)]
        operator: String,
        #[arg(long, conflicts_with = "deny")]
        approve: bool,
        #[arg(long)]
        deny: bool,
        #[arg(long)]
        reason: Option<String>,
    },
    /// Read an organization's audit log.
    Log {
        #[arg(long)]
        org: Uuid,
        /// Only records for this agent.
        #[arg(long)]
        agent: Option<String>,
        /// Only records with this decision (allow, deny, escalate, ...).
        #[arg(long)]
        decision: Option<String>,
        /// At most this many records.
        #[arg(long)]
        limit: Option<usize>,
        /// Only records after this sequence number.
        #[arg(long)]
        after_seq: Option<u64>,
    },
    /// Verify an organization's audit chain.
    Verify {
        #[arg(long)]
        org: Uuid,
        #[arg(long)]
        from_seq: Option<u64>,
        #[arg(long)]
        to_seq: Option<u64>,
    },
    /// Manage the agent registry.
    Agent {
        #[command(subcommand)]
        command: commands::agent::AgentCommands,
    },
    /// Manage policy rules.
    Rule {
        #[command(subcommand)]
        command: commands::rule::RuleCommands,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("warden_gateway=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let cli = Cli::parse();
    let home = CliHome::open(&cli.home)?;

    match &cli.command {
        Commands::IssueToken {
            agent,
            org,
            scopes,
            ttl_hours,
        } => commands::token::issue(&home, agent, *org, scopes, *ttl_hours),
        Commands::Submit {
            token,
            action,
            params,
            context,
        } => {
            let mut map = Map::new();
            for raw in params {
                let (key, value) = commands::submit::parse_param(raw)?;
                map.insert(key, value);
            }
            commands::submit::execute(&home, token, action, map, context.as_deref())
        }
        Commands::Pending {
            org,
            resolve_expired,
        } => commands::approvals::pending(&home, *org, *resolve_expired),
        Commands::Decide {
            task,
            operator,
            approve,
            deny,
            reason,
        } => {
            if *approve == *deny {
                anyhow::bail!("pass exactly one of --approve or --deny");
            }
            commands::approvals::decide(&home, task, operator, *approve, reason.as_deref())
        }
        Commands::Log {
            org,
            agent,
            decision,
            limit,
            after_seq,
        } => commands::audit::log(
            &home,
            *org,
            agent.clone(),
            decision.clone(),
            *limit,
            *after_seq,
        ),
        Commands::Verify {
            org,
            from_seq,
            to_seq,
        } => std::process::exit(commands::audit::verify(&home, *org, *from_seq, *to_seq)),
        Commands::Agent { command } => commands::agent::execute(command, &home),
        Commands::Rule { command } => commands::rule::execute(command, &home),
    }
}
