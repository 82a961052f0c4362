// agent.rs — Agent registry subcommands: register, suspend, activate, list.

use anyhow::Result;
use clap::Subcommand;
use uuid::Uuid;

use warden_gateway::{AgentProfile, AgentStatus};

use crate::home::CliHome;

#[derive(Subcommand)]
pub enum AgentCommands {
    /// Register an agent (or move it to another organization).
    Register {
        /// Agent identifier, as carried in its tokens.
        #[arg(long)]
        id: String,
        /// Organization the agent belongs to.
        #[arg(long)]
        org: Uuid,
    },
    /// Suspend an agent. Its actions are denied before policy runs.
    Suspend {
        #[arg(long)]
        id: String,
    },
    /// Reactivate a suspended agent.
    Activate {
        #[arg(long)]
        id: String,
    },
    /// List registered agents.
    List,
}

pub fn execute(cmd: &AgentCommands, home: &CliHome) -> Result<()> {
    match cmd {
        AgentCommands::Register { id, org } => {
            let mut agents = home.agents()?;
            agents.insert(
                id.clone(),
                AgentProfile {
                    org_id: *org,
                    status: AgentStatus::Active,
                },
            );
            home.save_agents(&agents)?;
            println!("registered '{id}' in organization {org}");
        }
        AgentCommands::Suspend { id } => set_status(home, id, AgentStatus::Suspended)?,
        AgentCommands::Activate { id } => set_status(home, id, AgentStatus::Active)?,
        AgentCommands::List => {
            let agents = home.agents()?;
            if agents.is_empty() {
                println!("No agents registered.");
                return Ok(());
            }
            let mut rows: Vec<_> = agents.into_iter().collect();
            rows.sort_by(|a, b| a.0.cmp(&b.0));
            println!("{:<20} {:<38} STATUS", "AGENT", "ORG");
            println!("{}", "-".repeat(68));
            for (id, profile) in rows {
                let status = match profile.status {
                    AgentStatus::Active => "active",
                    AgentStatus::Suspended => "suspended",
                };
                println!("{:<20} {:<38} {}", id, profile.org_id, status);
            }
        }
    }
    Ok(())
}

fn set_status(home: &CliHome, id: &str, status: AgentStatus) -> Result<()> {
    let mut agents = home.agents()?;
    let Some(profile) = agents.get_mut(id) else {
        anyhow::bail!("agent '{id}' is not registered");
    };
    profile.status = status;
    home.save_agents(&agents)?;
    println!("agent '{id}' is now {:?}", status);
    Ok(())
}
