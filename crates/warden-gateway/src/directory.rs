// directory.rs — Agent registry boundary.
//
// Agent registration and lifecycle live outside the gateway; the gateway
// only asks "who is this agent and are they active". A non-active agent is
// denied before policy evaluation runs.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Active,
    Suspended,
}

/// What the registry knows about an agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProfile {
    pub org_id: Uuid,
    pub status: AgentStatus,
}

/// Lookup boundary to the external agent registry.
pub trait AgentDirectory {
    fn lookup_agent(&self, agent_id: &str) -> Option<AgentProfile>;
}

/// In-memory directory for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct StaticDirectory {
    agents: RwLock<HashMap<String, AgentProfile>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or update an agent. Returns the previous profile, if any.
    pub fn register(&self, agent_id: &str, profile: AgentProfile) -> Option<AgentProfile> {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        agents.insert(agent_id.to_string(), profile)
    }

    pub fn set_status(&self, agent_id: &str, status: AgentStatus) {
        let mut agents = self.agents.write().unwrap_or_else(|e| e.into_inner());
        if let Some(profile) = agents.get_mut(agent_id) {
            profile.status = status;
        }
    }
}

impl AgentDirectory for StaticDirectory {
    fn lookup_agent(&self, agent_id: &str) -> Option<AgentProfile> {
        let agents = self.agents.read().unwrap_or_else(|e| e.into_inner());
        agents.get(agent_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_returns_registered_profile() {
        let dir = StaticDirectory::new();
        let org = Uuid::new_v4();
        dir.register(
            "agent-1",
            AgentProfile {
                org_id: org,
                status: AgentStatus::Active,
            },
        );

        let profile = dir.lookup_agent("agent-1").unwrap();
        assert_eq!(profile.org_id, org);
        assert_eq!(profile.status, AgentStatus::Active);
        assert!(dir.lookup_agent("agent-2").is_none());
    }

    #[test]
    fn set_status_suspends_an_agent() {
        let dir = StaticDirectory::new();
        dir.register(
            "agent-1",
            AgentProfile {
                org_id: Uuid::new_v4(),
                status: AgentStatus::Active,
            },
        );
        dir.set_status("agent-1", AgentStatus::Suspended);
        assert_eq!(
            dir.lookup_agent("agent-1").unwrap().status,
            AgentStatus::Suspended
        );
    }
}
