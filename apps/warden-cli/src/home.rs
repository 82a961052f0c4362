// home.rs — On-disk state for the CLI gateway.
//
// Everything the CLI needs between invocations lives under one directory
// (default `.warden/`): the token signing secret, the audit keypair, the
// per-org chain files, the rule and agent registries, and any escalations
// still waiting on an operator. The gateway itself stays in-memory; this
// module rebuilds it from disk at the start of each command.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::rand::{SecureRandom, SystemRandom};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use warden_approval::ApprovalTask;
use warden_audit::{AuditChain, AuditSigner};
use warden_gateway::{AgentProfile, EchoExecutor, Gateway, GatewayConfig, StaticDirectory};
use warden_policy::{PolicyEngine, PolicyRule, RuleSet, ZeroUsage};
use warden_token::{TokenCodec, TokenSigningKey};

const TOKEN_SECRET_FILE: &str = "token.secret";
const AUDIT_KEY_FILE: &str = "audit.key";
const AUDIT_DIR: &str = "audit";
const RULES_FILE: &str = "rules.json";
const AGENTS_FILE: &str = "agents.json";
const ESCALATIONS_FILE: &str = "escalations.json";
const AUDIT_KEY_ID: &str = "audit-key-1";

/// One escalation the CLI keeps decidable across invocations.
///
/// The audit record only carries the parameter hash, so the parameters
/// themselves ride along here until an operator decides or the task
/// expires.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeldEscalation {
    pub task: ApprovalTask,
    pub agent_id: String,
    pub action: String,
    pub params: Map<String, Value>,
    pub matched_rule_id: Option<Uuid>,
}

pub struct CliHome {
    root: PathBuf,
}

impl CliHome {
    pub fn open(root: &Path) -> Result<Self> {
        fs::create_dir_all(root.join(AUDIT_DIR))
            .with_context(|| format!("creating state directory {}", root.display()))?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }

    pub fn token_codec(&self) -> Result<TokenCodec> {
        let secret = self.token_secret()?;
        Ok(TokenCodec::new(TokenSigningKey::from_bytes(&secret)))
    }

    /// Rebuild the in-process gateway from everything on disk, re-arming
    /// any escalations still waiting on an operator.
    pub fn gateway(&self) -> Result<Gateway> {
        let rule_set = Arc::new(RuleSet::new());
        for rule in self.rules()? {
            rule_set
                .register(rule)
                .context("loading rules.json into the policy engine")?;
        }

        let directory = Arc::new(StaticDirectory::new());
        for (agent_id, profile) in self.agents()? {
            directory.register(&agent_id, profile);
        }

        let gateway = Gateway::new(
            self.token_codec()?,
            PolicyEngine::new(rule_set, Arc::new(ZeroUsage)),
            self.chain()?,
            directory,
            Arc::new(EchoExecutor),
            GatewayConfig::default(),
        );
        for held in self.escalations()? {
            gateway.restore_escalation(
                held.task,
                &held.agent_id,
                &held.action,
                held.params,
                held.matched_rule_id,
            );
        }
        Ok(gateway)
    }

    pub fn chain(&self) -> Result<AuditChain> {
        Ok(AuditChain::open(self.root.join(AUDIT_DIR), self.signer()?)?)
    }

    pub fn rules(&self) -> Result<Vec<PolicyRule>> {
        self.read_json(RULES_FILE)
    }

    pub fn save_rules(&self, rules: &[PolicyRule]) -> Result<()> {
        self.write_json(RULES_FILE, &rules)
    }

    pub fn agents(&self) -> Result<HashMap<String, AgentProfile>> {
        self.read_json(AGENTS_FILE)
    }

    pub fn save_agents(&self, agents: &HashMap<String, AgentProfile>) -> Result<()> {
        self.write_json(AGENTS_FILE, agents)
    }

    pub fn escalations(&self) -> Result<Vec<HeldEscalation>> {
        self.read_json(ESCALATIONS_FILE)
    }

    pub fn remember_escalation(&self, held: HeldEscalation) -> Result<()> {
        let mut all = self.escalations()?;
        all.push(held);
        self.write_json(ESCALATIONS_FILE, &all)
    }

    pub fn forget_escalation(&self, task_id: &str) -> Result<()> {
        let mut all = self.escalations()?;
        all.retain(|held| held.task.task_id != task_id);
        self.write_json(ESCALATIONS_FILE, &all)
    }

    fn token_secret(&self) -> Result<Vec<u8>> {
        let path = self.root.join(TOKEN_SECRET_FILE);
        if path.exists() {
            let encoded =
                fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
            return STANDARD
                .decode(encoded.trim())
                .with_context(|| format!("{} is not valid base64", path.display()));
        }

        let mut secret = vec![0u8; 32];
        SystemRandom::new()
            .fill(&mut secret)
            .map_err(|_| anyhow::anyhow!("system RNG unavailable"))?;
        fs::write(&path, STANDARD.encode(&secret))
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(secret)
    }

    fn signer(&self) -> Result<AuditSigner> {
        let path = self.root.join(AUDIT_KEY_FILE);
        if path.exists() {
            let pkcs8 = fs::read(&path).with_context(|| format!("reading {}", path.display()))?;
            return Ok(AuditSigner::from_pkcs8(&pkcs8, AUDIT_KEY_ID)?);
        }

        let (signer, pkcs8) = AuditSigner::generate(AUDIT_KEY_ID)?;
        fs::write(&path, &pkcs8).with_context(|| format!("writing {}", path.display()))?;
        Ok(signer)
    }

    fn read_json<T>(&self, name: &str) -> Result<T>
    where
        T: Default + for<'de> Deserialize<'de>,
    {
        let path = self.root.join(name);
        if !path.exists() {
            return Ok(T::default());
        }
        let data =
            fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        serde_json::from_str(&data).with_context(|| format!("parsing {}", path.display()))
    }

    fn write_json<T: Serialize>(&self, name: &str, value: &T) -> Result<()> {
        let path = self.root.join(name);
        let data = serde_json::to_string_pretty(value)?;
        fs::write(&path, data).with_context(|| format!("writing {}", path.display()))
    }
}
