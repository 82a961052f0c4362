//! # warden-gateway
//!
//! The mediation surface that sits between autonomous agents and the
//! actions they want performed. Every request flows through one loop:
//! validate the capability token, check the agent registry, evaluate
//! policy, then execute, deny, or escalate for human approval. Each
//! trusted-identity outcome is appended to the organization's
//! tamper-evident audit chain before the response goes out.
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use warden_audit::{AuditChain, AuditSigner};
//! use warden_gateway::{
//!     ActionRequest, AgentProfile, AgentStatus, EchoExecutor, Gateway, GatewayConfig,
//!     StaticDirectory, SubmitOutcome,
//! };
//! use warden_policy::{PolicyEngine, PolicyRule, RuleDecision, RuleSet, ZeroUsage};
//! use warden_token::{TokenCodec, TokenSigningKey};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let (signer, _pkcs8) = AuditSigner::generate("audit-key-1").unwrap();
//! let chain = AuditChain::open(dir.path(), signer).unwrap();
//!
//! let org = Uuid::new_v4();
//! let rules = Arc::new(RuleSet::new());
//! rules
//!     .register(PolicyRule::new(org, 10, "email:*", RuleDecision::Allow))
//!     .unwrap();
//!
//! let directory = Arc::new(StaticDirectory::new());
//! directory.register(
//!     "agent-1",
//!     AgentProfile { org_id: org, status: AgentStatus::Active },
//! );
//!
//! let codec = TokenCodec::new(TokenSigningKey::from_bytes(b"shared-secret"));
//! let token = codec
//!     .issue("agent-1", org, &["email:*".to_string()], chrono::Duration::hours(1))
//!     .unwrap();
//!
//! let gateway = Gateway::new(
//!     TokenCodec::new(TokenSigningKey::from_bytes(b"shared-secret")),
//!     PolicyEngine::new(rules, Arc::new(ZeroUsage)),
//!     chain,
//!     directory,
//!     Arc::new(EchoExecutor),
//!     GatewayConfig::default(),
//! );
//!
//! let outcome = gateway
//!     .submit_action(&token.encode(), &ActionRequest::new("email:send"))
//!     .unwrap();
//! assert!(matches!(outcome, SubmitOutcome::Executed { .. }));
//! assert!(gateway.verify_chain(org, None, None).unwrap().is_valid());
//! ```

pub mod directory;
pub mod error;
pub mod executor;
pub mod gateway;

pub use directory::{AgentDirectory, AgentProfile, AgentStatus, StaticDirectory};
pub use error::GatewayError;
pub use executor::{ActionExecutor, EchoExecutor, ExecutionResult, ExecutionStatus};
pub use gateway::{
    ActionRequest, ApprovalOutcome, ExpiryPolicy, Gateway, GatewayConfig, SubmitOutcome,
};
