//! # warden-policy
//!
//! Policy decision engine for the Warden action gateway.
//!
//! Every action request is evaluated against an organization's ordered rule
//! set: rules run in (priority ascending, registration order) and the first
//! rule whose action pattern and constraints all match decides the outcome.
//! If nothing matches, the answer is DENY. The engine never owns budget or
//! rate totals; it queries them through [`UsageSource`].
//!
//! ## Quick Example
//!
//! ```rust
//! use std::sync::Arc;
//! use uuid::Uuid;
//! use warden_policy::{PolicyEngine, PolicyRequest, PolicyRule, RuleDecision, RuleSet, ZeroUsage};
//!
//! let org = Uuid::new_v4();
//! let rules = RuleSet::new();
//! rules
//!     .register(PolicyRule::new(org, 1, "email:*", RuleDecision::Allow))
//!     .unwrap();
//!
//! let engine = PolicyEngine::new(Arc::new(rules), Arc::new(ZeroUsage));
//! let decision = engine.evaluate(org, &PolicyRequest::new("agent-1", "email:send"));
//! assert!(decision.is_allow());
//! ```

pub mod constraint;
pub mod engine;
pub mod error;
pub mod rule;
pub mod usage;

pub use constraint::Constraint;
pub use engine::{DenyCode, PolicyDecision, PolicyEngine, PolicyRequest};
pub use error::PolicyError;
pub use rule::{PolicyRule, RuleDecision, RuleSet, RuleSource};
pub use usage::{UsageSource, UsageWindow, ZeroUsage};
