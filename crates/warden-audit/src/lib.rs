//! # warden-audit
//!
//! Tamper-evident audit chain for the Warden action gateway.
//!
//! Every mediated action produces one [`InteractionRecord`], appended to a
//! per-organization JSONL chain. Each record carries the previous record's
//! content hash and an Ed25519 signature over its own, so a verifier holding
//! the public key can detect any retroactive edit, insertion, or deletion
//! and prove the chain was written by this gateway.
//!
//! ## Quick Example
//!
//! ```rust
//! use uuid::Uuid;
//! use warden_audit::{AuditChain, AuditSigner, RecordDraft, RecordFilter};
//!
//! let dir = tempfile::tempdir().unwrap();
//! let (signer, _pkcs8) = AuditSigner::generate("audit-key-1").unwrap();
//! let chain = AuditChain::open(dir.path(), signer).unwrap();
//!
//! let org = Uuid::new_v4();
//! let param_hash = warden_audit::hasher::hash_str("{}");
//! chain
//!     .append(org, RecordDraft::decision_only("agent-1", "email:send", &param_hash, "allow", None))
//!     .unwrap();
//!
//! assert!(chain.verify(org, None, None).unwrap().is_valid());
//! assert_eq!(chain.read_records(org, &RecordFilter::default()).unwrap().len(), 1);
//! ```

pub mod chain;
pub mod error;
pub mod hasher;
pub mod record;
pub mod signer;

pub use chain::{read_chain_file, verify_records, AuditChain, VerificationResult};
pub use error::AuditError;
pub use record::{InteractionRecord, RecordDraft, RecordFilter, GENESIS_HASH};
pub use signer::{signature_verifies, AuditSigner};
