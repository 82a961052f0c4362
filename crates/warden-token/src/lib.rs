//! # warden-token
//!
//! Capability token codec for the Warden action gateway.
//!
//! Agents authenticate action requests with a signed, scoped, time-bounded
//! [`CapabilityToken`]. The [`TokenCodec`] issues tokens under a process-wide
//! HMAC-SHA256 key and validates incoming tokens: signature first
//! (constant-time), then validity window, then revocation, then scope.
//!
//! ## Quick Example
//!
//! ```rust
//! use warden_token::{TokenCodec, TokenSigningKey};
//! use chrono::Duration;
//! use uuid::Uuid;
//!
//! let codec = TokenCodec::new(TokenSigningKey::from_bytes(b"test-key-material"));
//! let token = codec
//!     .issue("agent-1", Uuid::new_v4(), &["email:*".to_string()], Duration::hours(1))
//!     .unwrap();
//! let identity = codec.validate(&token.encode(), "email:send").unwrap();
//! assert_eq!(identity.agent_id, "agent-1");
//! ```

pub mod codec;
pub mod error;
pub mod revocation;
pub mod scope;
pub mod token;

pub use codec::{TokenCodec, TokenSigningKey};
pub use error::TokenError;
pub use revocation::{NoRevocations, RevocationCheck, RevocationList};
pub use scope::{scope_authorizes, validate_scope};
pub use token::{CapabilityToken, TokenClaims, TokenIdentity};
