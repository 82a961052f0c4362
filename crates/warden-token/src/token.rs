// token.rs — Capability token claims and wire representation.
//
// A token travels as two base64url segments joined by a dot: the JSON-encoded
// claims, then the HMAC-SHA256 tag over the claims segment. The claims carry
// who the token was issued to, which scopes it grants, and its validity
// window. Signing and verification live in `codec`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Discriminator embedded in every capability token's claims.
///
/// Validation rejects any token whose `kind` differs, so a signed blob from
/// some future token family cannot be replayed as a capability token.
pub const TOKEN_KIND: &str = "capability_token";

/// The signed statement inside a capability token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenClaims {
    /// Unique token identifier, used for revocation ("cap-" + random hex).
    pub token_id: String,
    /// Token family discriminator, always [`TOKEN_KIND`] for capability tokens.
    pub kind: String,
    /// The agent this token was issued to.
    pub agent_id: String,
    /// The organization the agent acts within.
    pub org_id: Uuid,
    /// Scopes granted to the bearer. See `scope` for the grammar.
    pub scopes: Vec<String>,
    /// The token is rejected before this instant.
    pub not_before: DateTime<Utc>,
    /// The token is rejected at or after this instant.
    pub expires_at: DateTime<Utc>,
    /// When the token was issued, for audit purposes.
    pub issued_at: DateTime<Utc>,
}

impl TokenClaims {
    /// Generate a fresh token id in the `cap-` namespace.
    pub fn fresh_token_id() -> String {
        format!("cap-{}", Uuid::new_v4().simple())
    }
}

/// A signed capability token: claims plus the base64url HMAC tag over the
/// encoded claims segment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityToken {
    pub claims: TokenClaims,
    /// base64url (no padding) HMAC-SHA256 tag over the encoded claims segment.
    pub signature: String,
}

impl CapabilityToken {
    /// Render the token in its wire form: `b64url(claims).b64url(tag)`.
    pub fn encode(&self) -> String {
        format!("{}.{}", encode_claims_segment(&self.claims), self.signature)
    }
}

/// Serialize claims to the base64url segment that gets signed.
///
/// Serializing `TokenClaims` cannot fail: every field is a plain value with
/// an infallible serde representation.
pub(crate) fn encode_claims_segment(claims: &TokenClaims) -> String {
    use base64::Engine as _;
    let json = serde_json::to_vec(claims).unwrap_or_default();
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(json)
}

/// The caller-facing identity extracted from a validated token.
///
/// Handed to the policy engine and the audit log once a token has passed
/// signature, window, revocation, and scope checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenIdentity {
    pub agent_id: String,
    pub org_id: Uuid,
    pub token_id: String,
}

impl From<&TokenClaims> for TokenIdentity {
    fn from(claims: &TokenClaims) -> Self {
        Self {
            agent_id: claims.agent_id.clone(),
            org_id: claims.org_id,
            token_id: claims.token_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sample_claims() -> TokenClaims {
        let now = Utc::now();
        TokenClaims {
            token_id: TokenClaims::fresh_token_id(),
            kind: TOKEN_KIND.to_string(),
            agent_id: "agent-1".to_string(),
            org_id: Uuid::new_v4(),
            scopes: vec!["email:*".to_string()],
            not_before: now,
            expires_at: now + Duration::hours(1),
            issued_at: now,
        }
    }

    #[test]
    fn token_ids_are_namespaced_and_unique() {
        let a = TokenClaims::fresh_token_id();
        let b = TokenClaims::fresh_token_id();
        assert!(a.starts_with("cap-"));
        assert_ne!(a, b);
    }

    #[test]
    fn claims_round_trip_through_json() {
        let claims = sample_claims();
        let json = serde_json::to_string(&claims).unwrap();
        let back: TokenClaims = serde_json::from_str(&json).unwrap();
        assert_eq!(claims, back);
    }

    #[test]
    fn wire_form_has_two_segments() {
        let token = CapabilityToken {
            claims: sample_claims(),
            signature: "dGFn".to_string(),
        };
        let wire = token.encode();
        let parts: Vec<&str> = wire.split('.').collect();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[1], "dGFn");
    }

    #[test]
    fn identity_borrows_the_claim_fields() {
        let claims = sample_claims();
        let identity = TokenIdentity::from(&claims);
        assert_eq!(identity.agent_id, claims.agent_id);
        assert_eq!(identity.org_id, claims.org_id);
        assert_eq!(identity.token_id, claims.token_id);
    }
}
