// codec.rs — Token issuance and validation.
//
// The codec owns the HMAC-SHA256 signing key and, optionally, a revocation
// check. Validation runs signature-first: the tag is verified over the raw
// claims segment (constant-time, via ring) before the claims are even parsed,
// so nothing attacker-controlled is interpreted until the gateway knows it
// signed the bytes.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use ring::hmac;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::TokenError;
use crate::revocation::{NoRevocations, RevocationCheck};
use crate::scope::{scope_authorizes, validate_scope};
use crate::token::{encode_claims_segment, CapabilityToken, TokenClaims, TokenIdentity, TOKEN_KIND};

/// HMAC-SHA256 key material for signing and verifying capability tokens.
pub struct TokenSigningKey {
    key: hmac::Key,
}

impl TokenSigningKey {
    /// Build a signing key from raw secret bytes.
    pub fn from_bytes(secret: &[u8]) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }
}

impl std::fmt::Debug for TokenSigningKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material.
        f.write_str("TokenSigningKey(..)")
    }
}

/// Issues and validates capability tokens under a single signing key.
pub struct TokenCodec {
    key: TokenSigningKey,
    revocations: Arc<dyn RevocationCheck + Send + Sync>,
}

impl TokenCodec {
    /// A codec with no revocation source. Tokens stay valid until expiry.
    pub fn new(key: TokenSigningKey) -> Self {
        Self {
            key,
            revocations: Arc::new(NoRevocations),
        }
    }

    /// A codec that consults `revocations` during validation.
    pub fn with_revocations(
        key: TokenSigningKey,
        revocations: Arc<dyn RevocationCheck + Send + Sync>,
    ) -> Self {
        Self { key, revocations }
    }

    /// Issue a token granting `scopes` to `agent_id` for `ttl` from now.
    ///
    /// Every scope is validated against the grammar in `scope`; the ttl must
    /// be positive. The returned token is already signed.
    pub fn issue(
        &self,
        agent_id: &str,
        org_id: Uuid,
        scopes: &[String],
        ttl: Duration,
    ) -> Result<CapabilityToken, TokenError> {
        for scope in scopes {
            validate_scope(scope)?;
        }
        if ttl <= Duration::zero() {
            return Err(TokenError::InvalidTtl {
                seconds: ttl.num_seconds(),
            });
        }

        let now = Utc::now();
        let claims = TokenClaims {
            token_id: TokenClaims::fresh_token_id(),
            kind: TOKEN_KIND.to_string(),
            agent_id: agent_id.to_string(),
            org_id,
            scopes: scopes.to_vec(),
            not_before: now,
            expires_at: now + ttl,
            issued_at: now,
        };
        let token = self.sign(claims);
        debug!(
            token_id = %token.claims.token_id,
            agent_id,
            scopes = ?scopes,
            expires_at = %token.claims.expires_at,
            "issued capability token"
        );
        Ok(token)
    }

    /// Sign prepared claims.
    ///
    /// `issue` is the normal entry point; this seam exists so callers can
    /// construct claims with explicit windows (backdated not-before for
    /// clock-skew tolerance, fixed expiry for fixtures).
    pub fn sign(&self, claims: TokenClaims) -> CapabilityToken {
        let segment = encode_claims_segment(&claims);
        let tag = hmac::sign(&self.key.key, segment.as_bytes());
        CapabilityToken {
            claims,
            signature: URL_SAFE_NO_PAD.encode(tag.as_ref()),
        }
    }

    /// Validate a wire token and check it authorizes `action`.
    ///
    /// Checks run in a fixed order and stop at the first failure: decode,
    /// signature, token kind, not-before, expiry, revocation, scope. The
    /// signature check happens before the claims are parsed.
    pub fn validate(&self, wire: &str, action: &str) -> Result<TokenIdentity, TokenError> {
        self.validate_at(wire, action, Utc::now())
    }

    /// Like [`validate`](Self::validate) with an explicit "now".
    pub fn validate_at(
        &self,
        wire: &str,
        action: &str,
        now: DateTime<Utc>,
    ) -> Result<TokenIdentity, TokenError> {
        let (claims_segment, sig_segment) = split_wire(wire)?;

        let tag = URL_SAFE_NO_PAD
            .decode(sig_segment)
            .map_err(|_| TokenError::Malformed {
                reason: "signature segment is not valid base64url".to_string(),
            })?;
        if hmac::verify(&self.key.key, claims_segment.as_bytes(), &tag).is_err() {
            warn!(action, "token signature verification failed");
            return Err(TokenError::BadSignature);
        }

        let claims = decode_claims(claims_segment)?;
        if claims.kind != TOKEN_KIND {
            return Err(TokenError::Malformed {
                reason: format!("unexpected token kind '{}'", claims.kind),
            });
        }

        if now < claims.not_before {
            return Err(TokenError::NotYetValid {
                not_before: claims.not_before.to_rfc3339(),
            });
        }
        if now >= claims.expires_at {
            return Err(TokenError::Expired {
                expired_at: claims.expires_at.to_rfc3339(),
            });
        }

        if self.revocations.is_revoked(&claims.token_id) {
            warn!(token_id = %claims.token_id, "revoked token presented");
            return Err(TokenError::Revoked {
                token_id: claims.token_id,
            });
        }

        if !claims.scopes.iter().any(|s| scope_authorizes(s, action)) {
            return Err(TokenError::ScopeNotGranted {
                action: action.to_string(),
            });
        }

        Ok(TokenIdentity::from(&claims))
    }

    /// Identity from a wire token whose signature verifies, ignoring the
    /// validity window, revocation, and scope.
    ///
    /// The claims are authentic (the gateway signed them), just not
    /// currently usable. Callers use this to attribute a denial to the
    /// claimed identity; `None` means the token is forged or garbled and
    /// carries no trustworthy identity at all.
    pub fn authenticated_identity(&self, wire: &str) -> Option<TokenIdentity> {
        let (claims_segment, sig_segment) = split_wire(wire).ok()?;
        let tag = URL_SAFE_NO_PAD.decode(sig_segment).ok()?;
        hmac::verify(&self.key.key, claims_segment.as_bytes(), &tag).ok()?;
        let claims = decode_claims(claims_segment).ok()?;
        (claims.kind == TOKEN_KIND).then(|| TokenIdentity::from(&claims))
    }
}

fn split_wire(wire: &str) -> Result<(&str, &str), TokenError> {
    match wire.split_once('.') {
        Some((claims, sig)) if !claims.is_empty() && !sig.is_empty() && !sig.contains('.') => {
            Ok((claims, sig))
        }
        _ => Err(TokenError::Malformed {
            reason: "expected exactly two non-empty dot-separated segments".to_string(),
        }),
    }
}

fn decode_claims(segment: &str) -> Result<TokenClaims, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::Malformed {
            reason: "claims segment is not valid base64url".to_string(),
        })?;
    serde_json::from_slice(&bytes).map_err(|e| TokenError::Malformed {
        reason: format!("claims segment is not valid claims JSON: {e}"),
    })
}
