// error.rs — Error types for the token subsystem.

use thiserror::Error;

/// Errors that can occur while issuing or validating capability tokens.
#[derive(Debug, Error)]
pub enum TokenError {
    /// A requested scope string is malformed (empty segment, misplaced wildcard).
    #[error("invalid scope '{scope}': {reason}")]
    InvalidScope { scope: String, reason: String },

    /// The requested time-to-live is zero or negative.
    #[error("invalid ttl: {seconds}s (must be positive)")]
    InvalidTtl { seconds: i64 },

    /// The wire string is not a decodable token (bad segments, bad base64, bad JSON).
    #[error("malformed token: {reason}")]
    Malformed { reason: String },

    /// HMAC verification failed — the token was not signed by this gateway's key.
    #[error("token signature verification failed")]
    BadSignature,

    /// The token's not-before timestamp is in the future.
    #[error("token not valid before {not_before}")]
    NotYetValid { not_before: String },

    /// The token's expiry timestamp has passed.
    #[error("token expired at {expired_at}")]
    Expired { expired_at: String },

    /// The token appears on the revocation list.
    #[error("token '{token_id}' has been revoked")]
    Revoked { token_id: String },

    /// The token is valid but none of its granted scopes authorize the action.
    #[error("scope not granted for action '{action}'")]
    ScopeNotGranted { action: String },
}
