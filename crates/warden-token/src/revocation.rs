// revocation.rs — Token revocation checks.
//
// The codec consults a `RevocationCheck` during validation, after the
// signature and validity window have been verified. The in-memory
// `RevocationList` is the default production implementation; `NoRevocations`
// is for codecs that never revoke (tests, short-lived tooling).

use std::collections::HashMap;
use std::sync::RwLock;

use tracing::info;

/// Answering "has this token been revoked?" during validation.
pub trait RevocationCheck {
    fn is_revoked(&self, token_id: &str) -> bool;
}

/// A check that never revokes anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoRevocations;

impl RevocationCheck for NoRevocations {
    fn is_revoked(&self, _token_id: &str) -> bool {
        false
    }
}

/// In-memory revocation list keyed by token id.
///
/// Revocation is permanent for the life of the list. The optional reason is
/// kept for operators inspecting why a token stopped working; it never
/// affects the validation outcome.
#[derive(Debug, Default)]
pub struct RevocationList {
    revoked: RwLock<HashMap<String, Option<String>>>,
}

impl RevocationList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Revoke a token. Idempotent; a second call may update the reason.
    pub fn revoke(&self, token_id: &str, reason: Option<&str>) {
        let mut revoked = self.revoked.write().unwrap_or_else(|e| e.into_inner());
        revoked.insert(token_id.to_string(), reason.map(str::to_string));
        info!(token_id, reason = reason.unwrap_or("unspecified"), "token revoked");
    }

    /// The reason recorded when the token was revoked, if any.
    pub fn revocation_reason(&self, token_id: &str) -> Option<Option<String>> {
        let revoked = self.revoked.read().unwrap_or_else(|e| e.into_inner());
        revoked.get(token_id).cloned()
    }

    /// Number of revoked tokens on the list.
    pub fn len(&self) -> usize {
        let revoked = self.revoked.read().unwrap_or_else(|e| e.into_inner());
        revoked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl RevocationCheck for RevocationList {
    fn is_revoked(&self, token_id: &str) -> bool {
        let revoked = self.revoked.read().unwrap_or_else(|e| e.into_inner());
        revoked.contains_key(token_id)
    }
}
