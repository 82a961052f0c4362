// signer.rs — Ed25519 attestation over record content hashes.
//
// The gateway signs every record's hex content hash so a verifier holding
// only the public key can prove the chain was written by this gateway, not
// merely that it is internally consistent. The key is loaded once at
// startup and never mutated; `key_id` travels on every record so a future
// rotation can verify old records against old keys.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use ring::rand::SystemRandom;
use ring::signature::{self, Ed25519KeyPair, KeyPair};

use crate::error::AuditError;

pub struct AuditSigner {
    key_pair: Ed25519KeyPair,
    key_id: String,
}

impl AuditSigner {
    /// Generate a fresh keypair. Also returns the PKCS#8 document so the
    /// caller can persist it for reuse across restarts.
    pub fn generate(key_id: &str) -> Result<(Self, Vec<u8>), AuditError> {
        let rng = SystemRandom::new();
        let doc = Ed25519KeyPair::generate_pkcs8(&rng).map_err(|_| AuditError::KeyRejected {
            reason: "ed25519 key generation failed".to_string(),
        })?;
        let signer = Self::from_pkcs8(doc.as_ref(), key_id)?;
        Ok((signer, doc.as_ref().to_vec()))
    }

    /// Load a persisted PKCS#8 keypair.
    pub fn from_pkcs8(pkcs8: &[u8], key_id: &str) -> Result<Self, AuditError> {
        let key_pair = Ed25519KeyPair::from_pkcs8(pkcs8).map_err(|e| AuditError::KeyRejected {
            reason: e.to_string(),
        })?;
        Ok(Self {
            key_pair,
            key_id: key_id.to_string(),
        })
    }

    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.key_pair.public_key().as_ref().to_vec()
    }

    /// Sign a hex content hash, returning the base64 signature.
    pub fn sign_content_hash(&self, content_hash: &str) -> String {
        BASE64.encode(self.key_pair.sign(content_hash.as_bytes()).as_ref())
    }
}

impl std::fmt::Debug for AuditSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditSigner")
            .field("key_id", &self.key_id)
            .finish_non_exhaustive()
    }
}

/// Check a record signature against a public key.
pub fn signature_verifies(public_key: &[u8], content_hash: &str, signature_b64: &str) -> bool {
    let Ok(sig) = BASE64.decode(signature_b64) else {
        return false;
    };
    signature::UnparsedPublicKey::new(&signature::ED25519, public_key)
        .verify(content_hash.as_bytes(), &sig)
        .is_ok()
}
