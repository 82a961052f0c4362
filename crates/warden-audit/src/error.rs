// error.rs — Error types for the audit subsystem.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while appending to or verifying the audit chain.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Could not open or create a chain file.
    #[error("failed to open chain file at {path:?}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure while reading or writing chain data.
    #[error("audit chain I/O error")]
    Io(#[from] std::io::Error),

    /// A chain line could not be parsed as a record.
    #[error("audit chain serialization error")]
    Serde(#[from] serde_json::Error),

    /// The Ed25519 signing key could not be generated or parsed.
    #[error("audit signing key rejected: {reason}")]
    KeyRejected { reason: String },
}
