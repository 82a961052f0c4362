// error.rs — Error types for the policy subsystem.

use thiserror::Error;

/// Errors that can occur while managing policy rules.
///
/// Evaluation itself never errors: a broken rule encountered at decision
/// time fails closed to DENY instead (see `DenyCode::MisconfiguredRule`).
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The rule's action pattern is not a valid glob.
    #[error("invalid action pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}
