// record.rs — The interaction record, one audit unit per mediated action.
//
// Each record embeds the previous record's content hash, so any retroactive
// edit breaks the chain. The content hash covers exactly the fields listed
// in `content_preimage()`; everything else on the record (record_id,
// matched_rule_id, result_status, key_id, the signature itself) is carried
// metadata and does not participate in the hash.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hasher;

/// `prev_hash` of sequence 1 in every organization's chain.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// One append-only, hash-linked, signed audit entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InteractionRecord {
    /// Unique record identifier ("rec-" + random hex).
    pub record_id: String,
    pub org_id: Uuid,
    /// Monotonic per organization, starting at 1, no gaps.
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
    pub agent_id: String,
    pub action: String,
    /// SHA-256 of the canonical JSON of the request parameters.
    pub param_hash: String,
    /// Decision kind as recorded: "allow", "deny", "escalate", or the
    /// approval follow-ups "approved", "denied", "expired".
    pub decision: String,
    pub matched_rule_id: Option<Uuid>,
    /// Execution outcome, when the action ran: "success", "failure",
    /// "timeout". Absent on denials and pending escalations.
    pub result_status: Option<String>,
    /// SHA-256 of the canonical JSON of the execution result payload, or
    /// the empty-string hash when nothing ran.
    pub result_hash: String,
    /// Content hash of the previous record, or [`GENESIS_HASH`] at seq 1.
    pub prev_hash: String,
    /// SHA-256 over [`content_preimage`](Self::content_preimage).
    pub content_hash: String,
    /// base64 Ed25519 signature over the hex `content_hash`.
    pub signature: String,
    /// Which signing key produced the signature.
    pub key_id: String,
}

impl InteractionRecord {
    pub fn fresh_record_id() -> String {
        format!("rec-{}", Uuid::new_v4().simple())
    }

    /// The exact byte string the content hash covers. Verification
    /// recomputes this from stored fields, so the field list and order are
    /// part of the chain format.
    pub fn content_preimage(&self) -> String {
        [
            self.prev_hash.as_str(),
            &self.seq.to_string(),
            &format_timestamp(&self.timestamp),
            &self.agent_id,
            &self.action,
            &self.param_hash,
            &self.decision,
            &self.result_hash,
        ]
        .join("\n")
    }

    pub fn compute_content_hash(&self) -> String {
        hasher::hash_str(&self.content_preimage())
    }
}

/// Timestamps enter the preimage at microsecond precision with a `Z`
/// suffix, independent of how serde renders them on disk.
pub(crate) fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// The caller-supplied fields of a record; the chain fills in sequence,
/// linkage, and signature at append time.
#[derive(Debug, Clone)]
pub struct RecordDraft {
    pub agent_id: String,
    pub action: String,
    pub param_hash: String,
    pub decision: String,
    pub matched_rule_id: Option<Uuid>,
    pub result_status: Option<String>,
    pub result_hash: String,
}

impl RecordDraft {
    /// A draft with no execution result (denials, pending escalations).
    pub fn decision_only(
        agent_id: &str,
        action: &str,
        param_hash: &str,
        decision: &str,
        matched_rule_id: Option<Uuid>,
    ) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            action: action.to_string(),
            param_hash: param_hash.to_string(),
            decision: decision.to_string(),
            matched_rule_id,
            result_status: None,
            result_hash: hasher::hash_str(""),
        }
    }
}

/// Filter for reading records back out of a chain. `after_seq` is the
/// pagination cursor: only records with `seq > after_seq` are returned.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub after_seq: Option<u64>,
    pub limit: Option<usize>,
    pub agent_id: Option<String>,
    pub decision: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl RecordFilter {
    pub(crate) fn matches(&self, record: &InteractionRecord) -> bool {
        if let Some(after) = self.after_seq {
            if record.seq <= after {
                return false;
            }
        }
        if let Some(agent) = &self.agent_id {
            if &record.agent_id != agent {
                return false;
            }
        }
        if let Some(decision) = &self.decision {
            if &record.decision != decision {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.timestamp >= until {
                return false;
            }
        }
        true
    }
}
