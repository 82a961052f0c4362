// chain.rs — Per-organization append-only hash chains.
//
// Each organization gets one JSONL file under the chain directory: one
// record per line, each linked to the previous via `prev_hash`. Appends for
// one organization serialize on that organization's lock, so sequence
// numbers are gapless and the chain never forks even under concurrent
// callers. Appends for different organizations do not contend.
//
// Records are flushed before `append` returns. The caller (the gateway)
// relies on that for its log-before-respond guarantee.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::AuditError;
use crate::record::{InteractionRecord, RecordDraft, RecordFilter, GENESIS_HASH};
use crate::signer::{signature_verifies, AuditSigner};

/// Outcome of verifying a chain or a range of it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum VerificationResult {
    Valid { records_checked: u64 },
    Invalid { at_seq: u64, reason: String },
}

impl VerificationResult {
    pub fn is_valid(&self) -> bool {
        matches!(self, VerificationResult::Valid { .. })
    }
}

struct OrgChain {
    writer: BufWriter<File>,
    last_seq: u64,
    last_hash: String,
}

impl OrgChain {
    /// Open an org's chain file, recovering (last_seq, last_hash) from the
    /// tail so new records link correctly after a restart.
    fn open(path: &Path) -> Result<Self, AuditError> {
        let (last_seq, last_hash) = if path.exists() {
            match read_chain_file(path)?.last() {
                Some(record) => (record.seq, record.content_hash.clone()),
                None => (0, GENESIS_HASH.to_string()),
            }
        } else {
            (0, GENESIS_HASH.to_string())
        };

        // Append mode: existing data is never overwritten.
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| AuditError::OpenFailed {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            writer: BufWriter::new(file),
            last_seq,
            last_hash,
        })
    }
}

/// The audit chain: single writer per organization, signed records, JSONL
/// storage.
pub struct AuditChain {
    dir: PathBuf,
    signer: AuditSigner,
    orgs: Mutex<HashMap<Uuid, Arc<Mutex<OrgChain>>>>,
}

impl AuditChain {
    /// Open a chain rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl AsRef<Path>, signer: AuditSigner) -> Result<Self, AuditError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            signer,
            orgs: Mutex::new(HashMap::new()),
        })
    }

    /// The chain file for an organization.
    pub fn chain_path(&self, org_id: Uuid) -> PathBuf {
        self.dir.join(format!("{org_id}.jsonl"))
    }

    pub fn public_key(&self) -> Vec<u8> {
        self.signer.public_key()
    }

    pub fn key_id(&self) -> &str {
        self.signer.key_id()
    }

    /// Append one record to an organization's chain.
    ///
    /// Sequence allocation, hashing, signing, and the flushed write all
    /// happen under the organization's lock; two concurrent appends cannot
    /// take the same sequence number or interleave their chain links.
    pub fn append(&self, org_id: Uuid, draft: RecordDraft) -> Result<InteractionRecord, AuditError> {
        let entry = self.org_entry(org_id)?;
        let mut chain = entry.lock().unwrap_or_else(|e| e.into_inner());

        let mut record = InteractionRecord {
            record_id: InteractionRecord::fresh_record_id(),
            org_id,
            seq: chain.last_seq + 1,
            timestamp: Utc::now(),
            agent_id: draft.agent_id,
            action: draft.action,
            param_hash: draft.param_hash,
            decision: draft.decision,
            matched_rule_id: draft.matched_rule_id,
            result_status: draft.result_status,
            result_hash: draft.result_hash,
            prev_hash: chain.last_hash.clone(),
            content_hash: String::new(),
            signature: String::new(),
            key_id: self.signer.key_id().to_string(),
        };
        record.content_hash = record.compute_content_hash();
        record.signature = self.signer.sign_content_hash(&record.content_hash);

        let json = serde_json::to_string(&record)?;
        writeln!(chain.writer, "{json}")?;
        chain.writer.flush()?;

        chain.last_seq = record.seq;
        chain.last_hash = record.content_hash.clone();
        info!(
            %org_id,
            seq = record.seq,
            record_id = %record.record_id,
            decision = %record.decision,
            "audit record appended"
        );
        Ok(record)
    }

    /// Read records for an organization, oldest first, applying the filter.
    /// An organization with no chain file has an empty (valid) chain.
    pub fn read_records(
        &self,
        org_id: Uuid,
        filter: &RecordFilter,
    ) -> Result<Vec<InteractionRecord>, AuditError> {
        let mut records: Vec<InteractionRecord> = self
            .read_all(org_id)?
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect();
        if let Some(limit) = filter.limit {
            records.truncate(limit);
        }
        Ok(records)
    }

    /// Verify an organization's chain, or the [from, to] sequence range of
    /// it, against this chain's public key.
    pub fn verify(
        &self,
        org_id: Uuid,
        from_seq: Option<u64>,
        to_seq: Option<u64>,
    ) -> Result<VerificationResult, AuditError> {
        let records = self.read_all(org_id)?;
        Ok(verify_records(
            &records,
            &self.signer.public_key(),
            from_seq,
            to_seq,
        ))
    }

    fn read_all(&self, org_id: Uuid) -> Result<Vec<InteractionRecord>, AuditError> {
        let path = self.chain_path(org_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        read_chain_file(&path)
    }

    fn org_entry(&self, org_id: Uuid) -> Result<Arc<Mutex<OrgChain>>, AuditError> {
        let mut orgs = self.orgs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = orgs.get(&org_id) {
            return Ok(Arc::clone(entry));
        }
        let chain = OrgChain::open(&self.chain_path(org_id))?;
        let entry = Arc::new(Mutex::new(chain));
        orgs.insert(org_id, Arc::clone(&entry));
        Ok(entry)
    }
}

/// Read every record from a chain file, oldest first. Blank lines are
/// skipped.
pub fn read_chain_file(path: impl AsRef<Path>) -> Result<Vec<InteractionRecord>, AuditError> {
    let file = File::open(path.as_ref()).map_err(|source| AuditError::OpenFailed {
        path: path.as_ref().to_path_buf(),
        source,
    })?;
    let reader = BufReader::new(file);
    let mut records = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        records.push(serde_json::from_str(&line)?);
    }
    Ok(records)
}

/// Verify a loaded chain against a public key.
///
/// Scans ascending and stops at the first failure: for each record in the
/// range, the content hash is recomputed from stored fields, the signature
/// is checked, and the previous-hash link is checked against the
/// predecessor (or the genesis constant at sequence 1). An empty range is
/// valid.
pub fn verify_records(
    records: &[InteractionRecord],
    public_key: &[u8],
    from_seq: Option<u64>,
    to_seq: Option<u64>,
) -> VerificationResult {
    let mut by_seq: HashMap<u64, &InteractionRecord> = HashMap::new();
    for record in records {
        if by_seq.insert(record.seq, record).is_some() {
            return VerificationResult::Invalid {
                at_seq: record.seq,
                reason: "duplicate sequence number".to_string(),
            };
        }
    }

    let last = records.iter().map(|r| r.seq).max().unwrap_or(0);
    let from = from_seq.unwrap_or(1);
    let to = to_seq.unwrap_or(last);
    if records.is_empty() || from > to {
        return VerificationResult::Valid { records_checked: 0 };
    }

    let mut checked = 0;
    for seq in from..=to {
        let Some(record) = by_seq.get(&seq) else {
            return VerificationResult::Invalid {
                at_seq: seq,
                reason: "record missing from chain".to_string(),
            };
        };

        if record.compute_content_hash() != record.content_hash {
            return VerificationResult::Invalid {
                at_seq: seq,
                reason: "content hash does not match stored fields".to_string(),
            };
        }
        if !signature_verifies(public_key, &record.content_hash, &record.signature) {
            return VerificationResult::Invalid {
                at_seq: seq,
                reason: "signature verification failed".to_string(),
            };
        }

        let expected_prev = if seq == 1 {
            GENESIS_HASH.to_string()
        } else {
            match by_seq.get(&(seq - 1)) {
                Some(prev) => prev.content_hash.clone(),
                None => {
                    return VerificationResult::Invalid {
                        at_seq: seq,
                        reason: format!("predecessor record {} missing", seq - 1),
                    }
                }
            }
        };
        if record.prev_hash != expected_prev {
            return VerificationResult::Invalid {
                at_seq: seq,
                reason: "previous-hash link broken".to_string(),
            };
        }

        checked += 1;
    }

    VerificationResult::Valid {
        records_checked: checked,
    }
}
