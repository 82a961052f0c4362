// audit.rs — Audit subcommands: log, verify.

use anyhow::Result;
use uuid::Uuid;

use warden_audit::{RecordFilter, VerificationResult};

use crate::home::CliHome;

pub fn log(
    home: &CliHome,
    org_id: Uuid,
    agent_id: Option<String>,
    decision: Option<String>,
    limit: Option<usize>,
    after_seq: Option<u64>,
) -> Result<()> {
    let chain = home.chain()?;
    let filter = RecordFilter {
        after_seq,
        limit,
        agent_id,
        decision,
        ..Default::default()
    };
    let records = chain.read_records(org_id, &filter)?;

    if records.is_empty() {
        println!("No records.");
        return Ok(());
    }

    println!(
        "{:<5} {:<20} {:<14} {:<22} {:<10} RESULT",
        "SEQ", "TIMESTAMP", "AGENT", "ACTION", "DECISION"
    );
    println!("{}", "-".repeat(88));
    for record in &records {
        println!(
            "{:<5} {:<20} {:<14} {:<22} {:<10} {}",
            record.seq,
            record.timestamp.format("%Y-%m-%d %H:%M:%S"),
            record.agent_id,
            record.action,
            record.decision,
            record.result_status.as_deref().unwrap_or("-"),
        );
    }
    Ok(())
}

/// Verify an organization's chain. Returns the process exit code: 0 when
/// the chain is valid, 1 when it is broken, 2 when verification itself
/// failed.
pub fn verify(home: &CliHome, org_id: Uuid, from_seq: Option<u64>, to_seq: Option<u64>) -> i32 {
    match run_verify(home, org_id, from_seq, to_seq) {
        Ok(VerificationResult::Valid { records_checked }) => {
            println!("chain valid: {records_checked} record(s) checked");
            0
        }
        Ok(VerificationResult::Invalid { at_seq, reason }) => {
            println!("chain INVALID at seq {at_seq}: {reason}");
            1
        }
        Err(err) => {
            eprintln!("verification error: {err:#}");
            2
        }
    }
}

fn run_verify(
    home: &CliHome,
    org_id: Uuid,
    from_seq: Option<u64>,
    to_seq: Option<u64>,
) -> Result<VerificationResult> {
    Ok(home.chain()?.verify(org_id, from_seq, to_seq)?)
}
