// token.rs — Issue capability tokens.

use anyhow::Result;
use chrono::Duration;
use uuid::Uuid;

use crate::home::CliHome;

pub fn issue(
    home: &CliHome,
    agent_id: &str,
    org_id: Uuid,
    scopes: &[String],
    ttl_hours: i64,
) -> Result<()> {
    let codec = home.token_codec()?;
    let token = codec.issue(agent_id, org_id, scopes, Duration::hours(ttl_hours))?;

    // The wire token alone goes to stdout so it can be piped or captured.
    eprintln!(
        "token_id: {}  expires_at: {}",
        token.claims.token_id, token.claims.expires_at
    );
    println!("{}", token.encode());
    Ok(())
}
