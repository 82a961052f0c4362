// executor.rs — Action execution behind a deadline.
//
// The gateway never blocks a request forever on a handler. Execution runs on
// a worker thread and the caller waits up to the configured timeout; a
// handler that overruns is abandoned and the action is recorded as timed out.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::warn;

/// Performs the side effect an allowed action stands for.
///
/// Implementations return the action's result payload on success, or a
/// human-readable failure message. Infrastructure failures belong in the
/// `Err` string; the gateway records them as a failed execution, not as a
/// gateway error.
pub trait ActionExecutor {
    fn execute(&self, action: &str, params: &Map<String, Value>) -> Result<Value, String>;
}

/// How an execution attempt ended.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failure,
    Timeout,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Success => "success",
            ExecutionStatus::Failure => "failure",
            ExecutionStatus::Timeout => "timeout",
        }
    }
}

/// Outcome of running an action through an [`ActionExecutor`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub payload: Value,
}

/// Run `action` on a worker thread, waiting at most `timeout`.
///
/// On timeout the worker is left running detached; its eventual result is
/// discarded. The returned result always carries a JSON payload, even for
/// failures and timeouts, so the audit record has something to hash.
pub fn run_with_timeout(
    executor: Arc<dyn ActionExecutor + Send + Sync>,
    action: &str,
    params: &Map<String, Value>,
    timeout: Duration,
) -> ExecutionResult {
    let (tx, rx) = mpsc::channel();
    let action_owned = action.to_string();
    let params_owned = params.clone();
    thread::spawn(move || {
        let outcome = executor.execute(&action_owned, &params_owned);
        // The receiver is gone if the caller already timed out; nothing to do.
        let _ = tx.send(outcome);
    });

    match rx.recv_timeout(timeout) {
        Ok(Ok(payload)) => ExecutionResult {
            status: ExecutionStatus::Success,
            payload,
        },
        Ok(Err(message)) => {
            warn!(action, error = %message, "action execution failed");
            ExecutionResult {
                status: ExecutionStatus::Failure,
                payload: json!({ "error": message }),
            }
        }
        Err(_) => {
            warn!(action, timeout_ms = timeout.as_millis() as u64, "action execution timed out");
            ExecutionResult {
                status: ExecutionStatus::Timeout,
                payload: json!({ "error": "execution timed out" }),
            }
        }
    }
}

/// Executor that performs no real side effect: it echoes the action and its
/// parameters back as the result payload. Useful for demos and tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct EchoExecutor;

impl ActionExecutor for EchoExecutor {
    fn execute(&self, action: &str, params: &Map<String, Value>) -> Result<Value, String> {
        Ok(json!({ "action": action, "params": Value::Object(params.clone()) }))
    }
}
