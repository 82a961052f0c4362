// usage.rs — External usage totals for budget and rate constraints.
//
// The engine treats running totals as an input. Whatever tracks spend and
// action counts (a metering service, a database, a test stub) implements
// `UsageSource`; the engine just asks and compares.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The accounting window a budget or rate constraint is measured over.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum UsageWindow {
    Hour,
    Day,
    Week,
    Month,
}

/// Supplies cumulative usage totals for an agent within a window.
pub trait UsageSource {
    /// Cumulative approved-action cost for the agent in the window.
    fn usage(&self, org_id: Uuid, agent_id: &str, window: UsageWindow) -> f64;

    /// Number of actions the agent has performed in the window.
    fn action_count(&self, org_id: Uuid, agent_id: &str, window: UsageWindow) -> u64;
}

/// A source that reports zero usage for everyone.
///
/// Budget and rate constraints always pass against it. Useful for engines
/// whose rule sets carry no usage constraints, and for tests.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZeroUsage;

impl UsageSource for ZeroUsage {
    fn usage(&self, _org_id: Uuid, _agent_id: &str, _window: UsageWindow) -> f64 {
        0.0
    }

    fn action_count(&self, _org_id: Uuid, _agent_id: &str, _window: UsageWindow) -> u64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_usage_reports_nothing() {
        let org = Uuid::new_v4();
        assert_eq!(ZeroUsage.usage(org, "agent-1", UsageWindow::Day), 0.0);
        assert_eq!(ZeroUsage.action_count(org, "agent-1", UsageWindow::Hour), 0);
    }

    #[test]
    fn window_serializes_snake_case() {
        let json = serde_json::to_string(&UsageWindow::Week).unwrap();
        assert_eq!(json, "\"week\"");
    }
}
