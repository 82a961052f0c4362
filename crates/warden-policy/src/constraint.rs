// constraint.rs — Rule constraints as data.
//
// Each PolicyRule carries a list of constraints, each a tagged variant
// evaluated by a small pure check. All constraints on a rule are ANDed: the
// rule matches only if every constraint it declares is satisfied. Anything
// that cannot be evaluated (missing parameter, non-numeric value where a
// number is required, nonsense offset) is unsatisfied, never a pass.

use chrono::{DateTime, Datelike, FixedOffset, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::usage::{UsageSource, UsageWindow};

/// One predicate on a policy rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Constraint {
    /// The named parameter must equal `value` exactly.
    ParamEquals { param: String, value: Value },

    /// The named parameter must be a number within the inclusive bounds.
    /// Either bound may be omitted for a one-sided range.
    ParamInRange {
        param: String,
        min: Option<f64>,
        max: Option<f64>,
    },

    /// The named parameter must be one of the listed values.
    ParamOneOf { param: String, values: Vec<Value> },

    /// The agent's cumulative cost in the window must not exceed `limit`.
    /// The total comes from the engine's `UsageSource`.
    Budget { limit: f64, window: UsageWindow },

    /// The agent must have performed fewer than `max_actions` actions in the
    /// window; the request being evaluated counts toward the limit.
    Rate { max_actions: u64, window: UsageWindow },

    /// The request must arrive within the hour range [start_hour, end_hour)
    /// on one of `days`, measured at a fixed UTC offset. `start_hour >
    /// end_hour` wraps past midnight; an empty `days` list means any day.
    TimeWindow {
        start_hour: u8,
        end_hour: u8,
        days: Vec<Weekday>,
        utc_offset_minutes: i32,
    },
}

/// Everything a constraint may consult during evaluation.
pub(crate) struct ConstraintContext<'a> {
    pub org_id: Uuid,
    pub agent_id: &'a str,
    pub params: &'a Map<String, Value>,
    pub usage: &'a dyn UsageSource,
    pub now: DateTime<Utc>,
}

impl Constraint {
    pub(crate) fn is_satisfied(&self, ctx: &ConstraintContext<'_>) -> bool {
        match self {
            Constraint::ParamEquals { param, value } => ctx.params.get(param) == Some(value),

            Constraint::ParamInRange { param, min, max } => {
                let Some(v) = ctx.params.get(param).and_then(Value::as_f64) else {
                    return false;
                };
                min.map_or(true, |lo| v >= lo) && max.map_or(true, |hi| v <= hi)
            }

            Constraint::ParamOneOf { param, values } => ctx
                .params
                .get(param)
                .is_some_and(|v| values.contains(v)),

            Constraint::Budget { limit, window } => {
                ctx.usage.usage(ctx.org_id, ctx.agent_id, *window) <= *limit
            }

            Constraint::Rate {
                max_actions,
                window,
            } => ctx.usage.action_count(ctx.org_id, ctx.agent_id, *window) < *max_actions,

            Constraint::TimeWindow {
                start_hour,
                end_hour,
                days,
                utc_offset_minutes,
            } => in_time_window(ctx.now, *start_hour, *end_hour, days, *utc_offset_minutes),
        }
    }
}

fn in_time_window(
    now: DateTime<Utc>,
    start_hour: u8,
    end_hour: u8,
    days: &[Weekday],
    utc_offset_minutes: i32,
) -> bool {
    let Some(offset) = FixedOffset::east_opt(utc_offset_minutes * 60) else {
        // An impossible offset cannot be satisfied.
        return false;
    };
    let local = now.with_timezone(&offset);

    if !days.is_empty() && !days.contains(&local.weekday()) {
        return false;
    }

    let hour = local.hour() as u8;
    if start_hour < end_hour {
        hour >= start_hour && hour < end_hour
    } else if start_hour > end_hour {
        // Wraps past midnight, e.g. 22..6.
        hour >= start_hour || hour < end_hour
    } else {
        // start == end covers the whole day.
        true
    }
}
