use chrono::{TimeZone, Utc};

use crate::models::ActivityEvent;

pub fn event(
    team_id: &str,
    tool_name: &str,
    action_type: &str,
    outcome: Option<&str>,
    satisfaction_score: Option<i32>,
    latency_ms: i64,
) -> ActivityEvent {
    ActivityEvent {
        event_timestamp: Utc.with_ymd_and_hms(2026, 3, 2, 9, 30, 0).unwrap(),
        team_id: team_id.to_string(),
        tool_name: tool_name.to_string(),
        action_type: action_type.to_string(),
        outcome: outcome.map(str::to_string),
        satisfaction_score,
        latency_ms,
    }
}

/// `count` successful events of one team on one tool.
pub fn usage(team_id: &str, tool_name: &str, count: usize) -> Vec<ActivityEvent> {
    (0..count)
        .map(|_| event(team_id, tool_name, "run", Some("success"), Some(4), 120))
        .collect()
}
