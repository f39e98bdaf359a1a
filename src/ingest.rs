use std::path::Path;

use anyhow::Context;
use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer};
use tracing::info;

use crate::error::PipelineError;
use crate::models::ActivityEvent;

pub const REQUIRED_COLUMNS: [&str; 7] = [
    "event_timestamp",
    "team_id",
    "tool_name",
    "action_type",
    "outcome",
    "satisfaction_score",
    "latency_ms",
];

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}

pub fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid event_timestamp: {raw}")))
}

pub fn load_events_csv(path: &Path) -> anyhow::Result<Vec<ActivityEvent>> {
    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("failed to open {}", path.display()))?;

    let headers = reader.headers()?.clone();
    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|column| !headers.iter().any(|header| header == *column))
        .collect();
    if !missing.is_empty() {
        return Err(PipelineError::Data(format!(
            "{} is missing required columns: {}",
            path.display(),
            missing.join(", ")
        ))
        .into());
    }

    let mut events = Vec::new();
    for (line, result) in reader.deserialize::<ActivityEvent>().enumerate() {
        let event = result.with_context(|| format!("invalid row {} in {}", line + 2, path.display()))?;
        events.push(event);
    }

    info!(rows = events.len(), path = %path.display(), "loaded activity events");
    Ok(events)
}

pub fn cutoff(window_days: i64) -> DateTime<Utc> {
    Utc::now() - Duration::days(window_days.max(1))
}

/// Source rule shared by `run` and `recommend`: Postgres whenever a database is
/// configured, publishing is requested, or no CSV was given.
pub fn reads_database(csv_given: bool, publish: bool, database_configured: bool) -> bool {
    publish || database_configured || !csv_given
}

pub fn within_window(events: Vec<ActivityEvent>, since: DateTime<Utc>) -> Vec<ActivityEvent> {
    events
        .into_iter()
        .filter(|event| event.event_timestamp >= since)
        .collect()
}
