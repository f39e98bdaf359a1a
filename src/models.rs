use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ingest::deserialize_timestamp;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityEvent {
    #[serde(deserialize_with = "deserialize_timestamp")]
    pub event_timestamp: DateTime<Utc>,
    pub team_id: String,
    pub tool_name: String,
    pub action_type: String,
    pub outcome: Option<String>,
    pub satisfaction_score: Option<i32>,
    pub latency_ms: i64,
}

/// Raw per-team aggregates, kept unscaled for reporting.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TeamMetrics {
    pub team_id: String,
    pub events_per_day: usize,
    pub unique_tools: usize,
    pub avg_latency_ms: f64,
    pub avg_satisfaction: f64,
}

impl TeamMetrics {
    pub const COLUMNS: [&'static str; 4] = [
        "events_per_day",
        "unique_tools",
        "avg_latency_ms",
        "avg_satisfaction",
    ];
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recommendation {
    pub team_id: String,
    pub tool_name: String,
    pub confidence: f64,
    pub cluster_id: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub team_count: usize,
}
