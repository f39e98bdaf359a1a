use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::error::PipelineError;
use crate::models::{ActivityEvent, TeamMetrics};

/// Column-name-indexed numeric table with one row per team.
///
/// Columns are discovered from the batch, so two runs over different data
/// generally produce different column sets.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    pub team_ids: Vec<String>,
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl FeatureMatrix {
    pub fn empty(columns: Vec<String>) -> Self {
        Self {
            team_ids: Vec::new(),
            columns,
            values: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.team_ids.len()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.team_ids.is_empty()
    }

    pub fn row(&self, team_id: &str) -> Option<&[f64]> {
        self.team_ids
            .iter()
            .position(|id| id == team_id)
            .map(|index| self.values[index].as_slice())
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|name| name == column)
    }

    pub fn column_values(&self, column: &str) -> Option<Vec<f64>> {
        let index = self.column_index(column)?;
        Some(self.values.iter().map(|row| row[index]).collect())
    }
}

/// Per-column `(mean, scale)` captured when the feature matrix was standardized.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalerParams {
    pub columns: Vec<String>,
    pub mean: Vec<f64>,
    pub scale: Vec<f64>,
}

impl ScalerParams {
    /// Fits population mean and standard deviation per column. Constant
    /// columns keep `scale = 1.0` so re-applying the transform yields 0.
    pub fn fit(raw: &FeatureMatrix) -> Self {
        let rows = raw.row_count();
        let mut mean = Vec::with_capacity(raw.column_count());
        let mut scale = Vec::with_capacity(raw.column_count());

        for index in 0..raw.column_count() {
            if rows == 0 {
                mean.push(0.0);
                scale.push(1.0);
                continue;
            }

            let first = raw.values[0][index];
            if raw.values.iter().all(|row| row[index] == first) {
                mean.push(first);
                scale.push(1.0);
                continue;
            }

            let column_mean = raw.values.iter().map(|row| row[index]).sum::<f64>() / rows as f64;
            let variance = raw
                .values
                .iter()
                .map(|row| (row[index] - column_mean).powi(2))
                .sum::<f64>()
                / rows as f64;
            let std_dev = variance.sqrt();

            mean.push(column_mean);
            scale.push(if std_dev > 0.0 && std_dev.is_finite() {
                std_dev
            } else {
                1.0
            });
        }

        Self {
            columns: raw.columns.clone(),
            mean,
            scale,
        }
    }

    /// Applies the stored transform to a raw matrix with the same column layout.
    pub fn transform(&self, raw: &FeatureMatrix) -> Result<FeatureMatrix, PipelineError> {
        if raw.columns != self.columns {
            return Err(PipelineError::Data(format!(
                "feature columns do not match the fitted scaler ({} fitted, {} supplied)",
                self.columns.len(),
                raw.columns.len()
            )));
        }

        let values = raw
            .values
            .iter()
            .map(|row| {
                row.iter()
                    .enumerate()
                    .map(|(index, value)| {
                        let scale = self.scale[index];
                        if scale == 0.0 {
                            0.0
                        } else {
                            finite_or_zero((value - self.mean[index]) / scale)
                        }
                    })
                    .collect()
            })
            .collect();

        Ok(FeatureMatrix {
            team_ids: raw.team_ids.clone(),
            columns: raw.columns.clone(),
            values,
        })
    }
}

/// Output of the feature stage. `raw` is the pre-standardization matrix the
/// scaler was fitted on; it is persisted so the scaler can be re-applied.
#[derive(Debug, Clone)]
pub struct FeatureSet {
    pub matrix: FeatureMatrix,
    pub raw: FeatureMatrix,
    pub metrics: Vec<TeamMetrics>,
    pub scaler: ScalerParams,
}

pub fn normalize_outcome(outcome: Option<&str>) -> String {
    let value = match outcome {
        Some(value) if !value.is_empty() => value.to_lowercase(),
        _ => return "unknown".to_string(),
    };

    if value.starts_with("succ") {
        "success".to_string()
    } else if value.starts_with("warn") {
        "warning".to_string()
    } else if value.starts_with("fail") || value.starts_with("err") {
        "failure".to_string()
    } else {
        value
    }
}

pub fn outcome_column(outcome: &str) -> String {
    format!("outcome_{outcome}")
}

pub fn tool_column(tool_name: &str) -> String {
    format!("tool_{}", tool_name.replace(' ', "_").to_lowercase())
}

pub fn action_column(action_type: &str) -> String {
    format!("action_{action_type}")
}

fn finite_or_zero(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

#[derive(Default)]
struct TeamAccumulator {
    events: usize,
    tools: BTreeSet<String>,
    latency_total: f64,
    satisfaction_total: f64,
    outcomes: BTreeMap<String, usize>,
    actions: BTreeMap<String, usize>,
    tool_counts: BTreeMap<String, usize>,
}

/// Every column carries a block prefix (`outcome_`, `action_`, `tool_`) except
/// the four aggregates, so column names never collide across blocks.
pub fn build_features(events: &[ActivityEvent]) -> Result<FeatureSet, PipelineError> {
    info!(events = events.len(), "engineering features");

    let metric_columns: Vec<String> = TeamMetrics::COLUMNS.iter().map(|c| c.to_string()).collect();
    if events.is_empty() {
        let raw = FeatureMatrix::empty(metric_columns);
        return Ok(FeatureSet {
            matrix: raw.clone(),
            scaler: ScalerParams::fit(&raw),
            raw,
            metrics: Vec::new(),
        });
    }

    let scores: Vec<i32> = events.iter().filter_map(|e| e.satisfaction_score).collect();
    let satisfaction_fill = if scores.is_empty() {
        0.0
    } else {
        scores.iter().map(|s| f64::from(*s)).sum::<f64>() / scores.len() as f64
    };
    debug!(satisfaction_fill, "imputing missing satisfaction scores");

    let mut teams: BTreeMap<&str, TeamAccumulator> = BTreeMap::new();
    let mut outcome_columns = BTreeSet::new();
    let mut action_columns = BTreeSet::new();
    let mut tool_columns = BTreeSet::new();

    for event in events {
        let outcome = outcome_column(&normalize_outcome(event.outcome.as_deref()));
        let action = action_column(&event.action_type);
        let tool = tool_column(&event.tool_name);

        let entry = teams.entry(event.team_id.as_str()).or_default();
        entry.events += 1;
        entry.tools.insert(event.tool_name.clone());
        entry.latency_total += event.latency_ms as f64;
        entry.satisfaction_total += event
            .satisfaction_score
            .map(f64::from)
            .unwrap_or(satisfaction_fill);
        *entry.outcomes.entry(outcome.clone()).or_insert(0) += 1;
        *entry.actions.entry(action.clone()).or_insert(0) += 1;
        *entry.tool_counts.entry(tool.clone()).or_insert(0) += 1;

        outcome_columns.insert(outcome);
        action_columns.insert(action);
        tool_columns.insert(tool);
    }

    let mut columns = metric_columns;
    columns.extend(outcome_columns.iter().cloned());
    columns.extend(action_columns.iter().cloned());
    columns.extend(tool_columns.iter().cloned());

    let mut team_ids = Vec::with_capacity(teams.len());
    let mut values = Vec::with_capacity(teams.len());
    let mut metrics = Vec::with_capacity(teams.len());

    for (team_id, acc) in &teams {
        let count = acc.events as f64;
        let team_metrics = TeamMetrics {
            team_id: team_id.to_string(),
            events_per_day: acc.events,
            unique_tools: acc.tools.len(),
            avg_latency_ms: finite_or_zero(acc.latency_total / count),
            avg_satisfaction: finite_or_zero(acc.satisfaction_total / count),
        };

        let mut row = vec![
            team_metrics.events_per_day as f64,
            team_metrics.unique_tools as f64,
            team_metrics.avg_latency_ms,
            team_metrics.avg_satisfaction,
        ];
        row.extend(outcome_columns.iter().map(|c| count_of(&acc.outcomes, c)));
        row.extend(action_columns.iter().map(|c| count_of(&acc.actions, c)));
        row.extend(tool_columns.iter().map(|c| count_of(&acc.tool_counts, c)));

        team_ids.push(team_id.to_string());
        values.push(row.into_iter().map(finite_or_zero).collect());
        metrics.push(team_metrics);
    }

    let raw = FeatureMatrix {
        team_ids,
        columns,
        values,
    };
    let scaler = ScalerParams::fit(&raw);
    let matrix = scaler.transform(&raw)?;

    info!(
        teams = matrix.row_count(),
        columns = matrix.column_count(),
        "feature matrix ready"
    );

    Ok(FeatureSet {
        matrix,
        raw,
        metrics,
        scaler,
    })
}

fn count_of(counts: &BTreeMap<String, usize>, column: &str) -> f64 {
    counts.get(column).copied().unwrap_or(0) as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::event;

    fn value(matrix: &FeatureMatrix, team_id: &str, column: &str) -> Option<f64> {
        let index = matrix.column_index(column)?;
        matrix.row(team_id).map(|row| row[index])
    }

    fn column_stats(values: &[f64]) -> (f64, f64) {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        (mean, var.sqrt())
    }

    fn sample_events() -> Vec<ActivityEvent> {
        vec![
            event("team-atlas", "Cloud Build", "build", Some("Succeeded"), Some(5), 100),
            event("team-atlas", "Cloud Build", "deploy", Some("ERROR"), None, 300),
            event("team-borealis", "terraform", "plan", Some("warning"), Some(3), 50),
            event("team-borealis", "cloud-run", "deploy", None, Some(4), 70),
            event("team-cosmo", "bigquery", "query", Some("timeout"), Some(1), 900),
        ]
    }

    #[test]
    fn normalizes_outcome_prefixes() {
        assert_eq!(normalize_outcome(Some("SUCCESS")), "success");
        assert_eq!(normalize_outcome(Some("succeeded")), "success");
        assert_eq!(normalize_outcome(Some("Warn")), "warning");
        assert_eq!(normalize_outcome(Some("failed")), "failure");
        assert_eq!(normalize_outcome(Some("Error")), "failure");
        assert_eq!(normalize_outcome(Some("Timeout")), "timeout");
        assert_eq!(normalize_outcome(Some("")), "unknown");
        assert_eq!(normalize_outcome(None), "unknown");
    }

    #[test]
    fn one_row_per_distinct_team() {
        let features = build_features(&sample_events()).unwrap();
        assert_eq!(features.matrix.row_count(), 3);
        assert_eq!(
            features.matrix.team_ids,
            vec!["team-atlas", "team-borealis", "team-cosmo"]
        );
        assert_eq!(features.metrics.len(), 3);
    }

    #[test]
    fn columns_follow_block_order() {
        let features = build_features(&sample_events()).unwrap();
        assert_eq!(
            features.raw.columns,
            vec![
                "events_per_day",
                "unique_tools",
                "avg_latency_ms",
                "avg_satisfaction",
                "outcome_failure",
                "outcome_success",
                "outcome_timeout",
                "outcome_unknown",
                "outcome_warning",
                "action_build",
                "action_deploy",
                "action_plan",
                "action_query",
                "tool_bigquery",
                "tool_cloud-run",
                "tool_cloud_build",
                "tool_terraform",
            ]
        );
    }

    #[test]
    fn raw_counts_fill_missing_cells_with_zero() {
        let features = build_features(&sample_events()).unwrap();
        assert_eq!(value(&features.raw, "team-atlas", "tool_cloud_build"), Some(2.0));
        assert_eq!(value(&features.raw, "team-atlas", "tool_terraform"), Some(0.0));
        assert_eq!(value(&features.raw, "team-borealis", "outcome_unknown"), Some(1.0));
        assert_eq!(value(&features.raw, "team-cosmo", "action_query"), Some(1.0));
    }

    #[test]
    fn imputes_satisfaction_with_batch_mean() {
        let features = build_features(&sample_events()).unwrap();
        let atlas = &features.metrics[0];
        // batch mean of observed scores is (5 + 3 + 4 + 1) / 4 = 3.25
        assert!((atlas.avg_satisfaction - (5.0 + 3.25) / 2.0).abs() < 1e-9);
        assert!((atlas.avg_latency_ms - 200.0).abs() < 1e-9);
        assert_eq!(atlas.unique_tools, 1);
        assert_eq!(atlas.events_per_day, 2);
    }

    #[test]
    fn missing_satisfaction_column_imputes_zero() {
        let events = vec![
            event("team-atlas", "tool-a", "run", Some("success"), None, 10),
            event("team-borealis", "tool-a", "run", Some("success"), None, 20),
        ];
        let features = build_features(&events).unwrap();
        assert!(features.metrics.iter().all(|m| m.avg_satisfaction == 0.0));
    }

    #[test]
    fn standardized_columns_have_zero_mean_and_unit_variance() {
        let features = build_features(&sample_events()).unwrap();
        for column in &features.matrix.columns {
            let values = features.matrix.column_values(column).unwrap();
            let (mean, std_dev) = column_stats(&values);
            assert!(mean.abs() < 1e-9, "{column} mean {mean}");
            assert!(
                (std_dev - 1.0).abs() < 1e-9 || std_dev == 0.0,
                "{column} std {std_dev}"
            );
        }
    }

    #[test]
    fn constant_column_standardizes_to_zero() {
        let events = vec![
            event("team-atlas", "tool-a", "run", Some("success"), Some(3), 10),
            event("team-borealis", "tool-a", "run", Some("success"), Some(3), 20),
        ];
        let features = build_features(&events).unwrap();
        let values = features.matrix.column_values("tool_tool-a").unwrap();
        assert!(values.iter().all(|v| *v == 0.0));
        let index = features.matrix.column_index("tool_tool-a").unwrap();
        assert_eq!(features.scaler.scale[index], 1.0);
    }

    #[test]
    fn empty_input_yields_zero_rows() {
        let features = build_features(&[]).unwrap();
        assert!(features.matrix.is_empty());
        assert!(features.metrics.is_empty());
        assert_eq!(features.scaler.mean.len(), features.matrix.column_count());
    }

    #[test]
    fn non_finite_values_become_zero() {
        assert_eq!(finite_or_zero(f64::INFINITY), 0.0);
        assert_eq!(finite_or_zero(f64::NEG_INFINITY), 0.0);
        assert_eq!(finite_or_zero(f64::NAN), 0.0);
        assert_eq!(finite_or_zero(2.5), 2.5);
    }

    #[test]
    fn scaler_reapplies_to_raw_matrix() {
        let features = build_features(&sample_events()).unwrap();
        let again = features.scaler.transform(&features.raw).unwrap();
        assert_eq!(again, features.matrix);
    }

    #[test]
    fn scaler_rejects_misaligned_columns() {
        let features = build_features(&sample_events()).unwrap();
        let mut raw = features.raw.clone();
        raw.columns.swap(0, 1);
        assert!(matches!(
            features.scaler.transform(&raw),
            Err(PipelineError::Data(_))
        ));
    }

    #[test]
    fn outcome_named_like_another_block_keeps_its_own_column() {
        let events = vec![
            event("team-atlas", "tool-a", "build", Some("action_build"), Some(4), 10),
            event("team-borealis", "tool-a", "deploy", Some("events_per_day"), Some(4), 20),
        ];
        let features = build_features(&events).unwrap();
        let columns = &features.raw.columns;
        let unique: BTreeSet<&String> = columns.iter().collect();
        assert_eq!(unique.len(), columns.len());
        assert_eq!(value(&features.raw, "team-atlas", "action_build"), Some(1.0));
        assert_eq!(value(&features.raw, "team-atlas", "outcome_action_build"), Some(1.0));
        assert_eq!(value(&features.raw, "team-borealis", "events_per_day"), Some(1.0));
        assert_eq!(value(&features.raw, "team-borealis", "outcome_events_per_day"), Some(1.0));
    }

    #[test]
    fn row_lookup_by_team() {
        let features = build_features(&sample_events()).unwrap();
        let row = features.raw.row("team-cosmo").unwrap();
        assert_eq!(row.len(), features.raw.column_count());
        assert_eq!(row[0], 1.0);
        assert!(features.raw.row("team-ghost").is_none());
    }

    #[test]
    fn tool_names_are_slugged() {
        assert_eq!(tool_column("Cloud Build"), "tool_cloud_build");
        assert_eq!(action_column("deploy"), "action_deploy");
        assert_eq!(outcome_column("success"), "outcome_success");
    }
}
