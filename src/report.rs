use std::fmt::Write;

use crate::cluster::ClusterAssignment;
use crate::features::FeatureMatrix;
use crate::pipeline::PipelineRun;

/// Mean standardized feature values for one cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterProfile {
    pub cluster_id: usize,
    pub team_count: usize,
    pub means: Vec<f64>,
}

pub fn cluster_profiles(
    matrix: &FeatureMatrix,
    assignments: &ClusterAssignment,
    cluster_count: usize,
) -> Vec<ClusterProfile> {
    let labels: Vec<Option<usize>> = matrix
        .team_ids
        .iter()
        .map(|team_id| assignments.cluster_of(team_id).filter(|id| *id < cluster_count))
        .collect();

    let mut profiles: Vec<ClusterProfile> = (0..cluster_count)
        .map(|cluster_id| ClusterProfile {
            cluster_id,
            team_count: labels.iter().filter(|label| **label == Some(cluster_id)).count(),
            means: Vec::with_capacity(matrix.column_count()),
        })
        .collect();

    for column in &matrix.columns {
        let values = matrix.column_values(column).unwrap_or_default();
        for profile in &mut profiles {
            let total: f64 = values
                .iter()
                .zip(&labels)
                .filter(|(_, label)| **label == Some(profile.cluster_id))
                .map(|(value, _)| value)
                .sum();
            profile.means.push(if profile.team_count == 0 {
                0.0
            } else {
                total / profile.team_count as f64
            });
        }
    }

    profiles
}

pub fn build_report(run: &PipelineRun) -> String {
    let assignments = &run.clusters.assignments;
    let mut output = String::new();

    let _ = writeln!(output, "# Team Tool Recommendations");
    let _ = writeln!(
        output,
        "Generated {} (run {})",
        run.generated_at.to_rfc3339(),
        run.run_id
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Clusters");

    for summary in run.clusters.describe() {
        let teams = assignments.teams_in(summary.cluster_id);
        let _ = writeln!(
            output,
            "- cluster {}: {} teams{}",
            summary.cluster_id,
            summary.team_count,
            if teams.is_empty() {
                String::new()
            } else {
                format!(" ({})", teams.join(", "))
            }
        );
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Team Activity");

    if run.features.metrics.is_empty() {
        let _ = writeln!(output, "No activity recorded for this window.");
    } else {
        for metrics in &run.features.metrics {
            let cluster = assignments
                .cluster_of(&metrics.team_id)
                .map(|id| id.to_string())
                .unwrap_or_else(|| "-".to_string());
            let _ = writeln!(
                output,
                "- {} (cluster {}): {} events across {} tools, avg latency {:.0} ms, avg satisfaction {:.2}",
                metrics.team_id,
                cluster,
                metrics.events_per_day,
                metrics.unique_tools,
                metrics.avg_latency_ms,
                metrics.avg_satisfaction
            );
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Recommendations");

    for (team_id, _) in assignments.iter() {
        let rows: Vec<_> = run.recommendations.for_team(team_id).collect();
        if rows.is_empty() {
            let _ = writeln!(output, "- {team_id}: no new tools adopted by peers");
            continue;
        }
        let tools: Vec<String> = rows
            .iter()
            .map(|row| format!("{} ({:.2})", row.tool_name, row.confidence))
            .collect();
        let _ = writeln!(output, "- {}: {}", team_id, tools.join(", "));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::pipeline;
    use crate::test_support::usage;

    fn sample_run() -> PipelineRun {
        let mut events = usage("team-atlas", "tool-A", 5);
        events.extend(usage("team-borealis", "tool-A", 3));
        events.extend(usage("team-borealis", "tool-B", 2));
        events.extend(usage("team-cosmo", "tool-B", 4));
        let config = PipelineConfig {
            cluster_count: 1,
            ..PipelineConfig::default()
        };
        pipeline::run(&config, &events).unwrap()
    }

    #[test]
    fn profiles_average_rows_per_cluster() {
        let matrix = FeatureMatrix {
            team_ids: vec!["a".into(), "b".into(), "c".into()],
            columns: vec!["x".into()],
            values: vec![vec![1.0], vec![3.0], vec![-2.0]],
        };
        let assignments =
            ClusterAssignment::new(vec![("a".into(), 0), ("b".into(), 0), ("c".into(), 1)]);
        let profiles = cluster_profiles(&matrix, &assignments, 3);
        assert_eq!(profiles.len(), 3);
        assert_eq!(profiles[0].means, vec![2.0]);
        assert_eq!(profiles[1].means, vec![-2.0]);
        assert_eq!(profiles[2].team_count, 0);
        assert_eq!(profiles[2].means, vec![0.0]);
    }

    #[test]
    fn profiles_keep_column_order() {
        let matrix = FeatureMatrix {
            team_ids: vec!["a".into(), "b".into()],
            columns: vec!["x".into(), "y".into()],
            values: vec![vec![1.0, -1.0], vec![3.0, 5.0]],
        };
        let assignments = ClusterAssignment::new(vec![("a".into(), 0), ("b".into(), 0)]);
        let profiles = cluster_profiles(&matrix, &assignments, 1);
        assert_eq!(profiles[0].team_count, 2);
        assert_eq!(profiles[0].means, vec![2.0, 2.0]);
    }

    #[test]
    fn report_lists_every_section() {
        let report = build_report(&sample_run());
        assert!(report.contains("# Team Tool Recommendations"));
        assert!(report.contains("- cluster 0: 3 teams"));
        assert!(report.contains("team-atlas (cluster 0): 5 events across 1 tools"));
        assert!(report.contains("- team-atlas: tool-B (0.50)"));
        assert!(report.contains("- team-borealis: no new tools adopted by peers"));
    }
}
