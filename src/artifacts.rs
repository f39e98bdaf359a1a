use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use crate::models::{ClusterSummary, TeamMetrics};
use crate::pipeline::PipelineRun;
use crate::report;

#[derive(Serialize)]
struct AssignmentRecord<'a> {
    team_id: &'a str,
    cluster_id: usize,
}

#[derive(Serialize)]
struct ModelArtifacts<'a> {
    run_id: String,
    generated_at: DateTime<Utc>,
    cluster_assignments: Vec<AssignmentRecord<'a>>,
    cluster_sizes: Vec<ClusterSummary>,
    inertia: f64,
    feature_columns: &'a [String],
    metrics_columns: Vec<&'static str>,
    scaler_mean: &'a [f64],
    scaler_scale: &'a [f64],
}

#[derive(Serialize)]
struct RecommendationRecord<'a> {
    team_id: &'a str,
    tool_name: &'a str,
    confidence: f64,
    cluster_id: usize,
    generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArtifactPaths {
    pub artifacts: PathBuf,
    pub recommendations: PathBuf,
    pub features: PathBuf,
    pub cluster_profile: PathBuf,
    pub report: PathBuf,
}

/// Writes every run artifact into `model_dir`, replacing earlier files.
pub fn write_artifacts(model_dir: &Path, run: &PipelineRun) -> anyhow::Result<ArtifactPaths> {
    std::fs::create_dir_all(model_dir)
        .with_context(|| format!("failed to create {}", model_dir.display()))?;

    let paths = ArtifactPaths {
        artifacts: model_dir.join("artifacts.json"),
        recommendations: model_dir.join("recommendations.csv"),
        features: model_dir.join("features.csv"),
        cluster_profile: model_dir.join("cluster_profile.csv"),
        report: model_dir.join("report.md"),
    };

    let artifacts = ModelArtifacts {
        run_id: run.run_id.to_string(),
        generated_at: run.generated_at,
        cluster_assignments: run
            .clusters
            .assignments
            .iter()
            .map(|(team_id, cluster_id)| AssignmentRecord {
                team_id,
                cluster_id,
            })
            .collect(),
        cluster_sizes: run.clusters.describe(),
        inertia: run.clusters.inertia,
        feature_columns: &run.features.scaler.columns,
        metrics_columns: TeamMetrics::COLUMNS.to_vec(),
        scaler_mean: &run.features.scaler.mean,
        scaler_scale: &run.features.scaler.scale,
    };
    std::fs::write(&paths.artifacts, serde_json::to_string_pretty(&artifacts)?)
        .with_context(|| format!("failed to write {}", paths.artifacts.display()))?;
    info!(path = %paths.artifacts.display(), "persisted model artifacts");

    write_recommendations(&paths.recommendations, run)?;
    write_raw_features(&paths.features, run)?;
    write_cluster_profile(&paths.cluster_profile, run)?;

    std::fs::write(&paths.report, report::build_report(run))
        .with_context(|| format!("failed to write {}", paths.report.display()))?;
    info!(path = %paths.report.display(), "wrote report");

    Ok(paths)
}

fn write_recommendations(path: &Path, run: &PipelineRun) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    if run.recommendations.is_empty() {
        writer.write_record([
            "team_id",
            "tool_name",
            "confidence",
            "cluster_id",
            "generated_at",
        ])?;
    }

    for row in &run.recommendations.rows {
        writer.serialize(RecommendationRecord {
            team_id: &row.team_id,
            tool_name: &row.tool_name,
            confidence: row.confidence,
            cluster_id: row.cluster_id,
            generated_at: run.generated_at,
        })?;
    }
    writer.flush()?;

    info!(
        path = %path.display(),
        rows = run.recommendations.len(),
        "wrote recommendations"
    );
    Ok(())
}

/// The unscaled matrix, in the column order `scaler_mean`/`scaler_scale` align with.
fn write_raw_features(path: &Path, run: &PipelineRun) -> anyhow::Result<()> {
    let raw = &run.features.raw;
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut header = vec!["team_id".to_string()];
    header.extend(raw.columns.iter().cloned());
    writer.write_record(&header)?;

    for team_id in &raw.team_ids {
        let Some(row) = raw.row(team_id) else {
            continue;
        };
        let mut record = vec![team_id.clone()];
        record.extend(row.iter().map(|value| value.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_cluster_profile(path: &Path, run: &PipelineRun) -> anyhow::Result<()> {
    let profiles = report::cluster_profiles(
        &run.features.matrix,
        &run.clusters.assignments,
        run.clusters.cluster_count(),
    );

    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;

    let mut header = vec!["cluster_id".to_string(), "team_count".to_string()];
    header.extend(run.features.matrix.columns.iter().cloned());
    writer.write_record(&header)?;

    for profile in profiles {
        let mut record = vec![profile.cluster_id.to_string(), profile.team_count.to_string()];
        record.extend(profile.means.iter().map(|value| format!("{value:.4}")));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}
