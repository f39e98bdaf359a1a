use chrono::{DateTime, Utc};
use tracing::info;
use uuid::Uuid;

use crate::cluster::{self, ClusterModel, ClusterParams};
use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::features::{self, FeatureSet};
use crate::models::ActivityEvent;
use crate::recommend::{self, RecommendationResult};

/// Everything one run produces, handed to the artifact writers.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub run_id: Uuid,
    pub generated_at: DateTime<Utc>,
    pub features: FeatureSet,
    pub clusters: ClusterModel,
    pub recommendations: RecommendationResult,
}

/// Features, clusters, then recommendations. The first failing stage ends the run.
pub fn run(config: &PipelineConfig, events: &[ActivityEvent]) -> Result<PipelineRun, PipelineError> {
    config.validate()?;

    let run_id = Uuid::new_v4();
    info!(%run_id, events = events.len(), "starting recommendation pipeline");

    let features = features::build_features(events)?;
    let clusters = cluster::fit_clusters(
        &features.matrix,
        &ClusterParams {
            cluster_count: config.cluster_count,
            seed: config.seed,
            batch_size: config.batch_size,
            max_iter: config.max_iter,
        },
    )?;
    let recommendations =
        recommend::recommend_tools(&clusters.assignments, events, config.recommendation_count);

    Ok(PipelineRun {
        run_id,
        generated_at: Utc::now(),
        features,
        clusters,
        recommendations,
    })
}
