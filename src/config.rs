use std::path::PathBuf;

use crate::error::PipelineError;

/// Settings for one pipeline run, passed explicitly into every stage.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub cluster_count: usize,
    pub recommendation_count: usize,
    pub seed: u64,
    pub batch_size: usize,
    pub max_iter: usize,
    pub feature_window_days: i64,
    pub model_dir: PathBuf,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cluster_count: 3,
            recommendation_count: 5,
            seed: 42,
            batch_size: 16,
            max_iter: 100,
            feature_window_days: 28,
            model_dir: PathBuf::from("artifacts"),
        }
    }
}

impl PipelineConfig {
    /// Rejects settings that can never produce a valid run, before any data is read.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.cluster_count == 0 {
            return Err(PipelineError::Configuration(
                "cluster_count must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::Configuration(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.max_iter == 0 {
            return Err(PipelineError::Configuration(
                "max_iter must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
