use rand::Rng;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::error::PipelineError;
use crate::features::FeatureMatrix;
use crate::models::ClusterSummary;

const SHIFT_TOLERANCE: f64 = 1e-4;
const MAX_STALE_ITERATIONS: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct ClusterParams {
    pub cluster_count: usize,
    pub seed: u64,
    pub batch_size: usize,
    pub max_iter: usize,
}

/// Team to cluster mapping in feature-matrix row order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterAssignment {
    entries: Vec<(String, usize)>,
}

impl ClusterAssignment {
    pub fn new(entries: Vec<(String, usize)>) -> Self {
        Self { entries }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.entries.iter().map(|(team, cluster)| (team.as_str(), *cluster))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn cluster_of(&self, team_id: &str) -> Option<usize> {
        self.entries
            .iter()
            .find(|(team, _)| team == team_id)
            .map(|(_, cluster)| *cluster)
    }

    pub fn teams_in(&self, cluster_id: usize) -> Vec<&str> {
        self.iter()
            .filter(|(_, cluster)| *cluster == cluster_id)
            .map(|(team, _)| team)
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ClusterModel {
    pub assignments: ClusterAssignment,
    pub centers: Vec<Vec<f64>>,
    pub inertia: f64,
}

impl ClusterModel {
    pub fn cluster_count(&self) -> usize {
        self.centers.len()
    }

    /// Teams per cluster, including clusters that ended up empty.
    pub fn describe(&self) -> Vec<ClusterSummary> {
        (0..self.cluster_count())
            .map(|cluster_id| ClusterSummary {
                cluster_id,
                team_count: self.assignments.teams_in(cluster_id).len(),
            })
            .collect()
    }
}

/// Mini-batch k-means over the standardized matrix.
///
/// Identical matrix and seed give identical labels. Labels are not stable
/// across different seeds or inputs.
pub fn fit_clusters(
    matrix: &FeatureMatrix,
    params: &ClusterParams,
) -> Result<ClusterModel, PipelineError> {
    let rows = matrix.row_count();
    let k = params.cluster_count;

    if matrix.is_empty() {
        return Err(PipelineError::Configuration(
            "no teams available to cluster".to_string(),
        ));
    }
    if k == 0 {
        return Err(PipelineError::Configuration(
            "cluster_count must be at least 1".to_string(),
        ));
    }
    if k > rows {
        return Err(PipelineError::Configuration(format!(
            "cluster_count {k} exceeds the number of teams ({rows})"
        )));
    }
    if params.batch_size == 0 {
        return Err(PipelineError::Configuration(
            "batch_size must be at least 1".to_string(),
        ));
    }

    info!(k, teams = rows, seed = params.seed, "fitting mini-batch k-means");

    let mut rng = ChaCha8Rng::seed_from_u64(params.seed);
    let mut centers = init_centers(&matrix.values, k, &mut rng);
    let mut counts = vec![0usize; k];
    let batch_size = params.batch_size.min(rows);
    let mut stale = 0usize;

    for iteration in 0..params.max_iter {
        let previous = centers.clone();

        for _ in 0..batch_size {
            let point = &matrix.values[rng.gen_range(0..rows)];
            let (label, _) = nearest(point, &centers);
            counts[label] += 1;
            let rate = 1.0 / counts[label] as f64;
            for (center_value, value) in centers[label].iter_mut().zip(point) {
                *center_value += rate * (value - *center_value);
            }
        }

        let shift: f64 = previous
            .iter()
            .zip(&centers)
            .map(|(before, after)| squared_distance(before, after))
            .sum();

        if shift < SHIFT_TOLERANCE {
            stale += 1;
            if stale >= MAX_STALE_ITERATIONS {
                debug!(iteration, "centers converged");
                break;
            }
        } else {
            stale = 0;
        }
    }

    let mut inertia = 0.0;
    let mut entries = Vec::with_capacity(rows);
    for (team_id, point) in matrix.team_ids.iter().zip(&matrix.values) {
        let (label, distance) = nearest(point, &centers);
        inertia += distance;
        entries.push((team_id.clone(), label));
    }

    let model = ClusterModel {
        assignments: ClusterAssignment::new(entries),
        centers,
        inertia,
    };

    for summary in model.describe() {
        info!(
            cluster_id = summary.cluster_id,
            teams = summary.team_count,
            "cluster size"
        );
    }

    Ok(model)
}

/// k-means++ seeding. Once every remaining point coincides with a chosen
/// center, the lowest unchosen row is taken.
fn init_centers(points: &[Vec<f64>], k: usize, rng: &mut ChaCha8Rng) -> Vec<Vec<f64>> {
    let mut chosen = vec![rng.gen_range(0..points.len())];

    while chosen.len() < k {
        let weights: Vec<f64> = points
            .iter()
            .map(|point| {
                chosen
                    .iter()
                    .map(|index| squared_distance(point, &points[*index]))
                    .fold(f64::INFINITY, f64::min)
            })
            .collect();
        let total: f64 = weights.iter().sum();

        let next = if total > 0.0 && total.is_finite() {
            let target = rng.gen::<f64>() * total;
            let mut cumulative = 0.0;
            let mut picked = None;
            for (index, weight) in weights.iter().enumerate() {
                cumulative += weight;
                if *weight > 0.0 && cumulative >= target {
                    picked = Some(index);
                    break;
                }
            }
            picked.or_else(|| weights.iter().rposition(|weight| *weight > 0.0))
        } else {
            None
        };

        let next = next
            .or_else(|| (0..points.len()).find(|index| !chosen.contains(index)))
            .unwrap_or(0);
        chosen.push(next);
    }

    chosen.into_iter().map(|index| points[index].clone()).collect()
}

fn nearest(point: &[f64], centers: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (index, center) in centers.iter().enumerate() {
        let distance = squared_distance(point, center);
        if distance < best.1 {
            best = (index, distance);
        }
    }
    best
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}
