use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::{info, warn};

use crate::cluster::ClusterAssignment;
use crate::models::{ActivityEvent, Recommendation};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecommendationResult {
    pub rows: Vec<Recommendation>,
}

impl RecommendationResult {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn for_team<'a>(&'a self, team_id: &'a str) -> impl Iterator<Item = &'a Recommendation> {
        self.rows.iter().filter(move |row| row.team_id == team_id)
    }
}

struct Candidate<'a> {
    tool_name: &'a str,
    team_count: usize,
    confidence: f64,
}

/// Recommends tools adopted by cluster peers that a team has not used yet.
///
/// Confidence divides a tool's peer adoption by the cluster's total adoption
/// across every tool, including the ones the team already uses.
pub fn recommend_tools(
    assignments: &ClusterAssignment,
    events: &[ActivityEvent],
    top_n: usize,
) -> RecommendationResult {
    info!(teams = assignments.len(), "generating recommendations");

    let cluster_of: HashMap<&str, usize> = assignments.iter().collect();

    // cluster -> tool -> teams that used it
    let mut adopters: HashMap<usize, BTreeMap<&str, HashSet<&str>>> = HashMap::new();
    let mut team_usage: HashMap<&str, HashMap<&str, usize>> = HashMap::new();
    let mut unassigned = 0usize;

    for event in events {
        let Some(cluster_id) = cluster_of.get(event.team_id.as_str()) else {
            unassigned += 1;
            continue;
        };
        adopters
            .entry(*cluster_id)
            .or_default()
            .entry(event.tool_name.as_str())
            .or_default()
            .insert(event.team_id.as_str());
        *team_usage
            .entry(event.team_id.as_str())
            .or_default()
            .entry(event.tool_name.as_str())
            .or_insert(0) += 1;
    }

    if unassigned > 0 {
        warn!(events = unassigned, "skipping events from teams without a cluster");
    }

    let no_usage = HashMap::new();
    let mut rows = Vec::new();

    for (team_id, cluster_id) in assignments.iter() {
        let Some(peer_tools) = adopters.get(&cluster_id) else {
            continue;
        };
        let used = team_usage.get(team_id).unwrap_or(&no_usage);

        let denominator: usize = peer_tools.values().map(HashSet::len).sum();

        let mut candidates: Vec<Candidate> = peer_tools
            .iter()
            .filter(|(tool, _)| used.get(*tool).copied().unwrap_or(0) == 0)
            .map(|(tool, teams)| Candidate {
                tool_name: *tool,
                team_count: teams.len(),
                confidence: confidence(teams.len(), denominator),
            })
            .collect();

        if candidates.is_empty() {
            continue;
        }

        candidates.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.team_count.cmp(&a.team_count))
        });

        rows.extend(candidates.into_iter().take(top_n).map(|candidate| Recommendation {
            team_id: team_id.to_string(),
            tool_name: candidate.tool_name.to_string(),
            confidence: candidate.confidence,
            cluster_id,
        }));
    }

    if rows.is_empty() {
        warn!("no recommendations generated");
    } else {
        info!(recommendations = rows.len(), "generated recommendations");
    }

    RecommendationResult { rows }
}

fn confidence(team_count: usize, denominator: usize) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        team_count as f64 / denominator as f64
    }
}
