use crate::config::ScoringConfig;
use crate::model::{Action, BaseHeuristics};
use crate::scoring::{CostBucket, CostEstimate};

/// Ranks candidate actions
///
/// Scoring is a pure function of its inputs, so repeated planning calls over
/// the same inputs produce the same ranking.
#[derive(Debug, Clone)]
pub struct PriorityScorer {
    config: ScoringConfig,
}

impl PriorityScorer {
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Computes the priority of an action
    ///
    /// # Arguments
    ///
    /// * `action` - The action being ranked
    /// * `heuristics` - Gap, pattern, and real-time adjustment signals
    /// * `expected_value` - Predicted payoff of the action
    /// * `cost` - Cost estimate, if cost-aware scoring is on and one exists
    ///
    /// # Returns
    ///
    /// The priority, clamped to the configured range
    pub fn score(
        &self,
        action: &Action,
        heuristics: &BaseHeuristics,
        expected_value: f64,
        cost: Option<&CostEstimate>,
    ) -> f64 {
        let config = &self.config;

        let mut score = expected_value * config.method_weights.weight(action.kind());

        if heuristics.fills_coverage_gap {
            score += config.gap_bonus;
        }

        if let Some(confidence) = heuristics.pattern_confidence {
            score += config.pattern_bonus * confidence;
        }

        let requests = action.estimated_requests().max(1);
        score += config.efficiency_weight
            * (f64::from(action.estimated_articles()) / f64::from(requests));

        score += heuristics.adjustment;

        let bucket = cost.map(|c| c.bucket).unwrap_or(CostBucket::Medium);
        score += bucket.adjustment() * config.cost_weight;

        if score.is_nan() {
            return config.min_priority;
        }
        score.clamp(config.min_priority, config.max_priority)
    }
}
