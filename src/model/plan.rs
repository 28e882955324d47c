use crate::model::{Action, ActionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a plan step came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepSource {
    /// Chosen by plan search from the offered candidates
    #[default]
    SearchGenerated,

    /// Synthesized from a learned pattern
    PatternLearned,

    /// Inserted by the controller after an excellent result
    Synthesized,
}

impl fmt::Display for StepSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::SearchGenerated => "search-generated",
            Self::PatternLearned => "pattern-learned",
            Self::Synthesized => "synthesized",
        };
        write!(f, "{}", name)
    }
}

/// One scheduled action inside a plan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub action: Action,

    /// Predicted payoff of the step
    pub expected_value: f64,

    /// Ranking score from the priority scorer
    pub priority: f64,

    pub source: StepSource,

    /// Predicted duration from the cost estimator, when one was available
    pub expected_cost_ms: Option<f64>,
}

/// Observed result of one executed step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    /// Position of the step in the plan when it ran
    pub step_index: usize,
    pub action_type: ActionType,
    pub target: String,
    pub expected_value: f64,
    pub actual_value: f64,

    /// actual / expected, or 1.0 when nothing was expected
    pub performance_ratio: f64,
    pub duration_ms: f64,
    pub error: Option<String>,

    /// When the result was recorded
    pub timestamp: DateTime<Utc>,
}

/// Expected vs. actual duration of one executed action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostObservation {
    pub action_type: ActionType,
    pub expected_cost_ms: Option<f64>,
    pub actual_cost_ms: f64,
    pub timestamp: DateTime<Utc>,
}

impl CostObservation {
    pub fn new(
        action_type: ActionType,
        expected_cost_ms: Option<f64>,
        actual_cost_ms: f64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            action_type,
            expected_cost_ms,
            actual_cost_ms,
            timestamp,
        }
    }
}

/// Ratio of realized to predicted value
///
/// A step with no expected value counts as meeting expectations.
pub fn performance_ratio(actual: f64, expected: f64) -> f64 {
    if expected <= 0.0 {
        1.0
    } else {
        actual / expected
    }
}

/// Coverage goal for a planning call
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    /// Articles the crawl should discover
    pub articles_target: u64,

    /// Optional cap on requests a single plan may spend
    #[serde(default)]
    pub request_budget: Option<u64>,
}

impl Goal {
    pub fn articles(articles_target: u64) -> Self {
        Self {
            articles_target,
            request_budget: None,
        }
    }

    pub fn with_request_budget(mut self, budget: u64) -> Self {
        self.request_budget = Some(budget);
        self
    }
}

/// Bookkeeping from the branch-and-bound search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    pub nodes_expanded: usize,
    pub nodes_pruned: usize,

    /// The node cap stopped the search before the tree was exhausted
    pub truncated: bool,
}

/// An ordered sequence of scored steps produced by one planning call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub domain: String,
    pub goal: Goal,
    pub steps: Vec<PlanStep>,
    pub lookahead: usize,
    pub branching_factor: usize,
    pub search: SearchStats,
}

impl Plan {
    /// Creates a plan with no steps
    pub fn empty(domain: impl Into<String>, goal: Goal) -> Self {
        Self {
            domain: domain.into(),
            goal,
            steps: Vec::new(),
            lookahead: 0,
            branching_factor: 0,
            search: SearchStats::default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Sum of expected values over all steps
    pub fn expected_value(&self) -> f64 {
        self.steps.iter().map(|s| s.expected_value).sum()
    }

    /// Sum of estimated requests over all steps
    pub fn estimated_requests(&self) -> u64 {
        self.steps
            .iter()
            .map(|s| u64::from(s.action.estimated_requests()))
            .sum()
    }
}
