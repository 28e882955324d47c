//! Planning data model
//!
//! - `Action` / `ActionType`: immutable units of crawl work
//! - `Candidate`: an action offered to the planner with its predicted payoff
//! - `PlanStep` / `Plan`: scored, ordered output of a planning call
//! - `CrawlState` / `PlanContext`: what the planner knows about the job
//! - `PatternSignature`: action-type sequence identifying a learned pattern

mod action;
mod plan;
mod signature;

pub use action::{Action, ActionType, BaseHeuristics, Candidate};
pub use plan::{
    performance_ratio, CostObservation, Goal, Plan, PlanStep, SearchStats, StepResult, StepSource,
};
pub use signature::PatternSignature;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Observed progress of a crawl job, handed to the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlState {
    pub hubs_discovered: u64,
    pub articles_collected: u64,
    pub requests_made: u64,

    /// Rolling performance ratio; 1.0 means outcomes match predictions
    pub momentum: f64,

    /// Targets already fetched by this job
    pub explored_targets: BTreeSet<String>,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self {
            hubs_discovered: 0,
            articles_collected: 0,
            requests_made: 0,
            momentum: 1.0,
            explored_targets: BTreeSet::new(),
        }
    }
}

impl CrawlState {
    pub fn is_explored(&self, target: &str) -> bool {
        self.explored_targets.contains(target)
    }
}

/// Domain and candidate set for a planning call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanContext {
    pub domain: String,
    pub candidates: Vec<Candidate>,

    /// Per-type priority adjustments learned during execution
    #[serde(default)]
    pub priority_adjustments: BTreeMap<ActionType, f64>,
}

impl PlanContext {
    pub fn new(domain: impl Into<String>, candidates: Vec<Candidate>) -> Self {
        Self {
            domain: domain.into(),
            candidates,
            priority_adjustments: BTreeMap::new(),
        }
    }

    pub fn adjustment_for(&self, kind: ActionType) -> f64 {
        self.priority_adjustments.get(&kind).copied().unwrap_or(0.0)
    }
}
