//! Candidate scoring
//!
//! - `PriorityScorer`: pure ranking function over a candidate's value,
//!   discovery method, heuristics, and cost
//! - `CostEstimator`: pluggable source of per-action-type cost buckets

mod cost;
mod priority;

pub use cost::{
    CostBucket, CostEstimate, CostEstimator, HistoricalCostEstimator, StaticCostEstimator,
};
pub use priority::PriorityScorer;
