//! Action cost estimation
//!
//! Cost estimates are coarse: the scorer only cares which duration bucket an
//! action falls into. Estimators are pluggable so a deployment can feed in
//! its own latency model; the historical estimator calibrates itself from
//! observations recorded during execution.

use crate::model::ActionType;
use crate::storage::HistoryStore;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Coarse duration class of an action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CostBucket {
    Low,
    Medium,
    High,
}

impl CostBucket {
    /// Buckets a duration: under 100ms low, up to 500ms medium, above high
    pub fn from_duration_ms(duration_ms: f64) -> Self {
        if duration_ms < 100.0 {
            Self::Low
        } else if duration_ms <= 500.0 {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Unweighted priority adjustment for the bucket
    pub fn adjustment(&self) -> f64 {
        match self {
            Self::Low => 15.0,
            Self::Medium => 0.0,
            Self::High => -10.0,
        }
    }
}

impl fmt::Display for CostBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        };
        write!(f, "{}", name)
    }
}

/// Predicted cost of an action
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CostEstimate {
    pub bucket: CostBucket,
    pub expected_duration_ms: Option<f64>,
}

impl CostEstimate {
    pub fn from_duration_ms(duration_ms: f64) -> Self {
        Self {
            bucket: CostBucket::from_duration_ms(duration_ms),
            expected_duration_ms: Some(duration_ms),
        }
    }
}

/// Source of cost estimates for the scorer
pub trait CostEstimator: Send + Sync {
    /// Estimates the cost of an action type, or None if unknown
    fn estimate_cost(&self, kind: ActionType) -> Option<CostEstimate>;
}

/// Fixed per-type durations
#[derive(Debug, Clone, Default)]
pub struct StaticCostEstimator {
    durations_ms: HashMap<ActionType, f64>,
}

impl StaticCostEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, kind: ActionType, duration_ms: f64) -> Self {
        self.durations_ms.insert(kind, duration_ms);
        self
    }
}

impl CostEstimator for StaticCostEstimator {
    fn estimate_cost(&self, kind: ActionType) -> Option<CostEstimate> {
        self.durations_ms
            .get(&kind)
            .copied()
            .map(CostEstimate::from_duration_ms)
    }
}

/// Estimates costs from recorded execution durations
pub struct HistoricalCostEstimator {
    history: Arc<dyn HistoryStore>,
    min_samples: u64,
}

impl HistoricalCostEstimator {
    /// Observations required before an action type gets an estimate
    pub const DEFAULT_MIN_SAMPLES: u64 = 3;

    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self {
            history,
            min_samples: Self::DEFAULT_MIN_SAMPLES,
        }
    }

    pub fn with_min_samples(mut self, min_samples: u64) -> Self {
        self.min_samples = min_samples;
        self
    }
}

impl CostEstimator for HistoricalCostEstimator {
    fn estimate_cost(&self, kind: ActionType) -> Option<CostEstimate> {
        match self.history.average_cost(kind) {
            Ok(Some((avg_ms, samples))) if samples >= self.min_samples => {
                Some(CostEstimate::from_duration_ms(avg_ms))
            }
            Ok(_) => None,
            Err(e) => {
                tracing::warn!("Failed to read cost observations for {}: {}", kind, e);
                None
            }
        }
    }
}
