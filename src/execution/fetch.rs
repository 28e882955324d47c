use crate::model::Action;
use async_trait::async_trait;

/// Result of dispatching one action to the fetch layer
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchOutcome {
    /// Articles (or other units of value) the action produced
    pub actual_value: f64,
    pub duration_ms: f64,

    /// Set when the fetch failed; the value is then treated as zero
    pub error: Option<String>,

    /// Follow-up actions found while executing
    pub discovered: Vec<Action>,
}

impl FetchOutcome {
    pub fn success(actual_value: f64, duration_ms: f64) -> Self {
        Self {
            actual_value,
            duration_ms,
            error: None,
            discovered: Vec::new(),
        }
    }

    pub fn failed(error: impl Into<String>, duration_ms: f64) -> Self {
        Self {
            actual_value: 0.0,
            duration_ms,
            error: Some(error.into()),
            discovered: Vec::new(),
        }
    }

    pub fn with_discovered(mut self, discovered: Vec<Action>) -> Self {
        self.discovered = discovered;
        self
    }

    /// Value credited to the step
    pub fn effective_value(&self) -> f64 {
        if self.error.is_some() || !self.actual_value.is_finite() {
            0.0
        } else {
            self.actual_value.max(0.0)
        }
    }
}

/// Executes crawl actions
///
/// Implementations perform the actual network work; the controller only
/// needs the realized value and duration.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn execute(&self, action: &Action) -> FetchOutcome;
}
