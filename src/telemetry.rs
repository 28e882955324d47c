//! Planning and execution telemetry
//!
//! Events are emitted through a `TelemetrySink`. The default sink turns them
//! into structured `tracing` events; `CollectingTelemetry` keeps them in
//! memory for assertions.

use crate::model::PatternSignature;
use serde::Serialize;
use std::sync::Mutex;

/// Why a re-plan was requested
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplanReason {
    /// Processed requests crossed a multiple of the re-plan interval
    RequestInterval,

    /// Rolling performance drifted too far from predictions
    PerformanceDeviation,

    /// Too many backtracks since the last re-plan
    BacktrackLimit,

    /// The plan ran out while the goal is unmet
    PlanExhausted,
}

impl ReplanReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequestInterval => "request-interval",
            Self::PerformanceDeviation => "performance-deviation",
            Self::BacktrackLimit => "backtrack-limit",
            Self::PlanExhausted => "plan-exhausted",
        }
    }
}

impl std::fmt::Display for ReplanReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Notable events during planning and execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum TelemetryEvent {
    Replanned {
        job_id: String,
        reason: ReplanReason,
        new_steps: usize,
        total_steps: usize,
        replan_count: u32,
    },
    ReplanSuppressed {
        job_id: String,
        reason: ReplanReason,
        seconds_since_last: i64,
    },
    Backtracked {
        job_id: String,
        from_step: usize,
        to_step: usize,
        backtrack_count: u32,
    },
    PatternTransferred {
        source_domain: String,
        target_domain: String,
        signature: PatternSignature,
        confidence: f64,
    },
    ExecutionFinished {
        job_id: String,
        domain: String,
        aborted: bool,
        steps_executed: usize,
        actual_value: f64,
        replan_count: u32,
        patterns_recorded: usize,
    },
}

/// Receives telemetry events
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &TelemetryEvent);
}

/// Logs every event as a structured tracing event
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTelemetry;

impl TelemetrySink for TracingTelemetry {
    fn emit(&self, event: &TelemetryEvent) {
        match event {
            TelemetryEvent::Replanned {
                job_id,
                reason,
                new_steps,
                total_steps,
                replan_count,
            } => tracing::info!(
                job_id = %job_id,
                reason = %reason,
                new_steps,
                total_steps,
                replan_count,
                "Re-planned"
            ),
            TelemetryEvent::ReplanSuppressed {
                job_id,
                reason,
                seconds_since_last,
            } => tracing::info!(
                job_id = %job_id,
                reason = %reason,
                seconds_since_last,
                "Re-plan suppressed by cooldown"
            ),
            TelemetryEvent::Backtracked {
                job_id,
                from_step,
                to_step,
                backtrack_count,
            } => tracing::debug!(
                job_id = %job_id,
                from_step,
                to_step,
                backtrack_count,
                "Backtracked"
            ),
            TelemetryEvent::PatternTransferred {
                source_domain,
                target_domain,
                signature,
                confidence,
            } => tracing::info!(
                source = %source_domain,
                target = %target_domain,
                signature = %signature,
                confidence,
                "Transferred pattern"
            ),
            TelemetryEvent::ExecutionFinished {
                job_id,
                domain,
                aborted,
                steps_executed,
                actual_value,
                replan_count,
                patterns_recorded,
            } => tracing::info!(
                job_id = %job_id,
                domain = %domain,
                aborted,
                steps_executed,
                actual_value,
                replan_count,
                patterns_recorded,
                "Execution finished"
            ),
        }
    }
}

/// Keeps every event in memory
#[derive(Debug, Default)]
pub struct CollectingTelemetry {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl CollectingTelemetry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event emitted so far
    pub fn events(&self) -> Vec<TelemetryEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl TelemetrySink for CollectingTelemetry {
    fn emit(&self, event: &TelemetryEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_sink_keeps_order() {
        let sink = CollectingTelemetry::new();
        sink.emit(&TelemetryEvent::ReplanSuppressed {
            job_id: "job-1".to_string(),
            reason: ReplanReason::RequestInterval,
            seconds_since_last: 10,
        });
        sink.emit(&TelemetryEvent::Backtracked {
            job_id: "job-1".to_string(),
            from_step: 3,
            to_step: 1,
            backtrack_count: 1,
        });

        let events = sink.events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TelemetryEvent::ReplanSuppressed { .. }));
        assert!(matches!(events[1], TelemetryEvent::Backtracked { .. }));
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = TelemetryEvent::Replanned {
            job_id: "job-1".to_string(),
            reason: ReplanReason::PlanExhausted,
            new_steps: 3,
            total_steps: 7,
            replan_count: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "replanned");
        assert_eq!(json["reason"], "plan-exhausted");
    }

    #[test]
    fn test_tracing_sink_accepts_every_event() {
        let sink = TracingTelemetry;
        sink.emit(&TelemetryEvent::PatternTransferred {
            source_domain: "a.example".to_string(),
            target_domain: "b.example".to_string(),
            signature: "explore-hub→explore-hub".parse().unwrap(),
            confidence: 0.4,
        });
    }
}
