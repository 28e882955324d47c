//! Plan execution
//!
//! This module drives plans against the fetch layer:
//! - `ExecutionPhase`: lifecycle states and their legal transitions
//! - `PlanExecution`: synchronous per-job state machine (adjustments,
//!   backtracking, re-plan triggers)
//! - `ExecutionController`: async registry of running jobs that dispatches
//!   actions to a `Fetcher`, re-plans, and records learned patterns
//! - `Fetcher`: the boundary to the code that actually crawls

mod controller;
mod fetch;
mod phase;
mod state;

pub use controller::ExecutionController;
pub use fetch::{FetchOutcome, Fetcher};
pub use phase::ExecutionPhase;
pub use state::{
    ExecutionSummary, PerformanceClass, PlanExecution, ReplanApplied, ReplanRequest,
    ScheduledStep, StepReport, SuppressedReplan,
};

use thiserror::Error;

/// Errors surfaced by plan execution
#[derive(Debug, Error)]
pub enum ExecutionError {
    #[error("Unknown job: {0}")]
    UnknownJob(String),

    #[error("Job already registered: {0}")]
    DuplicateJob(String),

    #[error("Job is already being driven: {0}")]
    AlreadyRunning(String),

    #[error("Step out of order: expected {expected}, got {got}")]
    StepOutOfOrder { expected: usize, got: usize },

    #[error("No actionable candidates for job {job_id}")]
    NoActionableCandidates { job_id: String },

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition {
        from: ExecutionPhase,
        to: ExecutionPhase,
    },

    #[error("Planner task failed: {0}")]
    Planner(#[from] tokio::task::JoinError),
}
