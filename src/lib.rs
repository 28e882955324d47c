//! Sumi-Compass: adaptive crawl planning
//!
//! This crate decides which crawl actions to take next for a domain under a
//! finite request budget, executes those plans through an external fetch
//! collaborator, and learns which action sequences pay off so that later
//! plans (and similar domains) start from experience.

pub mod config;
pub mod execution;
pub mod learning;
pub mod model;
pub mod planner;
pub mod profiler;
pub mod scoring;
pub mod storage;
pub mod telemetry;

use thiserror::Error;

/// Main error type for Sumi-Compass operations
#[derive(Debug, Error)]
pub enum CompassError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Result type alias for Sumi-Compass operations
pub type Result<T> = std::result::Result<T, CompassError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use config::Config;
pub use execution::{ExecutionController, ExecutionPhase, ExecutionSummary, PlanExecution};
pub use model::{Action, ActionType, Candidate, CrawlState, Goal, Plan, PlanContext, PlanStep};
pub use planner::HierarchicalPlanner;
pub use profiler::{Complexity, DomainProfile, DomainProfiler};
pub use scoring::{CostBucket, CostEstimate, CostEstimator, PriorityScorer};
pub use storage::{HistoryStore, PatternStore, SqliteStore};
