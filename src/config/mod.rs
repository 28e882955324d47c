//! Configuration module for Sumi-Compass
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//! Thresholds and feature toggles live here so operators can tune the engine
//! without a rebuild.
//!
//! # Example
//!
//! ```no_run
//! use sumi_compass::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("compass.toml")).unwrap();
//! println!("Re-plan cooldown: {}s", config.execution.replan_cooldown_secs);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, ExecutionConfig, FeatureToggles, MethodWeights, PlannerConfig, ScoringConfig,
    SharingConfig, StorageConfig,
};

// Re-export parser functions
pub use parser::{compute_config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
