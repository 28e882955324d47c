//! Storage module for persisting planning knowledge
//!
//! This module handles all database operations for the engine, including:
//! - SQLite database initialization and schema management
//! - Learned pattern rows and cross-domain transfer
//! - Domain descriptors used for similarity search
//! - Historical crawl records read by the domain profiler
//! - Cost observations used for cost-model calibration

mod schema;
mod sqlite;
mod traits;

pub use schema::get_schema_version;
pub use sqlite::SqliteStore;
pub use traits::{HistoryStore, PatternStore, StorageError, StorageResult};

use crate::model::PatternSignature;
use serde::Serialize;

/// Minimum samples before a pattern is trusted by `query_good_patterns`
pub const MIN_PATTERN_SAMPLES: u32 = 3;

/// Most recent cost observations kept per action type
pub const COST_OBSERVATION_WINDOW: u32 = 100;

/// A learned `(domain, signature)` success statistic
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    pub domain: String,
    pub signature: PatternSignature,
    pub confidence: f64,
    pub sample_size: u32,
    pub success_count: u32,
    pub failure_count: u32,
    pub avg_value: f64,

    /// True if the row was transferred from another domain
    pub shared: bool,

    /// Domain the row was transferred from
    pub source_domain: Option<String>,
}

impl Pattern {
    /// Fraction of samples that were successes
    pub fn success_rate(&self) -> f64 {
        if self.sample_size == 0 {
            0.0
        } else {
            f64::from(self.success_count) / f64::from(self.sample_size)
        }
    }
}

/// Result of a cross-domain share attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareOutcome {
    /// A new shared row was written
    Inserted,

    /// The target already holds a shared row for this signature
    AlreadyShared,

    /// The target holds a locally learned row (or is the source domain)
    Rejected,
}

/// Tolerance bands for domain similarity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimilarityBands {
    pub lookahead: f64,
    pub branching: f64,
}

/// Persisted planning characteristics of a domain
#[derive(Debug, Clone, PartialEq)]
pub struct DomainDescriptor {
    pub domain: String,
    pub avg_lookahead: f64,
    pub branching_factor: f64,
    pub plan_count: u64,
}

/// Aggregate statistics over a domain's historical crawl records
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DomainAggregates {
    pub page_count: u64,
    pub hub_type_count: u64,
    pub avg_links_per_page: f64,
}

/// A hub page known from historical records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnownHub {
    pub url: String,
    pub hub_type: String,
}
