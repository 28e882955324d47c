//! Storage traits and error types
//!
//! This module defines the trait interfaces for the persistent stores and
//! associated error types. Implementations take `&self` and must be safe to
//! share across concurrently running crawl jobs; every mutating operation is
//! a single atomic statement.

use crate::model::{ActionType, CostObservation, PatternSignature};
use crate::storage::{
    DomainAggregates, DomainDescriptor, KnownHub, Pattern, ShareOutcome,
    SimilarityBands,
};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Corrupt row: {0}")]
    CorruptRow(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Learned pattern persistence shared by all crawl jobs
pub trait PatternStore: Send + Sync {
    // ===== Outcomes =====

    /// Records one outcome for `(domain, signature)`
    ///
    /// Increments the success or failure count and the sample size, and
    /// folds `value` into the running average. Creates the row if absent.
    /// Two identical calls count as two samples.
    fn record_outcome(
        &self,
        domain: &str,
        signature: &PatternSignature,
        success: bool,
        value: f64,
    ) -> StorageResult<()>;

    // ===== Queries =====

    /// Returns patterns whose success rate and average value meet both
    /// thresholds, best first
    ///
    /// Patterns backed by fewer than `MIN_PATTERN_SAMPLES` samples are
    /// never returned.
    fn query_good_patterns(
        &self,
        domain: &str,
        min_success_rate: f64,
        min_avg_value: f64,
    ) -> StorageResult<Vec<Pattern>>;

    /// Gets a single pattern row
    fn get_pattern(
        &self,
        domain: &str,
        signature: &PatternSignature,
    ) -> StorageResult<Option<Pattern>>;

    /// Gets every pattern row for a domain
    fn list_patterns(&self, domain: &str) -> StorageResult<Vec<Pattern>>;

    // ===== Cross-domain transfer =====

    /// Returns domains whose planning characteristics lie within `bands`
    /// of `domain`'s own descriptor, closest first
    fn find_similar_domains(
        &self,
        domain: &str,
        max_results: usize,
        bands: SimilarityBands,
    ) -> StorageResult<Vec<String>>;

    /// Inserts a shared copy of `pattern` into `target_domain`
    ///
    /// The copy carries `pattern.confidence × decay`. Never overwrites an
    /// existing row; a locally learned row with the same signature causes
    /// the write to be rejected.
    fn share_pattern(
        &self,
        target_domain: &str,
        pattern: &Pattern,
        decay: f64,
    ) -> StorageResult<ShareOutcome>;

    // ===== Domain descriptors =====

    /// Folds one planning call's lookahead and branching into the domain's
    /// running averages
    fn record_domain_descriptor(
        &self,
        domain: &str,
        lookahead: usize,
        branching_factor: usize,
    ) -> StorageResult<()>;

    /// Gets a domain's descriptor
    fn domain_descriptor(&self, domain: &str) -> StorageResult<Option<DomainDescriptor>>;
}

/// Historical crawl data consumed by the profiler and cost calibration
pub trait HistoryStore: Send + Sync {
    /// Aggregate statistics for a domain, or None when it has no history
    fn domain_aggregates(&self, domain: &str) -> StorageResult<Option<DomainAggregates>>;

    /// Hub pages known for a domain, ordered by URL
    fn known_hubs(&self, domain: &str) -> StorageResult<Vec<KnownHub>>;

    /// Appends a historical crawl record (ignored if the URL is known)
    fn record_crawl_page(
        &self,
        domain: &str,
        url: &str,
        hub_type: Option<&str>,
        link_count: u32,
    ) -> StorageResult<()>;

    /// Appends an expected vs. actual duration observation, keeping only
    /// the most recent `COST_OBSERVATION_WINDOW` per action type
    fn record_cost_observation(&self, observation: &CostObservation) -> StorageResult<()>;

    /// Mean duration and sample count over the retained observations
    fn average_cost(&self, kind: ActionType) -> StorageResult<Option<(f64, u64)>>;
}
