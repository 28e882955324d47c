//! Domain profiling
//!
//! Summarizes a domain's historical crawl records into the few numbers the
//! planner needs to size its search. A domain without history (or whose
//! history cannot be read) gets a conservative default profile.

use crate::storage::HistoryStore;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Average outbound links assumed for a domain with no history
pub const DEFAULT_AVG_LINKS_PER_PAGE: f64 = 50.0;

/// Structural complexity of a domain, derived from its hub diversity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    Simple,
    Medium,
    Complex,
}

impl Complexity {
    /// Classifies a domain by the number of distinct hub types seen
    pub fn from_hub_type_count(hub_type_count: u64) -> Self {
        if hub_type_count < 5 {
            Self::Simple
        } else if hub_type_count < 15 {
            Self::Medium
        } else {
            Self::Complex
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Simple => "simple",
            Self::Medium => "medium",
            Self::Complex => "complex",
        };
        write!(f, "{}", name)
    }
}

/// Planning-relevant summary of a domain
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DomainProfile {
    pub domain: String,
    pub page_count: u64,
    pub hub_type_count: u64,
    pub avg_links_per_page: f64,
    pub complexity: Complexity,
}

impl DomainProfile {
    /// Profile used when nothing is known about a domain
    pub fn default_for(domain: &str) -> Self {
        Self {
            domain: domain.to_string(),
            page_count: 0,
            hub_type_count: 1,
            avg_links_per_page: DEFAULT_AVG_LINKS_PER_PAGE,
            complexity: Complexity::Simple,
        }
    }
}

/// Builds domain profiles from the historical record store
pub struct DomainProfiler {
    history: Arc<dyn HistoryStore>,
}

impl DomainProfiler {
    pub fn new(history: Arc<dyn HistoryStore>) -> Self {
        Self { history }
    }

    /// Profiles a domain
    ///
    /// Never fails: store errors are logged and answered with the default
    /// profile.
    pub fn profile(&self, domain: &str) -> DomainProfile {
        let aggregates = match self.history.domain_aggregates(domain) {
            Ok(Some(aggregates)) => aggregates,
            Ok(None) => {
                tracing::debug!("No crawl history for {}, using default profile", domain);
                return DomainProfile::default_for(domain);
            }
            Err(e) => {
                tracing::warn!("Failed to read crawl history for {}: {}", domain, e);
                return DomainProfile::default_for(domain);
            }
        };

        // A domain with pages but no tagged hubs still has its front page
        let hub_type_count = aggregates.hub_type_count.max(1);

        let profile = DomainProfile {
            domain: domain.to_string(),
            page_count: aggregates.page_count,
            hub_type_count,
            avg_links_per_page: aggregates.avg_links_per_page,
            complexity: Complexity::from_hub_type_count(hub_type_count),
        };

        tracing::debug!(
            "Profiled {}: {} pages, {} hub types, {:.1} links/page ({})",
            domain,
            profile.page_count,
            profile.hub_type_count,
            profile.avg_links_per_page,
            profile.complexity
        );

        profile
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ActionType, CostObservation};
    use crate::storage::{DomainAggregates, KnownHub, SqliteStore, StorageError, StorageResult};

    struct BrokenHistory;

    impl HistoryStore for BrokenHistory {
        fn domain_aggregates(&self, _domain: &str) -> StorageResult<Option<DomainAggregates>> {
            Err(StorageError::LockPoisoned)
        }

        fn known_hubs(&self, _domain: &str) -> StorageResult<Vec<KnownHub>> {
            Err(StorageError::LockPoisoned)
        }

        fn record_crawl_page(
            &self,
            _domain: &str,
            _url: &str,
            _hub_type: Option<&str>,
            _link_count: u32,
        ) -> StorageResult<()> {
            Err(StorageError::LockPoisoned)
        }

        fn record_cost_observation(&self, _obs: &CostObservation) -> StorageResult<()> {
            Err(StorageError::LockPoisoned)
        }

        fn average_cost(&self, _kind: ActionType) -> StorageResult<Option<(f64, u64)>> {
            Err(StorageError::LockPoisoned)
        }
    }

    #[test]
    fn test_complexity_thresholds() {
        assert_eq!(Complexity::from_hub_type_count(1), Complexity::Simple);
        assert_eq!(Complexity::from_hub_type_count(4), Complexity::Simple);
        assert_eq!(Complexity::from_hub_type_count(5), Complexity::Medium);
        assert_eq!(Complexity::from_hub_type_count(14), Complexity::Medium);
        assert_eq!(Complexity::from_hub_type_count(15), Complexity::Complex);
    }

    #[test]
    fn test_unknown_domain_gets_default_profile() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let profiler = DomainProfiler::new(store);

        let profile = profiler.profile("unknown.example");
        assert_eq!(profile, DomainProfile::default_for("unknown.example"));
        assert_eq!(profile.hub_type_count, 1);
        assert_eq!(profile.avg_links_per_page, 50.0);
    }

    #[test]
    fn test_store_error_gets_default_profile() {
        let profiler = DomainProfiler::new(Arc::new(BrokenHistory));
        let profile = profiler.profile("example.com");
        assert_eq!(profile.page_count, 0);
        assert_eq!(profile.complexity, Complexity::Simple);
    }

    #[test]
    fn test_profile_from_history() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        for (i, hub_type) in ["section", "tag", "author", "archive", "topic", "series"]
            .iter()
            .enumerate()
        {
            store
                .record_crawl_page(
                    "example.com",
                    &format!("https://example.com/hub/{}", i),
                    Some(hub_type),
                    10,
                )
                .unwrap();
        }

        let profiler = DomainProfiler::new(store);
        let profile = profiler.profile("example.com");
        assert_eq!(profile.page_count, 6);
        assert_eq!(profile.hub_type_count, 6);
        assert_eq!(profile.complexity, Complexity::Medium);
        assert!((profile.avg_links_per_page - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_pages_without_hubs_count_one_hub_type() {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        store
            .record_crawl_page("example.com", "https://example.com/a/1", None, 12)
            .unwrap();

        let profile = DomainProfiler::new(store).profile("example.com");
        assert_eq!(profile.page_count, 1);
        assert_eq!(profile.hub_type_count, 1);
    }
}
