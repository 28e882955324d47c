//! Hierarchical planner
//!
//! Produces a short, scored plan of crawl actions for a domain:
//!
//! 1. Profile the domain to size the search (lookahead, branching)
//! 2. Gather candidates from the caller plus learned patterns
//! 3. Score every candidate
//! 4. Branch-and-bound over the candidates for the best discounted path
//!
//! Planning never fails. Store problems degrade to planning without learned
//! patterns, and no candidates at all yields an empty plan.

mod candidates;
mod search;

pub use candidates::{branching_for_hub_types, lookahead_for_target};
pub use search::{ScoredCandidate, SearchOutcome, SearchParams};

use crate::config::{Config, FeatureToggles, PlannerConfig};
use crate::learning::PatternTransfer;
use crate::model::{Candidate, CrawlState, Goal, Plan, PlanContext, PlanStep};
use crate::profiler::{DomainProfile, DomainProfiler};
use crate::scoring::{CostEstimator, HistoricalCostEstimator, PriorityScorer};
use crate::storage::{HistoryStore, Pattern, PatternStore, SqliteStore};
use crate::telemetry::{TelemetrySink, TracingTelemetry};
use std::sync::Arc;

/// Generates crawl plans
pub struct HierarchicalPlanner {
    profiler: DomainProfiler,
    patterns: Arc<dyn PatternStore>,
    history: Arc<dyn HistoryStore>,
    cost_estimator: Arc<dyn CostEstimator>,
    scorer: PriorityScorer,
    transfer: PatternTransfer,
    config: PlannerConfig,
    features: FeatureToggles,
}

impl HierarchicalPlanner {
    /// Creates a planner over explicit collaborators
    pub fn new(
        config: &Config,
        patterns: Arc<dyn PatternStore>,
        history: Arc<dyn HistoryStore>,
        cost_estimator: Arc<dyn CostEstimator>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let transfer = PatternTransfer::new(
            Arc::clone(&patterns),
            telemetry,
            config.sharing.clone(),
            config.planner.pattern_min_success_rate,
            config.planner.pattern_min_avg_value,
        );

        Self {
            profiler: DomainProfiler::new(Arc::clone(&history)),
            patterns,
            history,
            cost_estimator,
            scorer: PriorityScorer::new(config.scoring.clone()),
            transfer,
            config: config.planner.clone(),
            features: config.features.clone(),
        }
    }

    /// Creates a planner backed by one SQLite store, with historical cost
    /// estimates and tracing telemetry
    pub fn with_store(config: &Config, store: Arc<SqliteStore>) -> Self {
        let cost_estimator = Arc::new(HistoricalCostEstimator::new(store.clone()));
        Self::new(
            config,
            store.clone(),
            store,
            cost_estimator,
            Arc::new(TracingTelemetry),
        )
    }

    pub fn profiler(&self) -> &DomainProfiler {
        &self.profiler
    }

    /// Lookahead for a goal, honoring the adaptive-branching toggle
    pub fn lookahead(&self, goal: &Goal) -> usize {
        if self.features.adaptive_branching {
            lookahead_for_target(goal.articles_target)
        } else {
            self.config.default_lookahead
        }
    }

    /// Branching factor for a profile, honoring the adaptive-branching toggle
    pub fn branching(&self, profile: &DomainProfile) -> usize {
        if self.features.adaptive_branching {
            branching_for_hub_types(profile.hub_type_count)
        } else {
            self.config.default_branching
        }
    }

    /// Generates a plan
    ///
    /// # Arguments
    ///
    /// * `state` - Observed progress of the crawl job
    /// * `goal` - Coverage goal and optional request budget
    /// * `context` - Domain, offered candidates, and real-time adjustments
    ///
    /// # Returns
    ///
    /// The best plan found, or an empty plan when there is nothing to do
    pub fn generate_plan(&self, state: &CrawlState, goal: &Goal, context: &PlanContext) -> Plan {
        let domain = context.domain.as_str();
        let profile = self.profiler.profile(domain);
        let lookahead = self.lookahead(goal);
        let branching = self.branching(&profile);

        if let Err(e) = self
            .patterns
            .record_domain_descriptor(domain, lookahead, branching)
        {
            tracing::warn!("Failed to record domain descriptor for {}: {}", domain, e);
        }

        let mut candidates: Vec<Candidate> = context
            .candidates
            .iter()
            .filter(|c| !state.is_explored(c.action.target()))
            .cloned()
            .collect();

        if self.features.pattern_discovery {
            let learned = self.pattern_candidates(domain, state, &candidates);
            candidates.extend(learned);
        }

        if candidates.is_empty() {
            tracing::debug!("No actionable candidates for {}", domain);
            return Plan::empty(domain, *goal);
        }

        let scored: Vec<ScoredCandidate> = candidates
            .into_iter()
            .map(|candidate| self.score(candidate, context))
            .collect();

        let outcome = search::search(
            &scored,
            SearchParams {
                lookahead,
                branching,
                discount: self.config.depth_discount,
                request_budget: goal.request_budget,
                max_nodes: self.config.max_search_nodes,
            },
        );

        let steps: Vec<PlanStep> = outcome
            .path
            .iter()
            .map(|&i| {
                let scored = &scored[i];
                PlanStep {
                    action: scored.candidate.action.clone(),
                    expected_value: scored.candidate.expected_value,
                    priority: scored.priority,
                    source: scored.candidate.source,
                    expected_cost_ms: scored.expected_cost_ms,
                }
            })
            .collect();

        tracing::info!(
            "Planned {} steps for {} (lookahead {}, branching {}, {} candidates)",
            steps.len(),
            domain,
            lookahead,
            branching,
            scored.len()
        );

        Plan {
            domain: domain.to_string(),
            goal: *goal,
            steps,
            lookahead,
            branching_factor: branching,
            search: outcome.stats,
        }
    }

    fn score(&self, mut candidate: Candidate, context: &PlanContext) -> ScoredCandidate {
        let kind = candidate.action.kind();
        candidate.heuristics.adjustment += context.adjustment_for(kind);

        let cost = if self.features.cost_aware_scoring {
            self.cost_estimator.estimate_cost(kind)
        } else {
            None
        };

        let priority = self.scorer.score(
            &candidate.action,
            &candidate.heuristics,
            candidate.expected_value,
            cost.as_ref(),
        );

        ScoredCandidate {
            candidate,
            priority,
            expected_cost_ms: cost.and_then(|c| c.expected_duration_ms),
        }
    }

    fn pattern_candidates(
        &self,
        domain: &str,
        state: &CrawlState,
        existing: &[Candidate],
    ) -> Vec<Candidate> {
        let patterns = self.good_patterns(domain);
        if patterns.is_empty() {
            return Vec::new();
        }

        let hubs = match self.history.known_hubs(domain) {
            Ok(hubs) => hubs,
            Err(e) => {
                tracing::warn!("Failed to read known hubs for {}: {}", domain, e);
                return Vec::new();
            }
        };

        candidates::synthesize_pattern_candidates(
            &patterns,
            &hubs,
            state,
            existing,
            self.config.max_pattern_candidates,
        )
    }

    /// Good patterns for a domain, bootstrapping from similar domains when it
    /// has none of its own
    fn good_patterns(&self, domain: &str) -> Vec<Pattern> {
        let query = || {
            self.patterns.query_good_patterns(
                domain,
                self.config.pattern_min_success_rate,
                self.config.pattern_min_avg_value,
            )
        };

        match query() {
            Ok(patterns) if !patterns.is_empty() => return patterns,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!("Failed to query patterns for {}: {}", domain, e);
                return Vec::new();
            }
        }

        if !self.features.cross_domain_sharing {
            return Vec::new();
        }

        if self.transfer.bootstrap(domain).inserted == 0 {
            return Vec::new();
        }

        query().unwrap_or_else(|e| {
            tracing::warn!("Failed to query patterns for {}: {}", domain, e);
            Vec::new()
        })
    }
}
