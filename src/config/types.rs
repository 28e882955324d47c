use crate::model::ActionType;
use serde::Deserialize;

/// Main configuration structure for Sumi-Compass
///
/// Every section falls back to its defaults, so an empty file is a valid
/// configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub planner: PlannerConfig,
    pub scoring: ScoringConfig,
    pub execution: ExecutionConfig,
    pub sharing: SharingConfig,
    pub features: FeatureToggles,
}

/// Persistent store configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    /// Path to the SQLite database file
    pub database_path: String,

    /// How long a statement waits on a locked database (milliseconds)
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: "./compass.db".to_string(),
            busy_timeout_ms: 5000,
        }
    }
}

/// Plan search configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct PlannerConfig {
    /// Lookahead used when adaptive branching is disabled
    pub default_lookahead: usize,

    /// Branching factor used when adaptive branching is disabled
    pub default_branching: usize,

    /// Per-depth discount applied to step utility during search
    pub depth_discount: f64,

    /// Upper bound on search nodes allocated per planning call
    pub max_search_nodes: usize,

    /// Minimum success rate for a pattern to seed candidates
    pub pattern_min_success_rate: f64,

    /// Minimum average realized value for a pattern to seed candidates
    pub pattern_min_avg_value: f64,

    /// Cap on candidates synthesized from a single pattern
    pub max_pattern_candidates: usize,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            default_lookahead: 3,
            default_branching: 5,
            depth_discount: 0.9,
            max_search_nodes: 50_000,
            pattern_min_success_rate: 0.7,
            pattern_min_avg_value: 50.0,
            max_pattern_candidates: 5,
        }
    }
}

/// Priority scoring configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ScoringConfig {
    /// Multiplier on the cost bucket adjustment (0 disables it)
    pub cost_weight: f64,

    /// Bonus for actions that fill a known coverage gap
    pub gap_bonus: f64,

    /// Bonus scaled by a pattern's confidence for pattern-derived actions
    pub pattern_bonus: f64,

    /// Weight on estimated articles per request
    pub efficiency_weight: f64,

    /// Lower clamp for final priorities
    pub min_priority: f64,

    /// Upper clamp for final priorities
    pub max_priority: f64,

    /// Discovery-method weighting per action type
    pub method_weights: MethodWeights,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            cost_weight: 1.0,
            gap_bonus: 25.0,
            pattern_bonus: 20.0,
            efficiency_weight: 2.0,
            min_priority: 0.0,
            max_priority: 1000.0,
            method_weights: MethodWeights::default(),
        }
    }
}

/// Discovery-method weights, one per action type
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct MethodWeights {
    pub explore_hub: f64,
    pub history: f64,
    pub adaptive_seed: f64,
    pub sitemap: f64,
}

impl MethodWeights {
    /// Returns the weight for an action type
    pub fn weight(&self, kind: ActionType) -> f64 {
        match kind {
            ActionType::ExploreHub => self.explore_hub,
            ActionType::History => self.history,
            ActionType::AdaptiveSeed => self.adaptive_seed,
            ActionType::Sitemap => self.sitemap,
        }
    }
}

impl Default for MethodWeights {
    fn default() -> Self {
        Self {
            explore_hub: 1.0,
            history: 0.8,
            adaptive_seed: 1.1,
            sitemap: 0.9,
        }
    }
}

/// Plan execution and re-planning thresholds
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ExecutionConfig {
    /// Rolling performance deviation from 1.0 that triggers a re-plan
    pub replan_deviation: f64,

    /// Backtracks since the last re-plan tolerated before re-planning
    pub backtrack_limit: u32,

    /// Backtracks allowed over a job's lifetime
    pub max_backtracks: u32,

    /// Minimum seconds between two executed re-plans
    pub replan_cooldown_secs: u64,

    /// Re-plan every time processed requests cross a multiple of this
    pub replan_interval_requests: u64,

    /// Number of recent steps averaged for the performance trigger
    pub rolling_window: usize,

    /// Priority added to similar steps after an excellent result
    pub excellent_boost: f64,

    /// Priority removed from similar steps after a poor result
    pub poor_penalty: f64,

    /// Maximum steps synthesized after an excellent result
    pub max_synthesized_steps: usize,

    /// Backtrack when actual value falls below this fraction of expected
    pub backtrack_ratio: f64,

    /// How far the cursor moves back on a backtrack
    pub backtrack_distance: usize,

    /// Mean performance ratio at which a pattern window counts as a success
    pub success_ratio: f64,

    /// Longest action-type window recorded as a pattern signature
    pub signature_window: usize,

    /// A fetch running longer than this counts as a zero-value failure
    pub fetch_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            replan_deviation: 0.4,
            backtrack_limit: 5,
            max_backtracks: 20,
            replan_cooldown_secs: 60,
            replan_interval_requests: 100,
            rolling_window: 5,
            excellent_boost: 20.0,
            poor_penalty: 15.0,
            max_synthesized_steps: 2,
            backtrack_ratio: 0.3,
            backtrack_distance: 2,
            success_ratio: 0.8,
            signature_window: 3,
            fetch_timeout_secs: 30,
        }
    }
}

/// Cross-domain pattern transfer configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SharingConfig {
    /// Confidence multiplier applied to transferred patterns
    pub transfer_decay: f64,

    /// Maximum difference in average lookahead for two domains to be similar
    pub lookahead_tolerance: f64,

    /// Maximum difference in branching factor for two domains to be similar
    pub branching_tolerance: f64,

    /// Maximum similar domains consulted per transfer
    pub max_similar_domains: usize,
}

impl Default for SharingConfig {
    fn default() -> Self {
        Self {
            transfer_decay: 0.7,
            lookahead_tolerance: 1.0,
            branching_tolerance: 3.0,
            max_similar_domains: 5,
        }
    }
}

/// Independently switchable engine features
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FeatureToggles {
    pub cost_aware_scoring: bool,
    pub pattern_discovery: bool,
    pub adaptive_branching: bool,
    pub real_time_adjustment: bool,
    pub dynamic_replanning: bool,
    pub cross_domain_sharing: bool,
}

impl Default for FeatureToggles {
    fn default() -> Self {
        Self {
            cost_aware_scoring: true,
            pattern_discovery: true,
            adaptive_branching: true,
            real_time_adjustment: true,
            dynamic_replanning: true,
            cross_domain_sharing: true,
        }
    }
}
