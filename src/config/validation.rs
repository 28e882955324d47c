use crate::config::types::{
    Config, ExecutionConfig, PlannerConfig, ScoringConfig, SharingConfig, StorageConfig,
};
use crate::ConfigError;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_storage_config(&config.storage)?;
    validate_planner_config(&config.planner)?;
    validate_scoring_config(&config.scoring)?;
    validate_execution_config(&config.execution)?;
    validate_sharing_config(&config.sharing)?;
    Ok(())
}

/// Validates storage configuration
fn validate_storage_config(config: &StorageConfig) -> Result<(), ConfigError> {
    if config.database_path.is_empty() {
        return Err(ConfigError::Validation(
            "database_path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// Validates plan search configuration
fn validate_planner_config(config: &PlannerConfig) -> Result<(), ConfigError> {
    if config.default_lookahead < 1 {
        return Err(ConfigError::Validation(format!(
            "default_lookahead must be >= 1, got {}",
            config.default_lookahead
        )));
    }

    if config.default_branching < 1 {
        return Err(ConfigError::Validation(format!(
            "default_branching must be >= 1, got {}",
            config.default_branching
        )));
    }

    if !(config.depth_discount > 0.0 && config.depth_discount <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "depth_discount must be in (0, 1], got {}",
            config.depth_discount
        )));
    }

    if config.max_search_nodes < 1 {
        return Err(ConfigError::Validation(
            "max_search_nodes must be >= 1".to_string(),
        ));
    }

    validate_fraction("pattern_min_success_rate", config.pattern_min_success_rate)?;
    validate_non_negative("pattern_min_avg_value", config.pattern_min_avg_value)?;

    Ok(())
}

/// Validates priority scoring configuration
fn validate_scoring_config(config: &ScoringConfig) -> Result<(), ConfigError> {
    validate_non_negative("cost_weight", config.cost_weight)?;
    validate_non_negative("gap_bonus", config.gap_bonus)?;
    validate_non_negative("pattern_bonus", config.pattern_bonus)?;
    validate_non_negative("efficiency_weight", config.efficiency_weight)?;

    if config.min_priority > config.max_priority {
        return Err(ConfigError::Validation(format!(
            "min_priority ({}) must not exceed max_priority ({})",
            config.min_priority, config.max_priority
        )));
    }

    let weights = &config.method_weights;
    for (name, value) in [
        ("method_weights.explore_hub", weights.explore_hub),
        ("method_weights.history", weights.history),
        ("method_weights.adaptive_seed", weights.adaptive_seed),
        ("method_weights.sitemap", weights.sitemap),
    ] {
        validate_non_negative(name, value)?;
    }

    Ok(())
}

/// Validates execution thresholds
fn validate_execution_config(config: &ExecutionConfig) -> Result<(), ConfigError> {
    validate_non_negative("replan_deviation", config.replan_deviation)?;
    validate_non_negative("excellent_boost", config.excellent_boost)?;
    validate_non_negative("poor_penalty", config.poor_penalty)?;
    validate_fraction("backtrack_ratio", config.backtrack_ratio)?;
    validate_non_negative("success_ratio", config.success_ratio)?;

    if config.replan_interval_requests < 1 {
        return Err(ConfigError::Validation(
            "replan_interval_requests must be >= 1".to_string(),
        ));
    }

    if config.rolling_window < 1 {
        return Err(ConfigError::Validation(
            "rolling_window must be >= 1".to_string(),
        ));
    }

    if config.signature_window < 1 {
        return Err(ConfigError::Validation(
            "signature_window must be >= 1".to_string(),
        ));
    }

    if config.max_backtracks < config.backtrack_limit {
        return Err(ConfigError::Validation(format!(
            "max_backtracks ({}) must be >= backtrack_limit ({})",
            config.max_backtracks, config.backtrack_limit
        )));
    }

    if config.fetch_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "fetch_timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates cross-domain sharing configuration
fn validate_sharing_config(config: &SharingConfig) -> Result<(), ConfigError> {
    if !(config.transfer_decay > 0.0 && config.transfer_decay <= 1.0) {
        return Err(ConfigError::Validation(format!(
            "transfer_decay must be in (0, 1], got {}",
            config.transfer_decay
        )));
    }

    validate_non_negative("lookahead_tolerance", config.lookahead_tolerance)?;
    validate_non_negative("branching_tolerance", config.branching_tolerance)?;

    Ok(())
}

fn validate_non_negative(name: &str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::Validation(format!(
            "{} must be a non-negative number, got {}",
            name, value
        )));
    }
    Ok(())
}

fn validate_fraction(name: &str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::Validation(format!(
            "{} must be between 0 and 1, got {}",
            name, value
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate(&Config::default()).is_ok());
    }

    #[test]
    fn test_rejects_bad_transfer_decay() {
        let mut config = Config::default();
        config.sharing.transfer_decay = 0.0;
        assert!(validate(&config).is_err());

        config.sharing.transfer_decay = 1.2;
        assert!(validate(&config).is_err());

        config.sharing.transfer_decay = 1.0;
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_rejects_inverted_priority_range() {
        let mut config = Config::default();
        config.scoring.min_priority = 10.0;
        config.scoring.max_priority = 5.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_cost_weight_zero_is_allowed() {
        let mut config = Config::default();
        config.scoring.cost_weight = 0.0;
        assert!(validate(&config).is_ok());

        config.scoring.cost_weight = -1.0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_zero_windows() {
        let mut config = Config::default();
        config.execution.rolling_window = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.execution.signature_window = 0;
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.planner.default_lookahead = 0;
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_rejects_lifetime_backtracks_below_limit() {
        let mut config = Config::default();
        config.execution.backtrack_limit = 8;
        config.execution.max_backtracks = 4;
        assert!(validate(&config).is_err());

        config.execution.max_backtracks = 8;
        assert!(validate(&config).is_ok());
    }
}
