//! Integration tests for planning and the pattern store
//!
//! These tests exercise the planner against a real SQLite store, including
//! cross-domain transfer and persistence across reopening the database.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use sumi_compass::config::Config;
use sumi_compass::learning::PatternTransfer;
use sumi_compass::model::{
    Action, ActionType, Candidate, CrawlState, Goal, PatternSignature, PlanContext, StepSource,
};
use sumi_compass::scoring::StaticCostEstimator;
use sumi_compass::storage::{HistoryStore, PatternStore, ShareOutcome, SqliteStore};
use sumi_compass::telemetry::{CollectingTelemetry, TelemetryEvent};
use sumi_compass::HierarchicalPlanner;
use tempfile::TempDir;

fn hub_candidates(n: usize, expected: u32) -> Vec<Candidate> {
    (0..n)
        .map(|i| {
            Candidate::new(Action::new(
                ActionType::ExploreHub,
                format!("/section/{}", i),
                expected,
                1,
            ))
        })
        .collect()
}

fn planner(config: &Config, store: Arc<SqliteStore>) -> HierarchicalPlanner {
    HierarchicalPlanner::new(
        config,
        store.clone(),
        store,
        Arc::new(StaticCostEstimator::new()),
        Arc::new(CollectingTelemetry::new()),
    )
}

fn seed_hubs(store: &SqliteStore, domain: &str, hub_types: &[&str]) {
    for (i, hub_type) in hub_types.iter().enumerate() {
        store
            .record_crawl_page(domain, &format!("/{}/{}", hub_type, i), Some(hub_type), 20)
            .unwrap();
    }
}

#[test]
fn test_planning_is_deterministic() {
    let config = Config::default();
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    seed_hubs(&store, "example.com", &["section", "tag", "author"]);
    let planner = planner(&config, store);

    let mut candidates = hub_candidates(6, 80);
    candidates.push(Candidate::new(Action::new(
        ActionType::Sitemap,
        "/sitemap.xml",
        120,
        2,
    )));
    let context = PlanContext::new("example.com", candidates);
    let goal = Goal::articles(2_000);

    let first = planner.generate_plan(&CrawlState::default(), &goal, &context);
    let second = planner.generate_plan(&CrawlState::default(), &goal, &context);

    assert!(!first.is_empty());
    assert_eq!(first.steps, second.steps);
    assert_eq!(first.lookahead, 5);
}

#[test]
fn test_lookahead_never_shrinks_for_larger_goals() {
    let config = Config::default();
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let planner = planner(&config, store);

    let lookaheads: Vec<usize> = [900, 1_500, 50_000]
        .iter()
        .map(|&target| planner.lookahead(&Goal::articles(target)))
        .collect();

    assert_eq!(lookaheads, vec![3, 5, 7]);
}

#[test]
fn test_explored_targets_are_not_replanned() {
    let config = Config::default();
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let planner = planner(&config, store);

    let mut state = CrawlState::default();
    state.explored_targets.insert("/section/0".to_string());
    state.explored_targets.insert("/section/1".to_string());

    let context = PlanContext::new("example.com", hub_candidates(3, 100));
    let plan = planner.generate_plan(&state, &Goal::articles(500), &context);

    assert_eq!(plan.len(), 1);
    assert_eq!(plan.steps[0].action.target(), "/section/2");
}

#[test]
fn test_learned_patterns_seed_known_hubs() {
    let config = Config::default();
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    seed_hubs(&store, "example.com", &["section", "tag"]);

    let signature = PatternSignature::from_str("explore-hub→explore-hub").unwrap();
    for _ in 0..3 {
        store
            .record_outcome("example.com", &signature, true, 150.0)
            .unwrap();
    }

    let planner = planner(&config, store);
    let context = PlanContext::new("example.com", vec![]);
    let plan = planner.generate_plan(&CrawlState::default(), &Goal::articles(500), &context);

    assert_eq!(plan.len(), 2);
    assert!(plan
        .steps
        .iter()
        .all(|s| s.source == StepSource::PatternLearned));
    let mut targets: Vec<&str> = plan.steps.iter().map(|s| s.action.target()).collect();
    targets.sort();
    assert_eq!(targets, vec!["/section/0", "/tag/1"]);
}

#[test]
fn test_two_outcomes_add_two_samples() {
    let store = SqliteStore::new_in_memory().unwrap();
    let signature = PatternSignature::from_str("history").unwrap();

    store
        .record_outcome("example.com", &signature, true, 60.0)
        .unwrap();
    let before = store
        .get_pattern("example.com", &signature)
        .unwrap()
        .unwrap();

    store
        .record_outcome("example.com", &signature, true, 60.0)
        .unwrap();
    store
        .record_outcome("example.com", &signature, true, 60.0)
        .unwrap();
    let after = store
        .get_pattern("example.com", &signature)
        .unwrap()
        .unwrap();

    assert_eq!(after.sample_size, before.sample_size + 2);
}

#[test]
fn test_share_never_overwrites_local_pattern() {
    let config = Config::default();
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let signature = PatternSignature::from_str("explore-hub").unwrap();

    for _ in 0..4 {
        store
            .record_outcome("source.com", &signature, true, 100.0)
            .unwrap();
    }
    store
        .record_outcome("target.com", &signature, false, 5.0)
        .unwrap();
    let local = store.get_pattern("target.com", &signature).unwrap().unwrap();

    let source = store.get_pattern("source.com", &signature).unwrap().unwrap();
    assert_eq!(
        store.share_pattern("target.com", &source, 0.7).unwrap(),
        ShareOutcome::Rejected
    );

    let telemetry = Arc::new(CollectingTelemetry::new());
    let transfer = PatternTransfer::new(
        store.clone(),
        telemetry.clone(),
        config.sharing.clone(),
        config.planner.pattern_min_success_rate,
        config.planner.pattern_min_avg_value,
    );
    let report = transfer.share_between("source.com", "target.com").unwrap();
    assert_eq!(report.inserted, 0);
    assert_eq!(report.rejected, 1);
    assert!(telemetry.events().is_empty());

    let unchanged = store.get_pattern("target.com", &signature).unwrap().unwrap();
    assert_eq!(unchanged, local);
    assert!(!unchanged.shared);
}

#[test]
fn test_transfer_applies_decay() {
    let config = Config::default();
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let signature = PatternSignature::from_str("explore-hub→explore-hub").unwrap();

    for _ in 0..3 {
        store
            .record_outcome("source.com", &signature, true, 100.0)
            .unwrap();
    }
    let source = store.get_pattern("source.com", &signature).unwrap().unwrap();

    let telemetry = Arc::new(CollectingTelemetry::new());
    let transfer = PatternTransfer::new(
        store.clone(),
        telemetry.clone(),
        config.sharing.clone(),
        config.planner.pattern_min_success_rate,
        config.planner.pattern_min_avg_value,
    );
    let report = transfer.share_between("source.com", "target.com").unwrap();
    assert_eq!(report.inserted, 1);

    let shared = store.get_pattern("target.com", &signature).unwrap().unwrap();
    assert!(shared.shared);
    assert_eq!(shared.source_domain.as_deref(), Some("source.com"));
    assert!((shared.confidence - source.confidence * config.sharing.transfer_decay).abs() < 1e-9);

    assert!(matches!(
        telemetry.events().as_slice(),
        [TelemetryEvent::PatternTransferred { target_domain, .. }] if target_domain == "target.com"
    ));

    let again = transfer.share_between("source.com", "target.com").unwrap();
    assert_eq!(again.inserted, 0);
    assert_eq!(again.already_shared, 1);
}

#[test]
fn test_patterns_survive_reopen() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("compass.db");
    let signature = PatternSignature::from_str("sitemap→explore-hub").unwrap();

    {
        let store = SqliteStore::new(&path, Duration::from_millis(500)).unwrap();
        for _ in 0..3 {
            store
                .record_outcome("example.com", &signature, true, 75.0)
                .unwrap();
        }
        store
            .record_domain_descriptor("example.com", 5, 10)
            .unwrap();
        store
            .record_crawl_page("example.com", "/news", Some("section"), 12)
            .unwrap();
    }

    let store = SqliteStore::new(&path, Duration::from_millis(500)).unwrap();
    let good = store.query_good_patterns("example.com", 0.7, 50.0).unwrap();
    assert_eq!(good.len(), 1);
    assert_eq!(good[0].signature, signature);
    assert_eq!(good[0].sample_size, 3);

    let descriptor = store.domain_descriptor("example.com").unwrap().unwrap();
    assert_eq!(descriptor.plan_count, 1);
    assert_eq!(store.known_hubs("example.com").unwrap().len(), 1);
}

#[test]
fn test_similar_domains_bootstrap_new_domain() {
    let config = Config::default();
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let signature = PatternSignature::from_str("explore-hub→explore-hub").unwrap();

    for _ in 0..5 {
        store
            .record_outcome("older.com", &signature, true, 120.0)
            .unwrap();
    }
    store.record_domain_descriptor("older.com", 3, 5).unwrap();
    seed_hubs(&store, "newer.com", &["section"]);

    let planner = planner(&config, store.clone());
    let context = PlanContext::new("newer.com", vec![]);
    let plan = planner.generate_plan(&CrawlState::default(), &Goal::articles(500), &context);

    let shared = store.get_pattern("newer.com", &signature).unwrap().unwrap();
    assert!(shared.shared);
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.steps[0].source, StepSource::PatternLearned);
    assert_eq!(plan.steps[0].action.target(), "/section/0");
}
