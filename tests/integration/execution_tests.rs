//! Integration tests for plan execution
//!
//! These tests drive the execution controller end-to-end with scripted
//! fetchers and an in-memory store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use sumi_compass::config::Config;
use sumi_compass::execution::{ExecutionError, FetchOutcome, Fetcher, PerformanceClass};
use sumi_compass::model::{Action, ActionType, Candidate, CrawlState, Goal, PlanContext, StepSource};
use sumi_compass::scoring::{PriorityScorer, StaticCostEstimator};
use sumi_compass::storage::{HistoryStore, PatternStore, SqliteStore};
use sumi_compass::telemetry::{CollectingTelemetry, TelemetryEvent};
use sumi_compass::{ExecutionController, ExecutionPhase, HierarchicalPlanner};

/// Returns a fixed value per target, and a default for everything else
struct ScriptedFetcher {
    values: HashMap<String, f64>,
    default_value: f64,
    calls: Mutex<Vec<String>>,
}

impl ScriptedFetcher {
    fn new(default_value: f64) -> Self {
        Self {
            values: HashMap::new(),
            default_value,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn with_value(mut self, target: &str, value: f64) -> Self {
        self.values.insert(target.to_string(), value);
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn execute(&self, action: &Action) -> FetchOutcome {
        self.calls.lock().unwrap().push(action.target().to_string());
        let value = self
            .values
            .get(action.target())
            .copied()
            .unwrap_or(self.default_value);
        FetchOutcome::success(value, 20.0)
    }
}

struct Harness {
    controller: ExecutionController,
    store: Arc<SqliteStore>,
    telemetry: Arc<CollectingTelemetry>,
}

fn harness(config: &Config, fetcher: Arc<dyn Fetcher>) -> Harness {
    let store = Arc::new(SqliteStore::new_in_memory().unwrap());
    let telemetry = Arc::new(CollectingTelemetry::new());
    let planner = Arc::new(HierarchicalPlanner::new(
        config,
        store.clone(),
        store.clone(),
        Arc::new(StaticCostEstimator::new()),
        telemetry.clone(),
    ));
    let controller = ExecutionController::new(
        config,
        planner,
        store.clone(),
        store.clone(),
        fetcher,
        telemetry.clone(),
    );
    Harness {
        controller,
        store,
        telemetry,
    }
}

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

#[tokio::test]
async fn test_excellent_step_synthesizes_and_boosts() {
    let config = Config::default();
    let h = harness(&config, Arc::new(ScriptedFetcher::new(100.0)));
    for (i, hub_type) in ["section", "tag", "author"].iter().enumerate() {
        h.store
            .record_crawl_page("news.example", &format!("/{}/{}", hub_type, i), Some(hub_type), 30)
            .unwrap();
    }

    let mut candidates = hub_candidates(5, 100);
    candidates[3] = candidates[3].clone().filling_gap();

    let plan = h
        .controller
        .plan_and_start(
            "job-e2e",
            CrawlState::default(),
            Goal::articles(500),
            PlanContext::new("news.example", candidates.clone()),
        )
        .await
        .unwrap();

    assert_eq!(plan.lookahead, 3);
    assert_eq!(plan.branching_factor, 5);
    assert_eq!(plan.len(), 3);

    let scorer = PriorityScorer::new(config.scoring.clone());
    let max_priority = candidates
        .iter()
        .map(|c| scorer.score(&c.action, &c.heuristics, c.expected_value, None))
        .fold(f64::MIN, f64::max);
    assert_eq!(plan.steps[0].priority, max_priority);
    assert_eq!(plan.steps[0].action.target(), "/section/3");

    let report = h
        .controller
        .record_step("job-e2e", 0, FetchOutcome::success(250.0, 40.0))
        .await
        .unwrap();
    assert_eq!(report.performance, PerformanceClass::Excellent);
    assert!(report.synthesized >= 1);
    assert!(!report.finished);

    let execution = h.controller.snapshot("job-e2e").await.unwrap();
    assert_eq!(execution.phase(), ExecutionPhase::Executing);
    assert_eq!(execution.current_step(), 1);

    let synthesized: Vec<_> = execution
        .steps()
        .iter()
        .filter(|s| s.step.source == StepSource::Synthesized)
        .collect();
    assert_eq!(synthesized.len(), report.synthesized);
    for scheduled in &synthesized {
        assert_eq!(scheduled.step.action.kind(), ActionType::ExploreHub);
        assert_eq!(scheduled.step.priority, plan.steps[0].priority + 20.0);
    }

    for planned in &plan.steps[1..] {
        let boosted = execution
            .steps()
            .iter()
            .find(|s| s.step.action == planned.action)
            .unwrap();
        assert_eq!(boosted.step.priority, planned.priority + 20.0);
    }
    assert_eq!(
        execution.priority_adjustments().get(&ActionType::ExploreHub),
        Some(&20.0)
    );
}

#[tokio::test]
async fn test_cooldown_allows_one_replan() {
    let mut config = Config::default();
    config.execution.replan_interval_requests = 1;
    config.execution.replan_cooldown_secs = 3600;
    let h = harness(&config, Arc::new(ScriptedFetcher::new(100.0)));

    h.controller
        .plan_and_start(
            "job-cooldown",
            CrawlState::default(),
            Goal::articles(10_000),
            PlanContext::new("example.com", hub_candidates(3, 100)),
        )
        .await
        .unwrap();

    let first = h
        .controller
        .record_step("job-cooldown", 0, FetchOutcome::success(100.0, 10.0))
        .await
        .unwrap();
    assert!(first.replan.is_some());

    let second = h
        .controller
        .record_step("job-cooldown", 1, FetchOutcome::success(100.0, 10.0))
        .await
        .unwrap();
    assert!(second.replan.is_none());
    assert!(second.suppressed.is_some());

    let execution = h.controller.snapshot("job-cooldown").await.unwrap();
    assert_eq!(execution.replan_count(), 1);
    assert_eq!(execution.suppressed_replans(), 1);

    let events = h.telemetry.events();
    let replanned = events
        .iter()
        .filter(|e| matches!(e, TelemetryEvent::Replanned { .. }))
        .count();
    let suppressed = events
        .iter()
        .filter(|e| matches!(e, TelemetryEvent::ReplanSuppressed { .. }))
        .count();
    assert_eq!(replanned, 1);
    assert_eq!(suppressed, 1);
}

#[tokio::test]
async fn test_run_reaches_goal_and_learns() {
    let config = Config::default();
    let fetcher = Arc::new(ScriptedFetcher::new(100.0));
    let h = harness(&config, fetcher.clone());

    h.controller
        .plan_and_start(
            "job-run",
            CrawlState::default(),
            Goal::articles(200),
            PlanContext::new("example.com", hub_candidates(4, 100)),
        )
        .await
        .unwrap();

    let summary = h.controller.run("job-run").await.unwrap();
    assert_eq!(summary.phase, ExecutionPhase::Completed);
    assert_eq!(summary.steps_executed, 2);
    assert_eq!(summary.actual_value, 200.0);
    assert_eq!(fetcher.calls().len(), 2);

    let patterns = h.store.list_patterns("example.com").unwrap();
    assert_eq!(patterns.len(), 2);
    assert_eq!(summary.patterns_recorded, 2);

    assert!(h.controller.active_jobs().await.is_empty());
    assert!(matches!(
        h.controller.run("job-run").await,
        Err(ExecutionError::UnknownJob(_))
    ));
}

#[tokio::test]
async fn test_exhausted_plan_replans_from_pool() {
    let config = Config::default();
    let h = harness(&config, Arc::new(ScriptedFetcher::new(100.0)));

    // Goal 500 gives lookahead 3, leaving two candidates for the next plan
    h.controller
        .plan_and_start(
            "job-exhaust",
            CrawlState::default(),
            Goal::articles(500),
            PlanContext::new("example.com", hub_candidates(5, 100)),
        )
        .await
        .unwrap();

    let summary = h.controller.run("job-exhaust").await.unwrap();
    assert_eq!(summary.phase, ExecutionPhase::Completed);
    assert_eq!(summary.steps_executed, 5);
    assert_eq!(summary.replan_count, 1);
    assert!(h.telemetry.events().iter().any(|e| matches!(
        e,
        TelemetryEvent::Replanned { new_steps: 2, .. }
    )));
}

#[tokio::test]
async fn test_stop_keeps_partial_results() {
    let config = Config::default();
    let h = harness(&config, Arc::new(ScriptedFetcher::new(100.0)));

    h.controller
        .plan_and_start(
            "job-stop",
            CrawlState::default(),
            Goal::articles(10_000),
            PlanContext::new("example.com", hub_candidates(5, 100)),
        )
        .await
        .unwrap();

    h.controller
        .record_step("job-stop", 0, FetchOutcome::success(90.0, 10.0))
        .await
        .unwrap();
    h.controller
        .record_step("job-stop", 1, FetchOutcome::success(95.0, 10.0))
        .await
        .unwrap();

    let summary = h.controller.stop("job-stop").await.unwrap().unwrap();
    assert_eq!(summary.phase, ExecutionPhase::Aborted);
    assert_eq!(summary.steps_executed, 2);
    assert_eq!(summary.actual_value, 185.0);

    // explore-hub and explore-hub→explore-hub
    assert_eq!(h.store.list_patterns("example.com").unwrap().len(), 2);
    assert!(h.telemetry.events().iter().any(|e| matches!(
        e,
        TelemetryEvent::ExecutionFinished { aborted: true, .. }
    )));
}

#[tokio::test]
async fn test_poor_step_backtracks() {
    let config = Config::default();
    let fetcher = ScriptedFetcher::new(100.0).with_value("/section/2", 0.0);
    let h = harness(&config, Arc::new(fetcher));

    let plan = h
        .controller
        .plan_and_start(
            "job-poor",
            CrawlState::default(),
            Goal::articles(10_000),
            PlanContext::new("example.com", hub_candidates(3, 100)),
        )
        .await
        .unwrap();
    let targets: Vec<&str> = plan.steps.iter().map(|s| s.action.target()).collect();
    let poor_idx = targets.iter().position(|t| *t == "/section/2").unwrap();

    for idx in 0..poor_idx {
        h.controller
            .record_step("job-poor", idx, FetchOutcome::success(100.0, 10.0))
            .await
            .unwrap();
    }
    let report = h
        .controller
        .record_step("job-poor", poor_idx, FetchOutcome::success(0.0, 10.0))
        .await
        .unwrap();

    assert_eq!(report.performance, PerformanceClass::Poor);
    let expected = if poor_idx == 0 {
        None
    } else {
        Some(poor_idx.saturating_sub(2))
    };
    assert_eq!(report.backtracked_to, expected);
}
