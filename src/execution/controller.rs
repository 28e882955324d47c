//! Execution controller
//!
//! Keeps a registry of running jobs. Each job's `PlanExecution` sits behind
//! its own async mutex, so jobs never contend with each other; the registry
//! lock is only held long enough to look a job up.

use crate::config::{validate, Config, ExecutionConfig, FeatureToggles};
use crate::execution::{
    ExecutionError, ExecutionPhase, ExecutionSummary, FetchOutcome, Fetcher, PlanExecution,
    ReplanRequest, StepReport,
};
use crate::model::{Action, Candidate, CostObservation, CrawlState, Goal, Plan, PlanContext};
use crate::learning::PatternOutcome;
use crate::planner::HierarchicalPlanner;
use crate::scoring::HistoricalCostEstimator;
use crate::storage::{HistoryStore, PatternStore, SqliteStore};
use crate::telemetry::{TelemetryEvent, TelemetrySink};
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;

struct Job {
    execution: Mutex<PlanExecution>,
    cancel: CancellationToken,

    /// Set while `run` owns the dispatch loop
    driving: AtomicBool,
}

/// Clears the driving flag when `run` exits
struct DrivingGuard<'a>(&'a AtomicBool);

impl Drop for DrivingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Runs plans for many concurrent crawl jobs
pub struct ExecutionController {
    planner: Arc<HierarchicalPlanner>,
    patterns: Arc<dyn PatternStore>,
    history: Arc<dyn HistoryStore>,
    fetcher: Arc<dyn Fetcher>,
    telemetry: Arc<dyn TelemetrySink>,
    config: ExecutionConfig,
    features: FeatureToggles,
    jobs: RwLock<HashMap<String, Arc<Job>>>,
}

impl ExecutionController {
    pub fn new(
        config: &Config,
        planner: Arc<HierarchicalPlanner>,
        patterns: Arc<dyn PatternStore>,
        history: Arc<dyn HistoryStore>,
        fetcher: Arc<dyn Fetcher>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        Self {
            planner,
            patterns,
            history,
            fetcher,
            telemetry,
            config: config.execution.clone(),
            features: config.features.clone(),
            jobs: RwLock::new(HashMap::new()),
        }
    }

    /// Opens the configured store and builds a controller over it
    ///
    /// The planner gets historical cost estimates from the same store.
    ///
    /// # Returns
    ///
    /// * `Ok(ExecutionController)` - Ready to start jobs
    /// * `Err(CompassError)` - Invalid configuration or unusable database
    pub fn open(
        config: &Config,
        fetcher: Arc<dyn Fetcher>,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> crate::Result<Self> {
        validate(config)?;
        let store = Arc::new(SqliteStore::open(&config.storage)?);
        tracing::info!("Opened planning store at {}", config.storage.database_path);

        let planner = Arc::new(HierarchicalPlanner::new(
            config,
            store.clone(),
            store.clone(),
            Arc::new(HistoricalCostEstimator::new(store.clone())),
            Arc::clone(&telemetry),
        ));

        Ok(Self::new(
            config,
            planner,
            store.clone(),
            store,
            fetcher,
            telemetry,
        ))
    }

    async fn job(&self, job_id: &str) -> Result<Arc<Job>, ExecutionError> {
        self.jobs
            .read()
            .await
            .get(job_id)
            .cloned()
            .ok_or_else(|| ExecutionError::UnknownJob(job_id.to_string()))
    }

    /// Ids of registered jobs, sorted
    pub async fn active_jobs(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn phase(&self, job_id: &str) -> Result<ExecutionPhase, ExecutionError> {
        let job = self.job(job_id).await?;
        let execution = job.execution.lock().await;
        Ok(execution.phase())
    }

    /// Copy of a job's current execution state
    pub async fn snapshot(&self, job_id: &str) -> Result<PlanExecution, ExecutionError> {
        let job = self.job(job_id).await?;
        let execution = job.execution.lock().await;
        Ok(execution.clone())
    }

    // ===== Starting =====

    /// Plans a job and registers it for execution
    ///
    /// The context's candidates become the job's candidate pool.
    ///
    /// # Returns
    ///
    /// * `Ok(Plan)` - The initial plan
    /// * `Err(ExecutionError::NoActionableCandidates)` - Planning produced
    ///   nothing to do
    pub async fn plan_and_start(
        &self,
        job_id: &str,
        state: CrawlState,
        goal: Goal,
        context: PlanContext,
    ) -> Result<Plan, ExecutionError> {
        let pool = context.candidates.clone();
        let planner = Arc::clone(&self.planner);
        let plan =
            tokio::task::spawn_blocking(move || planner.generate_plan(&state, &goal, &context))
                .await?;

        if plan.is_empty() {
            tracing::warn!("Job {} has no actionable candidates", job_id);
            return Err(ExecutionError::NoActionableCandidates {
                job_id: job_id.to_string(),
            });
        }

        self.start_execution_with_pool(plan.clone(), job_id, pool)
            .await?;
        Ok(plan)
    }

    /// Registers a job for an existing plan; the pool is the plan's own actions
    pub async fn start_execution(&self, plan: Plan, job_id: &str) -> Result<(), ExecutionError> {
        let pool = plan
            .steps
            .iter()
            .map(|s| Candidate::new(s.action.clone()).with_expected_value(s.expected_value))
            .collect();
        self.start_execution_with_pool(plan, job_id, pool).await
    }

    /// Registers a job for an existing plan and candidate pool
    pub async fn start_execution_with_pool(
        &self,
        plan: Plan,
        job_id: &str,
        pool: Vec<Candidate>,
    ) -> Result<(), ExecutionError> {
        let execution = PlanExecution::new(
            job_id,
            plan,
            pool,
            self.config.clone(),
            self.features.clone(),
            Utc::now(),
        )?;

        let mut jobs = self.jobs.write().await;
        if jobs.contains_key(job_id) {
            return Err(ExecutionError::DuplicateJob(job_id.to_string()));
        }
        jobs.insert(
            job_id.to_string(),
            Arc::new(Job {
                execution: Mutex::new(execution),
                cancel: CancellationToken::new(),
                driving: AtomicBool::new(false),
            }),
        );

        Ok(())
    }

    // ===== Stepping =====

    /// Records an externally executed step
    ///
    /// Re-plans and finalizes as needed; a finished job's summary is attached
    /// to the report.
    pub async fn record_step(
        &self,
        job_id: &str,
        step_idx: usize,
        outcome: FetchOutcome,
    ) -> Result<StepReport, ExecutionError> {
        let job = self.job(job_id).await?;
        let mut execution = job.execution.lock().await;
        self.apply_outcome(&mut execution, step_idx, &outcome).await
    }

    async fn apply_outcome(
        &self,
        execution: &mut PlanExecution,
        step_idx: usize,
        outcome: &FetchOutcome,
    ) -> Result<StepReport, ExecutionError> {
        let mut report = execution.record_step(step_idx, outcome, Utc::now())?;

        if let Some(observation) = execution.cost_observations().last() {
            self.record_cost(observation.clone()).await;
        }

        if let Some(to_step) = report.backtracked_to {
            self.telemetry.emit(&TelemetryEvent::Backtracked {
                job_id: execution.job_id().to_string(),
                from_step: step_idx,
                to_step,
                backtrack_count: execution.backtrack_count(),
            });
        }

        if let Some(suppressed) = report.suppressed {
            self.telemetry.emit(&TelemetryEvent::ReplanSuppressed {
                job_id: execution.job_id().to_string(),
                reason: suppressed.reason,
                seconds_since_last: suppressed.seconds_since_last,
            });
        }

        if report.replan.is_some() {
            self.replan(execution).await?;
        }

        if execution.is_finished() {
            report.finished = true;
            report.summary = self.finalize(execution).await;
        }

        Ok(report)
    }

    /// Persists a cost observation off the async runtime
    async fn record_cost(&self, observation: CostObservation) {
        let kind = observation.action_type;
        let history = Arc::clone(&self.history);
        let written =
            tokio::task::spawn_blocking(move || history.record_cost_observation(&observation))
                .await;

        match written {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!("Failed to record cost observation for {}: {}", kind, e),
            Err(e) => tracing::warn!("Cost observation task for {} failed: {}", kind, e),
        }
    }

    async fn replan(&self, execution: &mut PlanExecution) -> Result<(), ExecutionError> {
        let Some(ReplanRequest {
            reason,
            state,
            goal,
            context,
        }) = execution.replan_request()
        else {
            return Ok(());
        };

        let planner = Arc::clone(&self.planner);
        let planned =
            tokio::task::spawn_blocking(move || planner.generate_plan(&state, &goal, &context))
                .await;

        match planned {
            Ok(plan) => {
                let applied = execution.apply_replan(plan, Utc::now())?;
                self.telemetry.emit(&TelemetryEvent::Replanned {
                    job_id: execution.job_id().to_string(),
                    reason: applied.reason,
                    new_steps: applied.new_steps,
                    total_steps: applied.total_steps,
                    replan_count: applied.replan_count,
                });
            }
            Err(e) => {
                tracing::warn!(
                    "Re-planning job {} ({}) failed, keeping current plan: {}",
                    execution.job_id(),
                    reason,
                    e
                );
                execution.skip_replan()?;
            }
        }

        Ok(())
    }

    // ===== Driving =====

    /// Drives a job to completion through the fetcher
    ///
    /// Cancellation is checked before every dispatch and raced against each
    /// fetch. A fetch that outlives the configured timeout is recorded as a
    /// zero-value failure.
    pub async fn run(&self, job_id: &str) -> Result<ExecutionSummary, ExecutionError> {
        let job = self.job(job_id).await?;
        if job.driving.swap(true, Ordering::SeqCst) {
            return Err(ExecutionError::AlreadyRunning(job_id.to_string()));
        }
        let _driving = DrivingGuard(&job.driving);
        let timeout = Duration::from_secs(self.config.fetch_timeout_secs);

        tracing::info!("Running job {}", job_id);

        loop {
            let (step_idx, action) = {
                let mut execution = job.execution.lock().await;

                if job.cancel.is_cancelled() && !execution.is_finished() {
                    tracing::info!("Job {} cancelled at step {}", job_id, execution.current_step());
                    execution.abort()?;
                }

                if execution.is_finished() {
                    let summary = match self.finalize(&mut execution).await {
                        Some(summary) => summary,
                        None => execution.summary(0, Utc::now()),
                    };
                    return Ok(summary);
                }

                let Some(action) = execution.current_action().cloned() else {
                    tracing::warn!("Job {} has no step at its cursor, aborting", job_id);
                    execution.abort()?;
                    continue;
                };
                (execution.current_step(), action)
            };

            let outcome = tokio::select! {
                _ = job.cancel.cancelled() => continue,
                outcome = self.fetch(&action, timeout) => outcome,
            };

            let mut execution = job.execution.lock().await;
            let report = self
                .apply_outcome(&mut execution, step_idx, &outcome)
                .await?;
            if let Some(summary) = report.summary {
                return Ok(summary);
            }
        }
    }

    async fn fetch(&self, action: &Action, timeout: Duration) -> FetchOutcome {
        let started = Instant::now();
        match tokio::time::timeout(timeout, self.fetcher.execute(action)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::debug!("Fetch of {} timed out", action.target());
                FetchOutcome::failed(
                    format!("timed out after {}s", timeout.as_secs()),
                    started.elapsed().as_secs_f64() * 1000.0,
                )
            }
        }
    }

    /// Cancels a job
    ///
    /// A job being driven by `run` is finalized by its driver, in which case
    /// this returns `None`; otherwise the job is aborted and finalized here.
    pub async fn stop(&self, job_id: &str) -> Result<Option<ExecutionSummary>, ExecutionError> {
        let job = self.job(job_id).await?;
        job.cancel.cancel();
        tracing::info!("Stop requested for job {}", job_id);

        if job.driving.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut execution = job.execution.lock().await;
        if !execution.is_finished() {
            execution.abort()?;
        }
        Ok(self.finalize(&mut execution).await)
    }

    // ===== Finalization =====

    /// Records learned patterns, emits the final event, and unregisters the job
    async fn finalize(&self, execution: &mut PlanExecution) -> Option<ExecutionSummary> {
        if !execution.mark_finalized() {
            return None;
        }

        let recorded = if self.features.pattern_discovery {
            self.record_patterns(execution.domain(), execution.pattern_outcomes())
                .await
        } else {
            0
        };

        let summary = execution.summary(recorded, Utc::now());
        self.telemetry.emit(&TelemetryEvent::ExecutionFinished {
            job_id: summary.job_id.clone(),
            domain: summary.domain.clone(),
            aborted: summary.phase == ExecutionPhase::Aborted,
            steps_executed: summary.steps_executed,
            actual_value: summary.actual_value,
            replan_count: summary.replan_count,
            patterns_recorded: recorded,
        });

        self.jobs.write().await.remove(execution.job_id());

        tracing::info!(
            "Job {} {}: {} steps, {:.0} value, {} re-plans, {} patterns recorded",
            summary.job_id,
            summary.phase,
            summary.steps_executed,
            summary.actual_value,
            summary.replan_count,
            recorded
        );

        Some(summary)
    }

    /// Writes pattern outcomes on the blocking pool, returning how many stuck
    async fn record_patterns(&self, domain: &str, outcomes: Vec<PatternOutcome>) -> usize {
        let patterns = Arc::clone(&self.patterns);
        let domain = domain.to_string();
        let task_domain = domain.clone();

        let written = tokio::task::spawn_blocking(move || {
            let mut recorded = 0;
            for outcome in outcomes {
                match patterns.record_outcome(
                    &task_domain,
                    &outcome.signature,
                    outcome.success,
                    outcome.value,
                ) {
                    Ok(()) => recorded += 1,
                    Err(e) => tracing::warn!(
                        "Failed to record pattern {} for {}: {}",
                        outcome.signature,
                        task_domain,
                        e
                    ),
                }
            }
            recorded
        })
        .await;

        written.unwrap_or_else(|e| {
            tracing::warn!("Pattern recording task for {} failed: {}", domain, e);
            0
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Action, ActionType, PlanStep, StepSource};
    use crate::scoring::StaticCostEstimator;
    use crate::telemetry::CollectingTelemetry;
    use async_trait::async_trait;
    use crate::CompassError;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    struct FixedFetcher {
        value: f64,
    }

    #[async_trait]
    impl Fetcher for FixedFetcher {
        async fn execute(&self, _action: &Action) -> FetchOutcome {
            FetchOutcome::success(self.value, 5.0)
        }
    }

    /// Blocks until cancelled from outside
    struct HangingFetcher {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl Fetcher for HangingFetcher {
        async fn execute(&self, _action: &Action) -> FetchOutcome {
            self.started.notify_one();
            std::future::pending::<()>().await;
            FetchOutcome::default()
        }
    }

    fn step(target: &str, expected: f64) -> PlanStep {
        PlanStep {
            action: Action::new(ActionType::ExploreHub, target, expected as u32, 1),
            expected_value: expected,
            priority: expected,
            source: StepSource::SearchGenerated,
            expected_cost_ms: None,
        }
    }

    fn plan(n: usize) -> Plan {
        let mut plan = Plan::empty("example.com", Goal::articles(100_000));
        plan.steps = (0..n).map(|i| step(&format!("/hub/{}", i), 100.0)).collect();
        plan
    }

    fn controller(
        config: Config,
        fetcher: Arc<dyn Fetcher>,
    ) -> (Arc<ExecutionController>, Arc<SqliteStore>, Arc<CollectingTelemetry>) {
        let store = Arc::new(SqliteStore::new_in_memory().unwrap());
        let telemetry = Arc::new(CollectingTelemetry::new());
        let planner = Arc::new(HierarchicalPlanner::new(
            &config,
            store.clone(),
            store.clone(),
            Arc::new(StaticCostEstimator::new()),
            telemetry.clone(),
        ));
        let controller = Arc::new(ExecutionController::new(
            &config,
            planner,
            store.clone(),
            store.clone(),
            fetcher,
            telemetry.clone(),
        ));
        (controller, store, telemetry)
    }

    #[tokio::test]
    async fn test_open_runs_against_configured_store() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.database_path = dir.path().join("compass.db").display().to_string();

        let controller = ExecutionController::open(
            &config,
            Arc::new(FixedFetcher { value: 100.0 }),
            Arc::new(CollectingTelemetry::new()),
        )
        .unwrap();
        controller.start_execution(plan(2), "job-1").await.unwrap();
        let summary = controller.run("job-1").await.unwrap();
        assert_eq!(summary.phase, ExecutionPhase::Completed);

        let store = SqliteStore::open(&config.storage).unwrap();
        assert_eq!(store.list_patterns("example.com").unwrap().len(), 2);
    }

    #[test]
    fn test_open_rejects_invalid_config() {
        let mut config = Config::default();
        config.execution.rolling_window = 0;

        let result = ExecutionController::open(
            &config,
            Arc::new(FixedFetcher { value: 1.0 }),
            Arc::new(CollectingTelemetry::new()),
        );
        assert!(matches!(result, Err(CompassError::Config(_))));
    }

    #[test]
    fn test_open_reports_unusable_database() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.storage.database_path = dir
            .path()
            .join("missing")
            .join("compass.db")
            .display()
            .to_string();

        let result = ExecutionController::open(
            &config,
            Arc::new(FixedFetcher { value: 1.0 }),
            Arc::new(CollectingTelemetry::new()),
        );
        assert!(matches!(result, Err(CompassError::Storage(_))));
    }

    #[tokio::test]
    async fn test_plan_and_start_without_candidates() {
        let (controller, _, _) = controller(Config::default(), Arc::new(FixedFetcher { value: 1.0 }));
        let result = controller
            .plan_and_start(
                "job-1",
                CrawlState::default(),
                Goal::articles(500),
                PlanContext::new("example.com", vec![]),
            )
            .await;
        assert!(matches!(
            result,
            Err(ExecutionError::NoActionableCandidates { .. })
        ));
        assert!(controller.active_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_job_rejected() {
        let (controller, _, _) = controller(Config::default(), Arc::new(FixedFetcher { value: 1.0 }));
        controller.start_execution(plan(2), "job-1").await.unwrap();
        let result = controller.start_execution(plan(2), "job-1").await;
        assert!(matches!(result, Err(ExecutionError::DuplicateJob(_))));
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let (controller, _, _) = controller(Config::default(), Arc::new(FixedFetcher { value: 1.0 }));
        let result = controller
            .record_step("missing", 0, FetchOutcome::success(1.0, 1.0))
            .await;
        assert!(matches!(result, Err(ExecutionError::UnknownJob(_))));
    }

    #[tokio::test]
    async fn test_run_to_completion_records_patterns() {
        let (controller, store, telemetry) =
            controller(Config::default(), Arc::new(FixedFetcher { value: 100.0 }));
        controller.start_execution(plan(3), "job-1").await.unwrap();

        let summary = controller.run("job-1").await.unwrap();
        assert_eq!(summary.phase, ExecutionPhase::Completed);
        assert_eq!(summary.steps_executed, 3);
        assert_eq!(summary.actual_value, 300.0);
        // explore-hub, explore-hub→explore-hub, explore-hub→explore-hub→explore-hub
        assert_eq!(summary.patterns_recorded, 3);

        let patterns = store.list_patterns("example.com").unwrap();
        assert_eq!(patterns.len(), 3);
        assert!(patterns.iter().all(|p| p.success_count == 1));

        assert!(controller.active_jobs().await.is_empty());
        assert!(telemetry
            .events()
            .iter()
            .any(|e| matches!(e, TelemetryEvent::ExecutionFinished { aborted: false, .. })));
    }

    #[tokio::test]
    async fn test_record_step_out_of_order() {
        let (controller, _, _) = controller(Config::default(), Arc::new(FixedFetcher { value: 1.0 }));
        controller.start_execution(plan(3), "job-1").await.unwrap();

        let result = controller
            .record_step("job-1", 2, FetchOutcome::success(100.0, 1.0))
            .await;
        assert!(matches!(
            result,
            Err(ExecutionError::StepOutOfOrder {
                expected: 0,
                got: 2
            })
        ));
    }

    #[tokio::test]
    async fn test_manual_steps_finish_job() {
        let (controller, store, _) = controller(Config::default(), Arc::new(FixedFetcher { value: 1.0 }));
        controller.start_execution(plan(2), "job-1").await.unwrap();

        let first = controller
            .record_step("job-1", 0, FetchOutcome::success(100.0, 1.0))
            .await
            .unwrap();
        assert!(!first.finished);

        let second = controller
            .record_step("job-1", 1, FetchOutcome::success(100.0, 1.0))
            .await
            .unwrap();
        assert!(second.finished);
        assert_eq!(
            second.summary.map(|s| s.phase),
            Some(ExecutionPhase::Completed)
        );

        let (avg, count) = store.average_cost(ActionType::ExploreHub).unwrap().unwrap();
        assert_eq!(count, 2);
        assert_eq!(avg, 1.0);
    }

    #[tokio::test]
    async fn test_step_costs_reach_job_log_and_store() {
        let (controller, store, _) = controller(Config::default(), Arc::new(FixedFetcher { value: 1.0 }));
        controller.start_execution(plan(3), "job-1").await.unwrap();

        controller
            .record_step("job-1", 0, FetchOutcome::success(100.0, 12.0))
            .await
            .unwrap();

        let execution = controller.snapshot("job-1").await.unwrap();
        let observations = execution.cost_observations();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].action_type, ActionType::ExploreHub);
        assert_eq!(observations[0].actual_cost_ms, 12.0);
        assert_eq!(observations[0].timestamp, execution.step_results()[0].timestamp);

        assert_eq!(
            store.average_cost(ActionType::ExploreHub).unwrap(),
            Some((12.0, 1))
        );
    }

    #[tokio::test]
    async fn test_stop_idle_job_keeps_partial_learning() {
        let (controller, store, _) = controller(Config::default(), Arc::new(FixedFetcher { value: 1.0 }));
        controller.start_execution(plan(3), "job-1").await.unwrap();
        controller
            .record_step("job-1", 0, FetchOutcome::success(100.0, 1.0))
            .await
            .unwrap();

        let summary = controller.stop("job-1").await.unwrap().unwrap();
        assert_eq!(summary.phase, ExecutionPhase::Aborted);
        assert_eq!(summary.steps_executed, 1);
        assert_eq!(summary.patterns_recorded, 1);
        assert_eq!(store.list_patterns("example.com").unwrap().len(), 1);
        assert!(matches!(
            controller.stop("job-1").await,
            Err(ExecutionError::UnknownJob(_))
        ));
    }

    #[tokio::test]
    async fn test_stop_interrupts_running_fetch() {
        let started = Arc::new(Notify::new());
        let (controller, _, _) = controller(
            Config::default(),
            Arc::new(HangingFetcher {
                started: started.clone(),
            }),
        );
        controller.start_execution(plan(3), "job-1").await.unwrap();

        let runner = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.run("job-1").await })
        };

        started.notified().await;
        assert_eq!(controller.stop("job-1").await.unwrap(), None);

        let summary = runner.await.unwrap().unwrap();
        assert_eq!(summary.phase, ExecutionPhase::Aborted);
        assert_eq!(summary.steps_executed, 0);
    }

    #[tokio::test]
    async fn test_run_twice_rejected() {
        let started = Arc::new(Notify::new());
        let (controller, _, _) = controller(
            Config::default(),
            Arc::new(HangingFetcher {
                started: started.clone(),
            }),
        );
        controller.start_execution(plan(1), "job-1").await.unwrap();

        let runner = {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { controller.run("job-1").await })
        };
        started.notified().await;

        assert!(matches!(
            controller.run("job-1").await,
            Err(ExecutionError::AlreadyRunning(_))
        ));

        controller.stop("job-1").await.unwrap();
        runner.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_fetch_timeout_counts_as_failure() {
        let mut config = Config::default();
        config.execution.fetch_timeout_secs = 1;
        let (controller, _, _) = controller(
            config,
            Arc::new(HangingFetcher {
                started: Arc::new(Notify::new()),
            }),
        );
        controller.start_execution(plan(1), "job-1").await.unwrap();

        let summary = controller.run("job-1").await.unwrap();
        assert_eq!(summary.phase, ExecutionPhase::Completed);
        assert_eq!(summary.actual_value, 0.0);
        assert_eq!(summary.steps_executed, 1);
    }
}
