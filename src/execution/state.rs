//! Per-job execution state machine
//!
//! `PlanExecution` owns one job's plan, cursor, results, and counters. It is
//! synchronous and takes the current time as an argument, so every decision
//! (adjustments, backtracks, re-plan triggers, cooldown) can be driven
//! step by step without a runtime.

use crate::config::{ExecutionConfig, FeatureToggles};
use crate::execution::{ExecutionError, ExecutionPhase, FetchOutcome};
use crate::learning::{reduce_outcomes, PatternOutcome};
use crate::model::{
    performance_ratio, Action, ActionType, Candidate, CostObservation, CrawlState, Goal, Plan,
    PlanContext, PlanStep, StepResult, StepSource,
};
use crate::telemetry::ReplanReason;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// How a step's realized value compares to its prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PerformanceClass {
    /// Ratio above 1.5
    Excellent,

    /// Ratio from 0.8 to 1.5
    Good,

    /// Ratio from 0.5 up to 0.8
    Acceptable,

    /// Ratio below 0.5
    Poor,
}

impl PerformanceClass {
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio > 1.5 {
            Self::Excellent
        } else if ratio >= 0.8 {
            Self::Good
        } else if ratio >= 0.5 {
            Self::Acceptable
        } else {
            Self::Poor
        }
    }
}

/// A plan step and how many times it has run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScheduledStep {
    pub step: PlanStep,
    pub executions: u32,
}

impl ScheduledStep {
    fn new(step: PlanStep) -> Self {
        Self {
            step,
            executions: 0,
        }
    }

    pub fn is_executed(&self) -> bool {
        self.executions > 0
    }
}

/// A re-plan trigger that fell inside the cooldown window
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuppressedReplan {
    pub reason: ReplanReason,
    pub seconds_since_last: i64,
}

/// What happened when a step result was recorded
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step_index: usize,
    pub performance_ratio: f64,
    pub performance: PerformanceClass,

    /// Steps inserted after the cursor
    pub synthesized: usize,

    /// Cursor position after a backtrack
    pub backtracked_to: Option<usize>,

    /// Re-plan the caller must now perform
    pub replan: Option<ReplanReason>,
    pub suppressed: Option<SuppressedReplan>,

    /// The execution reached a terminal phase
    pub finished: bool,

    /// Filled in by the controller once the execution has been finalized
    pub summary: Option<ExecutionSummary>,
}

/// Inputs for a re-planning call
#[derive(Debug, Clone)]
pub struct ReplanRequest {
    pub reason: ReplanReason,
    pub state: CrawlState,
    pub goal: Goal,
    pub context: PlanContext,
}

/// Result of splicing a new plan into an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplanApplied {
    pub reason: ReplanReason,
    pub new_steps: usize,
    pub total_steps: usize,
    pub replan_count: u32,
}

/// Final report of an execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub job_id: String,
    pub domain: String,
    pub phase: ExecutionPhase,
    pub steps_executed: usize,
    pub actual_value: f64,
    pub requests_processed: u64,
    pub replan_count: u32,
    pub suppressed_replans: u32,
    pub backtrack_count: u32,
    pub patterns_recorded: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

/// Execution state of one crawl job
#[derive(Debug, Clone)]
pub struct PlanExecution {
    job_id: String,
    domain: String,
    goal: Goal,
    steps: Vec<ScheduledStep>,
    current_step: usize,
    phase: ExecutionPhase,
    step_results: Vec<StepResult>,
    cost_observations: Vec<CostObservation>,
    candidate_pool: Vec<Candidate>,
    priority_adjustments: BTreeMap<ActionType, f64>,
    explored_targets: BTreeSet<String>,
    actual_value: f64,
    requests_processed: u64,
    backtrack_count: u32,
    backtracks_since_replan: u32,
    replan_count: u32,
    suppressed_replans: u32,
    last_replan_at: Option<DateTime<Utc>>,
    pending_replan: Option<ReplanReason>,
    finalized: bool,
    started_at: DateTime<Utc>,
    config: ExecutionConfig,
    features: FeatureToggles,
}

impl PlanExecution {
    /// Starts executing a plan
    ///
    /// # Arguments
    ///
    /// * `job_id` - Identifier of the crawl job
    /// * `plan` - Initial plan; must contain at least one step
    /// * `candidate_pool` - Candidates available for synthesis and re-planning
    /// * `config` - Execution thresholds
    /// * `features` - Feature toggles
    /// * `now` - Start time
    pub fn new(
        job_id: impl Into<String>,
        plan: Plan,
        candidate_pool: Vec<Candidate>,
        config: ExecutionConfig,
        features: FeatureToggles,
        now: DateTime<Utc>,
    ) -> Result<Self, ExecutionError> {
        let job_id = job_id.into();
        if plan.is_empty() {
            return Err(ExecutionError::NoActionableCandidates { job_id });
        }

        let mut execution = Self {
            job_id,
            domain: plan.domain,
            goal: plan.goal,
            steps: plan.steps.into_iter().map(ScheduledStep::new).collect(),
            current_step: 0,
            phase: ExecutionPhase::Planning,
            step_results: Vec::new(),
            cost_observations: Vec::new(),
            candidate_pool,
            priority_adjustments: BTreeMap::new(),
            explored_targets: BTreeSet::new(),
            actual_value: 0.0,
            requests_processed: 0,
            backtrack_count: 0,
            backtracks_since_replan: 0,
            replan_count: 0,
            suppressed_replans: 0,
            last_replan_at: None,
            pending_replan: None,
            finalized: false,
            started_at: now,
            config,
            features,
        };
        execution.transition(ExecutionPhase::Executing)?;

        tracing::info!(
            "Started job {} on {} with {} steps",
            execution.job_id,
            execution.domain,
            execution.steps.len()
        );

        Ok(execution)
    }

    // ===== Accessors =====

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    pub fn goal(&self) -> &Goal {
        &self.goal
    }

    pub fn phase(&self) -> ExecutionPhase {
        self.phase
    }

    pub fn is_finished(&self) -> bool {
        self.phase.is_terminal()
    }

    pub fn current_step(&self) -> usize {
        self.current_step
    }

    pub fn steps(&self) -> &[ScheduledStep] {
        &self.steps
    }

    /// Action at the cursor, if the plan has one left
    pub fn current_action(&self) -> Option<&Action> {
        self.steps.get(self.current_step).map(|s| &s.step.action)
    }

    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    /// Expected vs. actual duration of every recorded step, in order
    pub fn cost_observations(&self) -> &[CostObservation] {
        &self.cost_observations
    }

    pub fn candidate_pool(&self) -> &[Candidate] {
        &self.candidate_pool
    }

    pub fn priority_adjustments(&self) -> &BTreeMap<ActionType, f64> {
        &self.priority_adjustments
    }

    pub fn actual_value(&self) -> f64 {
        self.actual_value
    }

    pub fn requests_processed(&self) -> u64 {
        self.requests_processed
    }

    pub fn backtrack_count(&self) -> u32 {
        self.backtrack_count
    }

    pub fn backtracks_since_replan(&self) -> u32 {
        self.backtracks_since_replan
    }

    pub fn replan_count(&self) -> u32 {
        self.replan_count
    }

    pub fn suppressed_replans(&self) -> u32 {
        self.suppressed_replans
    }

    pub fn last_replan_at(&self) -> Option<DateTime<Utc>> {
        self.last_replan_at
    }

    pub fn pending_replan(&self) -> Option<ReplanReason> {
        self.pending_replan
    }

    // ===== Step evaluation =====

    /// Records the outcome of the step at the cursor
    ///
    /// `step_idx` must equal the cursor; anything else is rejected so two
    /// callers cannot both advance the same job.
    pub fn record_step(
        &mut self,
        step_idx: usize,
        outcome: &FetchOutcome,
        now: DateTime<Utc>,
    ) -> Result<StepReport, ExecutionError> {
        if self.phase != ExecutionPhase::Executing {
            return Err(ExecutionError::InvalidTransition {
                from: self.phase,
                to: ExecutionPhase::StepEvaluating,
            });
        }
        if step_idx != self.current_step || step_idx >= self.steps.len() {
            return Err(ExecutionError::StepOutOfOrder {
                expected: self.current_step,
                got: step_idx,
            });
        }

        self.transition(ExecutionPhase::StepEvaluating)?;

        let scheduled = &mut self.steps[step_idx];
        scheduled.executions += 1;
        let step = scheduled.step.clone();

        let actual = outcome.effective_value();
        let ratio = performance_ratio(actual, step.expected_value);
        let performance = PerformanceClass::from_ratio(ratio);

        if let Some(error) = &outcome.error {
            tracing::debug!(
                "Job {} step {} ({}) failed: {}",
                self.job_id,
                step_idx,
                step.action.target(),
                error
            );
        }

        self.step_results.push(StepResult {
            step_index: step_idx,
            action_type: step.action.kind(),
            target: step.action.target().to_string(),
            expected_value: step.expected_value,
            actual_value: actual,
            performance_ratio: ratio,
            duration_ms: outcome.duration_ms,
            error: outcome.error.clone(),
            timestamp: now,
        });
        self.cost_observations.push(CostObservation::new(
            step.action.kind(),
            step.expected_cost_ms,
            outcome.duration_ms,
            now,
        ));

        let previous_requests = self.requests_processed;
        self.requests_processed += u64::from(step.action.estimated_requests());
        self.actual_value += actual;
        self.explored_targets
            .insert(step.action.target().to_string());
        self.absorb_discovered(&outcome.discovered);

        tracing::debug!(
            "Job {} step {}: {} expected {:.1}, got {:.1} (ratio {:.2}, {:?})",
            self.job_id,
            step_idx,
            step.action.target(),
            step.expected_value,
            actual,
            ratio,
            performance
        );

        let mut report = StepReport {
            step_index: step_idx,
            performance_ratio: ratio,
            performance,
            synthesized: 0,
            backtracked_to: None,
            replan: None,
            suppressed: None,
            finished: false,
            summary: None,
        };

        let mut next_step = step_idx + 1;

        if self.features.real_time_adjustment {
            match performance {
                PerformanceClass::Excellent => {
                    self.transition(ExecutionPhase::Adjusting)?;
                    self.adjust_priorities(step.action.kind(), self.config.excellent_boost);
                    report.synthesized = self.synthesize_after(step_idx, &step);
                }
                PerformanceClass::Poor => {
                    self.transition(ExecutionPhase::Adjusting)?;
                    self.adjust_priorities(step.action.kind(), -self.config.poor_penalty);

                    if let Some(target) = self.backtrack_target(step_idx, &step, actual) {
                        self.backtrack_count += 1;
                        self.backtracks_since_replan += 1;
                        report.backtracked_to = Some(target);
                        next_step = target;

                        tracing::debug!(
                            "Job {} backtracking from step {} to {} ({} since last re-plan)",
                            self.job_id,
                            step_idx,
                            target,
                            self.backtracks_since_replan
                        );
                    }
                }
                PerformanceClass::Good | PerformanceClass::Acceptable => {}
            }
        }

        self.current_step = next_step;

        if self.goal_reached() {
            tracing::info!(
                "Job {} reached its goal of {} articles",
                self.job_id,
                self.goal.articles_target
            );
            self.transition(ExecutionPhase::Completed)?;
            report.finished = true;
            return Ok(report);
        }

        match self.check_replan(previous_requests, now) {
            ReplanDecision::Replan(reason) => {
                self.transition(ExecutionPhase::ReplanCheck)?;
                self.pending_replan = Some(reason);
                report.replan = Some(reason);
            }
            ReplanDecision::Suppressed(suppressed) => {
                report.suppressed = Some(suppressed);
                self.continue_or_complete()?;
            }
            ReplanDecision::None => self.continue_or_complete()?,
        }

        report.finished = self.is_finished();
        Ok(report)
    }

    fn absorb_discovered(&mut self, discovered: &[Action]) {
        for action in discovered {
            let known = self.candidate_pool.iter().any(|c| {
                c.action.kind() == action.kind() && c.action.target() == action.target()
            });
            if !known {
                self.candidate_pool.push(Candidate::new(action.clone()));
            }
        }
    }

    /// Shifts the priority of unexecuted steps of one type and re-sorts the
    /// remaining steps so the change takes effect
    fn adjust_priorities(&mut self, kind: ActionType, delta: f64) {
        *self.priority_adjustments.entry(kind).or_insert(0.0) += delta;

        let tail_start = self.current_step + 1;
        for scheduled in self.steps.iter_mut().skip(tail_start) {
            if !scheduled.is_executed() && scheduled.step.action.kind() == kind {
                scheduled.step.priority += delta;
            }
        }

        if tail_start < self.steps.len() {
            self.steps[tail_start..]
                .sort_by(|a, b| b.step.priority.total_cmp(&a.step.priority));
        }
    }

    /// Inserts similar steps directly after `step_idx`
    ///
    /// Similar steps come from the candidate pool; when the pool has none, a
    /// next-page variant of the excellent step is tried.
    fn synthesize_after(&mut self, step_idx: usize, step: &PlanStep) -> usize {
        let kind = step.action.kind();
        let max = self.config.max_synthesized_steps;
        let priority = step.priority + self.config.excellent_boost;

        let mut actions: Vec<(Action, f64)> = self
            .candidate_pool
            .iter()
            .filter(|c| c.action.kind() == kind)
            .filter(|c| self.is_fresh_target(c.action.target()))
            .take(max)
            .map(|c| (c.action.clone(), c.expected_value))
            .collect();

        if actions.is_empty() && max > 0 {
            if let Some(next) = step.action.next_page_variant() {
                if self.is_fresh_target(next.target()) {
                    actions.push((next, step.expected_value));
                }
            }
        }

        let count = actions.len();
        for (offset, (action, expected_value)) in actions.into_iter().enumerate() {
            self.steps.insert(
                step_idx + 1 + offset,
                ScheduledStep::new(PlanStep {
                    action,
                    expected_value,
                    priority,
                    source: StepSource::Synthesized,
                    expected_cost_ms: step.expected_cost_ms,
                }),
            );
        }

        if count > 0 {
            tracing::debug!(
                "Job {} synthesized {} {} steps after step {}",
                self.job_id,
                count,
                kind,
                step_idx
            );
        }

        count
    }

    fn is_fresh_target(&self, target: &str) -> bool {
        !self.explored_targets.contains(target)
            && !self.steps.iter().any(|s| s.step.action.target() == target)
    }

    fn backtrack_target(&self, step_idx: usize, step: &PlanStep, actual: f64) -> Option<usize> {
        if actual >= step.expected_value * self.config.backtrack_ratio {
            return None;
        }
        if self.backtracks_since_replan > self.config.backtrack_limit
            || self.backtrack_count >= self.config.max_backtracks
        {
            return None;
        }
        if step_idx == 0 {
            return None;
        }
        Some(step_idx.saturating_sub(self.config.backtrack_distance))
    }

    fn goal_reached(&self) -> bool {
        self.goal.articles_target > 0 && self.actual_value >= self.goal.articles_target as f64
    }

    /// Candidates not yet explored or scheduled
    fn fresh_candidates(&self) -> Vec<Candidate> {
        self.candidate_pool
            .iter()
            .filter(|c| self.is_fresh_target(c.action.target()))
            .cloned()
            .collect()
    }

    fn rolling_ratio(&self) -> Option<f64> {
        let window = self.config.rolling_window;
        if window == 0 || self.step_results.len() < window {
            return None;
        }
        let recent = &self.step_results[self.step_results.len() - window..];
        Some(recent.iter().map(|r| r.performance_ratio).sum::<f64>() / window as f64)
    }

    // ===== Re-planning =====

    fn check_replan(&mut self, previous_requests: u64, now: DateTime<Utc>) -> ReplanDecision {
        if !self.features.dynamic_replanning {
            return ReplanDecision::None;
        }

        if self.current_step >= self.steps.len() {
            return if self.fresh_candidates().is_empty() {
                ReplanDecision::None
            } else {
                ReplanDecision::Replan(ReplanReason::PlanExhausted)
            };
        }

        let interval = self.config.replan_interval_requests.max(1);
        let reason = if self.backtracks_since_replan > self.config.backtrack_limit {
            Some(ReplanReason::BacktrackLimit)
        } else if self
            .rolling_ratio()
            .is_some_and(|r| (r - 1.0).abs() > self.config.replan_deviation)
        {
            Some(ReplanReason::PerformanceDeviation)
        } else if previous_requests / interval < self.requests_processed / interval {
            Some(ReplanReason::RequestInterval)
        } else {
            None
        };

        let Some(reason) = reason else {
            return ReplanDecision::None;
        };

        if let Some(last) = self.last_replan_at {
            let elapsed = (now - last).num_seconds();
            if elapsed < self.config.replan_cooldown_secs as i64 {
                self.suppressed_replans += 1;
                tracing::info!(
                    "Job {}: re-plan ({}) suppressed, last re-plan {}s ago",
                    self.job_id,
                    reason,
                    elapsed
                );
                return ReplanDecision::Suppressed(SuppressedReplan {
                    reason,
                    seconds_since_last: elapsed,
                });
            }
        }

        ReplanDecision::Replan(reason)
    }

    fn continue_or_complete(&mut self) -> Result<(), ExecutionError> {
        if self.current_step >= self.steps.len() {
            self.transition(ExecutionPhase::Completed)
        } else {
            self.transition(ExecutionPhase::Executing)
        }
    }

    /// Observed crawl state for the planner
    pub fn crawl_state(&self) -> CrawlState {
        let hubs_discovered = self
            .step_results
            .iter()
            .filter(|r| r.action_type == ActionType::ExploreHub)
            .map(|r| r.target.as_str())
            .collect::<BTreeSet<_>>()
            .len() as u64;

        CrawlState {
            hubs_discovered,
            articles_collected: self.actual_value.round() as u64,
            requests_made: self.requests_processed,
            momentum: self.rolling_ratio().unwrap_or(1.0),
            explored_targets: self.explored_targets.clone(),
        }
    }

    /// Planner inputs for the pending re-plan, if any
    pub fn replan_request(&self) -> Option<ReplanRequest> {
        let reason = self.pending_replan?;
        let mut context = PlanContext::new(self.domain.clone(), self.fresh_candidates());
        context.priority_adjustments = self.priority_adjustments.clone();

        Some(ReplanRequest {
            reason,
            state: self.crawl_state(),
            goal: self.goal,
            context,
        })
    }

    /// Splices a new plan in after the cursor
    ///
    /// Unexecuted old steps are discarded. An empty new plan keeps the old
    /// remaining steps and leaves the backtrack counter as it was.
    pub fn apply_replan(
        &mut self,
        plan: Plan,
        now: DateTime<Utc>,
    ) -> Result<ReplanApplied, ExecutionError> {
        let reason = self.pending_replan.ok_or(ExecutionError::InvalidTransition {
            from: self.phase,
            to: ExecutionPhase::Planning,
        })?;
        self.transition(ExecutionPhase::Planning)?;

        let new_steps = plan.steps.len();
        if new_steps > 0 {
            self.steps.truncate(self.current_step);
            self.steps
                .extend(plan.steps.into_iter().map(ScheduledStep::new));
            self.backtracks_since_replan = 0;
        }

        self.replan_count += 1;
        self.last_replan_at = Some(now);
        self.pending_replan = None;

        tracing::info!(
            "Job {} re-planned ({}): {} new steps, {} total",
            self.job_id,
            reason,
            new_steps,
            self.steps.len()
        );

        if self.current_step >= self.steps.len() {
            self.transition(ExecutionPhase::Completed)?;
        } else {
            self.transition(ExecutionPhase::Executing)?;
        }

        Ok(ReplanApplied {
            reason,
            new_steps,
            total_steps: self.steps.len(),
            replan_count: self.replan_count,
        })
    }

    /// Drops a pending re-plan and carries on with the current plan
    pub fn skip_replan(&mut self) -> Result<(), ExecutionError> {
        if self.pending_replan.take().is_none() {
            return Ok(());
        }
        if self.current_step >= self.steps.len() {
            self.transition(ExecutionPhase::Completed)
        } else {
            self.transition(ExecutionPhase::Executing)
        }
    }

    // ===== Termination =====

    /// Aborts the execution; already recorded results are kept
    pub fn abort(&mut self) -> Result<(), ExecutionError> {
        self.pending_replan = None;
        self.transition(ExecutionPhase::Aborted)
    }

    /// Reduces recorded results into pattern outcomes
    pub fn pattern_outcomes(&self) -> Vec<PatternOutcome> {
        reduce_outcomes(
            &self.step_results,
            self.config.signature_window,
            self.config.success_ratio,
        )
    }

    /// Marks the execution as finalized; returns false if it already was
    pub fn mark_finalized(&mut self) -> bool {
        !std::mem::replace(&mut self.finalized, true)
    }

    pub fn summary(&self, patterns_recorded: usize, now: DateTime<Utc>) -> ExecutionSummary {
        ExecutionSummary {
            job_id: self.job_id.clone(),
            domain: self.domain.clone(),
            phase: self.phase,
            steps_executed: self.step_results.len(),
            actual_value: self.actual_value,
            requests_processed: self.requests_processed,
            replan_count: self.replan_count,
            suppressed_replans: self.suppressed_replans,
            backtrack_count: self.backtrack_count,
            patterns_recorded,
            started_at: self.started_at,
            finished_at: now,
        }
    }

    fn transition(&mut self, next: ExecutionPhase) -> Result<(), ExecutionError> {
        if !self.phase.can_transition_to(next) {
            return Err(ExecutionError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        tracing::trace!("Job {}: {} -> {}", self.job_id, self.phase, next);
        self.phase = next;
        Ok(())
    }
}

enum ReplanDecision {
    None,
    Replan(ReplanReason),
    Suppressed(SuppressedReplan),
}
