//! WorkflowEngine - drives a draft through analyze, review and revise
//!
//! The graph is fixed:
//!
//! ```text
//! ANALYZE -> REVIEW -> ACCEPT                (review passed)
//!            REVIEW -> REVISE -> REVIEW ...  (review failed)
//! ```
//!
//! Every stage receives the latest committed snapshot and returns a new one.
//! A snapshot is only committed after it passes the engine's contract checks,
//! so a failed or rejected stage never leaks a partial state into the run.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{Analyzer, AgentBinding, RunError, Reviewer, Reviser, Stage, StageKind, VerdictMode, WorkflowError};
use crate::domain::{DraftState, ReviewStatus};
use crate::llm::LlmError;

/// What to do when the review keeps failing after `max_revisions` revisions
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LimitPolicy {
    /// Stop with `IterationLimitExceeded`
    #[default]
    Fail,
    /// Stop with the latest draft, flagged as not accepted
    AcceptWithWarning,
}

/// Caller-configured re-execution of a stage after a retryable generation error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageRetry {
    /// Total attempts per stage invocation, including the first (1 = no retry)
    pub max_attempts: u32,
    /// Base delay, doubled on every further attempt
    pub backoff: Duration,
}

impl Default for StageRetry {
    fn default() -> Self {
        Self {
            max_attempts: 1,
            backoff: Duration::from_millis(500),
        }
    }
}

impl StageRetry {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    /// Delay before attempt `attempt + 1`, with up to 10% jitter
    pub fn delay(&self, attempt: u32) -> Duration {
        let base = self.backoff.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
        let jitter_ms = (base.as_millis() / 10) as u64;
        if jitter_ms == 0 {
            return base;
        }
        base + Duration::from_millis(rand::rng().random_range(0..=jitter_ms))
    }
}

/// Engine settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Maximum number of REVISE executions before the limit policy applies
    pub max_revisions: u32,
    pub on_limit: LimitPolicy,
    pub retry: StageRetry,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_revisions: 5,
            on_limit: LimitPolicy::Fail,
            retry: StageRetry::none(),
        }
    }
}

/// How a successful run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Outcome {
    /// The last review passed
    Accepted,
    /// The revision limit was hit and the policy accepted the latest draft anyway
    LimitReached,
}

/// One committed stage execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: StageKind,
    pub iteration: u32,
    pub attempts: u32,
    pub versions: usize,
    pub review_status: ReviewStatus,
}

/// Terminal state of a run plus its execution trace
#[derive(Debug, Clone)]
pub struct WorkflowRun {
    pub state: DraftState,
    pub outcome: Outcome,
    pub review_rounds: u32,
    pub revisions: u32,
    pub trace: Vec<StageRecord>,
}

impl WorkflowRun {
    pub fn accepted(&self) -> bool {
        self.outcome == Outcome::Accepted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Analyze,
    Review,
    Revise,
    Accept,
}

/// Workflow execution engine
pub struct WorkflowEngine {
    run_id: String,
    analyzer: Arc<dyn Stage>,
    reviewer: Arc<dyn Stage>,
    reviser: Arc<dyn Stage>,
    config: EngineConfig,
}

impl WorkflowEngine {
    /// Create an engine over arbitrary stage implementations
    pub fn new(
        run_id: impl Into<String>,
        analyzer: Arc<dyn Stage>,
        reviewer: Arc<dyn Stage>,
        reviser: Arc<dyn Stage>,
        config: EngineConfig,
    ) -> Self {
        let run_id = run_id.into();
        debug!(%run_id, ?config, "WorkflowEngine::new: called");
        Self {
            run_id,
            analyzer,
            reviewer,
            reviser,
            config,
        }
    }

    /// Create an engine with the standard stages bound to one collaborator
    pub fn standard(run_id: impl Into<String>, binding: AgentBinding, verdict: VerdictMode, config: EngineConfig) -> Self {
        Self::new(
            run_id,
            Arc::new(Analyzer::new(binding.clone())),
            Arc::new(Reviewer::new(binding.clone(), verdict)),
            Arc::new(Reviser::new(binding)),
            config,
        )
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the workflow from a seed state to a terminal state
    pub async fn run(&self, seed: DraftState) -> Result<WorkflowRun, RunError> {
        info!(
            run_id = %self.run_id,
            subject = %seed.subject().subject_name,
            guidelines = seed.guidelines().len(),
            max_revisions = self.config.max_revisions,
            "Workflow starting"
        );
        if seed.guidelines().is_empty() {
            return Err(RunError {
                stage: StageKind::Analyze,
                iteration: 0,
                versions: seed.version_count(),
                error: WorkflowError::Configuration("review guidelines are empty".to_string()),
            });
        }

        let mut state = seed;
        let mut step = Step::Analyze;
        let mut review_rounds = 0u32;
        let mut revisions = 0u32;
        let mut trace = Vec::new();

        loop {
            debug!(run_id = %self.run_id, ?step, review_rounds, revisions, "WorkflowEngine::run: step");
            step = match step {
                Step::Analyze => {
                    state = self.execute(&*self.analyzer, &state, 0, &mut trace).await?;
                    Step::Review
                }
                Step::Review => {
                    review_rounds += 1;
                    state = self.execute(&*self.reviewer, &state, review_rounds, &mut trace).await?;
                    match state.review_status() {
                        ReviewStatus::Passed => Step::Accept,
                        _ if revisions >= self.config.max_revisions => {
                            return self.limit_reached(state, review_rounds, revisions, trace);
                        }
                        _ => Step::Revise,
                    }
                }
                Step::Revise => {
                    revisions += 1;
                    state = self.execute(&*self.reviser, &state, review_rounds, &mut trace).await?;
                    Step::Review
                }
                Step::Accept => {
                    info!(
                        run_id = %self.run_id,
                        versions = state.version_count(),
                        review_rounds,
                        "Workflow accepted"
                    );
                    return Ok(WorkflowRun {
                        state,
                        outcome: Outcome::Accepted,
                        review_rounds,
                        revisions,
                        trace,
                    });
                }
            };
        }
    }

    fn limit_reached(
        &self,
        state: DraftState,
        review_rounds: u32,
        revisions: u32,
        trace: Vec<StageRecord>,
    ) -> Result<WorkflowRun, RunError> {
        let limit = self.config.max_revisions;
        match self.config.on_limit {
            LimitPolicy::Fail => {
                warn!(run_id = %self.run_id, limit, "Revision limit reached, failing run");
                Err(RunError {
                    stage: StageKind::Review,
                    iteration: review_rounds,
                    versions: state.version_count(),
                    error: WorkflowError::IterationLimitExceeded { limit },
                })
            }
            LimitPolicy::AcceptWithWarning => {
                warn!(
                    run_id = %self.run_id,
                    limit,
                    versions = state.version_count(),
                    "Revision limit reached, keeping latest draft without a pass"
                );
                Ok(WorkflowRun {
                    state,
                    outcome: Outcome::LimitReached,
                    review_rounds,
                    revisions,
                    trace,
                })
            }
        }
    }

    /// Run one stage, retrying retryable failures, and commit its output
    async fn execute(
        &self,
        stage: &dyn Stage,
        state: &DraftState,
        iteration: u32,
        trace: &mut Vec<StageRecord>,
    ) -> Result<DraftState, RunError> {
        let kind = stage.kind();
        let mut attempt = 1u32;
        loop {
            debug!(run_id = %self.run_id, %kind, iteration, attempt, "WorkflowEngine::execute: called");
            let result = stage.run(state).await.and_then(|next| check_output(kind, state, next));
            match result {
                Ok(next) => {
                    trace.push(StageRecord {
                        stage: kind,
                        iteration,
                        attempts: attempt,
                        versions: next.version_count(),
                        review_status: next.review_status(),
                    });
                    return Ok(next);
                }
                Err(e) if e.is_retryable() && attempt < self.config.retry.max_attempts => {
                    let delay = e.retry_after().unwrap_or_else(|| self.config.retry.delay(attempt));
                    warn!(
                        run_id = %self.run_id,
                        %kind,
                        attempt,
                        error = %e,
                        ?delay,
                        "Stage failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(error) => {
                    warn!(run_id = %self.run_id, %kind, iteration, error = %error, "Stage failed");
                    return Err(RunError {
                        stage: kind,
                        iteration,
                        versions: state.version_count(),
                        error,
                    });
                }
            }
        }
    }
}

/// Contract checks applied before a stage's snapshot is committed
fn check_output(kind: StageKind, before: &DraftState, after: DraftState) -> Result<DraftState, WorkflowError> {
    let expected = match kind {
        StageKind::Analyze | StageKind::Revise => before.version_count() + 1,
        StageKind::Review => before.version_count(),
    };
    if after.version_count() != expected {
        return Err(WorkflowError::ContractViolation {
            stage: kind,
            reason: format!("expected {} version(s), got {}", expected, after.version_count()),
        });
    }
    if !after.numbering_is_contiguous() || after.versions()[..before.version_count()] != *before.versions() {
        return Err(WorkflowError::ContractViolation {
            stage: kind,
            reason: "existing versions were modified".to_string(),
        });
    }

    if kind == StageKind::Review {
        match after.review_status() {
            ReviewStatus::Unreviewed => {
                return Err(WorkflowError::ContractViolation {
                    stage: kind,
                    reason: "review left the draft unreviewed".to_string(),
                });
            }
            // A failed review must hand the reviser something to act on
            ReviewStatus::Failed if after.revision_notes().trim().is_empty() => {
                return Err(WorkflowError::generation(kind, LlmError::EmptyResponse));
            }
            _ => {}
        }
    }
    Ok(after)
}
