//! Workflow error types

use thiserror::Error;

use super::StageKind;
use crate::llm::LlmError;

/// Errors raised by a single stage or by the engine's routing
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// A stage's required input is missing; the calling code built an invalid state
    #[error("{stage} precondition failed: {reason}")]
    Precondition { stage: StageKind, reason: String },

    /// The text-generation collaborator failed or returned unusable content
    #[error("{stage} generation failed: {source}")]
    Generation { stage: StageKind, source: LlmError },

    /// Missing subject, empty guidelines, unreadable template and the like
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A stage returned a snapshot that breaks the draft invariants
    #[error("{stage} broke the draft contract: {reason}")]
    ContractViolation { stage: StageKind, reason: String },

    /// The review loop hit its revision cap without a pass
    #[error("Review still failing after {limit} revision(s)")]
    IterationLimitExceeded { limit: u32 },
}

impl WorkflowError {
    /// Shorthand for a precondition failure
    pub fn precondition(stage: StageKind, reason: impl Into<String>) -> Self {
        WorkflowError::Precondition {
            stage,
            reason: reason.into(),
        }
    }

    /// Shorthand for a generation failure
    pub fn generation(stage: StageKind, source: LlmError) -> Self {
        WorkflowError::Generation { stage, source }
    }

    /// Whether a caller-configured stage retry may re-run the stage
    ///
    /// Only generation failures qualify. Malformed output is worth another
    /// attempt; bad credentials, unknown providers and 4xx errors are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            WorkflowError::Generation { source, .. } => {
                source.is_retryable() || matches!(source, LlmError::InvalidResponse(_) | LlmError::Json(_))
            }
            _ => false,
        }
    }

    /// How long the collaborator asked us to wait, if it did
    pub fn retry_after(&self) -> Option<std::time::Duration> {
        match self {
            WorkflowError::Generation { source, .. } => source.retry_after(),
            _ => None,
        }
    }
}

/// A failed run: which stage, which review round, and how far the draft got
#[derive(Debug, Error)]
#[error("{stage} stage failed at iteration {iteration} with {versions} version(s): {error}")]
pub struct RunError {
    pub stage: StageKind,
    /// Review round in progress when the failure happened (0 = analysis)
    pub iteration: u32,
    /// Length of `versions` at failure time
    pub versions: usize,
    #[source]
    pub error: WorkflowError,
}
