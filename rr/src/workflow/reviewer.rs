//! Reviewer - judges the latest draft against the guidelines

use async_trait::async_trait;
use tracing::{debug, info};

use super::verdict::{self, ACCEPTANCE_MARKER, VerdictMode};
use super::{AgentBinding, Stage, StageKind, WorkflowError};
use crate::domain::{DraftState, ReviewOutcome};
use crate::llm::{CompletionRequest, ResponseFormat};
use crate::prompts::ReviewContext;

const SYSTEM_PROMPT: &str = "You are a senior reviewer of rural planning reports. You check drafts \
strictly against the review criteria you are given and nothing else.";

pub struct Reviewer {
    binding: AgentBinding,
    mode: VerdictMode,
}

impl Reviewer {
    pub fn new(binding: AgentBinding, mode: VerdictMode) -> Self {
        Self { binding, mode }
    }
}

#[async_trait]
impl Stage for Reviewer {
    fn kind(&self) -> StageKind {
        StageKind::Review
    }

    async fn run(&self, state: &DraftState) -> Result<DraftState, WorkflowError> {
        debug!(versions = state.version_count(), mode = ?self.mode, "Reviewer::run: called");
        let latest = state
            .latest()
            .ok_or_else(|| WorkflowError::precondition(StageKind::Review, "there is no draft to review"))?;
        if state.guidelines().is_empty() {
            return Err(WorkflowError::precondition(StageKind::Review, "review guidelines are empty"));
        }

        let previous_notes = Some(state.revision_notes()).filter(|n| !n.trim().is_empty());
        let structured = self.mode == VerdictMode::Structured;
        let prompt = self.binding.render(
            "review",
            &ReviewContext {
                guidelines: state.guidelines(),
                draft: &latest.content,
                previous_notes,
                acceptance_marker: ACCEPTANCE_MARKER,
                structured,
            },
        )?;

        let format = if structured {
            ResponseFormat::Structured
        } else {
            ResponseFormat::Plain
        };
        let request = CompletionRequest::new(SYSTEM_PROMPT, prompt, self.binding.max_tokens)
            .with_model(&state.subject().model.model)
            .with_format(format);
        let response = self.binding.generate(StageKind::Review, request).await?;

        let outcome = match self.mode {
            VerdictMode::Structured => verdict::parse_structured(&response)
                .map_err(|e| WorkflowError::generation(StageKind::Review, e))?,
            VerdictMode::Marker => verdict::parse_marker(response.content.as_deref().unwrap_or_default(), ACCEPTANCE_MARKER),
        };

        match &outcome {
            ReviewOutcome::Passed => info!(version = latest.version, "Review passed"),
            ReviewOutcome::Failed { notes } => info!(version = latest.version, notes_len = notes.len(), "Review failed"),
        }
        Ok(state.with_review(outcome))
    }
}
