//! Reviser - rewrites the latest draft against the reviewer's notes

use async_trait::async_trait;
use tracing::{debug, info};

use super::{AgentBinding, Stage, StageKind, WorkflowError};
use crate::domain::DraftState;
use crate::llm::{CompletionRequest, LlmError};
use crate::prompts::ReviseContext;

const SYSTEM_PROMPT: &str = "You are a rural planning report editor. You revise drafts to address \
reviewer feedback precisely and return the full revised report.";

pub struct Reviser {
    binding: AgentBinding,
}

impl Reviser {
    pub fn new(binding: AgentBinding) -> Self {
        Self { binding }
    }
}

#[async_trait]
impl Stage for Reviser {
    fn kind(&self) -> StageKind {
        StageKind::Revise
    }

    async fn run(&self, state: &DraftState) -> Result<DraftState, WorkflowError> {
        debug!(versions = state.version_count(), "Reviser::run: called");
        let latest = state
            .latest()
            .ok_or_else(|| WorkflowError::precondition(StageKind::Revise, "there is no draft to revise"))?;
        let notes = state.revision_notes().trim();
        if notes.is_empty() {
            return Err(WorkflowError::precondition(StageKind::Revise, "revision notes are empty"));
        }

        let prompt = self.binding.render(
            "revise",
            &ReviseContext {
                draft: &latest.content,
                notes,
            },
        )?;
        let request = CompletionRequest::new(SYSTEM_PROMPT, prompt, self.binding.max_tokens)
            .with_model(&state.subject().model.model);
        let response = self.binding.generate(StageKind::Revise, request).await?;

        let content = response
            .trimmed_text()
            .ok_or_else(|| WorkflowError::generation(StageKind::Revise, LlmError::EmptyResponse))?;

        let next = state.with_version(content);
        info!(version = next.version_count(), "Draft revised");
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReviewOutcome, ReviewStatus};
    use crate::llm::client::mock::MockLlmClient;
    use crate::workflow::test_support::{binding, seed};
    use std::sync::Arc;

    fn failed_review(notes: &str) -> DraftState {
        seed(&["g"]).with_version("draft v1").with_review(ReviewOutcome::Failed {
            notes: notes.to_string(),
        })
    }

    #[tokio::test]
    async fn test_reviser_appends_next_version() {
        let mock = Arc::new(MockLlmClient::texts(&["draft v2"]));
        let reviser = Reviser::new(binding(mock.clone()));
        let before = failed_review("Add population data");

        let after = reviser.run(&before).await.unwrap();
        assert_eq!(after.version_count(), 2);
        assert_eq!(after.latest().unwrap().version, 2);
        assert_eq!(after.latest().unwrap().content, "draft v2");
        assert_eq!(after.versions()[0], before.versions()[0]);
        // notes stay put until the next review replaces them
        assert_eq!(after.review_status(), ReviewStatus::Failed);

        let text = mock.requests()[0].user_text();
        assert!(text.contains("draft v1"));
        assert!(text.contains("Add population data"));
    }

    #[tokio::test]
    async fn test_reviser_rejects_empty_notes() {
        let mock = Arc::new(MockLlmClient::texts(&["unused"]));
        let reviser = Reviser::new(binding(mock.clone()));

        let err = reviser.run(&failed_review("  ")).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Precondition { stage: StageKind::Revise, .. }));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reviser_rejects_missing_draft() {
        let mock = Arc::new(MockLlmClient::texts(&["unused"]));
        let reviser = Reviser::new(binding(mock));

        let err = reviser.run(&seed(&["g"])).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Precondition { .. }));
    }

    #[tokio::test]
    async fn test_reviser_blank_reply_is_generation_error() {
        let mock = Arc::new(MockLlmClient::texts(&[""]));
        let reviser = Reviser::new(binding(mock));

        let err = reviser.run(&failed_review("fix it")).await.unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::Generation {
                stage: StageKind::Revise,
                source: LlmError::EmptyResponse
            }
        ));
    }
}
