//! Analyzer - produces the first draft from the subject context

use async_trait::async_trait;
use tracing::{debug, info};

use super::{AgentBinding, Stage, StageKind, WorkflowError};
use crate::domain::DraftState;
use crate::llm::{CompletionRequest, LlmError};
use crate::prompts::AnalyzeContext;

const SYSTEM_PROMPT: &str = "You are a rural planning analyst. You write factual, well structured \
current-situation reports on villages and townships for planning authorities.";

pub struct Analyzer {
    binding: AgentBinding,
}

impl Analyzer {
    pub fn new(binding: AgentBinding) -> Self {
        Self { binding }
    }
}

#[async_trait]
impl Stage for Analyzer {
    fn kind(&self) -> StageKind {
        StageKind::Analyze
    }

    async fn run(&self, state: &DraftState) -> Result<DraftState, WorkflowError> {
        debug!(versions = state.version_count(), "Analyzer::run: called");
        if state.version_count() != 0 {
            return Err(WorkflowError::precondition(
                StageKind::Analyze,
                format!("expected an empty draft, found {} version(s)", state.version_count()),
            ));
        }

        let subject = state.subject();
        if subject.subject_name.trim().is_empty() {
            return Err(WorkflowError::precondition(StageKind::Analyze, "subject name is empty"));
        }

        let prompt = self.binding.render(
            "analyze",
            &AnalyzeContext {
                subject_name: &subject.subject_name,
                query: &subject.query,
                research: &subject.research,
                framework: &subject.framework,
            },
        )?;
        let request =
            CompletionRequest::new(SYSTEM_PROMPT, prompt, self.binding.max_tokens).with_model(&subject.model.model);
        let response = self.binding.generate(StageKind::Analyze, request).await?;

        let content = response
            .trimmed_text()
            .ok_or_else(|| WorkflowError::generation(StageKind::Analyze, LlmError::EmptyResponse))?;

        info!(subject = %subject.subject_name, len = content.len(), "Initial draft written");
        Ok(state.with_version(content))
    }
}
