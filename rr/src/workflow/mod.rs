//! Draft-review-revise workflow
//!
//! Three stages share one [`DraftState`](crate::domain::DraftState) record:
//! the [`Analyzer`] writes the first draft, the [`Reviewer`] judges the
//! latest draft against the guidelines, and the [`Reviser`] rewrites it
//! against the reviewer's notes. [`WorkflowEngine`] owns the routing between
//! them, the revision cap and the caller-configured stage retry.

mod analyzer;
mod engine;
mod error;
mod reviewer;
mod reviser;
mod stage;
pub mod verdict;

pub use analyzer::Analyzer;
pub use engine::{EngineConfig, LimitPolicy, Outcome, StageRecord, StageRetry, WorkflowEngine, WorkflowRun};
pub use error::{RunError, WorkflowError};
pub use reviewer::Reviewer;
pub use reviser::Reviser;
pub use stage::{AgentBinding, Stage, StageKind};
pub use verdict::{ACCEPTANCE_MARKER, VerdictMode};

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use super::AgentBinding;
    use crate::domain::{DraftState, SubjectContext};
    use crate::llm::{LlmClient, ModelSelection};
    use crate::prompts::PromptLoader;

    pub fn binding(llm: Arc<dyn LlmClient>) -> AgentBinding {
        AgentBinding::new(llm, Arc::new(PromptLoader::embedded_only()), 1024)
    }

    pub fn seed(guidelines: &[&str]) -> DraftState {
        DraftState::new(
            SubjectContext::new("Village X", None, ModelSelection::new("openai", "test-model")),
            guidelines.iter().map(|g| g.to_string()).collect(),
        )
    }
}
