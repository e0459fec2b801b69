//! The Stage capability and the collaborator binding shared by every stage

use std::fmt;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::WorkflowError;
use crate::domain::DraftState;
use crate::llm::{CompletionRequest, CompletionResponse, LlmClient, TokenUsage};
use crate::prompts::PromptLoader;

/// One named step in the workflow graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Analyze,
    Review,
    Revise,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Analyze => write!(f, "analyze"),
            Self::Review => write!(f, "review"),
            Self::Revise => write!(f, "revise"),
        }
    }
}

/// A stateless draft transformer: snapshot in, new snapshot out
///
/// Implementations must not keep references to the state across calls and
/// issue at most one generation request per invocation.
#[async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn run(&self, state: &DraftState) -> Result<DraftState, WorkflowError>;
}

/// Collaborators a stage is bound to
///
/// Clones share one token tally, so every stage bound from the same binding
/// adds to the same run total.
#[derive(Clone)]
pub struct AgentBinding {
    pub llm: Arc<dyn LlmClient>,
    pub prompts: Arc<PromptLoader>,
    pub max_tokens: u32,
    usage: Arc<Mutex<TokenUsage>>,
}

impl AgentBinding {
    pub fn new(llm: Arc<dyn LlmClient>, prompts: Arc<PromptLoader>, max_tokens: u32) -> Self {
        Self {
            llm,
            prompts,
            max_tokens,
            usage: Arc::new(Mutex::new(TokenUsage::default())),
        }
    }

    /// Tokens consumed by every successful generation so far
    pub fn usage(&self) -> TokenUsage {
        self.usage.lock().map(|u| u.clone()).unwrap_or_default()
    }

    /// Render a prompt template, mapping failures to configuration errors
    pub(crate) fn render<T: Serialize>(&self, name: &str, context: &T) -> Result<String, WorkflowError> {
        self.prompts
            .render(name, context)
            .map_err(|e| WorkflowError::Configuration(e.to_string()))
    }

    /// Issue the stage's single generation request
    pub(crate) async fn generate(
        &self,
        stage: StageKind,
        request: CompletionRequest,
    ) -> Result<CompletionResponse, WorkflowError> {
        debug!(%stage, format = ?request.response_format, "AgentBinding::generate: called");
        let response = self
            .llm
            .complete(request)
            .await
            .map_err(|e| WorkflowError::generation(stage, e))?;
        debug!(%stage, tokens = response.usage.total(), "AgentBinding::generate: response received");
        if let Ok(mut total) = self.usage.lock() {
            total.add(&response.usage);
        }
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_kind_display() {
        assert_eq!(StageKind::Analyze.to_string(), "analyze");
        assert_eq!(StageKind::Review.to_string(), "review");
        assert_eq!(StageKind::Revise.to_string(), "revise");
    }

    #[test]
    fn test_stage_kind_serde() {
        let json = serde_json::to_string(&StageKind::Revise).unwrap();
        assert_eq!(json, "\"revise\"");
    }

    #[tokio::test]
    async fn test_binding_clones_share_usage() {
        use crate::llm::client::mock::MockLlmClient;
        use crate::workflow::test_support::binding;

        let reply = |input, output| CompletionResponse {
            usage: TokenUsage {
                input_tokens: input,
                output_tokens: output,
            },
            ..CompletionResponse::text("ok")
        };
        let mock = Arc::new(MockLlmClient::new(vec![reply(10, 5), reply(7, 3)]));
        let first = binding(mock);
        let second = first.clone();

        first
            .generate(StageKind::Analyze, CompletionRequest::new("s", "p", 10))
            .await
            .unwrap();
        second
            .generate(StageKind::Review, CompletionRequest::new("s", "p", 10))
            .await
            .unwrap();

        let usage = first.usage();
        assert_eq!(usage.input_tokens, 17);
        assert_eq!(usage.output_tokens, 8);
        assert_eq!(second.usage(), usage);
    }
}
