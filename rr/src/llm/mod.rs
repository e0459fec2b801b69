//! LLM client module
//!
//! The text-generation collaborator used by every workflow stage.

use std::sync::Arc;

use tracing::debug;

pub mod client;
mod error;
mod openai;
mod provider;
mod types;

pub use client::LlmClient;
pub use error::LlmError;
pub use openai::OpenAIClient;
pub use provider::{DEFAULT_PROVIDER, ModelSelection, ProviderDefaults, provider_defaults, supported_providers};
pub use types::{CompletionRequest, CompletionResponse, Message, ResponseFormat, Role, StopReason, TokenUsage};

use crate::config::ResolvedLlmConfig;

/// Create an LLM client from a resolved configuration
///
/// Every supported provider speaks the OpenAI protocol, so the provider only
/// has to be known; the endpoint comes from the resolved config.
pub fn create_client(config: &ResolvedLlmConfig) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, model = %config.model, "create_client: called");
    if provider_defaults(&config.provider).is_none() {
        debug!(provider = %config.provider, "create_client: unknown provider");
        return Err(LlmError::Config(format!(
            "Unknown LLM provider: '{}'. Supported: {}",
            config.provider,
            supported_providers().join(", ")
        )));
    }

    Ok(Arc::new(OpenAIClient::from_config(config)?))
}
