//! Model selection and provider defaults
//!
//! Models are named `provider:model` (e.g. `deepseek:deepseek-chat`). A bare
//! model name is taken to be an OpenAI model. Every supported provider speaks
//! the OpenAI Chat Completions protocol; they differ only in endpoint and key.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::LlmError;

/// Provider used when a model string carries no `provider:` prefix
pub const DEFAULT_PROVIDER: &str = "openai";

/// Endpoint and credential defaults for a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProviderDefaults {
    pub name: &'static str,
    pub base_url: &'static str,
    pub api_key_env: &'static str,
}

const PROVIDERS: &[ProviderDefaults] = &[
    ProviderDefaults {
        name: "openai",
        base_url: "https://api.openai.com/v1",
        api_key_env: "OPENAI_API_KEY",
    },
    ProviderDefaults {
        name: "deepseek",
        base_url: "https://api.deepseek.com/v1",
        api_key_env: "DEEPSEEK_API_KEY",
    },
    ProviderDefaults {
        name: "dashscope",
        base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1",
        api_key_env: "DASHSCOPE_API_KEY",
    },
    ProviderDefaults {
        name: "zhipu",
        base_url: "https://open.bigmodel.cn/api/paas/v4",
        api_key_env: "ZHIPU_API_KEY",
    },
];

/// Look up the defaults for a provider by name (case-insensitive)
pub fn provider_defaults(name: &str) -> Option<&'static ProviderDefaults> {
    debug!(%name, "provider_defaults: called");
    PROVIDERS.iter().find(|p| p.name.eq_ignore_ascii_case(name))
}

/// Names of every supported provider
pub fn supported_providers() -> Vec<&'static str> {
    PROVIDERS.iter().map(|p| p.name).collect()
}

/// A provider/model pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSelection {
    pub provider: String,
    pub model: String,
}

impl ModelSelection {
    pub fn new(provider: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            provider: provider.into().to_lowercase(),
            model: model.into(),
        }
    }

    /// Parse `provider:model` or a bare model name
    pub fn parse(input: &str) -> Result<Self, LlmError> {
        debug!(%input, "ModelSelection::parse: called");
        let input = input.trim();
        if input.is_empty() {
            return Err(LlmError::Config("model must not be empty".to_string()));
        }

        match input.split_once(':') {
            Some((provider, model)) => {
                let (provider, model) = (provider.trim(), model.trim());
                if provider.is_empty() || model.is_empty() {
                    debug!("ModelSelection::parse: empty provider or model half");
                    return Err(LlmError::Config(format!(
                        "invalid model '{}', expected provider:model",
                        input
                    )));
                }
                Ok(Self::new(provider, model))
            }
            None => {
                debug!("ModelSelection::parse: bare model, using default provider");
                Ok(Self::new(DEFAULT_PROVIDER, input))
            }
        }
    }
}

impl fmt::Display for ModelSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.provider, self.model)
    }
}
