//! LLM request/response types
//!
//! These model an OpenAI-style chat completion but stay provider-agnostic: a
//! system prompt, a list of text messages and a requested response format.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A completion request - everything needed for one LLM call
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// System prompt (role instructions for the stage)
    pub system_prompt: String,

    /// User messages (a single rendered prompt for every workflow stage)
    pub messages: Vec<Message>,

    /// Model override; `None` uses the client's configured model
    pub model: Option<String>,

    /// Max tokens for response (from config)
    pub max_tokens: u32,

    /// Plain text or a structured (JSON object) response
    pub response_format: ResponseFormat,
}

impl CompletionRequest {
    /// Create a plain-text request with one user message
    pub fn new(system_prompt: impl Into<String>, prompt: impl Into<String>, max_tokens: u32) -> Self {
        debug!(%max_tokens, "CompletionRequest::new: called");
        Self {
            system_prompt: system_prompt.into(),
            messages: vec![Message::user(prompt)],
            model: None,
            max_tokens,
            response_format: ResponseFormat::Plain,
        }
    }

    /// Select the model for this request
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    /// Select the response format for this request
    pub fn with_format(mut self, response_format: ResponseFormat) -> Self {
        debug!(?response_format, "CompletionRequest::with_format: called");
        self.response_format = response_format;
        self
    }

    /// Concatenated text of every user message (used by test doubles and logs)
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Requested shape of the model's answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Free text
    #[default]
    Plain,
    /// A single JSON object
    Structured,
}

/// A message in the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        debug!("Message::user: called");
        Self {
            role: Role::User,
            content: text.into(),
        }
    }
}

/// Message role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Response from a completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionResponse {
    /// Text content (if any)
    pub content: Option<String>,

    /// Parsed JSON object when the request asked for `ResponseFormat::Structured`
    pub structured: Option<serde_json::Value>,

    /// Why the model stopped
    pub stop_reason: StopReason,

    /// Token usage for cost tracking
    pub usage: TokenUsage,
}

impl CompletionResponse {
    /// Build a plain text response
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    /// Build a structured response; the raw text is the serialized value
    pub fn structured(value: serde_json::Value) -> Self {
        Self {
            content: Some(value.to_string()),
            structured: Some(value),
            ..Default::default()
        }
    }

    /// Text content with surrounding whitespace removed, `None` when blank
    pub fn trimmed_text(&self) -> Option<&str> {
        self.content.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

/// Why the model stopped generating
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum StopReason {
    #[default]
    EndTurn,
    MaxTokens,
    ContentFilter,
}

impl StopReason {
    /// Parse from an OpenAI `finish_reason` string
    pub fn from_openai(s: &str) -> Self {
        debug!(%s, "StopReason::from_openai: called");
        match s {
            "length" => StopReason::MaxTokens,
            "content_filter" => StopReason::ContentFilter,
            _ => StopReason::EndTurn,
        }
    }
}

/// Token usage statistics
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl TokenUsage {
    /// Total tokens consumed
    pub fn total(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Accumulate another usage record into this one
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
    }
}
