//! RuralReport - iterative draft, review and revise engine for rural
//! development planning reports
//!
//! A report run seeds a [`DraftState`] with the subject, its research notes
//! and the review guidelines, then hands it to the [`WorkflowEngine`]:
//! the analyzer writes the first draft, the reviewer judges the latest draft
//! against the guidelines and the reviser answers the review notes, until
//! the reviewer approves or the revision limit is reached.
//!
//! # Core Concepts
//!
//! - **Versions are append-only**: every draft ever produced stays in the history
//! - **Stages are pure transitions**: a stage takes a state and returns the next one
//! - **One call per stage**: no implicit retries, failures surface with context
//! - **Sections run in parallel**: each section owns its own draft state
//!
//! # Modules
//!
//! - [`domain`] - Draft state, subject context and final report
//! - [`workflow`] - Stages and the engine state machine
//! - [`orchestrator`] - Request validation, research, deadlines and export
//! - [`llm`] - LLM client trait and the OpenAI-compatible implementation
//! - [`retrieval`] - Web search, knowledge base and page scraping
//! - [`prompts`] - Prompt templates
//! - [`export`] - Report writers
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod domain;
pub mod export;
pub mod llm;
pub mod orchestrator;
pub mod prompts;
pub mod retrieval;
pub mod workflow;

// Re-export commonly used types
pub use config::{Config, ConfigError, LlmConfig};
pub use domain::{
    DraftState, DraftVersion, FinalReport, FrameworkCategory, Reference, ResearchNote, ReviewOutcome, ReviewStatus,
    SubjectContext,
};
pub use export::{ExportError, ExportedFiles, MarkdownExporter, ReportExporter};
pub use llm::{CompletionRequest, CompletionResponse, LlmClient, LlmError, ModelSelection, OpenAIClient, create_client};
pub use orchestrator::{Orchestrator, ReportRequest, RunReport, SectionPlan, SectionsReport};
pub use prompts::PromptLoader;
pub use retrieval::{ReportSource, Research, RetrievalError, Retriever};
pub use workflow::{
    AgentBinding, EngineConfig, LimitPolicy, Outcome, RunError, Stage, StageKind, StageRetry, VerdictMode,
    WorkflowEngine, WorkflowError, WorkflowRun,
};
