//! Prompt Template System
//!
//! Loads and renders `.pmt` (prompt template) files for the workflow stages and
//! section planning.
//!
//! Template loading chain:
//! 1. `.ruralreport/prompts/{name}.pmt` (user override)
//! 2. `prompts/{name}.pmt` (project default)
//! 3. Embedded fallback in code
//!
//! Templates use Handlebars syntax for variable substitution.

pub mod embedded;
mod loader;

pub use loader::{AnalyzeContext, PlanContext, PromptLoader, ReviewContext, ReviseContext};
