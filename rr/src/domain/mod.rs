//! Domain types for report generation
//!
//! Core domain types: DraftState (the versioned draft threaded through the
//! workflow), SubjectContext (read-only run metadata) and FinalReport (the
//! terminal artifact handed to export).

mod draft;
mod report;
mod subject;

pub use draft::{DraftState, DraftVersion, ReviewOutcome, ReviewStatus};
pub use report::{FinalReport, Reference};
pub use subject::{FrameworkCategory, ResearchNote, SubjectContext, default_framework, default_query};
