//! Report orchestration
//!
//! Validates a [`ReportRequest`], gathers research, seeds the draft state,
//! drives the [`WorkflowEngine`](crate::workflow::WorkflowEngine) under a
//! deadline and exports the resulting [`FinalReport`](crate::domain::FinalReport).
//! Sectioned requests run one workflow per section concurrently; a request
//! without sections has them planned by the model first.

mod planner;
mod request;
mod runner;
mod sections;

pub use request::{ReportRequest, SectionPlan};
pub use runner::{Orchestrator, RunReport, RunTimedOut};
pub use sections::{SectionOutcome, SectionResult, SectionsReport, aggregate};
