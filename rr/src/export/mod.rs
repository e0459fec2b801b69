//! Report export
//!
//! The exporter receives the [`FinalReport`] once a run has ended. Only the
//! markdown writer is built in; richer formats plug in behind the same trait.

use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::FinalReport;

mod markdown;

pub use markdown::{MarkdownExporter, file_stem};

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Failed to write {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Failed to serialize report history: {0}")]
    Json(#[from] serde_json::Error),
}

/// Files written for one report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedFiles {
    pub report: PathBuf,
    pub history: Option<PathBuf>,
}

#[async_trait]
pub trait ReportExporter: Send + Sync {
    async fn export(&self, report: &FinalReport) -> Result<ExportedFiles, ExportError>;
}
