//! Markdown exporter

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use tracing::{debug, info};

use super::{ExportError, ExportedFiles, ReportExporter};
use crate::domain::FinalReport;

/// Writes `{stem}.md` and optionally `{stem}.history.json`
pub struct MarkdownExporter {
    output_dir: PathBuf,
    write_history: bool,
}

impl MarkdownExporter {
    pub fn new(output_dir: impl Into<PathBuf>, write_history: bool) -> Self {
        Self {
            output_dir: output_dir.into(),
            write_history,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }
}

/// Characters of the run id kept in the file name
const RUN_SUFFIX_LEN: usize = 8;

/// `{subject}_{YYYYmmdd_HHMMSS}_{run}` with path-hostile characters replaced
///
/// `run` is the tail of the run id. Run ids are v7 uuids whose leading
/// characters encode the time, so the random tail is what separates two
/// runs started in the same second.
pub fn file_stem(subject_name: &str, timestamp: &str, run_id: &str) -> String {
    let safe: String = subject_name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_whitespace() => '_',
            c => c,
        })
        .collect();
    let safe = if safe.is_empty() { "report".to_string() } else { safe };
    let run: Vec<char> = run_id.chars().filter(|c| c.is_ascii_alphanumeric()).collect();
    let run: String = run[run.len().saturating_sub(RUN_SUFFIX_LEN)..].iter().collect();
    if run.is_empty() {
        format!("{}_{}", safe, timestamp)
    } else {
        format!("{}_{}_{}", safe, timestamp, run)
    }
}

async fn write(path: &Path, contents: &[u8]) -> Result<(), ExportError> {
    tokio::fs::write(path, contents).await.map_err(|source| ExportError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[async_trait]
impl ReportExporter for MarkdownExporter {
    async fn export(&self, report: &FinalReport) -> Result<ExportedFiles, ExportError> {
        debug!(subject = %report.subject_name, dir = ?self.output_dir, "MarkdownExporter::export: called");
        tokio::fs::create_dir_all(&self.output_dir)
            .await
            .map_err(|source| ExportError::Io {
                path: self.output_dir.clone(),
                source,
            })?;

        let timestamp = Local::now().format("%Y%m%d_%H%M%S").to_string();
        let stem = file_stem(&report.subject_name, &timestamp, &report.run_id);

        let report_path = self.output_dir.join(format!("{}.md", stem));
        write(&report_path, report.document().as_bytes()).await?;

        let history = if self.write_history {
            let path = self.output_dir.join(format!("{}.history.json", stem));
            let json = serde_json::to_vec_pretty(report)?;
            write(&path, &json).await?;
            Some(path)
        } else {
            None
        };

        info!(path = %report_path.display(), "Report exported");
        Ok(ExportedFiles {
            report: report_path,
            history,
        })
    }
}
