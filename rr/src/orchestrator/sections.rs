//! Parallel section runs
//!
//! Each section of a request gets its own workflow with its own draft
//! state. Sections share nothing but the semaphore that bounds how many run
//! at once; the combined report is assembled only after every task is done.

use std::sync::Arc;

use eyre::{Context, Result, eyre};
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{Orchestrator, ReportRequest, RunReport};
use crate::domain::{DraftVersion, FinalReport, ReviewStatus};
use crate::export::ExportedFiles;
use crate::llm::TokenUsage;

/// How one section ended
#[derive(Debug, Clone)]
pub enum SectionOutcome {
    Completed(Box<RunReport>),
    Failed(String),
    /// Aborted by fail-fast before it finished
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct SectionResult {
    pub name: String,
    pub outcome: SectionOutcome,
}

impl SectionResult {
    pub fn report(&self) -> Option<&RunReport> {
        match &self.outcome {
            SectionOutcome::Completed(run) => Some(run),
            _ => None,
        }
    }
}

/// Results of a sectioned run, in declaration order
#[derive(Debug, Clone)]
pub struct SectionsReport {
    pub run_id: String,
    pub sections: Vec<SectionResult>,
    /// `None` when no section completed
    pub combined: Option<FinalReport>,
    pub exported: Option<ExportedFiles>,
    /// True when the model chose the sections
    pub planned: bool,
    /// Tokens spent planning the sections
    pub planning_usage: TokenUsage,
}

impl SectionsReport {
    pub fn completed(&self) -> usize {
        self.sections.iter().filter(|s| s.report().is_some()).count()
    }

    /// Tokens consumed by planning and the completed sections
    pub fn usage(&self) -> TokenUsage {
        let mut total = self.planning_usage.clone();
        for run in self.sections.iter().filter_map(SectionResult::report) {
            total.add(&run.usage);
        }
        total
    }
}

impl Orchestrator {
    /// Run every section as an independent workflow and combine the results
    ///
    /// A request without sections has them planned first.
    pub async fn run_sections(&self, request: &ReportRequest) -> Result<SectionsReport> {
        request.validate()?;
        let planned = request.sections.is_empty();
        let (request, planning_usage) = if planned {
            let (sections, usage) = self.plan(request).await?;
            let planned_request = ReportRequest {
                sections,
                ..request.clone()
            };
            planned_request.validate()?;
            (planned_request, usage)
        } else {
            (request.clone(), TokenUsage::default())
        };
        let request = &request;

        let run_id = Uuid::now_v7().to_string();
        let max_concurrent = self.config.sections.max_concurrent.max(1);
        let fail_fast = self.config.sections.fail_fast;
        info!(
            %run_id,
            sections = request.sections.len(),
            max_concurrent,
            fail_fast,
            "Sectioned run starting"
        );

        let semaphore = Arc::new(Semaphore::new(max_concurrent));
        let mut handles = Vec::with_capacity(request.sections.len());
        for section in &request.sections {
            let this = self.clone();
            let sub = request.section_request(section);
            let semaphore = semaphore.clone();
            let name = section.name.clone();
            handles.push(tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| eyre!("Section semaphore closed: {}", e))?;
                debug!(section = %name, "run_sections: section started");
                this.run_workflow(&sub).await
            }));
        }

        let aborts: Vec<_> = handles.iter().map(|h| h.abort_handle()).collect();
        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| async move { (index, handle.await) })
            .collect();

        let mut outcomes: Vec<Option<SectionOutcome>> = vec![None; request.sections.len()];
        while let Some((index, joined)) = pending.next().await {
            let name = &request.sections[index].name;
            let outcome = match joined {
                Ok(Ok(run)) => {
                    info!(section = %name, accepted = run.report.accepted, "Section finished");
                    SectionOutcome::Completed(Box::new(run))
                }
                Ok(Err(e)) => {
                    warn!(section = %name, error = %e, "Section failed");
                    if fail_fast {
                        aborts.iter().for_each(|a| a.abort());
                    }
                    SectionOutcome::Failed(format!("{:#}", e))
                }
                Err(e) if e.is_cancelled() => SectionOutcome::Cancelled,
                Err(e) => {
                    warn!(section = %name, error = %e, "Section task panicked");
                    SectionOutcome::Failed(e.to_string())
                }
            };
            outcomes[index] = Some(outcome);
        }

        let sections: Vec<SectionResult> = request
            .sections
            .iter()
            .zip(outcomes)
            .map(|(plan, outcome)| SectionResult {
                name: plan.name.clone(),
                outcome: outcome.unwrap_or(SectionOutcome::Cancelled),
            })
            .collect();

        let combined = aggregate(&run_id, request, &sections);
        let exported = match (&self.exporter, &combined) {
            (Some(exporter), Some(report)) => Some(
                exporter
                    .export(report)
                    .await
                    .context("Failed to export combined report")?,
            ),
            (_, None) => {
                warn!(%run_id, "No section completed, nothing to export");
                None
            }
            (None, Some(_)) => None,
        };

        info!(%run_id, completed = sections.iter().filter(|s| s.report().is_some()).count(), "Sectioned run finished");
        Ok(SectionsReport {
            run_id,
            sections,
            combined,
            exported,
            planned,
            planning_usage,
        })
    }
}

/// Combine completed sections, in declaration order, into one report
///
/// `None` when no section completed. The combined report counts as accepted
/// only when every section completed and passed review.
pub fn aggregate(run_id: &str, request: &ReportRequest, sections: &[SectionResult]) -> Option<FinalReport> {
    let completed: Vec<(&str, &RunReport)> = sections
        .iter()
        .filter_map(|s| s.report().map(|r| (s.name.as_str(), r)))
        .collect();
    let first = completed.first()?.1;

    let mut content = format!("# {}\n", request.subject_name.trim());
    for (name, run) in &completed {
        content.push_str(&format!("\n## {}\n\n{}\n", name.trim(), run.report.content().trim()));
    }

    let all_accepted = completed.len() == sections.len() && completed.iter().all(|(_, r)| r.report.accepted);
    let latest = DraftVersion { version: 1, content };

    Some(FinalReport {
        run_id: run_id.to_string(),
        subject_name: request.subject_name.clone(),
        query: request
            .query
            .clone()
            .unwrap_or_else(|| crate::domain::default_query(&request.subject_name)),
        model: first.report.model.clone(),
        history: vec![latest.clone()],
        latest,
        review_status: if all_accepted {
            ReviewStatus::Passed
        } else {
            ReviewStatus::Failed
        },
        accepted: all_accepted,
        review_rounds: completed.iter().map(|(_, r)| r.report.review_rounds).sum(),
        references: completed.iter().fold(Vec::new(), |mut refs, (_, r)| {
            for reference in &r.report.references {
                if !refs.contains(reference) {
                    refs.push(reference.clone());
                }
            }
            refs
        }),
    })
}
