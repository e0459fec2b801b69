//! Orchestrator - wires research, the workflow engine and export together

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use eyre::{Context, Result, eyre};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::ReportRequest;
use crate::config::Config;
use crate::domain::{DraftState, FinalReport, FrameworkCategory, SubjectContext};
use crate::export::{ExportedFiles, MarkdownExporter, ReportExporter};
use crate::llm::{LlmClient, ModelSelection, TokenUsage, create_client};
use crate::prompts::PromptLoader;
use crate::retrieval::Research;
use crate::workflow::{AgentBinding, Outcome, StageRecord, WorkflowEngine, WorkflowRun};

/// The caller-level deadline expired before the run finished
#[derive(Debug, Error)]
#[error("Run {run_id} timed out after {after:?}")]
pub struct RunTimedOut {
    pub run_id: String,
    pub after: Duration,
}

/// Everything a finished single run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub report: FinalReport,
    pub outcome: Outcome,
    pub trace: Vec<StageRecord>,
    pub research_notes: usize,
    /// Tokens consumed by every stage of the run
    pub usage: TokenUsage,
    pub exported: Option<ExportedFiles>,
}

/// Entry point for report runs
#[derive(Clone)]
pub struct Orchestrator {
    pub(super) config: Config,
    pub(super) prompts: Arc<PromptLoader>,
    llm: Option<Arc<dyn LlmClient>>,
    pub(super) exporter: Option<Arc<dyn ReportExporter>>,
    run_timeout: Option<Duration>,
}

impl Orchestrator {
    /// Build from configuration; prompts are looked up under `base`
    pub fn new(config: Config, base: impl Into<PathBuf>) -> Self {
        let base = base.into();
        debug!(?base, "Orchestrator::new: called");
        let exporter: Arc<dyn ReportExporter> = Arc::new(MarkdownExporter::new(
            config.export.output_dir.clone(),
            config.export.write_history,
        ));
        let run_timeout = config.workflow.run_timeout();
        Self {
            config,
            prompts: Arc::new(PromptLoader::new(base)),
            llm: None,
            exporter: Some(exporter),
            run_timeout,
        }
    }

    /// Use one client for every run instead of building one per provider
    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_prompts(mut self, prompts: PromptLoader) -> Self {
        self.prompts = Arc::new(prompts);
        self
    }

    /// Replace the exporter; `None` skips export
    pub fn with_exporter(mut self, exporter: Option<Arc<dyn ReportExporter>>) -> Self {
        self.exporter = exporter;
        self
    }

    pub fn with_run_timeout(mut self, run_timeout: Option<Duration>) -> Self {
        self.run_timeout = run_timeout;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run one workflow and export the result
    pub async fn run(&self, request: &ReportRequest) -> Result<RunReport> {
        let mut run = self.run_workflow(request).await?;
        if let Some(exporter) = &self.exporter {
            let files = exporter.export(&run.report).await.context("Failed to export report")?;
            run.exported = Some(files);
        }
        Ok(run)
    }

    /// Run one workflow without exporting
    pub(crate) async fn run_workflow(&self, request: &ReportRequest) -> Result<RunReport> {
        request.validate()?;
        let run_id = Uuid::now_v7().to_string();
        let selection = request
            .model_selection()?
            .unwrap_or_else(|| self.config.llm.selection());
        info!(%run_id, subject = %request.subject_name, model = %selection, "Report run starting");

        let llm = self.client_for(&selection)?;

        let subject = SubjectContext::new(&request.subject_name, request.query.clone(), selection)
            .with_framework(self.framework_for(request));
        let source = request.source.unwrap_or(self.config.retrieval.source);
        let research = Research::from_config(&self.config.retrieval, source);
        let notes = research.gather(&subject.query, &request.source_urls).await;
        let research_notes = notes.len();
        debug!(%run_id, research_notes, "Orchestrator::run_workflow: research gathered");

        let seed = DraftState::new(subject.with_research(notes), request.guidelines());
        let binding = AgentBinding::new(llm, self.prompts.clone(), self.config.llm.max_tokens);
        let engine = WorkflowEngine::standard(
            run_id.clone(),
            binding.clone(),
            self.config.workflow.verdict,
            self.config.workflow.engine_config(),
        );

        let run = self.run_with_deadline(&engine, seed).await?;
        let usage = binding.usage();
        if run.outcome == Outcome::LimitReached {
            warn!(%run_id, "Report kept at the revision limit without passing review");
        }

        let report = FinalReport::from_state(&run_id, &run.state, run.accepted(), run.review_rounds)
            .ok_or_else(|| eyre!("Run {} finished without a draft", run_id))?;
        info!(
            %run_id,
            versions = report.history.len(),
            accepted = report.accepted,
            tokens = usage.total(),
            "Report run finished"
        );

        Ok(RunReport {
            report,
            outcome: run.outcome,
            trace: run.trace,
            research_notes,
            usage,
            exported: None,
        })
    }

    async fn run_with_deadline(&self, engine: &WorkflowEngine, seed: DraftState) -> Result<WorkflowRun> {
        let run = match self.run_timeout {
            Some(after) => tokio::time::timeout(after, engine.run(seed)).await.map_err(|_| RunTimedOut {
                run_id: engine.run_id().to_string(),
                after,
            })?,
            None => engine.run(seed).await,
        };
        Ok(run?)
    }

    /// The request's framework, or the configured one when it names none
    pub(super) fn framework_for(&self, request: &ReportRequest) -> Vec<FrameworkCategory> {
        if request.framework.is_empty() {
            self.config.analysis.framework.clone()
        } else {
            request.framework.clone()
        }
    }

    pub(super) fn client_for(&self, selection: &ModelSelection) -> Result<Arc<dyn LlmClient>> {
        if let Some(llm) = &self.llm {
            return Ok(llm.clone());
        }
        let resolved = self.config.llm.resolve(Some(selection))?;
        Ok(create_client(&resolved)?)
    }
}
