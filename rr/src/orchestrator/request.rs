//! ReportRequest - what the caller asks for

use std::collections::HashSet;
use std::path::Path;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::ConfigError;
use crate::domain::{FrameworkCategory, default_query};
use crate::llm::ModelSelection;
use crate::retrieval::ReportSource;

/// One independently reviewed part of a larger report
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SectionPlan {
    pub name: String,

    /// Query for this section; derived from the subject and name when unset
    pub query: Option<String>,

    /// Guidelines for this section; the request's guidelines when empty
    pub guidelines: Vec<String>,
}

/// A report request, loaded from YAML/JSON or built by the CLI
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportRequest {
    #[serde(rename = "subject-name", alias = "subject_name", alias = "subject")]
    pub subject_name: String,

    pub query: Option<String>,

    pub guidelines: Vec<String>,

    /// `provider:model` or a bare model name
    pub model: Option<String>,

    /// Research backends; the configured default when unset
    pub source: Option<ReportSource>,

    #[serde(rename = "source-urls", alias = "source_urls")]
    pub source_urls: Vec<String>,

    /// Sections to write; planned by the model when empty
    pub sections: Vec<SectionPlan>,

    /// Analysis framework for this request; the configured one when empty
    pub framework: Vec<FrameworkCategory>,
}

impl ReportRequest {
    pub fn new(subject_name: impl Into<String>, guidelines: Vec<String>) -> Self {
        Self {
            subject_name: subject_name.into(),
            guidelines,
            ..Default::default()
        }
    }

    /// Load a request file; `.json` is parsed as JSON, anything else as YAML
    pub fn load(path: &Path) -> Result<Self> {
        debug!(?path, "ReportRequest::load: called");
        let content = std::fs::read_to_string(path).context(format!("Failed to read request {}", path.display()))?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));

        let request = if is_json {
            serde_json::from_str(&content).context("Failed to parse request JSON")?
        } else {
            serde_yaml::from_str(&content).context("Failed to parse request YAML")?
        };
        Ok(request)
    }

    /// Reject requests that cannot start a run
    pub fn validate(&self) -> Result<(), ConfigError> {
        debug!(subject = %self.subject_name, "ReportRequest::validate: called");
        if self.subject_name.trim().is_empty() {
            return Err(ConfigError::Invalid("subject name is required".to_string()));
        }
        if self.guidelines.is_empty() {
            return Err(ConfigError::Invalid("at least one review guideline is required".to_string()));
        }
        check_guidelines("request", &self.guidelines)?;
        self.model_selection()?;
        if let Some(index) = self.framework.iter().position(|c| c.name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!("framework category {} has no name", index + 1)));
        }

        let mut names = HashSet::new();
        for section in &self.sections {
            let name = section.name.trim();
            if name.is_empty() {
                return Err(ConfigError::Invalid("section name is required".to_string()));
            }
            if !names.insert(name) {
                return Err(ConfigError::Invalid(format!("duplicate section '{}'", name)));
            }
            check_guidelines(name, &section.guidelines)?;
        }
        Ok(())
    }

    /// Guidelines exactly as given, in order
    pub fn guidelines(&self) -> Vec<String> {
        self.guidelines.clone()
    }

    /// The requested model, if any
    pub fn model_selection(&self) -> Result<Option<ModelSelection>, ConfigError> {
        self.model
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .map(ModelSelection::parse)
            .transpose()
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// The single-workflow request for one section
    pub fn section_request(&self, section: &SectionPlan) -> ReportRequest {
        let guidelines = if section.guidelines.is_empty() {
            self.guidelines()
        } else {
            section.guidelines.clone()
        };
        let query = section
            .query
            .clone()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| format!("{}: {}", default_query(&self.subject_name), section.name.trim()));

        ReportRequest {
            subject_name: self.subject_name.clone(),
            query: Some(query),
            guidelines,
            model: self.model.clone(),
            source: self.source,
            source_urls: self.source_urls.clone(),
            sections: Vec::new(),
            framework: self.framework.clone(),
        }
    }
}

/// Blank guidelines are rejected rather than dropped
fn check_guidelines(owner: &str, guidelines: &[String]) -> Result<(), ConfigError> {
    match guidelines.iter().position(|g| g.trim().is_empty()) {
        Some(index) => Err(ConfigError::Invalid(format!(
            "{} guideline {} is blank",
            owner,
            index + 1
        ))),
        None => Ok(()),
    }
}
