//! Identifying metadata for a report run

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::llm::ModelSelection;

/// One piece of retrieved research attached to the subject before the run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchNote {
    /// Where the note came from (URL or backend name)
    pub source: String,
    pub title: Option<String>,
    pub content: String,
}

/// One dimension of the analysis framework and the points it must cover
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameworkCategory {
    pub name: String,
    #[serde(default)]
    pub items: Vec<String>,
}

impl FrameworkCategory {
    pub fn new(name: impl Into<String>, items: &[&str]) -> Self {
        Self {
            name: name.into(),
            items: items.iter().map(|i| i.to_string()).collect(),
        }
    }
}

/// Dimensions a current-situation report covers when nothing else is configured
pub fn default_framework() -> Vec<FrameworkCategory> {
    vec![
        FrameworkCategory::new(
            "Location and natural conditions",
            &["geographic location and administrative area", "terrain and climate", "natural resources"],
        ),
        FrameworkCategory::new(
            "Population and land use",
            &["population and households", "land use", "settlement pattern"],
        ),
        FrameworkCategory::new(
            "Industry and rural economy",
            &["leading industries", "collective economy", "household income"],
        ),
        FrameworkCategory::new(
            "Infrastructure and public services",
            &["roads and transport", "water, power and telecoms", "education, health care and elderly care"],
        ),
        FrameworkCategory::new(
            "Ecology and living environment",
            &["environmental quality", "sanitation and waste handling"],
        ),
        FrameworkCategory::new(
            "Culture and governance",
            &["cultural heritage", "village governance", "community organisation"],
        ),
        FrameworkCategory::new(
            "Problems and opportunities",
            &["key problems", "development opportunities"],
        ),
    ]
}

/// Read-only context shared by every stage of one run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectContext {
    pub subject_name: String,
    pub query: String,
    pub model: ModelSelection,
    #[serde(default)]
    pub research: Vec<ResearchNote>,
    /// Dimensions the first draft is structured by
    #[serde(default = "default_framework")]
    pub framework: Vec<FrameworkCategory>,
}

impl SubjectContext {
    /// Build a context; a missing or blank query falls back to the default query
    pub fn new(subject_name: impl Into<String>, query: Option<String>, model: ModelSelection) -> Self {
        let subject_name = subject_name.into();
        let query = query
            .map(|q| q.trim().to_string())
            .filter(|q| !q.is_empty())
            .unwrap_or_else(|| default_query(&subject_name));
        debug!(%subject_name, %query, %model, "SubjectContext::new: called");
        Self {
            subject_name,
            query,
            model,
            research: Vec::new(),
            framework: default_framework(),
        }
    }

    pub fn with_research(mut self, research: Vec<ResearchNote>) -> Self {
        debug!(note_count = research.len(), "SubjectContext::with_research: called");
        self.research = research;
        self
    }

    pub fn with_framework(mut self, framework: Vec<FrameworkCategory>) -> Self {
        debug!(categories = framework.len(), "SubjectContext::with_framework: called");
        self.framework = framework;
        self
    }
}

/// The query used when the request names only the subject
pub fn default_query(subject_name: &str) -> String {
    format!("Analysis of the current development situation of {}", subject_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model() -> ModelSelection {
        ModelSelection::new("openai", "gpt-4o")
    }

    #[test]
    fn test_query_defaults_from_subject() {
        let ctx = SubjectContext::new("Shamei Village", None, model());
        assert_eq!(ctx.query, "Analysis of the current development situation of Shamei Village");
    }

    #[test]
    fn test_blank_query_defaults_from_subject() {
        let ctx = SubjectContext::new("Village X", Some("   ".to_string()), model());
        assert!(ctx.query.contains("Village X"));
    }

    #[test]
    fn test_explicit_query_kept() {
        let ctx = SubjectContext::new("Village X", Some("Tourism potential".to_string()), model());
        assert_eq!(ctx.query, "Tourism potential");
        assert!(ctx.research.is_empty());
        assert_eq!(ctx.framework, default_framework());
    }

    #[test]
    fn test_framework_items_default_to_empty() {
        let category: FrameworkCategory = serde_yaml::from_str("name: Tourism").unwrap();
        assert_eq!(category.name, "Tourism");
        assert!(category.items.is_empty());
    }
}
