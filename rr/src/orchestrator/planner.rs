//! Section planning
//!
//! A request without sections is split by the model: one structured request
//! returns the section names (and optionally a query for each), capped by
//! `sections.max-sections`.

use std::collections::HashSet;

use eyre::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use super::{Orchestrator, ReportRequest, SectionPlan};
use crate::domain::default_query;
use crate::llm::{CompletionRequest, CompletionResponse, LlmError, ResponseFormat, TokenUsage};
use crate::prompts::PlanContext;

const SYSTEM_PROMPT: &str = "You are a rural planning analyst. You outline current-situation reports \
on villages and townships and answer with JSON only.";

/// Wire shape of a section plan
#[derive(Debug, Deserialize)]
struct PlanReply {
    sections: Vec<PlannedSection>,
}

/// A bare heading or a heading with its own research question
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum PlannedSection {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        query: Option<String>,
    },
}

impl Orchestrator {
    /// Ask the model to split a request into at most `max-sections` sections
    pub async fn plan_sections(&self, request: &ReportRequest) -> Result<Vec<SectionPlan>> {
        let (sections, _) = self.plan(request).await?;
        Ok(sections)
    }

    /// Plan sections and report the tokens the planning request used
    pub(super) async fn plan(&self, request: &ReportRequest) -> Result<(Vec<SectionPlan>, TokenUsage)> {
        request.validate()?;
        let selection = request
            .model_selection()?
            .unwrap_or_else(|| self.config.llm.selection());
        let max_sections = self.config.sections.max_sections.max(1);
        debug!(subject = %request.subject_name, %selection, max_sections, "Orchestrator::plan: called");

        let llm = self.client_for(&selection)?;
        let query = request
            .query
            .clone()
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| default_query(&request.subject_name));
        let framework = self.framework_for(request);
        let prompt = self.prompts.render(
            "plan",
            &PlanContext {
                subject_name: &request.subject_name,
                query: &query,
                framework: &framework,
                max_sections,
            },
        )?;

        let completion = CompletionRequest::new(SYSTEM_PROMPT, prompt, self.config.llm.max_tokens)
            .with_model(&selection.model)
            .with_format(ResponseFormat::Structured);
        let response = llm.complete(completion).await.context("Section planning request failed")?;
        let sections = parse_plan(&response, max_sections).context("Section plan unusable")?;

        info!(
            subject = %request.subject_name,
            sections = sections.len(),
            "Sections planned"
        );
        Ok((sections, response.usage))
    }
}

/// Read the plan, dropping blank and repeated names and keeping the first `max_sections`
fn parse_plan(response: &CompletionResponse, max_sections: usize) -> Result<Vec<SectionPlan>, LlmError> {
    let value = match (&response.structured, response.trimmed_text()) {
        (Some(value), _) => value.clone(),
        (None, Some(text)) => serde_json::from_str(text)
            .map_err(|e| LlmError::InvalidResponse(format!("section plan is not JSON: {}", e)))?,
        (None, None) => return Err(LlmError::EmptyResponse),
    };
    let reply: PlanReply = serde_json::from_value(value)
        .map_err(|e| LlmError::InvalidResponse(format!("section plan has no 'sections' list: {}", e)))?;

    let mut seen = HashSet::new();
    let sections: Vec<SectionPlan> = reply
        .sections
        .into_iter()
        .map(|planned| match planned {
            PlannedSection::Name(name) => (name, None),
            PlannedSection::Detailed { name, query } => (name, query),
        })
        .filter_map(|(name, query)| {
            let name = name.trim().to_string();
            if name.is_empty() || !seen.insert(name.clone()) {
                return None;
            }
            Some(SectionPlan {
                name,
                query: query.map(|q| q.trim().to_string()).filter(|q| !q.is_empty()),
                guidelines: Vec::new(),
            })
        })
        .take(max_sections)
        .collect();

    if sections.is_empty() {
        return Err(LlmError::InvalidResponse("section plan is empty".to_string()));
    }
    debug!(count = sections.len(), "parse_plan: sections read");
    Ok(sections)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, ConfigError};
    use crate::domain::FrameworkCategory;
    use crate::llm::client::mock::MockLlmClient;
    use crate::prompts::PromptLoader;
    use serde_json::json;
    use std::sync::Arc;

    fn orchestrator(mock: Arc<MockLlmClient>, max_sections: usize) -> Orchestrator {
        let mut config = Config::default();
        config.sections.max_sections = max_sections;
        Orchestrator::new(config, "/nonexistent")
            .with_prompts(PromptLoader::embedded_only())
            .with_llm(mock)
            .with_exporter(None)
    }

    fn request() -> ReportRequest {
        ReportRequest::new("Village X", vec!["Covers infrastructure".to_string()])
    }

    #[tokio::test]
    async fn test_plan_makes_one_structured_request() {
        let mock = Arc::new(MockLlmClient::new(vec![CompletionResponse::structured(json!({
            "sections": [
                {"name": "Economy", "query": "How does Village X earn its living?"},
                "Ecology"
            ]
        }))]));

        let sections = orchestrator(mock.clone(), 6).plan_sections(&request()).await.unwrap();

        assert_eq!(mock.call_count(), 1);
        let sent = &mock.requests()[0];
        assert_eq!(sent.response_format, ResponseFormat::Structured);
        assert!(sent.user_text().contains("at most 6 sections"));
        assert!(sent.user_text().contains("Village X"));

        assert_eq!(sections.len(), 2);
        assert_eq!(sections[0].name, "Economy");
        assert_eq!(sections[0].query.as_deref(), Some("How does Village X earn its living?"));
        assert_eq!(sections[1].name, "Ecology");
        assert!(sections[1].query.is_none());
        assert!(sections.iter().all(|s| s.guidelines.is_empty()));
    }

    #[tokio::test]
    async fn test_plan_capped_by_max_sections() {
        let mock = Arc::new(MockLlmClient::new(vec![CompletionResponse::structured(json!({
            "sections": ["A", "B", "C", "D", "E"]
        }))]));

        let sections = orchestrator(mock.clone(), 3).plan_sections(&request()).await.unwrap();

        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert!(mock.requests()[0].user_text().contains("at most 3 sections"));
    }

    #[tokio::test]
    async fn test_plan_prompt_lists_framework() {
        let mock = Arc::new(MockLlmClient::new(vec![CompletionResponse::structured(json!({
            "sections": ["Tourism"]
        }))]));
        let req = ReportRequest {
            framework: vec![FrameworkCategory::new("Tourism", &["homestays"])],
            ..request()
        };

        orchestrator(mock.clone(), 6).plan_sections(&req).await.unwrap();
        assert!(mock.requests()[0].user_text().contains("- Tourism"));
    }

    #[tokio::test]
    async fn test_plan_without_sections_is_error() {
        let mock = Arc::new(MockLlmClient::new(vec![CompletionResponse::structured(json!({"sections": []}))]));
        let err = orchestrator(mock, 6).plan_sections(&request()).await.unwrap_err();

        let llm_err = err.downcast_ref::<LlmError>().unwrap();
        assert!(matches!(llm_err, LlmError::InvalidResponse(m) if m.contains("empty")));
    }

    #[tokio::test]
    async fn test_invalid_request_is_not_planned() {
        let mock = Arc::new(MockLlmClient::texts(&["unused"]));
        let err = orchestrator(mock.clone(), 6)
            .plan_sections(&ReportRequest::new(" ", vec!["g".to_string()]))
            .await
            .unwrap_err();

        assert!(err.downcast_ref::<ConfigError>().is_some());
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_parse_plan_from_text_drops_blank_and_repeated() {
        let response = CompletionResponse::text(
            r#"{"sections": [" Economy ", "", {"name": "Economy"}, {"name": "Culture", "query": "  "}]}"#,
        );
        let sections = parse_plan(&response, 6).unwrap();

        let names: Vec<&str> = sections.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Economy", "Culture"]);
        assert!(sections[1].query.is_none());
    }

    #[test]
    fn test_parse_plan_rejects_prose_and_blank() {
        assert!(matches!(
            parse_plan(&CompletionResponse::text("Economy, Ecology"), 6),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_plan(&CompletionResponse::structured(json!({"outline": ["A"]})), 6),
            Err(LlmError::InvalidResponse(_))
        ));
        assert!(matches!(
            parse_plan(&CompletionResponse::text("  "), 6),
            Err(LlmError::EmptyResponse)
        ));
    }
}
