//! Prompt Loader
//!
//! Loads prompt templates from files or falls back to embedded defaults.

use std::path::{Path, PathBuf};

use eyre::{Result, eyre};
use handlebars::Handlebars;
use serde::Serialize;
use tracing::debug;

use super::embedded;
use crate::domain::{FrameworkCategory, ResearchNote};

/// Context for the `analyze` template
#[derive(Debug, Clone, Serialize)]
pub struct AnalyzeContext<'a> {
    pub subject_name: &'a str,
    pub query: &'a str,
    pub research: &'a [ResearchNote],
    pub framework: &'a [FrameworkCategory],
}

/// Context for the `review` template
#[derive(Debug, Clone, Serialize)]
pub struct ReviewContext<'a> {
    pub guidelines: &'a [String],
    pub draft: &'a str,
    /// Feedback from the previous round, if the reviser has acted on one
    pub previous_notes: Option<&'a str>,
    pub acceptance_marker: &'a str,
    /// Ask for the JSON verdict instead of the marker
    pub structured: bool,
}

/// Context for the `revise` template
#[derive(Debug, Clone, Serialize)]
pub struct ReviseContext<'a> {
    pub draft: &'a str,
    pub notes: &'a str,
}

/// Context for the `plan` template
#[derive(Debug, Clone, Serialize)]
pub struct PlanContext<'a> {
    pub subject_name: &'a str,
    pub query: &'a str,
    pub framework: &'a [FrameworkCategory],
    pub max_sections: usize,
}

/// Loads and renders prompt templates
pub struct PromptLoader {
    /// Handlebars template engine
    hbs: Handlebars<'static>,
    /// User override directory (e.g., `.ruralreport/prompts/`)
    user_dir: Option<PathBuf>,
    /// Project default directory (e.g., `prompts/`)
    repo_dir: Option<PathBuf>,
}

impl PromptLoader {
    /// Create a new prompt loader rooted at `base`
    ///
    /// Looks for `.ruralreport/prompts/` and `prompts/` under `base`.
    pub fn new(base: impl AsRef<Path>) -> Self {
        let base = base.as_ref();
        debug!(?base, "PromptLoader::new: called");
        let user_dir = base.join(".ruralreport/prompts");
        let repo_dir = base.join("prompts");

        let user_dir_exists = user_dir.exists();
        let repo_dir_exists = repo_dir.exists();
        debug!(?user_dir, %user_dir_exists, ?repo_dir, %repo_dir_exists, "PromptLoader::new: checking directories");

        Self {
            hbs: Self::engine(),
            user_dir: user_dir_exists.then_some(user_dir),
            repo_dir: repo_dir_exists.then_some(repo_dir),
        }
    }

    /// Create a loader that only uses embedded prompts (for testing)
    pub fn embedded_only() -> Self {
        debug!("PromptLoader::embedded_only: called");
        Self {
            hbs: Self::engine(),
            user_dir: None,
            repo_dir: None,
        }
    }

    /// Prompts carry report text verbatim, so HTML escaping is off
    fn engine() -> Handlebars<'static> {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        hbs
    }

    /// Load a template by name
    ///
    /// Checks in order:
    /// 1. User override: `.ruralreport/prompts/{name}.pmt`
    /// 2. Project default: `prompts/{name}.pmt`
    /// 3. Embedded fallback
    fn load_template(&self, name: &str) -> Result<String> {
        debug!(%name, "PromptLoader::load_template: called");
        for dir in [&self.user_dir, &self.repo_dir].into_iter().flatten() {
            let path = dir.join(format!("{}.pmt", name));
            if path.exists() {
                debug!(?path, "PromptLoader::load_template: found on disk");
                return std::fs::read_to_string(&path)
                    .map_err(|e| eyre!("Failed to read prompt {}: {}", path.display(), e));
            }
        }

        if let Some(content) = embedded::get_embedded(name) {
            debug!(%name, "PromptLoader::load_template: found in embedded");
            return Ok(content.to_string());
        }

        debug!(%name, "PromptLoader::load_template: not found anywhere");
        Err(eyre!("Prompt template not found: {}", name))
    }

    /// Render a template with the given context
    pub fn render<T: Serialize>(&self, template_name: &str, context: &T) -> Result<String> {
        debug!(%template_name, "PromptLoader::render: called");
        let template = self.load_template(template_name)?;
        self.hbs
            .render_template(&template, context)
            .map_err(|e| eyre!("Failed to render template {}: {}", template_name, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn review_ctx<'a>(guidelines: &'a [String], previous_notes: Option<&'a str>, structured: bool) -> ReviewContext<'a> {
        ReviewContext {
            guidelines,
            draft: "# Draft <b>&</b>",
            previous_notes,
            acceptance_marker: "[[MARK]]",
            structured,
        }
    }

    #[test]
    fn test_render_analyze_without_research() {
        let loader = PromptLoader::embedded_only();
        let out = loader
            .render(
                "analyze",
                &AnalyzeContext {
                    subject_name: "Village X",
                    query: "How is Village X doing?",
                    research: &[],
                    framework: &crate::domain::default_framework(),
                },
            )
            .unwrap();
        assert!(out.contains("Village X"));
        assert!(out.contains("How is Village X doing?"));
        assert!(!out.contains("Reference material"));
        assert!(out.contains("Infrastructure and public services"));
        assert!(out.contains("  - roads and transport"));
    }

    #[test]
    fn test_render_analyze_with_custom_framework() {
        let loader = PromptLoader::embedded_only();
        let framework = vec![
            FrameworkCategory::new("Tourism", &["visitor numbers", "homestays & guesthouses"]),
            FrameworkCategory::new("Water", &[]),
        ];
        let out = loader
            .render(
                "analyze",
                &AnalyzeContext {
                    subject_name: "Village X",
                    query: "q",
                    research: &[],
                    framework: &framework,
                },
            )
            .unwrap();
        assert!(out.contains("- Tourism"));
        assert!(out.contains("  - visitor numbers"));
        assert!(out.contains("  - homestays & guesthouses"));
        assert!(out.contains("- Water"));
        assert!(!out.contains("Infrastructure"));
    }

    #[test]
    fn test_render_analyze_with_research() {
        let loader = PromptLoader::embedded_only();
        let research = vec![ResearchNote {
            source: "https://example.org/x".to_string(),
            title: Some("County yearbook".to_string()),
            content: "Population 1,204".to_string(),
        }];
        let out = loader
            .render(
                "analyze",
                &AnalyzeContext {
                    subject_name: "Village X",
                    query: "q",
                    research: &research,
                    framework: &[],
                },
            )
            .unwrap();
        assert!(out.contains("Reference material"));
        assert!(out.contains("County yearbook"));
        assert!(out.contains("https://example.org/x"));
        assert!(out.contains("Population 1,204"));
        assert!(out.contains("headed sections of your choosing"));
    }

    #[test]
    fn test_render_review_does_not_escape() {
        let loader = PromptLoader::embedded_only();
        let guidelines = vec!["a & b".to_string()];
        let out = loader.render("review", &review_ctx(&guidelines, None, false)).unwrap();
        assert!(out.contains("# Draft <b>&</b>"));
        assert!(out.contains("- a & b"));
        assert!(out.contains("[[MARK]]"));
        assert!(!out.contains("previous feedback"));
    }

    #[test]
    fn test_render_review_with_previous_notes() {
        let loader = PromptLoader::embedded_only();
        let guidelines = vec!["g".to_string()];
        let out = loader
            .render("review", &review_ctx(&guidelines, Some("Add a roads section"), false))
            .unwrap();
        assert!(out.contains("Add a roads section"));
        assert!(out.contains("only for critical issues"));
    }

    #[test]
    fn test_render_review_structured() {
        let loader = PromptLoader::embedded_only();
        let guidelines = vec!["g".to_string()];
        let out = loader.render("review", &review_ctx(&guidelines, None, true)).unwrap();
        assert!(out.contains("\"passed\""));
        assert!(!out.contains("[[MARK]]"));
    }

    #[test]
    fn test_render_plan() {
        let loader = PromptLoader::embedded_only();
        let framework = vec![FrameworkCategory::new("Tourism", &["homestays"])];
        let out = loader
            .render(
                "plan",
                &PlanContext {
                    subject_name: "Village X",
                    query: "q",
                    framework: &framework,
                    max_sections: 3,
                },
            )
            .unwrap();
        assert!(out.contains("at most 3 sections"));
        assert!(out.contains("- Tourism"));
        assert!(!out.contains("homestays"));
        assert!(out.contains(r#"{"sections": [{"name""#));
    }

    #[test]
    fn test_user_override_wins() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join(".ruralreport/prompts");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("revise.pmt"), "OVERRIDE {{notes}}").unwrap();

        let loader = PromptLoader::new(temp.path());
        let out = loader
            .render("revise", &ReviseContext { draft: "d", notes: "n" })
            .unwrap();
        assert_eq!(out, "OVERRIDE n");
    }

    #[test]
    fn test_repo_dir_used_when_no_user_override() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("prompts");
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("revise.pmt"), "REPO {{draft}}").unwrap();

        let loader = PromptLoader::new(temp.path());
        let out = loader
            .render("revise", &ReviseContext { draft: "d", notes: "n" })
            .unwrap();
        assert_eq!(out, "REPO d");
    }

    #[test]
    fn test_prompt_loader_unknown_template() {
        let loader = PromptLoader::embedded_only();
        assert!(loader.load_template("nonexistent-template").is_err());
    }
}
