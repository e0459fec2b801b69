//! FinalReport - the terminal artifact of a workflow run

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{DraftState, DraftVersion, ResearchNote, ReviewStatus};

/// One consulted source, listed after the report body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub source: String,
    pub title: Option<String>,
}

impl Reference {
    /// One entry per distinct source and title, in first-seen order
    pub fn collect<'a>(notes: impl IntoIterator<Item = &'a ResearchNote>) -> Vec<Reference> {
        let mut refs: Vec<Reference> = Vec::new();
        for note in notes {
            let candidate = Reference {
                source: note.source.clone(),
                title: note.title.clone(),
            };
            if !refs.contains(&candidate) {
                refs.push(candidate);
            }
        }
        refs
    }

    fn is_link(&self) -> bool {
        self.source.starts_with("http://") || self.source.starts_with("https://")
    }

    /// Markdown list item body: a link for web sources, `title (backend)` otherwise
    pub fn to_markdown(&self) -> String {
        match (&self.title, self.is_link()) {
            (Some(title), true) => format!("[{}]({})", title, self.source),
            (None, true) => format!("<{}>", self.source),
            (Some(title), false) => format!("{} ({})", title, self.source),
            (None, false) => self.source.clone(),
        }
    }
}

/// What the export collaborator receives once a run has ended
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalReport {
    pub run_id: String,
    pub subject_name: String,
    pub query: String,
    pub model: String,
    /// The version handed to the exporter
    pub latest: DraftVersion,
    /// Every version in order, for audit and debugging
    pub history: Vec<DraftVersion>,
    pub review_status: ReviewStatus,
    /// False when the run stopped at the revision limit without a pass
    pub accepted: bool,
    pub review_rounds: u32,
    /// Research the run was seeded with
    #[serde(default)]
    pub references: Vec<Reference>,
}

impl FinalReport {
    /// Extract the report from a terminal state; `None` if no version exists
    pub fn from_state(run_id: &str, state: &DraftState, accepted: bool, review_rounds: u32) -> Option<Self> {
        debug!(%run_id, versions = state.version_count(), accepted, review_rounds, "FinalReport::from_state: called");
        let latest = state.latest()?.clone();
        let subject = state.subject();
        Some(Self {
            run_id: run_id.to_string(),
            subject_name: subject.subject_name.clone(),
            query: subject.query.clone(),
            model: subject.model.to_string(),
            latest,
            history: state.versions().to_vec(),
            review_status: state.review_status(),
            accepted,
            review_rounds,
            references: Reference::collect(&subject.research),
        })
    }

    pub fn content(&self) -> &str {
        &self.latest.content
    }

    /// The accepted content followed by a numbered references section
    pub fn document(&self) -> String {
        if self.references.is_empty() {
            return self.content().to_string();
        }
        let mut doc = format!("{}\n\n## References\n\n", self.content().trim_end());
        for (i, reference) in self.references.iter().enumerate() {
            doc.push_str(&format!("{}. {}\n", i + 1, reference.to_markdown()));
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ReviewOutcome, SubjectContext};
    use crate::llm::ModelSelection;

    fn state() -> DraftState {
        DraftState::new(
            SubjectContext::new("Village X", None, ModelSelection::new("deepseek", "deepseek-chat")),
            vec!["g".to_string()],
        )
    }

    #[test]
    fn test_from_empty_state_is_none() {
        assert!(FinalReport::from_state("run", &state(), true, 0).is_none());
    }

    #[test]
    fn test_from_state_takes_latest_and_history() {
        let s = state()
            .with_version("v1")
            .with_version("v2")
            .with_review(ReviewOutcome::Passed);
        let report = FinalReport::from_state("run-1", &s, true, 2).unwrap();

        assert_eq!(report.latest.version, 2);
        assert_eq!(report.content(), "v2");
        assert_eq!(report.history.len(), 2);
        assert_eq!(report.model, "deepseek:deepseek-chat");
        assert_eq!(report.review_status, ReviewStatus::Passed);
        assert!(report.accepted);
        assert!(report.references.is_empty());
        assert_eq!(report.document(), "v2");
    }

    fn note(source: &str, title: Option<&str>) -> ResearchNote {
        ResearchNote {
            source: source.to_string(),
            title: title.map(str::to_string),
            content: "text".to_string(),
        }
    }

    #[test]
    fn test_references_from_research() {
        let subject = SubjectContext::new("Village X", None, ModelSelection::new("openai", "gpt-4o")).with_research(vec![
            note("https://gov.example/plan", Some("County plan")),
            note("knowledge-base", Some("2023 census.pdf")),
            note("knowledge-base", Some("2023 census.pdf")),
            note("https://news.example/canal", None),
        ]);
        let s = DraftState::new(subject, vec!["g".to_string()]).with_version("# Report\n\nBody\n");
        let report = FinalReport::from_state("run-1", &s, true, 1).unwrap();

        assert_eq!(report.references.len(), 3);
        assert_eq!(
            report.document(),
            "# Report\n\nBody\n\n## References\n\n\
             1. [County plan](https://gov.example/plan)\n\
             2. 2023 census.pdf (knowledge-base)\n\
             3. <https://news.example/canal>\n"
        );
        assert_eq!(report.content(), "# Report\n\nBody\n");
    }
}
