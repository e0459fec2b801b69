//! DraftState - the versioned record threaded through every workflow stage
//!
//! Fields are private. The only ways to change a draft are the snapshot
//! methods (`with_version`, `with_review`), which leave `self` untouched and
//! return the next state. That keeps the numbering invariant (`version ==
//! position + 1`) and the "notes cleared on pass" rule in one place.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::SubjectContext;

/// One immutable snapshot of the draft content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DraftVersion {
    /// 1-based version number, equal to position + 1
    pub version: u32,
    pub content: String,
}

/// Classification of the latest version against the guidelines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    #[default]
    Unreviewed,
    Passed,
    Failed,
}

impl fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unreviewed => write!(f, "unreviewed"),
            Self::Passed => write!(f, "passed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Result of one review round, applied with [`DraftState::with_review`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
    Passed,
    /// Failed with the reviewer's feedback (may be empty)
    Failed { notes: String },
}

/// The shared draft record
#[derive(Debug, Clone)]
pub struct DraftState {
    versions: Vec<DraftVersion>,
    guidelines: Arc<[String]>,
    review_status: ReviewStatus,
    revision_notes: String,
    subject: Arc<SubjectContext>,
}

impl DraftState {
    /// Seed state: no versions, unreviewed, no notes
    pub fn new(subject: SubjectContext, guidelines: Vec<String>) -> Self {
        debug!(subject = %subject.subject_name, guideline_count = guidelines.len(), "DraftState::new: called");
        Self {
            versions: Vec::new(),
            guidelines: guidelines.into(),
            review_status: ReviewStatus::Unreviewed,
            revision_notes: String::new(),
            subject: Arc::new(subject),
        }
    }

    pub fn versions(&self) -> &[DraftVersion] {
        &self.versions
    }

    pub fn version_count(&self) -> usize {
        self.versions.len()
    }

    /// The most recent version, if the analyzer has run
    pub fn latest(&self) -> Option<&DraftVersion> {
        self.versions.last()
    }

    pub fn guidelines(&self) -> &[String] {
        &self.guidelines
    }

    pub fn review_status(&self) -> ReviewStatus {
        self.review_status
    }

    pub fn revision_notes(&self) -> &str {
        &self.revision_notes
    }

    pub fn subject(&self) -> &SubjectContext {
        &self.subject
    }

    /// Next snapshot with `content` appended as version `len + 1`
    ///
    /// Review status and notes carry over unchanged.
    pub fn with_version(&self, content: impl Into<String>) -> Self {
        let version = self.versions.len() as u32 + 1;
        debug!(%version, "DraftState::with_version: called");
        let mut next = self.clone();
        next.versions.push(DraftVersion {
            version,
            content: content.into(),
        });
        next
    }

    /// Next snapshot with the review outcome applied
    ///
    /// A pass always clears the notes; a failure replaces them.
    pub fn with_review(&self, outcome: ReviewOutcome) -> Self {
        debug!(?outcome, "DraftState::with_review: called");
        let mut next = self.clone();
        match outcome {
            ReviewOutcome::Passed => {
                next.review_status = ReviewStatus::Passed;
                next.revision_notes.clear();
            }
            ReviewOutcome::Failed { notes } => {
                next.review_status = ReviewStatus::Failed;
                next.revision_notes = notes;
            }
        }
        next
    }

    /// True when version numbers are exactly `1..=len`
    pub fn numbering_is_contiguous(&self) -> bool {
        self.versions
            .iter()
            .enumerate()
            .all(|(i, v)| v.version as usize == i + 1)
    }
}
