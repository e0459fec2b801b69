//! Turning a reviewer reply into a pass/fail verdict

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::ReviewOutcome;
use crate::llm::{CompletionResponse, LlmError};

/// Token a marker-mode reviewer emits to approve a draft
pub const ACCEPTANCE_MARKER: &str = "[[REPORT APPROVED]]";

/// How the reviewer reports its verdict
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerdictMode {
    /// JSON object with a boolean `passed` and a `feedback` string
    #[default]
    Structured,
    /// Free text; approval is signalled by [`ACCEPTANCE_MARKER`]
    Marker,
}

/// Wire shape of a structured verdict
#[derive(Debug, Deserialize)]
struct ReviewVerdict {
    passed: bool,
    #[serde(default)]
    feedback: Option<String>,
}

/// Marker mode: any occurrence of the marker passes, anything else is feedback
pub fn parse_marker(text: &str, marker: &str) -> ReviewOutcome {
    let text = text.trim();
    if text.contains(marker) {
        debug!("parse_marker: acceptance marker found");
        ReviewOutcome::Passed
    } else {
        debug!(len = text.len(), "parse_marker: treating reply as feedback");
        ReviewOutcome::Failed {
            notes: text.to_string(),
        }
    }
}

/// Structured mode: `passed` must be a boolean, `feedback` is optional
///
/// A blank reply is a failed review with empty feedback. Anything that is
/// present but not a verdict object is an invalid response.
pub fn parse_structured(response: &CompletionResponse) -> Result<ReviewOutcome, LlmError> {
    let value = match (&response.structured, response.trimmed_text()) {
        (Some(value), _) => value.clone(),
        (None, None) => {
            debug!("parse_structured: blank reply");
            return Ok(ReviewOutcome::Failed { notes: String::new() });
        }
        (None, Some(text)) => serde_json::from_str(text)
            .map_err(|e| LlmError::InvalidResponse(format!("review verdict is not JSON: {}", e)))?,
    };

    let verdict: ReviewVerdict = serde_json::from_value(value)
        .map_err(|e| LlmError::InvalidResponse(format!("review verdict has no boolean 'passed': {}", e)))?;
    debug!(passed = verdict.passed, "parse_structured: verdict parsed");

    Ok(if verdict.passed {
        ReviewOutcome::Passed
    } else {
        ReviewOutcome::Failed {
            notes: verdict.feedback.unwrap_or_default().trim().to_string(),
        }
    })
}
