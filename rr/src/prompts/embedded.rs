//! Embedded prompts
//!
//! These are compiled into the binary from .pmt files at build time.

use tracing::debug;

/// Initial analysis prompt
pub const ANALYZE: &str = include_str!("../../prompts/analyze.pmt");

/// Review prompt (guidelines, latest draft, previous feedback)
pub const REVIEW: &str = include_str!("../../prompts/review.pmt");

/// Revision prompt (latest draft plus reviewer feedback)
pub const REVISE: &str = include_str!("../../prompts/revise.pmt");

/// Section planning prompt (subject, framework, section cap)
pub const PLAN: &str = include_str!("../../prompts/plan.pmt");

/// Get the embedded prompt by name
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "analyze" => Some(ANALYZE),
        "review" => Some(REVIEW),
        "revise" => Some(REVISE),
        "plan" => Some(PLAN),
        _ => {
            debug!("get_embedded: no match found");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_embedded_templates() {
        assert!(get_embedded("analyze").unwrap().contains("{{subject_name}}"));
        assert!(get_embedded("review").unwrap().contains("{{acceptance_marker}}"));
        assert!(get_embedded("revise").unwrap().contains("{{notes}}"));
        assert!(get_embedded("plan").unwrap().contains("{{max_sections}}"));
    }

    #[test]
    fn test_get_embedded_unknown() {
        assert!(get_embedded("unknown-template").is_none());
    }
}
