//! Research collaborators
//!
//! Gathers reference material before the first draft: web search (Tavily),
//! a RAGFlow knowledge base, and pages scraped from explicit source URLs.
//! Retrieval is best effort. A backend without credentials is disabled and a
//! failing backend is logged and skipped; neither stops the run.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::RetrievalConfig;
use crate::domain::ResearchNote;

mod knowledge_base;
mod scrape;
mod tavily;

pub use knowledge_base::KnowledgeBaseRetriever;
pub use scrape::PageScraper;
pub use tavily::TavilyRetriever;

/// Retrieval errors
#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{backend} returned {status}: {body}")]
    Status { backend: String, status: u16, body: String },

    #[error("Invalid response from {backend}: {message}")]
    InvalidResponse { backend: String, message: String },

    #[error("API key not found. Set the {0} environment variable.")]
    MissingApiKey(String),
}

/// A query-driven research backend
#[async_trait]
pub trait Retriever: Send + Sync {
    fn name(&self) -> &str;

    async fn retrieve(&self, query: &str) -> Result<Vec<ResearchNote>, RetrievalError>;
}

/// Which backends feed a report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportSource {
    /// Web search only
    Web,
    /// Knowledge base only
    Docs,
    /// Web search and knowledge base
    Hybrid,
    /// No query-driven research
    #[default]
    None,
}

impl ReportSource {
    pub fn uses_web(self) -> bool {
        matches!(self, Self::Web | Self::Hybrid)
    }

    pub fn uses_docs(self) -> bool {
        matches!(self, Self::Docs | Self::Hybrid)
    }
}

impl fmt::Display for ReportSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Web => write!(f, "web"),
            Self::Docs => write!(f, "docs"),
            Self::Hybrid => write!(f, "hybrid"),
            Self::None => write!(f, "none"),
        }
    }
}

impl std::str::FromStr for ReportSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "web" => Ok(Self::Web),
            "docs" => Ok(Self::Docs),
            "hybrid" => Ok(Self::Hybrid),
            "none" => Ok(Self::None),
            other => Err(format!("unknown report source '{}' (web, docs, hybrid, none)", other)),
        }
    }
}

/// The set of backends enabled for one run
pub struct Research {
    retrievers: Vec<Arc<dyn Retriever>>,
    scraper: Option<PageScraper>,
}

impl Research {
    /// Build from explicit parts
    pub fn new(retrievers: Vec<Arc<dyn Retriever>>, scraper: Option<PageScraper>) -> Self {
        Self { retrievers, scraper }
    }

    /// No research at all
    pub fn disabled() -> Self {
        Self::new(Vec::new(), None)
    }

    /// Enable the backends `source` asks for that have credentials
    pub fn from_config(config: &RetrievalConfig, source: ReportSource) -> Self {
        debug!(%source, "Research::from_config: called");
        let mut retrievers: Vec<Arc<dyn Retriever>> = Vec::new();

        if source.uses_web() {
            match TavilyRetriever::from_config(&config.tavily) {
                Ok(r) => retrievers.push(Arc::new(r)),
                Err(e) => info!("Web search disabled: {}", e),
            }
        }
        if source.uses_docs() {
            match KnowledgeBaseRetriever::from_config(&config.knowledge_base) {
                Ok(r) => retrievers.push(Arc::new(r)),
                Err(e) => info!("Knowledge base disabled: {}", e),
            }
        }

        let scraper = match PageScraper::from_config(&config.scrape) {
            Ok(s) => Some(s),
            Err(e) => {
                warn!("Page scraping disabled: {}", e);
                None
            }
        };

        Self { retrievers, scraper }
    }

    /// Names of the enabled query backends
    pub fn backends(&self) -> Vec<&str> {
        self.retrievers.iter().map(|r| r.name()).collect()
    }

    /// Run every enabled backend; failures are logged and skipped
    pub async fn gather(&self, query: &str, source_urls: &[String]) -> Vec<ResearchNote> {
        debug!(%query, backends = self.retrievers.len(), urls = source_urls.len(), "Research::gather: called");

        let results = join_all(self.retrievers.iter().map(|r| async move { (r.name(), r.retrieve(query).await) })).await;

        let mut notes = Vec::new();
        for (name, result) in results {
            match result {
                Ok(found) => {
                    info!(backend = %name, count = found.len(), "Research retrieved");
                    notes.extend(found);
                }
                Err(e) => warn!(backend = %name, error = %e, "Research backend failed, skipping"),
            }
        }

        if let Some(scraper) = &self.scraper
            && !source_urls.is_empty()
        {
            notes.extend(scraper.scrape_all(source_urls).await);
        }

        notes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(&'static str, Result<Vec<ResearchNote>, ()>);

    #[async_trait]
    impl Retriever for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        async fn retrieve(&self, _query: &str) -> Result<Vec<ResearchNote>, RetrievalError> {
            self.1.clone().map_err(|_| RetrievalError::MissingApiKey("X".to_string()))
        }
    }

    fn note(content: &str) -> ResearchNote {
        ResearchNote {
            source: "test".to_string(),
            title: None,
            content: content.to_string(),
        }
    }

    #[test]
    fn test_report_source_parse_and_flags() {
        assert_eq!("Hybrid".parse::<ReportSource>().unwrap(), ReportSource::Hybrid);
        assert!("pdf".parse::<ReportSource>().is_err());
        assert!(ReportSource::Hybrid.uses_web() && ReportSource::Hybrid.uses_docs());
        assert!(ReportSource::Web.uses_web() && !ReportSource::Web.uses_docs());
        assert!(!ReportSource::None.uses_web() && !ReportSource::None.uses_docs());
    }

    #[tokio::test]
    async fn test_gather_skips_failing_backend() {
        let research = Research::new(
            vec![
                Arc::new(Fixed("ok", Ok(vec![note("a"), note("b")]))),
                Arc::new(Fixed("broken", Err(()))),
            ],
            None,
        );

        let notes = research.gather("q", &[]).await;
        assert_eq!(notes.len(), 2);
        assert_eq!(research.backends(), vec!["ok", "broken"]);
    }

    #[tokio::test]
    async fn test_disabled_gathers_nothing() {
        assert!(Research::disabled().gather("q", &[]).await.is_empty());
    }
}
