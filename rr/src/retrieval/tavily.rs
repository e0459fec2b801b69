//! Tavily web search

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::{RetrievalError, Retriever};
use crate::config::TavilyConfig;
use crate::domain::ResearchNote;

const BACKEND: &str = "tavily";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: String,
    #[serde(default)]
    content: String,
}

/// Web search through the Tavily API
pub struct TavilyRetriever {
    http: Client,
    api_key: String,
    endpoint: String,
    max_results: u32,
    search_depth: String,
    include_domains: Vec<String>,
}

impl TavilyRetriever {
    pub fn from_config(config: &TavilyConfig) -> Result<Self, RetrievalError> {
        debug!(base_url = %config.base_url, "TavilyRetriever::from_config: called");
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RetrievalError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_key(config, api_key)
    }

    /// Build with an explicit key instead of the environment
    pub fn with_key(config: &TavilyConfig, api_key: impl Into<String>) -> Result<Self, RetrievalError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            endpoint: format!("{}/search", config.base_url.trim_end_matches('/')),
            max_results: config.max_results,
            search_depth: config.search_depth.clone(),
            include_domains: config.include_domains.clone(),
        })
    }
}

#[async_trait]
impl Retriever for TavilyRetriever {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<ResearchNote>, RetrievalError> {
        debug!(%query, max_results = self.max_results, "TavilyRetriever::retrieve: called");
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": self.max_results,
            "search_depth": self.search_depth,
            "include_domains": self.include_domains,
            "include_answer": false,
            "include_images": false,
        });

        let response = self.http.post(&self.endpoint).json(&body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, "TavilyRetriever::retrieve: error status");
            return Err(RetrievalError::Status {
                backend: BACKEND.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let parsed: SearchResponse = response.json().await.map_err(|e| RetrievalError::InvalidResponse {
            backend: BACKEND.to_string(),
            message: e.to_string(),
        })?;
        debug!(count = parsed.results.len(), "TavilyRetriever::retrieve: results parsed");

        Ok(parsed
            .results
            .into_iter()
            .filter(|r| !r.content.trim().is_empty())
            .map(|r| ResearchNote {
                source: r.url,
                title: r.title.filter(|t| !t.trim().is_empty()),
                content: r.content,
            })
            .collect())
    }
}
