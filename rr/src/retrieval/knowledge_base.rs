//! RAGFlow knowledge base retrieval over its REST API

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::{RetrievalError, Retriever};
use crate::config::KnowledgeBaseConfig;
use crate::domain::ResearchNote;

const BACKEND: &str = "knowledge-base";

/// RAGFlow wraps every payload in `{code, message, data}`
#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct Dataset {
    id: String,
}

#[derive(Debug, Deserialize)]
struct RetrievalData {
    #[serde(default)]
    chunks: Vec<Chunk>,
}

#[derive(Debug, Deserialize)]
struct Chunk {
    content: String,
    #[serde(default)]
    document_keyword: Option<String>,
}

/// Knowledge base backed by a RAGFlow server
pub struct KnowledgeBaseRetriever {
    http: Client,
    api_key: String,
    base_url: String,
    dataset_ids: Vec<String>,
    document_ids: Vec<String>,
    top_k: u32,
}

impl KnowledgeBaseRetriever {
    pub fn from_config(config: &KnowledgeBaseConfig) -> Result<Self, RetrievalError> {
        debug!(base_url = %config.base_url, "KnowledgeBaseRetriever::from_config: called");
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| RetrievalError::MissingApiKey(config.api_key_env.clone()))?;
        Self::with_key(config, api_key)
    }

    /// Build with an explicit key instead of the environment
    pub fn with_key(config: &KnowledgeBaseConfig, api_key: impl Into<String>) -> Result<Self, RetrievalError> {
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self {
            http,
            api_key: api_key.into(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            dataset_ids: config.dataset_ids.clone(),
            document_ids: config.document_ids.clone(),
            top_k: config.top_k,
        })
    }

    async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RetrievalError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(RetrievalError::Status {
                backend: BACKEND.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let envelope: Envelope<T> = response.json().await.map_err(|e| RetrievalError::InvalidResponse {
            backend: BACKEND.to_string(),
            message: e.to_string(),
        })?;
        if envelope.code != 0 {
            return Err(RetrievalError::InvalidResponse {
                backend: BACKEND.to_string(),
                message: format!(
                    "code {}: {}",
                    envelope.code,
                    envelope.message.unwrap_or_default()
                ),
            });
        }
        envelope.data.ok_or_else(|| RetrievalError::InvalidResponse {
            backend: BACKEND.to_string(),
            message: "response has no data".to_string(),
        })
    }

    /// Every dataset on the server, used when none are configured
    async fn list_datasets(&self) -> Result<Vec<String>, RetrievalError> {
        debug!("KnowledgeBaseRetriever::list_datasets: called");
        let response = self
            .http
            .get(format!("{}/api/v1/datasets", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;
        let datasets: Vec<Dataset> = Self::unwrap_envelope(response).await?;
        Ok(datasets.into_iter().map(|d| d.id).collect())
    }
}

#[async_trait]
impl Retriever for KnowledgeBaseRetriever {
    fn name(&self) -> &str {
        BACKEND
    }

    async fn retrieve(&self, query: &str) -> Result<Vec<ResearchNote>, RetrievalError> {
        debug!(%query, top_k = self.top_k, "KnowledgeBaseRetriever::retrieve: called");
        let dataset_ids = if self.dataset_ids.is_empty() {
            match self.list_datasets().await {
                Ok(ids) => ids,
                Err(e) => {
                    warn!(error = %e, "Could not list datasets, querying without dataset ids");
                    Vec::new()
                }
            }
        } else {
            self.dataset_ids.clone()
        };

        let body = serde_json::json!({
            "question": query,
            "dataset_ids": dataset_ids,
            "document_ids": self.document_ids,
            "top_k": self.top_k,
        });
        let response = self
            .http
            .post(format!("{}/api/v1/retrieval", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let data: RetrievalData = Self::unwrap_envelope(response).await?;
        debug!(count = data.chunks.len(), "KnowledgeBaseRetriever::retrieve: chunks parsed");

        Ok(data
            .chunks
            .into_iter()
            .filter(|c| !c.content.trim().is_empty())
            .map(|c| ResearchNote {
                source: BACKEND.to_string(),
                title: c.document_keyword,
                content: c.content,
            })
            .collect())
    }
}
