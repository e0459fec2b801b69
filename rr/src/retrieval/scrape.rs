//! Fetch explicit source pages and convert them to markdown

use std::time::Duration;

use futures::future::join_all;
use reqwest::{Client, Response};
use scraper::{Html, Selector};
use tracing::{debug, warn};

use super::RetrievalError;
use crate::config::ScrapeConfig;
use crate::domain::ResearchNote;

/// Larger bodies are dropped; reading stops once the limit is passed
const MAX_BODY_BYTES: usize = 2_000_000;

pub struct PageScraper {
    http: Client,
    min_chars: usize,
}

impl PageScraper {
    pub fn from_config(config: &ScrapeConfig) -> Result<Self, RetrievalError> {
        debug!(min_chars = config.min_chars, "PageScraper::from_config: called");
        let http = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .user_agent(concat!("ruralreport/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            http,
            min_chars: config.min_chars,
        })
    }

    /// Scrape every URL; unreachable or near-empty pages are skipped
    pub async fn scrape_all(&self, urls: &[String]) -> Vec<ResearchNote> {
        debug!(count = urls.len(), "PageScraper::scrape_all: called");
        let results = join_all(urls.iter().map(|url| self.scrape(url))).await;

        urls.iter()
            .zip(results)
            .filter_map(|(url, result)| match result {
                Ok(Some(note)) => Some(note),
                Ok(None) => {
                    debug!(%url, "PageScraper::scrape_all: page too short");
                    None
                }
                Err(e) => {
                    warn!(%url, error = %e, "Failed to scrape source page");
                    None
                }
            })
            .collect()
    }

    /// Fetch one page; `None` when it has too little text to be useful
    pub async fn scrape(&self, url: &str) -> Result<Option<ResearchNote>, RetrievalError> {
        debug!(%url, "PageScraper::scrape: called");
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RetrievalError::Status {
                backend: url.to_string(),
                status: status.as_u16(),
                body: String::new(),
            });
        }

        let is_html = response
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|ct| ct.contains("text/html") || ct.contains("application/xhtml"));

        let body = read_capped(response, url, MAX_BODY_BYTES).await?;

        let (title, content) = if is_html {
            (extract_title(&body), html2md::rewrite_html(&body, false))
        } else {
            (None, body)
        };
        let content = content.trim().to_string();

        if content.chars().count() <= self.min_chars {
            return Ok(None);
        }
        Ok(Some(ResearchNote {
            source: url.to_string(),
            title,
            content,
        }))
    }
}

/// Read the body chunk by chunk, failing as soon as it passes `limit` bytes
async fn read_capped(mut response: Response, url: &str, limit: usize) -> Result<String, RetrievalError> {
    let too_large = |size: u64| RetrievalError::InvalidResponse {
        backend: url.to_string(),
        message: format!("page too large ({} bytes, limit {})", size, limit),
    };
    if let Some(declared) = response.content_length()
        && declared > limit as u64
    {
        debug!(%url, declared, "read_capped: declared length over limit");
        return Err(too_large(declared));
    }

    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > limit {
            debug!(%url, read = body.len(), "read_capped: stopped reading");
            return Err(too_large(body.len() as u64));
        }
    }
    Ok(String::from_utf8_lossy(&body).into_owned())
}

/// Text of the document's `<title>` element, entities decoded
fn extract_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("title").ok()?;
    document
        .select(&selector)
        .next()
        .map(|el| el.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}
