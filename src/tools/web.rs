//! Web search - Brave Search API client and digest formatting

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use crate::config::SearchConfig;
use crate::error::Error;
use crate::Result;

/// One search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// Search collaborator used by the tool executor.
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Brave Search web API client
#[derive(Clone)]
pub struct BraveSearch {
    api_key: String,
    base_url: String,
    max_results: usize,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Debug, Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Debug, Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

impl BraveSearch {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Tool(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            max_results: config.max_results,
            client,
        })
    }
}

#[async_trait]
impl WebSearch for BraveSearch {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        if self.api_key.is_empty() {
            return Err(Error::Tool("search API key is not configured".to_string()));
        }

        debug!("Brave search: {}", query);
        let count = self.max_results.to_string();
        let response = self
            .client
            .get(format!("{}/web/search", self.base_url))
            .header("Accept", "application/json")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| Error::Tool(format!("search request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Tool(format!("search API returned {}", status)));
        }

        let body: BraveResponse = response
            .json()
            .await
            .map_err(|e| Error::Tool(format!("unreadable search response: {}", e)))?;

        Ok(body
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .take(self.max_results)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: strip_tags(&r.description),
            })
            .collect())
    }
}

/// Render hits as a plain-text digest, cut at `max_chars`.
pub fn format_digest(query: &str, hits: &[SearchHit], max_chars: usize) -> String {
    let mut out = format!("Web search results for \"{}\":\n", query);
    for (i, hit) in hits.iter().enumerate() {
        out.push_str(&format!(
            "\n{}. {}\n   {}\n   {}\n",
            i + 1,
            hit.title,
            hit.snippet,
            hit.url
        ));
    }

    if out.chars().count() > max_chars {
        let cut: String = out.chars().take(max_chars).collect();
        format!("{}...\n\n[Truncated]", cut)
    } else {
        out
    }
}

/// Brave marks query terms with <strong>; drop simple inline tags.
fn strip_tags(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut in_tag = false;
    for c in text.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}
