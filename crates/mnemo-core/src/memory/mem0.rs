//! ============================================================================
//! Mem0 Client - Hosted memory platform over HTTP
//! ============================================================================
//! Search and add against the mem0 REST API. The HTTP client keeps a warm
//! keep-alive pool with tight timeouts since search sits on the
//! time-to-first-token path.
//! ============================================================================

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::MemoryGateway;
use crate::types::ChatMessage;

/// Default API base URL
pub const DEFAULT_MEM0_BASE_URL: &str = "https://api.mem0.ai";

/// Default minimum relevance score for search hits
pub const DEFAULT_SEARCH_THRESHOLD: f32 = 0.2;

/// Client for the hosted memory API
pub struct Mem0Client {
    client: Client,
    api_key: String,
    base_url: String,
    threshold: f32,
}

#[derive(Debug, Serialize)]
struct SearchRequest<'a> {
    query: &'a str,
    user_id: &'a str,
    limit: usize,
    threshold: f32,
}

#[derive(Debug, Serialize)]
struct AddRequest<'a> {
    messages: &'a [ChatMessage],
    user_id: &'a str,
}

/// Search responses come either as a bare array or wrapped in `results`
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum SearchResponse {
    Results { results: Vec<Value> },
    List(Vec<Value>),
}

impl SearchResponse {
    fn into_items(self) -> Vec<Value> {
        match self {
            SearchResponse::Results { results } => results,
            SearchResponse::List(items) => items,
        }
    }
}

/// Build the pooled HTTP client used for memory calls
fn build_http_client() -> Result<Client> {
    Client::builder()
        .pool_max_idle_per_host(50)
        .pool_idle_timeout(Duration::from_secs(60))
        .tcp_keepalive(Duration::from_secs(60))
        .connect_timeout(Duration::from_secs(2))
        .timeout(Duration::from_secs(8))
        .build()
        .map_err(|e| anyhow!("Failed to build memory HTTP client: {}", e))
}

impl Mem0Client {
    /// Create a client against the hosted API
    pub fn new(api_key: String) -> Result<Self> {
        Self::new_custom(api_key, DEFAULT_MEM0_BASE_URL.to_string())
    }

    /// Create with a custom base URL
    pub fn new_custom(api_key: String, base_url: String) -> Result<Self> {
        Ok(Self {
            client: build_http_client()?,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            threshold: DEFAULT_SEARCH_THRESHOLD,
        })
    }

    /// Override the minimum relevance score
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Issue one throwaway search so the first real request finds an open
    /// connection. Failure is only logged.
    pub async fn warm_up(&self, identity: &str) -> bool {
        let started = std::time::Instant::now();
        match self.search("warm up", identity, 1).await {
            Ok(_) => {
                info!(
                    "Memory connection warmed up in {:.3}s",
                    started.elapsed().as_secs_f64()
                );
                true
            }
            Err(e) => {
                warn!("Memory warm-up failed: {}", e);
                false
            }
        }
    }

    async fn post<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<String> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("Authorization", format!("Token {}", self.api_key))
            .json(body)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to call memory API: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read memory API response: {}", e))?;

        if !status.is_success() {
            return Err(anyhow!("Memory API error {}: {}", status, body));
        }
        Ok(body)
    }
}

/// Pull the memory text out of one search hit
fn memory_text(item: &Value) -> Option<String> {
    let text = match item {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => ["memory", "content", "text"]
            .iter()
            .filter_map(|key| map.get(*key).and_then(Value::as_str))
            .find(|s| !s.trim().is_empty()),
        _ => None,
    }?;

    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

#[async_trait]
impl MemoryGateway for Mem0Client {
    fn name(&self) -> &'static str {
        "mem0"
    }

    async fn search(&self, query: &str, identity: &str, limit: usize) -> Result<Vec<String>> {
        debug!("Searching memories for {} ({} chars)", identity, query.len());

        let request = SearchRequest {
            query,
            user_id: identity,
            limit,
            threshold: self.threshold,
        };
        let body = self.post("/v1/memories/search/", &request).await?;

        let response: SearchResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse memory search response: {} - body: {}", e, body))?;

        let memories: Vec<String> = response
            .into_items()
            .iter()
            .filter_map(memory_text)
            .take(limit)
            .collect();

        debug!("Found {} memories for {}", memories.len(), identity);
        Ok(memories)
    }

    async fn add(&self, turns: &[ChatMessage], identity: &str) -> Result<()> {
        debug!("Adding {} turns for {}", turns.len(), identity);

        let request = AddRequest {
            messages: turns,
            user_id: identity,
        };
        self.post("/v1/memories/", &request).await?;
        Ok(())
    }
}
