//! ============================================================================
//! Embedding Service - Vectors for the self-hosted memory backend
//! ============================================================================
//! Calls an OpenAI-compatible `/embeddings` endpoint.
//! ============================================================================

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default embedding model (OpenAI compatible)
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";

/// Expected embedding dimension for text-embedding-3-small
pub const EMBEDDING_DIM: usize = 1536;

/// Default embeddings API base URL
pub const DEFAULT_EMBEDDING_BASE_URL: &str = "https://api.openai.com/v1";

/// Embedding service for generating text vectors
pub struct EmbeddingService {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

impl EmbeddingService {
    /// Create against the OpenAI API with the default model
    pub fn new(api_key: String) -> Self {
        Self::new_custom(
            api_key,
            DEFAULT_EMBEDDING_BASE_URL.to_string(),
            DEFAULT_EMBEDDING_MODEL.to_string(),
        )
    }

    /// Create with custom base URL and model
    pub fn new_custom(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    /// Generate embeddings for multiple texts, in input order
    pub async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!("Generating embeddings for {} texts", texts.len());

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&EmbeddingRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await
            .map_err(|e| anyhow!("Failed to send embedding request: {}", e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| anyhow!("Failed to read response body: {}", e))?;

        if !status.is_success() {
            if let Ok(error) = serde_json::from_str::<ErrorResponse>(&body) {
                return Err(anyhow!(
                    "Embedding API error ({}): {}",
                    status,
                    error.error.message
                ));
            }
            return Err(anyhow!("Embedding API error ({}): {}", status, body));
        }

        let parsed: EmbeddingResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to parse embedding response: {}", e))?;

        if parsed.data.len() != texts.len() {
            return Err(anyhow!(
                "Embedding API returned {} vectors for {} inputs",
                parsed.data.len(),
                texts.len()
            ));
        }

        let mut embeddings: Vec<(usize, Vec<f32>)> = parsed
            .data
            .into_iter()
            .map(|d| (d.index, d.embedding))
            .collect();
        embeddings.sort_by_key(|(idx, _)| *idx);

        Ok(embeddings.into_iter().map(|(_, e)| e).collect())
    }

    /// Generate embedding for a single text
    pub async fn embed_single(&self, text: &str) -> Result<Vec<f32>> {
        self.embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No embedding returned"))
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}
