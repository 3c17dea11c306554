//! ============================================================================
//! Qdrant Memory - Self-hosted vector store backend
//! ============================================================================
//! Every remembered turn becomes one point carrying its identity, text and
//! role. Search embeds the query and filters by identity.
//! ============================================================================

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use qdrant_client::qdrant::{
    Condition, CreateCollectionBuilder, Distance, Filter, PointStruct, SearchPointsBuilder,
    UpsertPointsBuilder, Value, VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use tracing::{debug, info};

use super::embeddings::{EmbeddingService, EMBEDDING_DIM};
use super::types::MemoryRecord;
use super::MemoryGateway;
use crate::types::ChatMessage;

/// Collection name for memories
pub const COLLECTION_NAME: &str = "mnemo_memories";

/// Memory backend over a Qdrant collection
pub struct QdrantMemory {
    client: Qdrant,
    embeddings: EmbeddingService,
    score_threshold: f32,
}

impl QdrantMemory {
    /// Connect to Qdrant and make sure the collection exists
    pub async fn new(url: &str, embeddings: EmbeddingService, score_threshold: f32) -> Result<Self> {
        debug!("Connecting to Qdrant at {}", url);

        let client = Qdrant::from_url(url)
            .build()
            .map_err(|e| anyhow!("Failed to create Qdrant client: {}", e))?;

        let memory = Self {
            client,
            embeddings,
            score_threshold,
        };
        memory.ensure_collection().await?;
        Ok(memory)
    }

    async fn ensure_collection(&self) -> Result<()> {
        let exists = self
            .client
            .collection_exists(COLLECTION_NAME)
            .await
            .map_err(|e| anyhow!("Failed to check collection existence: {}", e))?;

        if exists {
            debug!("Collection {} already exists", COLLECTION_NAME);
            return Ok(());
        }

        info!("Creating collection: {}", COLLECTION_NAME);
        self.client
            .create_collection(
                CreateCollectionBuilder::new(COLLECTION_NAME).vectors_config(
                    VectorParamsBuilder::new(EMBEDDING_DIM as u64, Distance::Cosine),
                ),
            )
            .await
            .map_err(|e| anyhow!("Failed to create collection: {}", e))?;
        Ok(())
    }

    /// Store embedded records
    async fn upsert(&self, records: &[MemoryRecord]) -> Result<()> {
        let points: Vec<PointStruct> = records
            .iter()
            .map(|record| {
                PointStruct::new(
                    record.id.to_string(),
                    record.embedding.clone(),
                    record_payload(record),
                )
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(COLLECTION_NAME, points))
            .await
            .map_err(|e| anyhow!("Failed to upsert memories: {}", e))?;
        Ok(())
    }
}

fn record_payload(record: &MemoryRecord) -> HashMap<String, Value> {
    let role = serde_json::to_value(record.role)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default();

    [
        ("identity".to_string(), Value::from(record.identity.clone())),
        ("text".to_string(), Value::from(record.text.clone())),
        ("role".to_string(), Value::from(role)),
        ("created_at".to_string(), Value::from(record.created_at)),
    ]
    .into_iter()
    .collect()
}

fn get_string(payload: &HashMap<String, Value>, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[async_trait]
impl MemoryGateway for QdrantMemory {
    fn name(&self) -> &'static str {
        "qdrant"
    }

    async fn search(&self, query: &str, identity: &str, limit: usize) -> Result<Vec<String>> {
        let query_embedding = self.embeddings.embed_single(query).await?;
        let filter = Filter::must([Condition::matches("identity", identity.to_string())]);

        let result = self
            .client
            .search_points(
                SearchPointsBuilder::new(COLLECTION_NAME, query_embedding, limit as u64)
                    .filter(filter)
                    .score_threshold(self.score_threshold)
                    .with_payload(true),
            )
            .await
            .map_err(|e| anyhow!("Failed to search memories: {}", e))?;

        let memories: Vec<String> = result
            .result
            .into_iter()
            .filter_map(|point| get_string(&point.payload, "text"))
            .collect();

        debug!("Found {} matching memories for {}", memories.len(), identity);
        Ok(memories)
    }

    async fn add(&self, turns: &[ChatMessage], identity: &str) -> Result<()> {
        let texts: Vec<String> = turns.iter().map(|t| t.content.clone()).collect();
        let vectors = self.embeddings.embed(&texts).await?;

        let records: Vec<MemoryRecord> = turns
            .iter()
            .zip(vectors)
            .map(|(turn, vector)| MemoryRecord::from_turn(identity, turn).with_embedding(vector))
            .collect();

        self.upsert(&records).await?;
        debug!("Stored {} memories for {}", records.len(), identity);
        Ok(())
    }
}
