//! ============================================================================
//! Memory Module - Long-term caller memory behind an opaque service
//! ============================================================================
//! The pipeline only ever searches and adds; storage lives elsewhere.
//!
//! ## Backends
//! - `Mem0Client`: hosted memory platform over HTTP
//! - `QdrantMemory`: self-hosted vector store plus an embeddings API
//!
//! ## Architecture
//! ```text
//! Recent turns → Query → MemoryService::search (bounded timeout)
//!                                   ↓
//!                      [System Prompt] + [Memories]
//!                                   ↓
//!                          Generation stream
//!                                   ↓
//!            first chunk → MemoryService::commit (detached task)
//! ```
//! ============================================================================

mod embeddings;
mod mem0;
mod qdrant;
mod service;
mod types;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::ChatMessage;

pub use embeddings::{
    EmbeddingService, DEFAULT_EMBEDDING_BASE_URL, DEFAULT_EMBEDDING_MODEL, EMBEDDING_DIM,
};
pub use mem0::{Mem0Client, DEFAULT_MEM0_BASE_URL, DEFAULT_SEARCH_THRESHOLD};
pub use qdrant::{QdrantMemory, COLLECTION_NAME};
pub use service::{prepare_turns, MemoryService, DEFAULT_SEARCH_LIMIT, DEFAULT_SEARCH_TIMEOUT};
pub use types::MemoryRecord;

/// Contract of the external memory service. Implementations are shared
/// across requests and must be safe for concurrent use.
#[async_trait]
pub trait MemoryGateway: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &'static str;

    /// Memory texts relevant to `query` for this identity, best match first
    async fn search(&self, query: &str, identity: &str, limit: usize) -> Result<Vec<String>>;

    /// Record conversation turns under this identity
    async fn add(&self, turns: &[ChatMessage], identity: &str) -> Result<()>;
}
