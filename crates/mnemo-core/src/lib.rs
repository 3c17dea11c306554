//! ============================================================================
//! MNEMO-CORE: Memory-augmented streaming inference
//! ============================================================================
//! This crate holds the request pipeline behind the gateway:
//! - Caller identity derived from phone metadata
//! - Memory search queries built from the most recent turns
//! - Recalled memories injected into the system instruction
//! - Streaming generation against an OpenAI-compatible provider
//! - Fire-and-forget memory writes once the first chunk arrives
//! ============================================================================

pub mod error;
pub mod generation;
pub mod identity;
pub mod memory;
pub mod pipeline;
pub mod prompt;
pub mod summarizer;
pub mod types;

// Re-export main types for convenience
pub use types::*;
pub use error::{GatewayError, Result};
pub use generation::{GenerationStream, Generator, OpenAiClient};
pub use identity::resolve_identity;
pub use memory::{Mem0Client, MemoryGateway, MemoryService, QdrantMemory};
pub use pipeline::{EventStream, Pipeline, PipelineConfig};
pub use summarizer::TurnSummarizer;
