//! ============================================================================
//! Generation Module - Streaming completions from the upstream provider
//! ============================================================================
//! A generator opens one upstream call and hands back a lazy, single-use
//! stream of chunks. The stream ends cleanly after the provider's end marker
//! or yields exactly one `Err` and stops. There is no retry at this layer.
//! ============================================================================

mod openai;
mod sse;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;

use crate::error::Result;
use crate::types::{ChatCompletionChunk, GenerationRequest};

pub use openai::{OpenAiClient, DEFAULT_GENERATION_BASE_URL, DEFAULT_MODEL};
pub use sse::SseDecoder;

/// Chunks of one generation, in provider order
pub type GenerationStream = Pin<Box<dyn Stream<Item = Result<ChatCompletionChunk>> + Send>>;

/// Upstream completion provider. Shared across requests.
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &'static str;

    /// Submit the request. Errors here happen before any chunk exists.
    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream>;
}
