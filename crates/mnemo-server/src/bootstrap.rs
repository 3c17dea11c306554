//! Startup wiring: turn a `GatewayConfig` into live clients and a pipeline.

use std::sync::Arc;

use anyhow::{Context, Result};
use mnemo_core::identity::ANONYMOUS_IDENTITY;
use mnemo_core::memory::{EmbeddingService, DEFAULT_EMBEDDING_MODEL};
use mnemo_core::{
    Generator, Mem0Client, MemoryGateway, MemoryService, OpenAiClient, Pipeline, QdrantMemory,
};
use tracing::info;

use crate::config::{GatewayConfig, MemoryBackend};

/// Connect the configured memory backend, or None when memory is disabled.
/// The hosted backend gets a warm-up search so the first caller finds an
/// open connection.
pub async fn connect_memory(config: &GatewayConfig) -> Result<Option<Arc<dyn MemoryGateway>>> {
    match config.memory_backend {
        MemoryBackend::Disabled => {
            info!("Memory disabled, requests will run without recall");
            Ok(None)
        }
        MemoryBackend::Mem0 => {
            let api_key = config
                .mem0_api_key
                .clone()
                .context("MEMORY_BACKEND=mem0 requires MEM0_API_KEY")?;
            let client = Mem0Client::new_custom(api_key, config.mem0_base_url.clone())?
                .with_threshold(config.search_threshold);
            client.warm_up(ANONYMOUS_IDENTITY).await;
            info!("Memory backend: mem0 at {}", client.base_url());
            Ok(Some(Arc::new(client)))
        }
        MemoryBackend::Qdrant => {
            let api_key = config
                .embedding_api_key
                .clone()
                .context("MEMORY_BACKEND=qdrant requires EMBEDDING_API_KEY or OPENAI_API_KEY")?;
            let embeddings = EmbeddingService::new_custom(
                api_key,
                config.embedding_base_url.clone(),
                DEFAULT_EMBEDDING_MODEL.to_string(),
            );
            let memory = QdrantMemory::new(&config.qdrant_url, embeddings, config.search_threshold)
                .await
                .context("Failed to connect to Qdrant")?;
            info!("Memory backend: qdrant at {}", config.qdrant_url);
            Ok(Some(Arc::new(memory)))
        }
    }
}

/// Wrap the backend with the request-path timeout and limit
pub fn memory_service(config: &GatewayConfig, gateway: Option<Arc<dyn MemoryGateway>>) -> MemoryService {
    gateway
        .map(MemoryService::new)
        .unwrap_or_else(MemoryService::disabled)
        .with_search_timeout(config.search_timeout)
        .with_search_limit(config.search_limit)
}

pub fn generator(config: &GatewayConfig) -> Result<Arc<dyn Generator>> {
    let api_key = config
        .generation_api_key
        .clone()
        .context("GENERATION_API_KEY (or CEREBRAS_API_KEY) must be set")?;
    let client = OpenAiClient::new_custom(api_key, config.generation_base_url.clone())?;
    info!(
        "Generation endpoint: {} (default model {})",
        client.base_url(),
        config.generation_model
    );
    Ok(Arc::new(client))
}

pub async fn pipeline(config: &GatewayConfig) -> Result<Pipeline> {
    let generator = generator(config)?;
    let memory = memory_service(config, connect_memory(config).await?);
    Ok(Pipeline::new(generator, memory, config.pipeline_config()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_disabled_memory() {
        let config = GatewayConfig::default();
        let gateway = connect_memory(&config).await.unwrap();
        assert!(gateway.is_none());
        assert_eq!(memory_service(&config, gateway).backend_name(), "disabled");
    }

    #[tokio::test]
    async fn test_mem0_requires_key() {
        let config = GatewayConfig {
            memory_backend: MemoryBackend::Mem0,
            ..Default::default()
        };
        assert!(connect_memory(&config).await.is_err());
    }

    #[test]
    fn test_generator_requires_key() {
        assert!(generator(&GatewayConfig::default()).is_err());

        let config = GatewayConfig {
            generation_api_key: Some("key".to_string()),
            ..Default::default()
        };
        assert_eq!(generator(&config).unwrap().name(), "openai-compatible");
    }
}
