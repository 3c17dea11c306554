//! ============================================================================
//! Memory Service - Request-facing wrapper around a memory backend
//! ============================================================================
//! Search degrades to no memories on timeout or error. Add runs as a detached
//! task whose failures are logged and never reach the caller.
//! ============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::MemoryGateway;
use crate::types::{ChatMessage, Role};

/// Default bound on a memory search
pub const DEFAULT_SEARCH_TIMEOUT: Duration = Duration::from_millis(500);

/// Default number of memories requested per search
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Memory service shared by all requests
#[derive(Clone)]
pub struct MemoryService {
    gateway: Option<Arc<dyn MemoryGateway>>,
    search_timeout: Duration,
    search_limit: usize,
}

impl MemoryService {
    /// Create a service over a backend
    pub fn new(gateway: Arc<dyn MemoryGateway>) -> Self {
        Self {
            gateway: Some(gateway),
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    /// Service with no backend: searches return nothing, adds are skipped
    pub fn disabled() -> Self {
        Self {
            gateway: None,
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            search_limit: DEFAULT_SEARCH_LIMIT,
        }
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    pub fn with_search_limit(mut self, limit: usize) -> Self {
        self.search_limit = limit;
        self
    }

    /// Backend name, or "disabled"
    pub fn backend_name(&self) -> &'static str {
        self.gateway.as_ref().map_or("disabled", |g| g.name())
    }

    /// Search memories. Empty query, missing backend, timeout and backend
    /// errors all yield an empty result.
    pub async fn search(&self, query: &str, identity: &str) -> Vec<String> {
        let Some(gateway) = &self.gateway else {
            return Vec::new();
        };
        if query.trim().is_empty() {
            debug!("Empty memory query for {}, skipping search", identity);
            return Vec::new();
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(
            self.search_timeout,
            gateway.search(query, identity, self.search_limit),
        )
        .await;

        match outcome {
            Ok(Ok(memories)) => {
                info!(
                    "Memory search returned {} results for {} in {:.4}s",
                    memories.len(),
                    identity,
                    started.elapsed().as_secs_f64()
                );
                memories
            }
            Ok(Err(e)) => {
                warn!("Memory search failed for {}, continuing without memories: {}", identity, e);
                Vec::new()
            }
            Err(_) => {
                warn!(
                    "Memory search timed out after {:?} for {}, continuing without memories",
                    self.search_timeout, identity
                );
                Vec::new()
            }
        }
    }

    /// Dispatch an add for the original conversation without waiting on it.
    /// Returns the detached task handle, or None when there is no backend.
    pub fn commit(&self, messages: &[ChatMessage], identity: &str) -> Option<JoinHandle<()>> {
        let gateway = Arc::clone(self.gateway.as_ref()?);
        let turns = prepare_turns(messages);
        let identity = identity.to_string();

        Some(tokio::spawn(async move {
            if turns.is_empty() {
                debug!("No turns worth remembering for {}", identity);
                return;
            }
            match gateway.add(&turns, &identity).await {
                Ok(()) => debug!("Stored {} turns for {}", turns.len(), identity),
                Err(e) => warn!("Background memory add failed for {}: {}", identity, e),
            }
        }))
    }
}

/// Non-system turns with trimmed, non-empty content
pub fn prepare_turns(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| ChatMessage::new(m.role, m.content.trim()))
        .filter(|m| !m.content.is_empty())
        .collect()
}
