//! ============================================================================
//! Streaming Pipeline - Per-request orchestration
//! ============================================================================
//! Received → MemoryLookup → Assembling → Streaming → Committing → Completed
//!
//! Memory lookup never fails the request. The first chunk carrying text is
//! timed for TTFT; every chunk is forwarded. The memory add is dispatched as a
//! detached task on the first chunk, at the terminal event, or when the
//! caller drops the stream, whichever comes first. Dropping the stream
//! releases the upstream connection but never cancels the add.
//! ============================================================================

use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use futures_util::{Stream, StreamExt};
use tracing::{debug, error, info};

use crate::error::{GatewayError, Result};
use crate::generation::{Generator, DEFAULT_MODEL};
use crate::identity::resolve_identity;
use crate::memory::MemoryService;
use crate::prompt;
use crate::summarizer::TurnSummarizer;
use crate::types::{
    ChatCompletion, ChatCompletionRequest, ChatMessage, CompletionChoice, GenerationRequest, Role,
    SamplingParams, StreamEvent,
};

/// Events for one request; always ends with exactly one terminal event
pub type EventStream = Pin<Box<dyn Stream<Item = StreamEvent> + Send>>;

/// Defaults applied when the caller leaves fields unset
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub default_model: String,
    pub sampling: SamplingParams,
    pub summarizer: TurnSummarizer,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_model: DEFAULT_MODEL.to_string(),
            sampling: SamplingParams::default(),
            summarizer: TurnSummarizer::default(),
        }
    }
}

/// Request pipeline. Built once at startup and shared by all requests.
pub struct Pipeline {
    generator: Arc<dyn Generator>,
    memory: MemoryService,
    config: PipelineConfig,
}

/// Per-stream bookkeeping. Owns the single memory commit so that it also
/// happens when the caller drops the stream before any chunk arrives.
struct StreamGuard {
    memory: MemoryService,
    original: Vec<ChatMessage>,
    identity: String,
    forwarded: usize,
    committed: bool,
    finished: bool,
}

impl StreamGuard {
    fn commit(&mut self) {
        if !self.committed {
            self.committed = true;
            self.memory.commit(&self.original, &self.identity);
        }
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        debug!(
            "Caller disconnected from {} after {} chunks, upstream released",
            self.identity, self.forwarded
        );
        // tokio::spawn needs a runtime; a drop outside one has nowhere to send the add.
        if tokio::runtime::Handle::try_current().is_ok() {
            self.commit();
        }
    }
}

impl Pipeline {
    pub fn new(generator: Arc<dyn Generator>, memory: MemoryService, config: PipelineConfig) -> Self {
        Self {
            generator,
            memory,
            config,
        }
    }

    pub fn memory(&self) -> &MemoryService {
        &self.memory
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Resolve model and sampling for the upstream call
    fn generation_request(
        &self,
        request: &ChatCompletionRequest,
        messages: Vec<ChatMessage>,
    ) -> GenerationRequest {
        let defaults = self.config.sampling;
        let sampling = SamplingParams {
            temperature: request.temperature.unwrap_or(defaults.temperature),
            top_p: request.top_p.unwrap_or(defaults.top_p),
            max_tokens: request.max_tokens.unwrap_or(defaults.max_tokens),
        };
        let model = request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());

        GenerationRequest::new(messages, model, sampling)
    }

    /// Run the pipeline up to an open upstream stream.
    ///
    /// Failures before the first chunk (empty conversation, upstream refusing
    /// the call) are returned as `Err` so the caller gets a single error
    /// response. Later failures arrive as a terminal `StreamEvent::Error`.
    pub async fn run(&self, request: ChatCompletionRequest) -> Result<EventStream> {
        let received = Instant::now();

        if request.messages.is_empty() {
            return Err(GatewayError::InvalidRequest(
                "messages must contain at least one message".to_string(),
            ));
        }

        let identity = resolve_identity(&request.caller);
        info!(
            "Received chat completion request with {} messages (identity={})",
            request.messages.len(),
            identity
        );

        let query = self.config.summarizer.summarize(&request.messages);
        let memories = self.memory.search(&query, &identity).await;

        let augmented = prompt::assemble(&request.messages, &memories);
        let generation = self.generation_request(&request, augmented);
        debug!(
            "Assembled prompt with {} memories for model {}",
            memories.len(),
            generation.model
        );

        let submitted = Instant::now();
        let mut upstream = self.generator.stream(generation).await.map_err(|e| {
            error!("Generation request failed before streaming ({}): {}", self.generator.name(), e);
            e
        })?;

        // Built before the stream so a drop ahead of the first poll still commits.
        let mut guard = StreamGuard {
            memory: self.memory.clone(),
            original: request.messages,
            identity,
            forwarded: 0,
            committed: false,
            finished: false,
        };

        Ok(Box::pin(async_stream::stream! {
            let mut timed = false;

            while let Some(item) = upstream.next().await {
                match item {
                    Ok(chunk) => {
                        // Role-only preambles carry no text and do not count for TTFT.
                        if !timed && !chunk.delta_text().is_empty() {
                            info!(
                                "TTFT: {:.4} seconds ({:.4} since request received)",
                                submitted.elapsed().as_secs_f64(),
                                received.elapsed().as_secs_f64()
                            );
                            timed = true;
                        }
                        guard.commit();
                        guard.forwarded += 1;
                        yield StreamEvent::Delta(chunk);
                    }
                    Err(e) => {
                        error!(
                            "Generation stream failed after {} chunks for {}: {}",
                            guard.forwarded, guard.identity, e
                        );
                        guard.commit();
                        guard.finished = true;
                        yield StreamEvent::Error(e.to_string());
                        return;
                    }
                }
            }

            guard.commit();
            debug!(
                "Generation completed for {} ({} chunks in {:.4}s)",
                guard.identity,
                guard.forwarded,
                received.elapsed().as_secs_f64()
            );
            guard.finished = true;
            yield StreamEvent::Done;
        }))
    }

    /// Non-streaming variant: same pipeline, deltas folded into one message
    pub async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion> {
        let requested_model = request
            .model
            .clone()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| self.config.default_model.clone());
        let mut events = self.run(request).await?;

        let mut completion = ChatCompletion {
            id: String::new(),
            object: "chat.completion".to_string(),
            created: chrono::Utc::now().timestamp(),
            model: requested_model,
            choices: Vec::new(),
            usage: None,
        };
        let mut content = String::new();
        let mut finish_reason = None;

        while let Some(event) = events.next().await {
            match event {
                StreamEvent::Delta(chunk) => {
                    if completion.id.is_empty() {
                        completion.id = chunk.id.clone();
                        if chunk.created != 0 {
                            completion.created = chunk.created;
                        }
                        if !chunk.model.is_empty() {
                            completion.model = chunk.model.clone();
                        }
                    }
                    content.push_str(&chunk.delta_text());
                    if let Some(reason) = chunk.finish_reason() {
                        finish_reason = Some(reason.to_string());
                    }
                    if chunk.usage.is_some() {
                        completion.usage = chunk.usage;
                    }
                }
                StreamEvent::Error(message) => return Err(GatewayError::Upstream(message)),
                StreamEvent::Done => break,
            }
        }

        completion.choices.push(CompletionChoice {
            index: 0,
            message: ChatMessage::new(Role::Assistant, content),
            finish_reason,
        });
        Ok(completion)
    }
}
