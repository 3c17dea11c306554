//! ============================================================================
//! OpenAI-Compatible Client - Streaming chat completions
//! ============================================================================
//! Works against any `/chat/completions` endpoint that speaks SSE with a
//! `data: [DONE]` terminator (Cerebras by default).
//! ============================================================================

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::sse::SseDecoder;
use super::{GenerationStream, Generator};
use crate::error::{GatewayError, Result};
use crate::types::{ChatCompletionChunk, GenerationRequest};

/// Default upstream endpoint
pub const DEFAULT_GENERATION_BASE_URL: &str = "https://api.cerebras.ai/v1";

/// Model used when the caller does not name one
pub const DEFAULT_MODEL: &str = "qwen-3-235b-a22b-instruct-2507";

/// End-of-stream sentinel
const DONE_MARKER: &str = "[DONE]";

/// Streaming client for OpenAI-compatible providers
pub struct OpenAiClient {
    client: Client,
    api_key: String,
    base_url: String,
}

/// A `data:` frame is either a chunk or an in-band error
#[derive(Deserialize)]
#[serde(untagged)]
enum UpstreamFrame {
    Failure { error: Value },
    Chunk(ChatCompletionChunk),
}

impl OpenAiClient {
    /// Create a client against the default endpoint
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::new_custom(api_key, DEFAULT_GENERATION_BASE_URL)
    }

    /// Create with a custom base URL (for API-compatible services)
    pub fn new_custom(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        // No overall timeout: a generation lives as long as its stream.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self {
            client,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Parse one `data:` payload
fn parse_frame(data: &str) -> Result<ChatCompletionChunk> {
    match serde_json::from_str::<UpstreamFrame>(data) {
        Ok(UpstreamFrame::Chunk(chunk)) => Ok(chunk),
        // Some providers send `"error": null` on ordinary chunks.
        Ok(UpstreamFrame::Failure { error }) if error.is_null() => serde_json::from_str(data)
            .map_err(|e| GatewayError::MalformedFrame(format!("{}: {}", e, data))),
        Ok(UpstreamFrame::Failure { error }) => {
            let message = error
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| error.to_string());
            Err(GatewayError::Upstream(message))
        }
        Err(e) => Err(GatewayError::MalformedFrame(format!("{}: {}", e, data))),
    }
}

#[async_trait]
impl Generator for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn stream(&self, request: GenerationRequest) -> Result<GenerationStream> {
        debug!(
            "Opening generation stream (model={}, messages={})",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Accept", "text/event-stream")
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::UpstreamStatus {
                status: status.as_u16(),
                body,
            });
        }

        let mut bytes = response.bytes_stream();

        Ok(Box::pin(async_stream::stream! {
            let mut decoder = SseDecoder::new();
            let mut finished = false;

            loop {
                let (payloads, eof) = match bytes.next().await {
                    Some(Ok(chunk)) => (decoder.push(&chunk), false),
                    Some(Err(e)) => {
                        yield Err(GatewayError::Transport(e));
                        return;
                    }
                    None => (decoder.finish(), true),
                };

                for data in payloads {
                    if data.trim() == DONE_MARKER {
                        return;
                    }
                    match parse_frame(&data) {
                        Ok(chunk) => {
                            finished |= chunk.finish_reason().is_some();
                            yield Ok(chunk);
                        }
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }

                if eof {
                    // Providers that skip [DONE] still report a finish reason.
                    if !finished {
                        yield Err(GatewayError::UnexpectedEof);
                    }
                    return;
                }
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ChatMessage, SamplingParams};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn chunk_line(content: &str) -> String {
        format!(
            "data: {}\n\n",
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "created": 1,
                "model": "qwen",
                "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}]
            })
        )
    }

    fn request() -> GenerationRequest {
        GenerationRequest::new(
            vec![ChatMessage::user("Hello")],
            "qwen".to_string(),
            SamplingParams::default(),
        )
    }

    async fn collect(stream: GenerationStream) -> Vec<Result<ChatCompletionChunk>> {
        stream.collect().await
    }

    async fn server_with_body(body: String) -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_streams_chunks_until_done() {
        let server = MockServer::start().await;
        let body = format!("{}{}data: [DONE]\n\n", chunk_line("Hel"), chunk_line("lo"));
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", "Bearer key"))
            .and(body_partial_json(json!({"model": "qwen", "stream": true})))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiClient::new_custom("key", server.uri()).unwrap();
        let items = collect(client.stream(request()).await.unwrap()).await;

        let texts: Vec<String> = items.into_iter().map(|r| r.unwrap().delta_text()).collect();
        assert_eq!(texts, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_rate_limit_fails_before_stream() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiClient::new_custom("key", server.uri()).unwrap();
        let err = match client.stream(request()).await {
            Ok(_) => panic!("expected failure"),
            Err(e) => e,
        };
        assert!(err.is_rate_limited());
        assert!(err.to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn test_malformed_frame_terminates_with_error() {
        let body = format!("{}data: not-json\n\n{}", chunk_line("ok"), chunk_line("never"));
        let server = server_with_body(body).await;

        let client = OpenAiClient::new_custom("key", server.uri()).unwrap();
        let items = collect(client.stream(request()).await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap().delta_text(), "ok");
        assert!(matches!(items[1], Err(GatewayError::MalformedFrame(_))));
    }

    #[tokio::test]
    async fn test_in_band_error_frame() {
        let body = format!(
            "{}data: {}\n\n",
            chunk_line("a"),
            json!({"error": {"message": "model overloaded"}})
        );
        let server = server_with_body(body).await;

        let client = OpenAiClient::new_custom("key", server.uri()).unwrap();
        let items = collect(client.stream(request()).await.unwrap()).await;

        match &items[1] {
            Err(GatewayError::Upstream(message)) => assert_eq!(message, "model overloaded"),
            other => panic!("unexpected item: {:?}", other),
        }
    }

    #[test]
    fn test_null_error_field_is_a_chunk() {
        let data = json!({
            "id": "c",
            "choices": [{"index": 0, "delta": {"content": "hi"}, "finish_reason": null}],
            "error": null
        })
        .to_string();

        let chunk = parse_frame(&data).unwrap();
        assert_eq!(chunk.delta_text(), "hi");
    }

    #[test]
    fn test_error_string_frame() {
        match parse_frame(r#"{"error": "quota exceeded"}"#) {
            Err(GatewayError::Upstream(message)) => assert!(message.contains("quota exceeded")),
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eof_without_marker_is_an_error() {
        let server = server_with_body(chunk_line("partial")).await;

        let client = OpenAiClient::new_custom("key", server.uri()).unwrap();
        let items = collect(client.stream(request()).await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(GatewayError::UnexpectedEof)));
    }

    #[tokio::test]
    async fn test_eof_after_finish_reason_is_clean() {
        let finish = format!(
            "data: {}\n\n",
            json!({"id": "x", "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}]})
        );
        let server = server_with_body(format!("{}{}", chunk_line("done"), finish)).await;

        let client = OpenAiClient::new_custom("key", server.uri()).unwrap();
        let items = collect(client.stream(request()).await.unwrap()).await;

        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|r| r.is_ok()));
    }
}
