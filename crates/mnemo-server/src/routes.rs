//! ============================================================================
//! HTTP Surface - OpenAI-compatible chat completions over SSE
//! ============================================================================
//! POST /chat/completions        streaming (default) or aggregated completion
//! POST /v1/chat/completions     same handler
//! GET  /health                  liveness plus the active memory backend
//! ============================================================================

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    routing::{get, post},
    Json, Router,
};
use futures_util::StreamExt;
use mnemo_core::{ChatCompletionRequest, GatewayError, Pipeline, StreamEvent};
use serde::Serialize;
use serde_json::json;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
}

impl AppState {
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline: Arc::new(pipeline),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/chat/completions", post(chat_completions))
        .route("/v1/chat/completions", post(chat_completions))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    timestamp: f64,
    memory_backend: &'static str,
}

async fn health(State(state): State<AppState>) -> Json<Health> {
    let now = chrono::Utc::now();
    Json(Health {
        status: "healthy",
        timestamp: now.timestamp_micros() as f64 / 1_000_000.0,
        memory_backend: state.pipeline.memory().backend_name(),
    })
}

// POST /chat/completions
async fn chat_completions(
    State(state): State<AppState>,
    payload: Result<Json<ChatCompletionRequest>, JsonRejection>,
) -> Result<Response, ApiError> {
    let Json(request) =
        payload.map_err(|e| GatewayError::InvalidRequest(e.body_text()))?;

    if !request.wants_stream() {
        let completion = state.pipeline.complete(request).await?;
        return Ok(Json(completion).into_response());
    }

    let events = state.pipeline.run(request).await?;
    let stream = events.map(|event| Ok::<_, Infallible>(sse_event(event)));
    Ok(Sse::new(stream).into_response())
}

/// Encode one pipeline event as an SSE frame
fn sse_event(event: StreamEvent) -> Event {
    match event {
        StreamEvent::Delta(chunk) => Event::default().json_data(&chunk).unwrap_or_else(|e| {
            warn!("Failed to encode chunk {}: {}", chunk.id, e);
            error_event(&format!("failed to encode chunk: {}", e))
        }),
        StreamEvent::Done => Event::default().data("[DONE]"),
        StreamEvent::Error(message) => error_event(&message),
    }
}

fn error_event(message: &str) -> Event {
    let body = json!({
        "error": {
            "message": message,
            "type": "upstream_error",
        }
    });
    Event::default().event("error").data(body.to_string())
}

/// OpenAI-style error response for failures before streaming starts
pub struct ApiError(GatewayError);

impl From<GatewayError> for ApiError {
    fn from(err: GatewayError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match &self.0 {
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            e if e.is_rate_limited() => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = json!({
            "error": {
                "message": self.0.to_string(),
                "type": self.0.kind(),
                "code": status.as_u16(),
            }
        });
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request};
    use mnemo_core::{
        ChatCompletionChunk, ChatMessage, ChunkChoice, ChunkDelta, GenerationRequest,
        GenerationStream, Generator, MemoryGateway, MemoryService, PipelineConfig,
    };
    use serde_json::Value;
    use tower::ServiceExt;

    enum Script {
        Reply(Vec<&'static str>),
        FailAfter(Vec<&'static str>),
        Refuse(u16),
    }

    struct FakeGenerator(Script);

    fn chunk(text: &str) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: "chatcmpl-1".to_string(),
            object: "chat.completion.chunk".to_string(),
            created: 7,
            model: "qwen".to_string(),
            choices: vec![ChunkChoice {
                index: 0,
                delta: ChunkDelta {
                    role: None,
                    content: Some(text.to_string()),
                },
                finish_reason: None,
            }],
            ..Default::default()
        }
    }

    #[async_trait]
    impl Generator for FakeGenerator {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn stream(&self, _request: GenerationRequest) -> mnemo_core::Result<GenerationStream> {
            let (texts, fail) = match &self.0 {
                Script::Reply(texts) => (texts.clone(), false),
                Script::FailAfter(texts) => (texts.clone(), true),
                Script::Refuse(status) => {
                    return Err(GatewayError::UpstreamStatus {
                        status: *status,
                        body: "refused".to_string(),
                    })
                }
            };
            let mut items: Vec<mnemo_core::Result<ChatCompletionChunk>> =
                texts.into_iter().map(|t| Ok(chunk(t))).collect();
            if fail {
                items.push(Err(GatewayError::Upstream("connection reset".to_string())));
            }
            Ok(Box::pin(futures_util::stream::iter(items)))
        }
    }

    struct NullMemory;

    #[async_trait]
    impl MemoryGateway for NullMemory {
        fn name(&self) -> &'static str {
            "null"
        }

        async fn search(&self, _q: &str, _id: &str, _limit: usize) -> anyhow::Result<Vec<String>> {
            Ok(vec![])
        }

        async fn add(&self, _turns: &[ChatMessage], _id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn app(script: Script) -> Router {
        let pipeline = Pipeline::new(
            Arc::new(FakeGenerator(script)),
            MemoryService::new(Arc::new(NullMemory)),
            PipelineConfig::default(),
        );
        router(AppState::new(pipeline))
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn hello() -> Value {
        json!({"messages": [{"role": "user", "content": "Hello"}]})
    }

    #[tokio::test]
    async fn test_health() {
        let response = app(Script::Reply(vec![]))
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["memory_backend"], "null");
        assert!(body["timestamp"].as_f64().unwrap() > 0.0);
    }

    #[tokio::test]
    async fn test_streams_chunks_then_done() {
        let response = app(Script::Reply(vec!["Hi", " there"]))
            .oneshot(post_json("/chat/completions", hello()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/event-stream"
        );

        let text = body_text(response).await;
        let data: Vec<&str> = text
            .lines()
            .filter_map(|l| l.strip_prefix("data: "))
            .collect();
        assert_eq!(data.len(), 3);

        let first: Value = serde_json::from_str(data[0]).unwrap();
        assert_eq!(first["object"], "chat.completion.chunk");
        assert_eq!(first["choices"][0]["delta"]["content"], "Hi");
        assert_eq!(data[2], "[DONE]");
    }

    #[tokio::test]
    async fn test_mid_stream_failure_ends_with_error_event() {
        let response = app(Script::FailAfter(vec!["a", "b"]))
            .oneshot(post_json("/v1/chat/completions", hello()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let text = body_text(response).await;
        assert!(text.contains("event: error"));
        assert!(text.contains("connection reset"));
        assert!(!text.contains("[DONE]"));
        assert_eq!(text.matches("chat.completion.chunk").count(), 2);
    }

    #[tokio::test]
    async fn test_empty_messages_is_bad_request() {
        let response = app(Script::Reply(vec!["x"]))
            .oneshot(post_json("/chat/completions", json!({"messages": []})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["error"]["type"], "invalid_request_error");
        assert_eq!(body["error"]["code"], 400);
    }

    #[tokio::test]
    async fn test_unknown_role_is_bad_request() {
        let response = app(Script::Reply(vec!["x"]))
            .oneshot(post_json(
                "/chat/completions",
                json!({"messages": [{"role": "wizard", "content": "hi"}]}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upstream_rejection_status() {
        let response = app(Script::Refuse(429))
            .oneshot(post_json("/chat/completions", hello()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);

        let response = app(Script::Refuse(500))
            .oneshot(post_json("/chat/completions", hello()))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_non_streaming_completion() {
        let response = app(Script::Reply(vec!["Hel", "lo"]))
            .oneshot(post_json(
                "/chat/completions",
                json!({"messages": [{"role": "user", "content": "Hi"}], "stream": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body: Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(body["object"], "chat.completion");
        assert_eq!(body["choices"][0]["message"]["role"], "assistant");
        assert_eq!(body["choices"][0]["message"]["content"], "Hello");
    }

    #[tokio::test]
    async fn test_non_streaming_mid_stream_failure() {
        let response = app(Script::FailAfter(vec!["partial"]))
            .oneshot(post_json(
                "/chat/completions",
                json!({"messages": [{"role": "user", "content": "Hi"}], "stream": false}),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
