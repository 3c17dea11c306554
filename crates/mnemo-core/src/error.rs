//! Fatal-to-request errors for the gateway pipeline.

use thiserror::Error;

/// Errors that end a request. Memory failures never appear here: they are
/// degraded or logged at their call site.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Inbound request cannot be served as-is.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Upstream provider answered with a non-success status.
    #[error("upstream returned {status}: {body}")]
    UpstreamStatus { status: u16, body: String },
    /// Network fault talking to the upstream provider.
    #[error("upstream transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Upstream sent a frame that is not a valid chunk.
    #[error("malformed upstream frame: {0}")]
    MalformedFrame(String),
    /// Upstream reported an error inside the stream.
    #[error("upstream error: {0}")]
    Upstream(String),
    /// Upstream closed the stream without an end marker.
    #[error("upstream stream ended unexpectedly")]
    UnexpectedEof,
}

impl GatewayError {
    /// Whether the upstream rejected us for rate limiting
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GatewayError::UpstreamStatus { status: 429, .. })
    }

    /// Short machine-readable kind for error envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidRequest(_) => "invalid_request_error",
            GatewayError::UpstreamStatus { status: 429, .. } => "rate_limit_error",
            GatewayError::UpstreamStatus { .. } => "upstream_error",
            GatewayError::Transport(_) => "upstream_unavailable",
            GatewayError::MalformedFrame(_) => "upstream_protocol_error",
            GatewayError::Upstream(_) => "upstream_error",
            GatewayError::UnexpectedEof => "upstream_protocol_error",
        }
    }
}

/// Result alias used across the generation and pipeline modules.
pub type Result<T> = std::result::Result<T, GatewayError>;
