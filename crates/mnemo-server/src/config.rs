//! Gateway configuration loaded from the environment.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, Result};
use mnemo_core::generation::{DEFAULT_GENERATION_BASE_URL, DEFAULT_MODEL};
use mnemo_core::memory::{
    DEFAULT_EMBEDDING_BASE_URL, DEFAULT_MEM0_BASE_URL, DEFAULT_SEARCH_LIMIT,
    DEFAULT_SEARCH_THRESHOLD, DEFAULT_SEARCH_TIMEOUT,
};
use mnemo_core::summarizer::{DEFAULT_MAX_TURN_CHARS, DEFAULT_SUMMARY_TURNS};
use mnemo_core::{PipelineConfig, SamplingParams, TurnSummarizer};
use tracing::warn;

/// Which long-term memory service backs the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryBackend {
    Mem0,
    Qdrant,
    Disabled,
}

impl FromStr for MemoryBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mem0" => Ok(MemoryBackend::Mem0),
            "qdrant" => Ok(MemoryBackend::Qdrant),
            "disabled" | "none" | "off" => Ok(MemoryBackend::Disabled),
            other => Err(anyhow!(
                "Unknown MEMORY_BACKEND '{}'. Valid values: mem0, qdrant, disabled",
                other
            )),
        }
    }
}

impl fmt::Display for MemoryBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MemoryBackend::Mem0 => "mem0",
            MemoryBackend::Qdrant => "qdrant",
            MemoryBackend::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,

    pub generation_base_url: String,
    pub generation_api_key: Option<String>,
    pub generation_model: String,
    pub sampling: SamplingParams,

    pub memory_backend: MemoryBackend,
    pub mem0_api_key: Option<String>,
    pub mem0_base_url: String,
    pub search_threshold: f32,
    pub qdrant_url: String,
    pub embedding_api_key: Option<String>,
    pub embedding_base_url: String,

    pub search_timeout: Duration,
    pub search_limit: usize,
    pub summary_turns: usize,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_qdrant_url() -> String {
    "http://localhost:6334".to_string()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            generation_base_url: DEFAULT_GENERATION_BASE_URL.to_string(),
            generation_api_key: None,
            generation_model: DEFAULT_MODEL.to_string(),
            sampling: SamplingParams::default(),
            memory_backend: MemoryBackend::Disabled,
            mem0_api_key: None,
            mem0_base_url: DEFAULT_MEM0_BASE_URL.to_string(),
            search_threshold: DEFAULT_SEARCH_THRESHOLD,
            qdrant_url: default_qdrant_url(),
            embedding_api_key: None,
            embedding_base_url: DEFAULT_EMBEDDING_BASE_URL.to_string(),
            search_timeout: DEFAULT_SEARCH_TIMEOUT,
            search_limit: DEFAULT_SEARCH_LIMIT,
            summary_turns: DEFAULT_SUMMARY_TURNS,
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from any key lookup; blank values count as unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let mem0_api_key = get("MEM0_API_KEY");
        let memory_backend = match get("MEMORY_BACKEND") {
            Some(value) => value.parse()?,
            None if mem0_api_key.is_some() => MemoryBackend::Mem0,
            None => MemoryBackend::Disabled,
        };

        let sampling = SamplingParams {
            temperature: parse_or(&get, "DEFAULT_TEMPERATURE", defaults.sampling.temperature),
            top_p: parse_or(&get, "DEFAULT_TOP_P", defaults.sampling.top_p),
            max_tokens: parse_or(&get, "DEFAULT_MAX_TOKENS", defaults.sampling.max_tokens),
        };

        let search_timeout_ms = parse_or(
            &get,
            "MEMORY_SEARCH_TIMEOUT_MS",
            defaults.search_timeout.as_millis() as u64,
        );

        Ok(Self {
            host: get("MNEMO_HOST").unwrap_or(defaults.host),
            port: parse_or(&get, "MNEMO_PORT", defaults.port),
            generation_base_url: get("GENERATION_BASE_URL").unwrap_or(defaults.generation_base_url),
            generation_api_key: get("GENERATION_API_KEY").or_else(|| get("CEREBRAS_API_KEY")),
            generation_model: get("GENERATION_MODEL").unwrap_or(defaults.generation_model),
            sampling,
            memory_backend,
            mem0_api_key,
            mem0_base_url: get("MEM0_BASE_URL").unwrap_or(defaults.mem0_base_url),
            search_threshold: parse_or(&get, "MEMORY_SEARCH_THRESHOLD", defaults.search_threshold),
            qdrant_url: get("QDRANT_URL").unwrap_or(defaults.qdrant_url),
            embedding_api_key: get("EMBEDDING_API_KEY").or_else(|| get("OPENAI_API_KEY")),
            embedding_base_url: get("EMBEDDING_BASE_URL").unwrap_or(defaults.embedding_base_url),
            search_timeout: Duration::from_millis(search_timeout_ms),
            search_limit: parse_or(&get, "MEMORY_SEARCH_LIMIT", defaults.search_limit),
            summary_turns: parse_or(&get, "SUMMARY_TURNS", defaults.summary_turns),
        })
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            default_model: self.generation_model.clone(),
            sampling: self.sampling,
            summarizer: TurnSummarizer::new(self.summary_turns, DEFAULT_MAX_TURN_CHARS),
        }
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Parse a value, falling back to the default (with a warning) when malformed
fn parse_or<T, G>(get: &G, key: &str, default: T) -> T
where
    T: FromStr,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("Ignoring invalid {}='{}', using default", key, raw);
            default
        }),
        None => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<GatewayConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8000");
        assert_eq!(config.generation_model, DEFAULT_MODEL);
        assert_eq!(config.memory_backend, MemoryBackend::Disabled);
        assert_eq!(config.search_timeout, Duration::from_millis(500));
        assert_eq!(config.search_limit, 10);
        assert_eq!(config.summary_turns, 4);
        assert_eq!(config.sampling, SamplingParams::default());
        assert!(config.generation_api_key.is_none());
    }

    #[test]
    fn test_mem0_key_selects_backend() {
        let config = config_from(&[("MEM0_API_KEY", "m0-key")]).unwrap();
        assert_eq!(config.memory_backend, MemoryBackend::Mem0);

        let config =
            config_from(&[("MEM0_API_KEY", "m0-key"), ("MEMORY_BACKEND", "disabled")]).unwrap();
        assert_eq!(config.memory_backend, MemoryBackend::Disabled);
    }

    #[test]
    fn test_key_fallbacks() {
        let config = config_from(&[
            ("CEREBRAS_API_KEY", "cb"),
            ("OPENAI_API_KEY", "oa"),
            ("MEMORY_BACKEND", "Qdrant"),
        ])
        .unwrap();
        assert_eq!(config.generation_api_key.as_deref(), Some("cb"));
        assert_eq!(config.embedding_api_key.as_deref(), Some("oa"));
        assert_eq!(config.memory_backend, MemoryBackend::Qdrant);

        let config =
            config_from(&[("GENERATION_API_KEY", "gen"), ("CEREBRAS_API_KEY", "cb")]).unwrap();
        assert_eq!(config.generation_api_key.as_deref(), Some("gen"));
    }

    #[test]
    fn test_overrides_and_bad_numbers() {
        let config = config_from(&[
            ("MNEMO_PORT", "9100"),
            ("MEMORY_SEARCH_TIMEOUT_MS", "250"),
            ("DEFAULT_TEMPERATURE", "0.3"),
            ("DEFAULT_MAX_TOKENS", "lots"),
            ("SUMMARY_TURNS", "6"),
        ])
        .unwrap();
        assert_eq!(config.port, 9100);
        assert_eq!(config.search_timeout, Duration::from_millis(250));
        assert_eq!(config.sampling.temperature, 0.3);
        assert_eq!(config.sampling.max_tokens, 250);
        assert_eq!(config.pipeline_config().summarizer.max_turns(), 6);
    }

    #[test]
    fn test_unknown_backend_rejected() {
        let err = config_from(&[("MEMORY_BACKEND", "redis")]).unwrap_err();
        assert!(err.to_string().contains("redis"));
    }
}
