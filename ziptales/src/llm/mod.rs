use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Core trait for generative-language providers
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Generate completion for a given prompt
    async fn generate(&self, request: LlmRequest) -> Result<LlmResponse>;

    /// Model identifier recorded alongside persisted analyses
    fn model(&self) -> &str;
}

/// Request structure for LLM generation
#[derive(Debug, Clone)]
pub struct LlmRequest {
    pub prompt: String,
    pub max_tokens: Option<usize>,
    pub temperature: Option<f32>,
    pub timeout_seconds: Option<u64>,
}

/// Response from LLM generation
#[derive(Debug, Clone)]
pub struct LlmResponse {
    pub content: String,
    pub usage: UsageMetadata,
    pub model: String,
}

/// Token usage metadata
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UsageMetadata {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

pub mod remote;

const DEFAULT_REMOTE_MODEL: &str = "gpt-4o-mini";

/// Build the provider named by `[llm]`. Returns `None` (heuristic-only
/// scoring) when the adapter is not "remote" or its settings are incomplete.
pub fn provider_from_config(cfg: Option<&common::LlmConfig>) -> Option<Arc<dyn LlmProvider>> {
    let llm_config = cfg?;
    match llm_config.adapter.as_deref() {
        Some("remote") => {}
        other => {
            info!("LLM adapter '{}': credibility scoring stays local", other.unwrap_or("none"));
            return None;
        }
    }

    let Some(remote_cfg) = llm_config.remote.as_ref() else {
        warn!("llm.adapter = \"remote\" but no [llm.remote] section");
        return None;
    };
    let (Some(api_url), Some(api_key_env)) = (&remote_cfg.api_url, &remote_cfg.api_key_env) else {
        warn!("LLM remote config: missing api_url or api_key_env");
        return None;
    };
    let Ok(api_key) = std::env::var(api_key_env) else {
        warn!("LLM configured but API key env var '{}' not set", api_key_env);
        return None;
    };

    let model = remote_cfg
        .model
        .clone()
        .unwrap_or_else(|| DEFAULT_REMOTE_MODEL.to_string());
    let provider = remote::RemoteLlmProvider::new(api_url, api_key, &model).with_defaults(
        remote_cfg.timeout_seconds.unwrap_or(30),
        remote_cfg.max_tokens.unwrap_or(500),
        0.0,
    );
    info!("LLM provider initialized: remote ({}) at {}", model, api_url);
    Some(Arc::new(provider) as Arc<dyn LlmProvider>)
}

/// Returns the first run of ASCII digits in `text`, with a leading '-' kept.
///
/// Models tend to wrap the number in prose ("Score: 72/100"), so only the
/// first integer counts.
pub fn extract_first_integer(text: &str) -> Option<i64> {
    let bytes = text.as_bytes();
    let start = bytes.iter().position(|b| b.is_ascii_digit())?;
    let end = bytes[start..]
        .iter()
        .position(|b| !b.is_ascii_digit())
        .map(|len| start + len)
        .unwrap_or(bytes.len());

    let negative = start > 0 && bytes[start - 1] == b'-';
    let digits = &text[start..end];
    // Overlong digit runs are not a score
    let value: i64 = digits.parse().ok()?;
    Some(if negative { -value } else { value })
}
