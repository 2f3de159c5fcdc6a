// src/config/llm.rs
// LLM provider configuration

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::{env_parse, env_string};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat-completions endpoint base URL (OpenAI-compatible)
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Model context window, in tokens
    pub context_window: usize,
    /// Compaction triggers when the estimated context reaches this count.
    /// Defaults to 90% of the context window.
    pub compaction_token_threshold: usize,
}

impl LlmConfig {
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY")
            .map_err(|_| anyhow::anyhow!("LLM_API_KEY is required but not set"))?;
        if api_key.trim().is_empty() {
            return Err(anyhow::anyhow!("LLM_API_KEY is set but empty"));
        }

        let context_window = env_parse("LLM_CONTEXT_WINDOW", 128_000usize);
        let default_threshold = context_window * 9 / 10;

        Ok(Self {
            base_url: env_string("LLM_BASE_URL", "https://api.openai.com/v1"),
            api_key,
            model: env_string("LLM_MODEL", "gpt-4o"),
            temperature: env_parse("LLM_TEMPERATURE", 0.7f32),
            max_tokens: env_parse("LLM_MAX_TOKENS", 4096u32),
            context_window,
            compaction_token_threshold: env_parse(
                "LLM_COMPACTION_TOKEN_THRESHOLD",
                default_threshold,
            ),
        })
    }
}
