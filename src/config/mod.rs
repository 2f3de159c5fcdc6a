// src/config/mod.rs
// Central configuration for the Vega runtime. Built once in main and passed
// by Arc; there is no ambient config singleton.

pub mod llm;
pub mod memory;
pub mod scheduler;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::resilience::ResiliencePolicy;

pub use llm::LlmConfig;
pub use memory::MemoryConfig;
pub use scheduler::{HeartbeatConfig, ReminderConfig, SchedulerConfig};

/// Main configuration structure - composes all domain configs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    pub llm: LlmConfig,
    pub memory: MemoryConfig,
    pub scheduler: SchedulerConfig,

    /// Retry/circuit policy for agent-loop LLM calls
    pub agent_resilience: ResiliencePolicy,
    /// Retry/circuit policy for scheduler-triggered runs
    pub scheduler_resilience: ResiliencePolicy,
    /// Retry/circuit policy for the memory summarizer
    pub summarizer_resilience: ResiliencePolicy,

    /// Base persona injected at the top of every system prompt
    pub persona: String,

    /// Directory holding skill markdown files
    pub skills_dir: std::path::PathBuf,
}

impl AgentConfig {
    /// Load configuration from the environment (.env honored when present).
    /// Fails when the required LLM API key is absent.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let llm = LlmConfig::from_env()?;
        let memory = MemoryConfig::from_env();
        let scheduler = SchedulerConfig::from_env();

        let data_dir = memory.data_dir.clone();

        Ok(Self {
            llm,
            memory,
            scheduler,
            agent_resilience: ResiliencePolicy::from_env("AGENT"),
            scheduler_resilience: ResiliencePolicy::from_env("SCHEDULER"),
            summarizer_resilience: ResiliencePolicy::from_env("SUMMARIZER"),
            persona: env_string(
                "AGENT_PERSONA",
                "You are Vega, an autonomous operations agent. You are precise, \
                 grounded, and you use tools for anything you cannot verify yourself.",
            ),
            skills_dir: std::env::var("SKILLS_DIR")
                .map(Into::into)
                .unwrap_or_else(|_| data_dir.join("skills")),
        })
    }
}

pub(crate) fn env_string(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

pub(crate) fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
