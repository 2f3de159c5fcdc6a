// src/config/memory.rs
// Memory manager configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::env_parse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryConfig {
    /// Root directory for all persisted stores (semantic/, procedural/,
    /// episodic/, goals/, scheduler state, session history)
    pub data_dir: PathBuf,
    /// Write an episodic turn summary every N turns
    pub extract_every_n_turns: usize,
    /// How many recent episodic files feed the bootstrap context
    pub max_recent_episodes: usize,
    /// Model used for session summaries during compaction
    pub summary_model: String,
}

impl MemoryConfig {
    pub fn from_env() -> Self {
        let default_dir = dirs::data_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("vega");

        Self {
            data_dir: std::env::var("VEGA_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or(default_dir),
            extract_every_n_turns: env_parse("MEMORY_EXTRACT_EVERY_N_TURNS", 3usize).max(1),
            max_recent_episodes: env_parse("MEMORY_MAX_RECENT_EPISODES", 3usize),
            summary_model: std::env::var("MEMORY_SUMMARY_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
        }
    }
}
