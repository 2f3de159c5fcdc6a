// src/llm/mod.rs
// LLM provider seam: message types, chat-completions client trait,
// streaming deltas.

pub mod openai;
pub mod stream;
pub mod tokens;
mod types;

pub use openai::OpenAiClient;
pub use stream::{StreamAccumulator, StreamDelta};
pub use tokens::{CounterMode, EstimateCounter, TokenCounter};
pub use types::{
    ChatCompletion, ChatMessage, ChatRequest, ContentPart, MessageContent, Role, TokenUsage,
    ToolCallInfo,
};

use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Chat-completions provider interface. The runtime consumes exactly this:
/// one non-streaming call (planner, summarizer, guard rewrites) and one
/// streaming call (the agent turn loop).
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Provider name for logging
    fn name(&self) -> &'static str;

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion>;

    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>>;
}
