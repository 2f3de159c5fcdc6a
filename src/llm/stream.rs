// src/llm/stream.rs
// Streaming delta types and the index-keyed tool-call accumulator.
// Tool-call fragments arrive interleaved; argument strings concatenate
// monotonically per index until the stream terminates.

use std::collections::BTreeMap;

use super::types::{TokenUsage, ToolCallInfo};

/// One delta chunk from a streaming chat completion.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A fragment of assistant text
    Content(String),
    /// A fragment of a tool call, keyed by its stream index
    ToolCall {
        index: usize,
        id: Option<String>,
        name: Option<String>,
        arguments_fragment: Option<String>,
    },
    /// Token usage, when the provider reports it at end of stream
    Usage(TokenUsage),
}

#[derive(Debug, Default, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
}

/// Accumulates stream deltas into the final assistant turn.
#[derive(Debug, Default)]
pub struct StreamAccumulator {
    content: String,
    tool_calls: BTreeMap<usize, PartialToolCall>,
    usage: TokenUsage,
}

impl StreamAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, delta: StreamDelta) {
        match delta {
            StreamDelta::Content(text) => self.content.push_str(&text),
            StreamDelta::ToolCall {
                index,
                id,
                name,
                arguments_fragment,
            } => {
                let slot = self.tool_calls.entry(index).or_default();
                if let Some(id) = id {
                    slot.id = id;
                }
                if let Some(name) = name {
                    slot.name.push_str(&name);
                }
                if let Some(fragment) = arguments_fragment {
                    slot.arguments.push_str(&fragment);
                }
            }
            StreamDelta::Usage(usage) => self.usage.add(usage),
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn usage(&self) -> TokenUsage {
        self.usage
    }

    /// Freeze into (content, tool calls in index order).
    pub fn finish(self) -> (String, Vec<ToolCallInfo>, TokenUsage) {
        let tool_calls = self
            .tool_calls
            .into_values()
            .filter(|c| !c.name.is_empty())
            .map(|c| ToolCallInfo {
                id: c.id,
                name: c.name,
                arguments: c.arguments,
            })
            .collect();
        (self.content, tool_calls, self.usage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_accumulates_in_order() {
        let mut acc = StreamAccumulator::new();
        acc.push(StreamDelta::Content("Hel".into()));
        acc.push(StreamDelta::Content("lo".into()));

        let (content, calls, _) = acc.finish();
        assert_eq!(content, "Hello");
        assert!(calls.is_empty());
    }

    #[test]
    fn test_interleaved_tool_call_fragments() {
        let mut acc = StreamAccumulator::new();
        acc.push(StreamDelta::ToolCall {
            index: 0,
            id: Some("call_a".into()),
            name: Some("wallet_balance".into()),
            arguments_fragment: Some("{\"ad".into()),
        });
        acc.push(StreamDelta::ToolCall {
            index: 1,
            id: Some("call_b".into()),
            name: Some("perplexity_search".into()),
            arguments_fragment: Some("{\"query\":".into()),
        });
        acc.push(StreamDelta::ToolCall {
            index: 0,
            id: None,
            name: None,
            arguments_fragment: Some("dress\":\"0xabc\"}".into()),
        });
        acc.push(StreamDelta::ToolCall {
            index: 1,
            id: None,
            name: None,
            arguments_fragment: Some("\"eth price\"}".into()),
        });

        let (_, calls, _) = acc.finish();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].id, "call_a");
        assert_eq!(calls[0].arguments, "{\"address\":\"0xabc\"}");
        assert_eq!(calls[1].name, "perplexity_search");
        assert_eq!(calls[1].arguments, "{\"query\":\"eth price\"}");
    }

    #[test]
    fn test_unnamed_calls_are_dropped_on_finish() {
        let mut acc = StreamAccumulator::new();
        acc.push(StreamDelta::ToolCall {
            index: 3,
            id: Some("call_x".into()),
            name: None,
            arguments_fragment: Some("{}".into()),
        });

        let (_, calls, _) = acc.finish();
        assert!(calls.is_empty());
    }
}
