// src/events/mod.rs
// Event bus for tool activity. Fire-and-forget broadcast; listeners never
// block the emitting handler.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::broadcast;
use tracing::debug;

const PREVIEW_LIMIT: usize = 1200;

/// Events pushed to front-end subscribers around every tool invocation.
/// Invariant: each invocation emits exactly one Start and one End.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ToolEvent {
    #[serde(rename = "tool:start")]
    Start {
        tool: String,
        args: Value,
        label: String,
        at: DateTime<Utc>,
    },
    #[serde(rename = "tool:end")]
    End {
        tool: String,
        duration_ms: u64,
        success: bool,
        output_preview: String,
        at: DateTime<Utc>,
    },
}

impl ToolEvent {
    pub fn start(tool: impl Into<String>, args: Value, label: impl Into<String>) -> Self {
        ToolEvent::Start {
            tool: tool.into(),
            args,
            label: label.into(),
            at: Utc::now(),
        }
    }

    pub fn end(tool: impl Into<String>, duration_ms: u64, output: &str) -> Self {
        ToolEvent::End {
            tool: tool.into(),
            duration_ms,
            success: !output.starts_with("Error"),
            output_preview: truncate_preview(output),
            at: Utc::now(),
        }
    }
}

fn truncate_preview(output: &str) -> String {
    if output.len() <= PREVIEW_LIMIT {
        return output.to_string();
    }
    let mut end = PREVIEW_LIMIT;
    while !output.is_char_boundary(end) {
        end -= 1;
    }
    output[..end].to_string()
}

#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<ToolEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(256);
        Self { tx }
    }

    /// Emit to all current subscribers. Dropped when nobody listens.
    pub fn emit(&self, event: ToolEvent) {
        if let ToolEvent::Start { tool, label, .. } = &event {
            debug!("[BUS] {} -> {}", tool, label);
        }
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ToolEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
