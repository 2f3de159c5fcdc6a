// src/tools/memory_tools.rs
// Tool façade over the memory manager.

use serde_json::Value;
use std::sync::Arc;

use crate::memory::MemoryManager;

use super::{ToolBuilder, ToolSpec, properties};

pub fn memory_tools(memory: Arc<MemoryManager>) -> Vec<ToolSpec> {
    let write_schema = ToolBuilder::new(
        "write_memory_entry",
        "Append a durable note to long-term memory. Store 'semantic' holds facts and preferences; 'procedural' holds operating rules.",
    )
    .property(
        "store",
        properties::string_enum("Target store", &["semantic", "procedural"]),
        true,
    )
    .property("content", properties::description("The note to save"), true)
    .property(
        "section",
        properties::description(
            "Section heading, e.g. 'User Preferences', 'Known Facts', 'Operating Rules'",
        ),
        false,
    )
    .build();

    let goal_schema = ToolBuilder::new(
        "write_goal_entry",
        "Create or update a persistent goal, optionally with a progress note, status, and tags.",
    )
    .property("title", properties::description("Goal title"), true)
    .property("progress", properties::description("Progress note to append"), false)
    .property(
        "status",
        properties::string_enum(
            "New status",
            &["active", "completed", "paused", "cancelled"],
        ),
        false,
    )
    .property("tags", properties::string_array("Tags for the goal"), false)
    .build();

    let remember_schema = ToolBuilder::new(
        "remember_this",
        "Remember something the user said for future sessions. Saves a durable fact, logs it, and captures any goal it implies.",
    )
    .property("text", properties::description("What to remember"), true)
    .build();

    let for_write = memory.clone();
    let for_goal = memory.clone();
    let for_remember = memory;

    vec![
        ToolSpec::new(write_schema, move |args: Value| {
            let memory = for_write.clone();
            async move {
                let store = args
                    .get("store")
                    .and_then(|s| s.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'store'"))?;
                let content = args
                    .get("content")
                    .and_then(|c| c.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'content'"))?;
                let section = args.get("section").and_then(|s| s.as_str());
                Ok(memory.write_memory_entry(store, content, section).await)
            }
        }),
        ToolSpec::new(goal_schema, move |args: Value| {
            let memory = for_goal.clone();
            async move {
                let title = args
                    .get("title")
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'title'"))?;
                let progress = args.get("progress").and_then(|p| p.as_str());
                let status = args.get("status").and_then(|s| s.as_str());
                let tags: Vec<String> = args
                    .get("tags")
                    .and_then(|t| t.as_array())
                    .map(|arr| {
                        arr.iter()
                            .filter_map(|v| v.as_str())
                            .map(|s| s.to_string())
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(memory.write_goal_entry(title, progress, status, &tags).await)
            }
        }),
        ToolSpec::new(remember_schema, move |args: Value| {
            let memory = for_remember.clone();
            async move {
                let text = args
                    .get("text")
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'text'"))?;
                Ok(memory.remember_this(text).await)
            }
        }),
    ]
}
