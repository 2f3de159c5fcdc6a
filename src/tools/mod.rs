// src/tools/mod.rs
// Tool registry: named handlers with JSON schemas, dispatched by the agent
// loop. Immutable once built. Every invocation emits one tool:start and one
// tool:end on the bus.

pub mod browser;
pub mod builder;
pub mod labels;
pub mod memory_tools;
pub mod scheduler_tools;
pub mod search;
pub mod social;
pub mod time;
pub mod wallet;

pub use builder::{ToolBuilder, properties};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, warn};

use crate::events::{EventBus, ToolEvent};

/// A tool handler takes parsed JSON arguments and returns a string. Handlers
/// report their own failures as `Err`; the registry renders those as
/// `Error executing <tool>: <msg>` strings so the agent loop never throws.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, args: Value) -> anyhow::Result<String>;
}

/// Blanket impl so simple closures can register as handlers.
pub struct FnHandler<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(Value) -> Fut + Send + Sync,
    Fut: std::future::Future<Output = anyhow::Result<String>> + Send,
{
    async fn call(&self, args: Value) -> anyhow::Result<String> {
        (self.0)(args).await
    }
}

pub struct ToolSpec {
    pub name: String,
    /// Full function-calling schema: {"type":"function","function":{...}}
    pub schema: Value,
    pub handler: Arc<dyn ToolHandler>,
}

impl ToolSpec {
    /// Build a spec from a schema and a handler closure. The name comes from
    /// the schema's `function.name`.
    pub fn new<F, Fut>(schema: Value, handler: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        let name = schema
            .pointer("/function/name")
            .and_then(|n| n.as_str())
            .unwrap_or_default()
            .to_string();
        Self {
            name,
            schema,
            handler: Arc::new(FnHandler(handler)),
        }
    }
}

/// Immutable post-startup capability table.
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolSpec>,
    bus: EventBus,
}

pub struct ToolRegistryBuilder {
    tools: BTreeMap<String, ToolSpec>,
}

impl ToolRegistryBuilder {
    pub fn register(mut self, spec: ToolSpec) -> Self {
        debug_assert!(!spec.name.is_empty(), "tool schema missing function.name");
        self.tools.insert(spec.name.clone(), spec);
        self
    }

    pub fn build(self, bus: EventBus) -> Arc<ToolRegistry> {
        Arc::new(ToolRegistry {
            tools: self.tools,
            bus,
        })
    }
}

impl ToolRegistry {
    pub fn builder() -> ToolRegistryBuilder {
        ToolRegistryBuilder {
            tools: BTreeMap::new(),
        }
    }

    /// Function-calling schemas for the LLM request.
    pub fn schemas(&self) -> Vec<Value> {
        self.tools.values().map(|t| t.schema.clone()).collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Execute a tool from a raw argument string (as streamed from the
    /// model). Never fails: every outcome is a string.
    pub async fn dispatch_raw(&self, name: &str, raw_args: &str) -> String {
        let args: Value = if raw_args.trim().is_empty() {
            Value::Object(Default::default())
        } else {
            match serde_json::from_str(raw_args) {
                Ok(v) => v,
                Err(e) => {
                    warn!("[TOOLS] {}: argument parse failed: {}", name, e);
                    return format!("Error executing {}: {}", name, e);
                }
            }
        };
        self.dispatch(name, args).await
    }

    /// Execute a tool with parsed arguments, emitting start/end events.
    pub async fn dispatch(&self, name: &str, args: Value) -> String {
        let Some(spec) = self.tools.get(name) else {
            return format!("Unknown tool: {}", name);
        };

        let label = labels::label_for(name, &args);
        self.bus.emit(ToolEvent::start(name, args.clone(), label));

        let started = Instant::now();
        let output = match spec.handler.call(args).await {
            Ok(output) => output,
            Err(e) => {
                warn!("[TOOLS] {} failed: {}", name, e);
                format!("Error executing {}: {}", name, e)
            }
        };
        let duration_ms = started.elapsed().as_millis() as u64;
        debug!("[TOOLS] {} finished in {}ms", name, duration_ms);

        self.bus.emit(ToolEvent::end(name, duration_ms, &output));
        output
    }
}
