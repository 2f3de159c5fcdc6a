// src/tools/builder.rs
// Builder for OpenAI-compatible function tool schemas

use serde_json::{Value, json};

/// Builder for creating function tool schemas
pub struct ToolBuilder {
    name: String,
    description: String,
    properties: Vec<(String, Value)>,
    required: Vec<String>,
}

impl ToolBuilder {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            properties: Vec::new(),
            required: Vec::new(),
        }
    }

    /// Add a property to the tool
    pub fn property(mut self, name: impl Into<String>, schema: Value, required: bool) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.push((name, schema));
        self
    }

    /// Build the final tool schema (nested function object)
    pub fn build(self) -> Value {
        let mut properties_obj = serde_json::Map::new();
        for (name, schema) in self.properties {
            properties_obj.insert(name, schema);
        }

        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": {
                    "type": "object",
                    "properties": properties_obj,
                    "required": self.required
                }
            }
        })
    }
}

/// Common property schemas
pub mod properties {
    use serde_json::{Value, json};

    pub fn description(desc: &str) -> Value {
        json!({
            "type": "string",
            "description": desc
        })
    }

    pub fn integer(desc: &str, default: Option<i64>) -> Value {
        match default {
            Some(d) => json!({"type": "integer", "description": desc, "default": d}),
            None => json!({"type": "integer", "description": desc}),
        }
    }

    pub fn string_enum(desc: &str, values: &[&str]) -> Value {
        json!({
            "type": "string",
            "enum": values,
            "description": desc
        })
    }

    pub fn string_array(desc: &str) -> Value {
        json!({
            "type": "array",
            "items": {"type": "string"},
            "description": desc
        })
    }
}
