// src/llm/openai.rs
// OpenAI-compatible chat-completions client with SSE streaming.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use super::stream::StreamDelta;
use super::types::{
    ChatCompletion, ChatMessage, ChatRequest, MessageContent, Role, TokenUsage, ToolCallInfo,
};
use super::LlmClient;

#[derive(Clone)]
pub struct OpenAiClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn role_str(role: Role) -> &'static str {
        match role {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }

    fn message_to_wire(msg: &ChatMessage) -> Value {
        let content = match &msg.content {
            MessageContent::Text(t) => Value::String(t.clone()),
            MessageContent::Parts(_) => {
                serde_json::to_value(&msg.content).unwrap_or(Value::Null)
            }
        };

        let mut wire = json!({
            "role": Self::role_str(msg.role),
            "content": content,
        });

        if let Some(call_id) = &msg.tool_call_id {
            wire["tool_call_id"] = Value::String(call_id.clone());
        }
        if let Some(calls) = &msg.tool_calls {
            wire["tool_calls"] = Value::Array(
                calls
                    .iter()
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {"name": c.name, "arguments": c.arguments},
                        })
                    })
                    .collect(),
            );
        }
        wire
    }

    fn request_body(&self, request: &ChatRequest, stream: bool) -> Value {
        let messages: Vec<Value> = request.messages.iter().map(Self::message_to_wire).collect();

        let mut body = json!({
            "model": request.model,
            "messages": messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
        });
        if !request.tools.is_empty() {
            body["tools"] = Value::Array(request.tools.clone());
            body["tool_choice"] = Value::String("auto".to_string());
        }
        if stream {
            body["stream"] = Value::Bool(true);
            body["stream_options"] = json!({"include_usage": true});
        }
        body
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .context("LLM API request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!("LLM API error {}: {}", status, error_text));
        }
        Ok(response)
    }

    fn parse_delta_line(data: &str) -> Vec<StreamDelta> {
        let json: Value = match serde_json::from_str(data) {
            Ok(v) => v,
            Err(_) => return Vec::new(),
        };

        let mut deltas = Vec::new();

        if let Some(usage) = json.get("usage").filter(|u| !u.is_null()) {
            deltas.push(StreamDelta::Usage(TokenUsage {
                input: usage["prompt_tokens"].as_i64().unwrap_or(0),
                output: usage["completion_tokens"].as_i64().unwrap_or(0),
            }));
        }

        let Some(delta) = json.pointer("/choices/0/delta") else {
            return deltas;
        };

        if let Some(content) = delta.get("content").and_then(|c| c.as_str()) {
            if !content.is_empty() {
                deltas.push(StreamDelta::Content(content.to_string()));
            }
        }

        if let Some(calls) = delta.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                let index = call.get("index").and_then(|i| i.as_u64()).unwrap_or(0) as usize;
                let id = call
                    .get("id")
                    .and_then(|i| i.as_str())
                    .map(|s| s.to_string());
                let function = call.get("function");
                let name = function
                    .and_then(|f| f.get("name"))
                    .and_then(|n| n.as_str())
                    .map(|s| s.to_string());
                let arguments_fragment = function
                    .and_then(|f| f.get("arguments"))
                    .and_then(|a| a.as_str())
                    .map(|s| s.to_string());

                deltas.push(StreamDelta::ToolCall {
                    index,
                    id,
                    name,
                    arguments_fragment,
                });
            }
        }

        deltas
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    fn name(&self) -> &'static str {
        "openai-compatible"
    }

    async fn chat(&self, request: ChatRequest) -> Result<ChatCompletion> {
        debug!(
            "LLM chat: {} messages, {} tools, model {}",
            request.messages.len(),
            request.tools.len(),
            request.model
        );

        let body = self.request_body(&request, false);
        let response_json: Value = self
            .post(&body)
            .await?
            .json()
            .await
            .context("Failed to parse LLM response")?;

        let message = response_json
            .pointer("/choices/0/message")
            .ok_or_else(|| anyhow!("No message in LLM response"))?;

        let content = message
            .get("content")
            .and_then(|c| c.as_str())
            .unwrap_or("")
            .to_string();

        let mut tool_calls = Vec::new();
        if let Some(calls) = message.get("tool_calls").and_then(|t| t.as_array()) {
            for call in calls {
                let id = call
                    .get("id")
                    .and_then(|i| i.as_str())
                    .unwrap_or("")
                    .to_string();
                let function = call
                    .get("function")
                    .ok_or_else(|| anyhow!("Missing function in tool call"))?;
                let name = function
                    .get("name")
                    .and_then(|n| n.as_str())
                    .ok_or_else(|| anyhow!("Missing function name"))?
                    .to_string();
                let arguments = function
                    .get("arguments")
                    .and_then(|a| a.as_str())
                    .unwrap_or("{}")
                    .to_string();
                tool_calls.push(ToolCallInfo {
                    id,
                    name,
                    arguments,
                });
            }
        }

        let usage = response_json.get("usage");
        let usage = TokenUsage {
            input: usage
                .and_then(|u| u.get("prompt_tokens"))
                .and_then(|t| t.as_i64())
                .unwrap_or(0),
            output: usage
                .and_then(|u| u.get("completion_tokens"))
                .and_then(|t| t.as_i64())
                .unwrap_or(0),
        };

        Ok(ChatCompletion {
            content,
            tool_calls,
            usage,
        })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> Result<BoxStream<'static, Result<StreamDelta>>> {
        debug!(
            "LLM stream: {} messages, {} tools, model {}",
            request.messages.len(),
            request.tools.len(),
            request.model
        );

        let body = self.request_body(&request, true);
        let response = self.post(&body).await?;
        let mut byte_stream = response.bytes_stream();

        let stream = async_stream::try_stream! {
            // SSE lines can split across chunk boundaries; buffer the tail.
            let mut pending = String::new();

            'read: while let Some(chunk) = byte_stream.next().await {
                let bytes = chunk.context("LLM stream read failed")?;
                match std::str::from_utf8(&bytes) {
                    Ok(text) => pending.push_str(text),
                    Err(e) => {
                        warn!("Dropping non-UTF8 stream chunk: {}", e);
                        continue;
                    }
                }

                while let Some(newline) = pending.find('\n') {
                    let line: String = pending.drain(..=newline).collect();
                    let line = line.trim();
                    if line.is_empty() || line.starts_with(':') {
                        continue;
                    }
                    let Some(data) = line.strip_prefix("data: ") else {
                        continue;
                    };
                    if data == "[DONE]" {
                        break 'read;
                    }
                    for delta in OpenAiClient::parse_delta_line(data) {
                        yield delta;
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let deltas = OpenAiClient::parse_delta_line(
            r#"{"choices":[{"delta":{"content":"Hi"}}]}"#,
        );
        assert_eq!(deltas.len(), 1);
        assert!(matches!(&deltas[0], StreamDelta::Content(t) if t == "Hi"));
    }

    #[test]
    fn test_parse_tool_call_delta_fragments() {
        let deltas = OpenAiClient::parse_delta_line(
            r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_1","function":{"name":"wallet_balance","arguments":"{\""}}]}}]}"#,
        );
        assert_eq!(deltas.len(), 1);
        match &deltas[0] {
            StreamDelta::ToolCall {
                index,
                id,
                name,
                arguments_fragment,
            } => {
                assert_eq!(*index, 0);
                assert_eq!(id.as_deref(), Some("call_1"));
                assert_eq!(name.as_deref(), Some("wallet_balance"));
                assert_eq!(arguments_fragment.as_deref(), Some("{\""));
            }
            other => panic!("unexpected delta: {:?}", other),
        }
    }

    #[test]
    fn test_parse_usage_chunk() {
        let deltas = OpenAiClient::parse_delta_line(
            r#"{"choices":[],"usage":{"prompt_tokens":120,"completion_tokens":30}}"#,
        );
        assert_eq!(deltas.len(), 1);
        assert!(
            matches!(deltas[0], StreamDelta::Usage(u) if u.input == 120 && u.output == 30)
        );
    }

    #[test]
    fn test_malformed_line_yields_nothing() {
        assert!(OpenAiClient::parse_delta_line("not json").is_empty());
    }
}
