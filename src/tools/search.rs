// src/tools/search.rs
// Realtime web search over a Perplexity-style API collaborator.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::debug;

use super::{ToolBuilder, ToolSpec, properties};

#[derive(Debug, Clone)]
pub struct SearchAnswer {
    pub summary: String,
    pub sources: Vec<String>,
}

impl SearchAnswer {
    pub fn render(&self, max_sources: usize) -> String {
        let mut out = self.summary.clone();
        if !self.sources.is_empty() {
            out.push_str("\n\nSources:\n");
            for source in self.sources.iter().take(max_sources) {
                out.push_str(&format!("- {}\n", source));
            }
        }
        out
    }
}

#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchAnswer>;
}

/// Perplexity-compatible search-augmented chat endpoint
pub struct PerplexityClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl PerplexityClient {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model: "sonar".to_string(),
        }
    }
}

#[async_trait]
impl SearchClient for PerplexityClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<SearchAnswer> {
        debug!("Realtime search: {}", query);

        let body = json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": "Answer concisely with current, verifiable facts."},
                {"role": "user", "content": query}
            ],
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .context("search API request failed")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("search API error {}: {}", status, text));
        }

        let response_json: Value = response
            .json()
            .await
            .context("search API returned invalid JSON")?;

        let summary = response_json
            .pointer("/choices/0/message/content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| anyhow!("search API response missing content"))?
            .to_string();

        let sources = response_json
            .get("citations")
            .and_then(|c| c.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .take(max_results)
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        Ok(SearchAnswer { summary, sources })
    }
}

pub fn search_tool(client: Arc<dyn SearchClient>) -> ToolSpec {
    let schema = ToolBuilder::new(
        "perplexity_search",
        "Search the live web for current facts: prices, news, weather, scores, releases. Use whenever the answer depends on anything that may have changed recently.",
    )
    .property("query", properties::description("What to search for"), true)
    .property(
        "max_results",
        properties::integer("How many sources to cite (max 10)", Some(5)),
        false,
    )
    .build();

    ToolSpec::new(schema, move |args: Value| {
        let client = client.clone();
        async move {
            let query = args
                .get("query")
                .and_then(|q| q.as_str())
                .ok_or_else(|| anyhow!("missing 'query'"))?
                .to_string();
            let max_results = args
                .get("max_results")
                .and_then(|m| m.as_u64())
                .unwrap_or(5)
                .min(10) as usize;

            let answer = client.search(&query, max_results).await?;
            Ok(answer.render(max_results))
        }
    })
}
