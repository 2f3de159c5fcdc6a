// src/tools/social.rs
// Social-network tools over an HTTP API collaborator.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{Value, json};
use std::sync::Arc;

use super::{ToolBuilder, ToolSpec, properties};

#[derive(Debug, Clone)]
pub struct Mention {
    pub author: String,
    pub text: String,
}

#[async_trait]
pub trait SocialClient: Send + Sync {
    /// Publish a post; returns its id or URL
    async fn post(&self, text: &str) -> Result<String>;
    /// Recent mentions of the agent's account
    async fn mentions(&self, limit: usize) -> Result<Vec<Mention>>;
}

pub struct HttpSocialClient {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpSocialClient {
    pub fn new(base_url: String, token: String) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        }
    }
}

#[async_trait]
impl SocialClient for HttpSocialClient {
    async fn post(&self, text: &str) -> Result<String> {
        let response: Value = self
            .client
            .post(format!("{}/posts", self.base_url))
            .bearer_auth(&self.token)
            .json(&json!({"text": text}))
            .send()
            .await
            .context("social API post failed")?
            .error_for_status()
            .context("social API rejected the post")?
            .json()
            .await
            .context("social API returned invalid JSON")?;

        response
            .get("id")
            .and_then(|i| i.as_str())
            .map(|s| s.to_string())
            .ok_or_else(|| anyhow!("social API response missing post id"))
    }

    async fn mentions(&self, limit: usize) -> Result<Vec<Mention>> {
        let response: Value = self
            .client
            .get(format!("{}/mentions?limit={}", self.base_url, limit))
            .bearer_auth(&self.token)
            .send()
            .await
            .context("social API mentions failed")?
            .error_for_status()
            .context("social API refused mentions")?
            .json()
            .await
            .context("social API returned invalid JSON")?;

        let mentions = response
            .get("mentions")
            .and_then(|m| m.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|m| {
                        Some(Mention {
                            author: m.get("author")?.as_str()?.to_string(),
                            text: m.get("text")?.as_str()?.to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(mentions)
    }
}

pub fn social_tools(client: Arc<dyn SocialClient>) -> Vec<ToolSpec> {
    let post_schema = ToolBuilder::new(
        "social_post",
        "Publish a post to the agent's social account. Use when asked to post, tweet, or announce something.",
    )
    .property("text", properties::description("Post body"), true)
    .build();

    let mentions_schema = ToolBuilder::new(
        "social_mentions",
        "Fetch recent mentions of the agent's social account. Use when asked who mentioned, replied, or what people are saying.",
    )
    .property(
        "limit",
        properties::integer("How many mentions to fetch (max 20)", Some(5)),
        false,
    )
    .build();

    let for_post = client.clone();
    let for_mentions = client;

    vec![
        ToolSpec::new(post_schema, move |args: Value| {
            let client = for_post.clone();
            async move {
                let text = args
                    .get("text")
                    .and_then(|t| t.as_str())
                    .ok_or_else(|| anyhow!("missing 'text'"))?;
                let id = client.post(text).await?;
                Ok(format!("Posted: {}", id))
            }
        }),
        ToolSpec::new(mentions_schema, move |args: Value| {
            let client = for_mentions.clone();
            async move {
                let limit = args
                    .get("limit")
                    .and_then(|l| l.as_u64())
                    .unwrap_or(5)
                    .min(20) as usize;
                let mentions = client.mentions(limit).await?;
                if mentions.is_empty() {
                    return Ok("No recent mentions.".to_string());
                }
                let lines: Vec<String> = mentions
                    .iter()
                    .map(|m| format!("@{}: {}", m.author, m.text))
                    .collect();
                Ok(lines.join("\n"))
            }
        }),
    ]
}
