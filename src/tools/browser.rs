// src/tools/browser.rs
// Page-reading tool over a headless-browser collaborator. Bounded at 120s.

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;

use super::{ToolBuilder, ToolSpec, properties};

const BROWSE_TIMEOUT: Duration = Duration::from_secs(120);
const MAX_PAGE_CHARS: usize = 8000;

#[async_trait]
pub trait BrowserClient: Send + Sync {
    /// Rendered text content of a page
    async fn fetch_page(&self, url: &str) -> Result<String>;
}

/// Plain HTTP fetch with a crude tag strip. A real headless browser slots in
/// behind the same trait.
pub struct HttpBrowser {
    client: Client,
}

impl HttpBrowser {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
        }
    }
}

impl Default for HttpBrowser {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BrowserClient for HttpBrowser {
    async fn fetch_page(&self, url: &str) -> Result<String> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(anyhow!("url must start with http:// or https://"));
        }

        let body = self
            .client
            .get(url)
            .send()
            .await
            .context("page fetch failed")?
            .error_for_status()
            .context("page returned an error status")?
            .text()
            .await
            .context("page body was not readable text")?;

        Ok(strip_markup(&body))
    }
}

fn starts_with_ci(s: &str, prefix: &str) -> bool {
    s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
}

fn strip_markup(html: &str) -> String {
    let mut out = String::with_capacity(html.len() / 4);
    let mut in_tag = false;
    let mut skip_block = false;

    for (i, c) in html.char_indices() {
        if !in_tag && c == '<' {
            in_tag = true;
            let rest = &html[i..];
            if starts_with_ci(rest, "<script") || starts_with_ci(rest, "<style") {
                skip_block = true;
            } else if starts_with_ci(rest, "</script") || starts_with_ci(rest, "</style") {
                skip_block = false;
            }
            continue;
        }
        if in_tag {
            if c == '>' {
                in_tag = false;
            }
            continue;
        }
        if !skip_block {
            out.push(c);
        }
    }

    let collapsed = out
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    if collapsed.len() > MAX_PAGE_CHARS {
        let mut end = MAX_PAGE_CHARS;
        while !collapsed.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &collapsed[..end])
    } else {
        collapsed
    }
}

pub fn browser_tool(client: Arc<dyn BrowserClient>) -> ToolSpec {
    let schema = ToolBuilder::new(
        "browse_page",
        "Open a web page and return its readable text. Use for reading a specific URL the user gave or one found by search.",
    )
    .property("url", properties::description("Full http(s) URL to open"), true)
    .build();

    ToolSpec::new(schema, move |args: serde_json::Value| {
        let client = client.clone();
        async move {
            let url = args
                .get("url")
                .and_then(|u| u.as_str())
                .ok_or_else(|| anyhow!("missing 'url'"))?
                .to_string();

            // Slow or hung pages are bounded; the agent loop keeps going.
            match tokio::time::timeout(BROWSE_TIMEOUT, client.fetch_page(&url)).await {
                Ok(result) => result,
                Err(_) => Err(anyhow!(
                    "gave up on {} after {}s",
                    url,
                    BROWSE_TIMEOUT.as_secs()
                )),
            }
        }
    })
}
