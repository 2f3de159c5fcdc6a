// tests/common/mod.rs
// Shared test fixtures: scripted LLM, mock collaborators, manual clock, and
// a runtime harness over a temp data dir.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream::BoxStream;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use tempfile::TempDir;

use vega_backend::config::{
    AgentConfig, HeartbeatConfig, LlmConfig, MemoryConfig, SchedulerConfig,
};
use vega_backend::llm::{
    ChatCompletion, ChatRequest, EstimateCounter, LlmClient, StreamDelta, TokenUsage,
};
use vega_backend::resilience::{CircuitBreakerPolicy, ResiliencePolicy, RetryPolicy};
use vega_backend::runtime::{Collaborators, Runtime};
use vega_backend::scheduler::Clock;
use vega_backend::tools::browser::BrowserClient;
use vega_backend::tools::search::{SearchAnswer, SearchClient};
use vega_backend::tools::social::{Mention, SocialClient};
use vega_backend::tools::wallet::WalletProvider;

// ---- Scripted LLM ----------------------------------------------------------

/// One scripted streaming turn.
#[derive(Clone)]
pub enum StreamTurn {
    Text(String),
    ToolCall { name: String, args: String },
}

pub struct ScriptedLlm {
    stream_script: Mutex<VecDeque<StreamTurn>>,
    chat_script: Mutex<VecDeque<String>>,
    pub stream_calls: AtomicUsize,
    pub chat_calls: AtomicUsize,
    /// While > 0, chat_stream fails and decrements (simulates provider
    /// outages; set high to outlast retries).
    pub stream_failures: AtomicUsize,
    /// System prompt of the most recent streaming request
    pub last_system_prompt: Mutex<Option<String>>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            stream_script: Mutex::new(VecDeque::new()),
            chat_script: Mutex::new(VecDeque::new()),
            stream_calls: AtomicUsize::new(0),
            chat_calls: AtomicUsize::new(0),
            stream_failures: AtomicUsize::new(0),
            last_system_prompt: Mutex::new(None),
        })
    }

    pub fn push_stream(&self, turn: StreamTurn) {
        self.stream_script.lock().push_back(turn);
    }

    pub fn push_chat(&self, content: &str) {
        self.chat_script.lock().push_back(content.to_string());
    }

    pub fn fail_next_streams(&self, count: usize) {
        self.stream_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    fn name(&self) -> &'static str {
        "scripted"
    }

    async fn chat(&self, _request: ChatRequest) -> anyhow::Result<ChatCompletion> {
        self.chat_calls.fetch_add(1, Ordering::SeqCst);
        let content = self
            .chat_script
            .lock()
            .pop_front()
            .unwrap_or_else(|| "ok".to_string());
        Ok(ChatCompletion {
            content,
            tool_calls: Vec::new(),
            usage: TokenUsage {
                input: 10,
                output: 5,
            },
        })
    }

    async fn chat_stream(
        &self,
        request: ChatRequest,
    ) -> anyhow::Result<BoxStream<'static, anyhow::Result<StreamDelta>>> {
        self.stream_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(system) = request
            .messages
            .first()
            .filter(|m| m.role == vega_backend::llm::Role::System)
        {
            *self.last_system_prompt.lock() = Some(system.text());
        }

        if self.stream_failures.load(Ordering::SeqCst) > 0 {
            self.stream_failures.fetch_sub(1, Ordering::SeqCst);
            anyhow::bail!("connection reset by provider");
        }

        let turn = self
            .stream_script
            .lock()
            .pop_front()
            .unwrap_or(StreamTurn::Text("ok".to_string()));

        let deltas: Vec<anyhow::Result<StreamDelta>> = match turn {
            StreamTurn::Text(text) => {
                // Split so tests exercise real accumulation.
                let mid = text.len() / 2;
                let mut split = mid;
                while !text.is_char_boundary(split) {
                    split -= 1;
                }
                vec![
                    Ok(StreamDelta::Content(text[..split].to_string())),
                    Ok(StreamDelta::Content(text[split..].to_string())),
                    Ok(StreamDelta::Usage(TokenUsage {
                        input: 20,
                        output: 10,
                    })),
                ]
            }
            StreamTurn::ToolCall { name, args } => {
                let mid = args.len() / 2;
                vec![
                    Ok(StreamDelta::ToolCall {
                        index: 0,
                        id: Some("call_1".to_string()),
                        name: Some(name),
                        arguments_fragment: Some(args[..mid].to_string()),
                    }),
                    Ok(StreamDelta::ToolCall {
                        index: 0,
                        id: None,
                        name: None,
                        arguments_fragment: Some(args[mid..].to_string()),
                    }),
                    Ok(StreamDelta::Usage(TokenUsage {
                        input: 20,
                        output: 10,
                    })),
                ]
            }
        };

        Ok(Box::pin(futures::stream::iter(deltas)))
    }
}

// ---- Mock collaborators ----------------------------------------------------

pub struct MockWallet {
    pub balance_calls: AtomicUsize,
}

impl MockWallet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            balance_calls: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl WalletProvider for MockWallet {
    fn address(&self) -> String {
        "0xabc123".to_string()
    }

    async fn balance(&self) -> anyhow::Result<String> {
        self.balance_calls.fetch_add(1, Ordering::SeqCst);
        Ok("2.0000 ETH".to_string())
    }
}

pub struct MockSearch {
    pub queries: Mutex<Vec<String>>,
}

impl MockSearch {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            queries: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SearchClient for MockSearch {
    async fn search(&self, query: &str, _max_results: usize) -> anyhow::Result<SearchAnswer> {
        self.queries.lock().push(query.to_string());
        Ok(SearchAnswer {
            summary: "ETH is trading at $4,210 today.".to_string(),
            sources: vec!["https://example.com/markets".to_string()],
        })
    }
}

pub struct MockSocial {
    pub posts: Mutex<Vec<String>>,
}

impl MockSocial {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            posts: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl SocialClient for MockSocial {
    async fn post(&self, text: &str) -> anyhow::Result<String> {
        self.posts.lock().push(text.to_string());
        Ok(format!("post-{}", self.posts.lock().len()))
    }

    async fn mentions(&self, _limit: usize) -> anyhow::Result<Vec<Mention>> {
        Ok(vec![Mention {
            author: "alice".to_string(),
            text: "nice work".to_string(),
        }])
    }
}

pub struct MockBrowser;

#[async_trait]
impl BrowserClient for MockBrowser {
    async fn fetch_page(&self, url: &str) -> anyhow::Result<String> {
        Ok(format!("page content of {}", url))
    }
}

// ---- Manual clock ----------------------------------------------------------

pub struct ManualClock {
    ms: AtomicI64,
}

impl ManualClock {
    pub fn new(start_ms: i64) -> Arc<Self> {
        Arc::new(Self {
            ms: AtomicI64::new(start_ms),
        })
    }

    pub fn advance(&self, delta_ms: i64) {
        self.ms.fetch_add(delta_ms, Ordering::SeqCst);
    }

    pub fn set(&self, ms: i64) {
        self.ms.store(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> i64 {
        self.ms.load(Ordering::SeqCst)
    }
}

// ---- Runtime harness -------------------------------------------------------

pub fn fast_policy() -> ResiliencePolicy {
    ResiliencePolicy {
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay_ms: 1,
            max_delay_ms: 5,
            jitter_ratio: 0.0,
        },
        circuit_breaker: CircuitBreakerPolicy {
            failure_threshold: 10,
            cooldown_ms: 1_000,
        },
    }
}

pub fn test_config(data_dir: std::path::PathBuf, context_window: usize) -> AgentConfig {
    AgentConfig {
        llm: LlmConfig {
            base_url: "http://unused.local".to_string(),
            api_key: "test-key".to_string(),
            model: "test-model".to_string(),
            temperature: 0.0,
            max_tokens: 512,
            context_window,
            compaction_token_threshold: context_window * 9 / 10,
        },
        memory: MemoryConfig {
            data_dir: data_dir.clone(),
            extract_every_n_turns: 1,
            max_recent_episodes: 3,
            summary_model: "test-model".to_string(),
        },
        scheduler: SchedulerConfig {
            tick_seconds: 1,
            reminders: Vec::new(),
            heartbeat: HeartbeatConfig::default(),
        },
        agent_resilience: fast_policy(),
        scheduler_resilience: fast_policy(),
        summarizer_resilience: fast_policy(),
        persona: "You are Vega.".to_string(),
        skills_dir: data_dir.join("skills"),
    }
}

pub struct TestHarness {
    pub runtime: Arc<Runtime>,
    pub llm: Arc<ScriptedLlm>,
    pub wallet: Arc<MockWallet>,
    pub search: Arc<MockSearch>,
    pub social: Arc<MockSocial>,
    pub clock: Arc<ManualClock>,
    pub dir: TempDir,
}

pub async fn harness() -> TestHarness {
    harness_with_window(1_000_000).await
}

pub async fn harness_with_window(context_window: usize) -> TestHarness {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path().to_path_buf(), context_window);

    let llm = ScriptedLlm::new();
    let wallet = MockWallet::new();
    let search = MockSearch::new();
    let social = MockSocial::new();
    let clock = ManualClock::new(0);

    let collaborators = Collaborators {
        wallet: wallet.clone(),
        search: search.clone(),
        social: social.clone(),
        browser: Arc::new(MockBrowser),
    };

    let runtime = Runtime::with_parts(
        config,
        llm.clone(),
        collaborators,
        clock.clone(),
        Arc::new(EstimateCounter),
    )
    .await
    .expect("runtime");

    TestHarness {
        runtime,
        llm,
        wallet,
        search,
        social,
        clock,
        dir,
    }
}
