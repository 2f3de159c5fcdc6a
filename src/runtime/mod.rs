// src/runtime/mod.rs
// Constructed runtime root. Everything the subsystems used to reach for as a
// global lives here and is passed by reference: queue, bus, memory,
// scheduler, tool registry, agent loop.

use anyhow::{Result, anyhow};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::OnceLock;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::agent::{AgentLoop, AgentOptions, TokenCallback};
use crate::config::{AgentConfig, HeartbeatConfig};
use crate::events::{EventBus, ToolEvent};
use crate::llm::{ChatMessage, EstimateCounter, LlmClient, OpenAiClient, TokenCounter};
use crate::memory::{MemoryHealth, MemoryManager};
use crate::queue::{Lane, LaneCounters, LaneQueue, TaskReply, TaskResult, TaskStatus};
use crate::scheduler::{Clock, ReminderRunner, Scheduler, SchedulerHealth, SystemClock};
use crate::skills::SkillCatalogue;
use crate::tools::{
    ToolRegistry, browser, memory_tools, scheduler_tools, search, social, time, wallet,
};

/// Session history ring bound. Persisted memory, not this ring, carries
/// anything durable.
const SESSION_RING_CAP: usize = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentStatus {
    Idle,
    Thinking,
    Streaming,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusProbe {
    pub agent: AgentProbe,
    pub queue: HashMap<Lane, LaneCounters>,
    pub heartbeat: HeartbeatConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct AgentProbe {
    pub status: AgentStatus,
    pub model: String,
    pub context_window: usize,
}

/// External collaborator clients, injectable for tests.
pub struct Collaborators {
    pub wallet: Arc<dyn wallet::WalletProvider>,
    pub search: Arc<dyn search::SearchClient>,
    pub social: Arc<dyn social::SocialClient>,
    pub browser: Arc<dyn browser::BrowserClient>,
}

impl Collaborators {
    /// Default wiring from the environment.
    pub fn from_env() -> Self {
        let rpc_url = std::env::var("WALLET_RPC_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8545".to_string());
        let address = std::env::var("WALLET_ADDRESS").unwrap_or_default();
        let search_url = std::env::var("SEARCH_BASE_URL")
            .unwrap_or_else(|_| "https://api.perplexity.ai".to_string());
        let search_key = std::env::var("SEARCH_API_KEY").unwrap_or_default();
        let social_url = std::env::var("SOCIAL_API_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8800".to_string());
        let social_token = std::env::var("SOCIAL_API_TOKEN").unwrap_or_default();

        Self {
            wallet: Arc::new(wallet::JsonRpcWallet::new(rpc_url, address)),
            search: Arc::new(search::PerplexityClient::new(search_url, search_key)),
            social: Arc::new(social::HttpSocialClient::new(social_url, social_token)),
            browser: Arc::new(browser::HttpBrowser::new()),
        }
    }
}

pub struct Runtime {
    config: Arc<AgentConfig>,
    queue: Arc<LaneQueue>,
    bus: EventBus,
    memory: Arc<MemoryManager>,
    scheduler: Arc<Scheduler>,
    agent: Arc<AgentLoop>,

    session: Mutex<VecDeque<ChatMessage>>,
    session_path: PathBuf,
    status: Arc<Mutex<AgentStatus>>,
}

impl Runtime {
    /// Build the full runtime with default collaborators and the system
    /// clock. Fails only on construction-time problems (the missing-LLM-key
    /// failure already happened in `AgentConfig::from_env`).
    pub async fn new(config: AgentConfig) -> Result<Arc<Self>> {
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiClient::new(
            config.llm.base_url.clone(),
            config.llm.api_key.clone(),
        ));
        Self::with_parts(
            config,
            llm,
            Collaborators::from_env(),
            Arc::new(SystemClock),
            Arc::new(EstimateCounter),
        )
        .await
    }

    /// Fully injectable constructor (tests swap the LLM, collaborators, and
    /// clock).
    pub async fn with_parts(
        config: AgentConfig,
        llm: Arc<dyn LlmClient>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
        counter: Arc<dyn TokenCounter>,
    ) -> Result<Arc<Self>> {
        let config = Arc::new(config);
        let bus = EventBus::new();
        let queue = LaneQueue::new();

        let memory = Arc::new(MemoryManager::new(
            config.memory.clone(),
            llm.clone(),
            config.summarizer_resilience.clone(),
        ));

        let skills = Arc::new(SkillCatalogue::load(&config.skills_dir).await);

        // The scheduler's runner reaches the agent loop through a slot that
        // is filled after the registry (which needs the scheduler) exists.
        let agent_slot: Arc<OnceLock<Arc<AgentLoop>>> = Arc::new(OnceLock::new());
        let runner: ReminderRunner = {
            let agent_slot = agent_slot.clone();
            let queue = queue.clone();
            Arc::new(move |prompt: String, lane: Lane| {
                let agent_slot = agent_slot.clone();
                let queue = queue.clone();
                Box::pin(async move {
                    let agent = agent_slot
                        .get()
                        .cloned()
                        .ok_or_else(|| anyhow!("agent loop not wired yet"))?;
                    let receiver = queue.submit(lane, async move {
                        let outcome = agent
                            .run_agent(&prompt, Vec::new(), None, AgentOptions::default())
                            .await?;
                        Ok(TaskReply {
                            reply: outcome.reply,
                            history: outcome.history,
                        })
                    });
                    let result = receiver
                        .await
                        .map_err(|_| anyhow!("lane task dropped before completion"))?;
                    match result.status {
                        TaskStatus::Completed => Ok(TaskReply {
                            reply: result.reply,
                            history: result.history,
                        }),
                        TaskStatus::Failed => Err(anyhow!(
                            result.error.unwrap_or_else(|| "task failed".to_string())
                        )),
                    }
                })
            })
        };

        let scheduler = Scheduler::new(
            config.scheduler.clone(),
            config.memory.data_dir.join("scheduler/state.json"),
            config.scheduler_resilience.clone(),
            runner,
            clock,
        )
        .await;

        // Capability table: immutable once built.
        let mut builder = ToolRegistry::builder().register(time::datetime_tool());
        for spec in wallet::wallet_tools(collaborators.wallet.clone()) {
            builder = builder.register(spec);
        }
        builder = builder.register(search::search_tool(collaborators.search.clone()));
        for spec in social::social_tools(collaborators.social.clone()) {
            builder = builder.register(spec);
        }
        builder = builder.register(browser::browser_tool(collaborators.browser.clone()));
        for spec in scheduler_tools::scheduler_tools(scheduler.clone()) {
            builder = builder.register(spec);
        }
        for spec in memory_tools::memory_tools(memory.clone()) {
            builder = builder.register(spec);
        }
        let registry = builder.build(bus.clone());
        info!("Tool registry ready: {} tools", registry.names().len());

        let agent = Arc::new(AgentLoop::new(
            llm,
            config.agent_resilience.clone(),
            registry,
            memory.clone(),
            skills,
            counter,
            config.llm.clone(),
            config.persona.clone(),
        ));
        agent_slot
            .set(agent.clone())
            .map_err(|_| anyhow!("agent slot filled twice"))?;

        let session_path = config.memory.data_dir.join("session/history.json");
        let runtime = Arc::new(Self {
            config,
            queue,
            bus,
            memory,
            scheduler,
            agent,
            session: Mutex::new(VecDeque::new()),
            session_path,
            status: Arc::new(Mutex::new(AgentStatus::Idle)),
        });
        runtime.load_session().await;

        Ok(runtime)
    }

    pub fn start_scheduler(self: &Arc<Self>) {
        self.scheduler.start();
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn memory(&self) -> &Arc<MemoryManager> {
        &self.memory
    }

    pub fn agent(&self) -> &Arc<AgentLoop> {
        &self.agent
    }

    /// Submit a user turn with explicit history. The returned result is
    /// always a value; failures surface as `status: Failed`.
    pub async fn submit_task(
        self: &Arc<Self>,
        user_message: &str,
        history: Vec<ChatMessage>,
        lane: Lane,
        on_token: Option<TokenCallback>,
    ) -> TaskResult {
        let agent = self.agent.clone();
        let status = self.status.clone();
        let message = user_message.to_string();

        *status.lock() = AgentStatus::Thinking;
        let streaming_status = status.clone();
        let wrapped_token: Option<TokenCallback> = Some(Arc::new(move |token: &str| {
            *streaming_status.lock() = AgentStatus::Streaming;
            if let Some(inner) = &on_token {
                inner(token);
            }
        }));

        let receiver = self.queue.submit(lane, async move {
            let outcome = agent
                .run_agent(&message, history, wrapped_token, AgentOptions::default())
                .await?;
            Ok(TaskReply {
                reply: outcome.reply,
                history: outcome.history,
            })
        });

        let result = match receiver.await {
            Ok(result) => result,
            Err(_) => {
                warn!("lane task dropped before completion");
                TaskResult {
                    id: uuid::Uuid::new_v4().to_string(),
                    lane,
                    reply: String::new(),
                    history: Vec::new(),
                    status: TaskStatus::Failed,
                    error: Some("task dropped".to_string()),
                    started_at: chrono::Utc::now(),
                    completed_at: chrono::Utc::now(),
                }
            }
        };
        *status.lock() = AgentStatus::Idle;
        result
    }

    /// Conversation-ring variant: uses and updates the runtime's own bounded
    /// session history, persisting the sanitized form.
    pub async fn chat(self: &Arc<Self>, user_message: &str, on_token: Option<TokenCallback>) -> TaskResult {
        let history: Vec<ChatMessage> = self.session.lock().iter().cloned().collect();
        let result = self
            .submit_task(user_message, history, Lane::Fast, on_token)
            .await;

        if result.status == TaskStatus::Completed {
            {
                let mut session = self.session.lock();
                session.clear();
                session.extend(result.history.iter().cloned());
                while session.len() > SESSION_RING_CAP {
                    session.pop_front();
                }
            }
            self.save_session().await;
        }
        result
    }

    pub async fn status(&self) -> StatusProbe {
        StatusProbe {
            agent: AgentProbe {
                status: *self.status.lock(),
                model: self.agent.model().to_string(),
                context_window: self.agent.context_window(),
            },
            queue: self.queue.all_counters(),
            heartbeat: self.scheduler.heartbeat().await,
        }
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ToolEvent> {
        self.bus.subscribe()
    }

    pub async fn scheduler_health(&self) -> SchedulerHealth {
        self.scheduler.health_metrics().await
    }

    pub async fn memory_health(&self) -> MemoryHealth {
        self.memory.health().await
    }

    // ---- Session persistence ----------------------------------------------

    async fn save_session(&self) {
        let sanitized: Vec<ChatMessage> =
            self.session.lock().iter().map(|m| m.sanitized()).collect();
        match serde_json::to_string_pretty(&sanitized) {
            Ok(json) => {
                if let Err(e) = crate::utils::atomic_write(&self.session_path, &json).await {
                    warn!("Failed to persist session history: {}", e);
                }
            }
            Err(e) => warn!("Failed to serialize session history: {}", e),
        }
    }

    async fn load_session(&self) {
        let Ok(content) = tokio::fs::read_to_string(&self.session_path).await else {
            return;
        };
        match serde_json::from_str::<Vec<ChatMessage>>(&content) {
            Ok(messages) => {
                let mut session = self.session.lock();
                session.extend(messages);
                while session.len() > SESSION_RING_CAP {
                    session.pop_front();
                }
            }
            Err(e) => warn!("Session history unreadable ({}), starting fresh", e),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.config
    }

    pub async fn shutdown(&self) {
        self.scheduler.stop();
        self.save_session().await;
        info!("Runtime shut down");
    }
}
