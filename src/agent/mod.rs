// src/agent/mod.rs
// The agent turn loop: compaction check, deterministic routing, skill and
// plan assembly, streaming tool loop, integrity guards, epilogue.

pub mod guards;
pub mod planner;
pub mod prompt;
pub mod router;

use anyhow::{Result, anyhow};
use futures_util::StreamExt;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::LlmConfig;
use crate::llm::{
    ChatMessage, ChatRequest, CounterMode, LlmClient, StreamAccumulator, StreamDelta,
    TokenCounter, TokenUsage, ToolCallInfo,
};
use crate::memory::MemoryManager;
use crate::memory::text::first_sentence;
use crate::resilience::{ResiliencePolicy, ResilientExecutor};
use crate::skills::SkillCatalogue;
use crate::tools::ToolRegistry;

use guards::GuardContext;
use planner::PlanningMode;

/// Tool-call rounds per turn before the loop bails out.
const MAX_TOOL_ROUNDS: usize = 10;
/// History kept after a compaction.
const POST_COMPACTION_HISTORY: usize = 10;
/// Action-promise override retries.
const MAX_PROMISE_RETRIES: usize = 2;

pub type TokenCallback = Arc<dyn Fn(&str) + Send + Sync>;

#[derive(Debug, Clone, Copy, Default)]
pub struct AgentOptions {
    pub planning_mode: PlanningMode,
}

#[derive(Debug, Clone, Serialize)]
pub struct TokenReport {
    pub input: i64,
    pub output: i64,
    /// Estimated context size at the top of the turn
    pub context_tokens: usize,
    pub counter_mode: &'static str,
    pub compacted: bool,
}

#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub reply: String,
    pub history: Vec<ChatMessage>,
    pub usage: TokenReport,
}

pub struct AgentLoop {
    llm: Arc<dyn LlmClient>,
    executor: ResilientExecutor,
    registry: Arc<ToolRegistry>,
    memory: Arc<MemoryManager>,
    skills: Arc<SkillCatalogue>,
    counter: Arc<dyn TokenCounter>,
    llm_config: LlmConfig,
    persona: String,
}

impl AgentLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        llm: Arc<dyn LlmClient>,
        policy: ResiliencePolicy,
        registry: Arc<ToolRegistry>,
        memory: Arc<MemoryManager>,
        skills: Arc<SkillCatalogue>,
        counter: Arc<dyn TokenCounter>,
        llm_config: LlmConfig,
        persona: String,
    ) -> Self {
        Self {
            llm,
            executor: ResilientExecutor::new(policy),
            registry,
            memory,
            skills,
            counter,
            llm_config,
            persona,
        }
    }

    pub fn executor(&self) -> &ResilientExecutor {
        &self.executor
    }

    /// One full turn: user message in, final reply and updated history out.
    /// The only error that escapes is an executor-final LLM failure.
    pub async fn run_agent(
        &self,
        user_message: &str,
        mut history: Vec<ChatMessage>,
        on_token: Option<TokenCallback>,
        options: AgentOptions,
    ) -> Result<AgentOutcome> {
        // Step 1: compaction check
        let history_json = serde_json::to_string(&history).unwrap_or_default();
        let context_tokens = self.counter.count(&self.persona)
            + self.counter.count(&history_json)
            + self.counter.count(user_message);
        let mut compacted = false;

        if context_tokens >= self.llm_config.compaction_token_threshold {
            info!(
                "[AGENT] context at {} tokens ({}), compacting",
                context_tokens,
                self.counter.mode().as_str()
            );
            self.memory.flush_before_compaction(&history).await;
            if history.len() > POST_COMPACTION_HISTORY {
                history = history.split_off(history.len() - POST_COMPACTION_HISTORY);
            }
            compacted = true;
        }

        // Step 2: deterministic router — no LLM for unambiguous tool intents
        if let Some(route) = router::route(user_message) {
            debug!("[AGENT] deterministic route -> {}", route.tool);
            let reply = self.registry.dispatch(&route.tool, route.args).await;

            history.push(ChatMessage::user(user_message));
            history.push(ChatMessage::assistant(reply.clone()));
            self.epilogue(user_message, &reply, vec![route.tool]).await;

            return Ok(AgentOutcome {
                reply,
                history,
                usage: TokenReport {
                    input: 0,
                    output: 0,
                    context_tokens,
                    counter_mode: self.counter.mode().as_str(),
                    compacted,
                },
            });
        }

        // Step 3: skill + plan assembly
        let active_skill = self.skills.select(user_message);
        if let Some(skill) = active_skill {
            debug!("[AGENT] active skill: {}", skill.id);
        }
        let plan = if planner::wants_plan(options.planning_mode, user_message) {
            planner::generate_plan(
                &self.llm,
                &self.executor,
                &self.llm_config.model,
                user_message,
            )
            .await
        } else {
            None
        };

        // Step 4: system prompt
        let memory_context = self.memory.bootstrap_context().await;
        let system_prompt = prompt::build_system_prompt(&prompt::PromptParts {
            persona: &self.persona,
            memory_context: &memory_context,
            skills: &self.skills,
            active_skill,
            plan: plan.as_ref(),
            user_text: user_message,
        });

        // Step 5: streaming tool loop
        let mut messages = Vec::with_capacity(history.len() + 2);
        messages.push(ChatMessage::system(system_prompt));
        messages.extend(history.iter().cloned());
        messages.push(ChatMessage::user(user_message));

        let mut tools_used: Vec<String> = Vec::new();
        let mut guard_fired: Vec<String> = Vec::new();
        let mut total_usage = TokenUsage::default();
        let mut promise_retries = 0;
        let mut rounds = 0;

        let final_reply = loop {
            rounds += 1;
            let (content, tool_calls, usage) =
                self.stream_turn(&messages, on_token.clone()).await?;
            total_usage.add(usage);

            if !tool_calls.is_empty() && rounds < MAX_TOOL_ROUNDS {
                messages.push(ChatMessage::assistant_with_tool_calls(
                    content,
                    tool_calls.clone(),
                ));
                for call in tool_calls {
                    let output = self.registry.dispatch_raw(&call.name, &call.arguments).await;
                    tools_used.push(call.name.clone());
                    messages.push(ChatMessage::tool_result(call.id, output));
                }
                continue;
            }
            if rounds >= MAX_TOOL_ROUNDS {
                warn!("[AGENT] tool round limit reached, forcing final reply");
            }

            // Step 6: integrity guards, in order: wallet, realtime rewrite,
            // claims, action-promise retry, plan footer.
            let ctx = GuardContext {
                user_text: user_message,
                tools_used: &tools_used,
                registry: &self.registry,
                llm: &self.llm,
                executor: &self.executor,
                model: &self.llm_config.model,
            };

            let mut reply = guards::wallet_guard(&ctx, content, &mut guard_fired).await;
            reply = guards::realtime_guard(&ctx, reply, &mut guard_fired).await;
            reply = guards::claim_guards(&ctx, reply, &mut guard_fired).await;

            if guards::promises_without_action(&ctx, &guard_fired, &reply)
                && promise_retries < MAX_PROMISE_RETRIES
            {
                promise_retries += 1;
                info!("[AGENT] promise without action, overriding (retry {})", promise_retries);
                messages.push(ChatMessage::assistant(reply));
                messages.push(ChatMessage::user(guards::PROMISE_OVERRIDE));
                continue;
            }

            if let Some(plan) = &plan {
                let activity: Vec<String> =
                    tools_used.iter().chain(guard_fired.iter()).cloned().collect();
                reply = guards::plan_footer(plan, &reply, &activity.join(", "));
            }
            break reply;
        };

        // Step 7: epilogue
        tools_used.extend(guard_fired);
        history.push(ChatMessage::user(user_message));
        history.push(ChatMessage::assistant(final_reply.clone()));
        self.epilogue(user_message, &final_reply, tools_used).await;

        Ok(AgentOutcome {
            reply: final_reply,
            history,
            usage: TokenReport {
                input: total_usage.input,
                output: total_usage.output,
                context_tokens,
                counter_mode: self.counter.mode().as_str(),
                compacted,
            },
        })
    }

    /// One streaming completion, accumulated to (content, tool_calls, usage).
    /// Wrapped in the resilient executor; the final error after retries or a
    /// circuit fast-fail is what callers see as "LLM unavailable".
    async fn stream_turn(
        &self,
        messages: &[ChatMessage],
        on_token: Option<TokenCallback>,
    ) -> Result<(String, Vec<ToolCallInfo>, TokenUsage)> {
        let request = ChatRequest::new(self.llm_config.model.clone(), messages.to_vec())
            .with_tools(self.registry.schemas())
            .with_sampling(self.llm_config.temperature, self.llm_config.max_tokens);
        let llm = self.llm.clone();

        self.executor
            .execute("agent:chat_completion_stream", move || {
                let llm = llm.clone();
                let request = request.clone();
                let on_token = on_token.clone();
                async move {
                    let mut stream = llm.chat_stream(request).await?;
                    let mut acc = StreamAccumulator::new();
                    while let Some(delta) = stream.next().await {
                        let delta = delta?;
                        if let StreamDelta::Content(text) = &delta {
                            if let Some(callback) = &on_token {
                                callback(text);
                            }
                        }
                        acc.push(delta);
                    }
                    Ok(acc.finish())
                }
            })
            .await
            .map_err(|e| anyhow!("LLM unavailable: {}", e))
    }

    /// Turn epilogue: episodic log line now, deterministic extraction in the
    /// background. Extraction failures never reach the caller.
    async fn epilogue(&self, user_message: &str, reply: &str, tools_used: Vec<String>) {
        let summary = format!(
            "Turn: {} -> {}",
            first_sentence(user_message, 80).replace('|', "/"),
            first_sentence(reply, 100).replace('|', "/")
        );
        self.memory.log_episode(&summary).await;

        let memory = self.memory.clone();
        let user = user_message.to_string();
        let reply = reply.to_string();
        tokio::spawn(async move {
            memory.process_turn(&user, &reply, &tools_used).await;
        });
    }

    pub fn counter_mode(&self) -> CounterMode {
        self.counter.mode()
    }

    pub fn model(&self) -> &str {
        &self.llm_config.model
    }

    pub fn context_window(&self) -> usize {
        self.llm_config.context_window
    }
}
