// src/agent/planner.rs
// Execution planning. A separate LLM call returns strict JSON; anything that
// fails to parse or violates the bounds yields no plan.

use serde::Deserialize;
use std::sync::Arc;
use tracing::debug;

use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::resilience::ResilientExecutor;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlanningMode {
    /// Never plan
    Fast,
    /// Plan when the request looks multi-step
    #[default]
    Auto,
    /// Always plan
    Autonomous,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<String>,
    #[serde(default)]
    pub completion_criteria: Vec<String>,
}

const PLAN_SIGNALS: &[&str] = &[
    "plan",
    "step by step",
    "steps",
    "organize",
    "strategy",
    "campaign",
    "project",
    "roadmap",
    "first",
    "then",
    "finally",
    "and then",
    "checklist",
];

pub fn wants_plan(mode: PlanningMode, user_text: &str) -> bool {
    match mode {
        PlanningMode::Fast => false,
        PlanningMode::Autonomous => true,
        PlanningMode::Auto => {
            let lower = user_text.to_lowercase();
            PLAN_SIGNALS.iter().any(|s| lower.contains(s))
        }
    }
}

/// Validate plan bounds: 3..=6 steps, at most 6 criteria.
pub fn parse_plan(raw: &str) -> Option<Plan> {
    // Models wrap JSON in fences often enough to be worth stripping.
    let trimmed = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    let plan: Plan = serde_json::from_str(trimmed).ok()?;
    if plan.goal.trim().is_empty() {
        return None;
    }
    if plan.steps.len() < 3 || plan.steps.len() > 6 {
        return None;
    }
    if plan.completion_criteria.len() > 6 {
        return None;
    }
    Some(plan)
}

const PLANNER_PROMPT: &str = "You are an execution planner. Given the user's request, \
respond with ONLY a JSON object shaped exactly like \
{\"goal\": \"...\", \"steps\": [\"...\"], \"completion_criteria\": [\"...\"]}. \
Use 3 to 6 steps and at most 6 completion criteria. No prose, no code fences.";

/// Generate a plan. Failures and invalid JSON silently produce no plan.
pub async fn generate_plan(
    llm: &Arc<dyn LlmClient>,
    executor: &ResilientExecutor,
    model: &str,
    user_text: &str,
) -> Option<Plan> {
    let request = ChatRequest::new(
        model,
        vec![
            ChatMessage::system(PLANNER_PROMPT),
            ChatMessage::user(user_text),
        ],
    )
    .with_sampling(0.2, 800);

    match executor
        .execute("agent:plan_generation", || llm.chat(request.clone()))
        .await
    {
        Ok(completion) => {
            let plan = parse_plan(&completion.content);
            if plan.is_none() {
                debug!("[AGENT] plan response was not valid JSON, continuing without plan");
            }
            plan
        }
        Err(e) => {
            debug!("[AGENT] plan generation failed ({}), continuing without plan", e);
            None
        }
    }
}

/// Render the plan block for the system prompt.
pub fn render_plan(plan: &Plan) -> String {
    let mut out = format!("Goal: {}\nSteps:\n", plan.goal);
    for (i, step) in plan.steps.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, step));
    }
    if !plan.completion_criteria.is_empty() {
        out.push_str("Completion criteria:\n");
        for criterion in &plan.completion_criteria {
            out.push_str(&format!("- {}\n", criterion));
        }
    }
    out
}
