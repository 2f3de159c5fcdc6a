// src/agent/guards.rs
// Post-hoc integrity guards. Each guard has a narrow precondition and an
// idempotent action, so several can fire in one turn without double-coercing
// the reply. They run after the model's final text, in a fixed order.

use regex::Regex;
use serde_json::json;
use std::sync::Arc;
use std::sync::LazyLock;
use tracing::info;

use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::memory::text::jaccard;
use crate::resilience::ResilientExecutor;
use crate::tools::ToolRegistry;

use super::planner::Plan;
use super::router;

static WALLET_QUESTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bbalance\b|\b(?:wallet|deposit)\s+address\b|\bhow much\b.*\b(?:eth|crypto|hold|have)\b",
    )
    .expect("static pattern")
});

static WALLET_ADDRESS_HINT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\baddress\b").expect("static pattern"));

static REALTIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(current|latest|today|tonight|right now|this (?:week|morning)|breaking)\b|\b(price|news|weather|score|headline)s?\b",
    )
    .expect("static pattern")
});

static SEARCH_CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bi searched\b|\bsearch results\b|\baccording to (?:a|my|the) search\b|\bperplexity\b")
        .expect("static pattern")
});

static SOCIAL_CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bi (?:just )?(?:posted|tweeted)\b|\bthe post is (?:up|live)\b")
        .expect("static pattern")
});

static SCHEDULER_CLAIM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:i(?:'ve| have)? (?:set|scheduled))\b|\breminder is set\b|\bi'll remind you\b")
        .expect("static pattern")
});

static PROMISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\bi'?ll (?:check|look|get|fetch|find|do)\b|\blet me (?:check|look|see|fetch|find)\b|\bgive me a (?:moment|second)\b|\bi(?:'m| am) going to (?:check|look)\b",
    )
    .expect("static pattern")
});

fn family_used(tools_used: &[String], prefix: &str) -> bool {
    tools_used.iter().any(|t| t.starts_with(prefix))
}

pub struct GuardContext<'a> {
    pub user_text: &'a str,
    pub tools_used: &'a [String],
    pub registry: &'a Arc<ToolRegistry>,
    pub llm: &'a Arc<dyn LlmClient>,
    pub executor: &'a ResilientExecutor,
    pub model: &'a str,
}

fn tool_ran(ctx: &GuardContext<'_>, fired: &[String], prefix: &str) -> bool {
    family_used(ctx.tools_used, prefix) || family_used(fired, prefix)
}

/// Guard 1: wallet questions must carry tool-backed numbers. If the user
/// asked about the wallet and no wallet tool ran, run it and prepend.
pub async fn wallet_guard(
    ctx: &GuardContext<'_>,
    reply: String,
    fired: &mut Vec<String>,
) -> String {
    if !WALLET_QUESTION_RE.is_match(ctx.user_text) || tool_ran(ctx, fired, "wallet_") {
        return reply;
    }

    let tool = if WALLET_ADDRESS_HINT_RE.is_match(ctx.user_text) {
        "wallet_address"
    } else {
        "wallet_balance"
    };
    info!("[GUARD] wallet question answered without {}, coercing", tool);

    let output = ctx.registry.dispatch(tool, json!({})).await;
    fired.push(tool.to_string());
    format!("{}\n\n{}", output, reply)
}

/// Guard 2: questions about live facts get rewritten against search results
/// when no realtime tool ran.
pub async fn realtime_guard(
    ctx: &GuardContext<'_>,
    reply: String,
    fired: &mut Vec<String>,
) -> String {
    if !REALTIME_RE.is_match(ctx.user_text) || tool_ran(ctx, fired, "perplexity_search") {
        return reply;
    }
    info!("[GUARD] realtime question answered without search, coercing");

    let results = ctx
        .registry
        .dispatch(
            "perplexity_search",
            json!({"query": ctx.user_text, "max_results": 5}),
        )
        .await;
    if results.starts_with("Error") || results.starts_with("Unknown tool") {
        return reply;
    }
    fired.push("perplexity_search".to_string());

    let rewrite = ChatRequest::new(
        ctx.model,
        vec![
            ChatMessage::system(
                "Rewrite the draft reply so every time-sensitive fact comes from the live \
                 results. Keep the answer short. Output only the final reply.",
            ),
            ChatMessage::user(format!(
                "Question: {}\n\nDraft reply: {}\n\nLive results:\n{}",
                ctx.user_text, reply, results
            )),
        ],
    )
    .with_sampling(0.3, 1024);

    match ctx
        .executor
        .execute("agent:realtime_rewrite", || ctx.llm.chat(rewrite.clone()))
        .await
    {
        Ok(completion) if !completion.content.trim().is_empty() => completion.content,
        _ => format!("{}\n\n{}", results, reply),
    }
}

/// Guard 3: replies that claim a tool family was used when it was not.
/// The deterministic-route equivalent runs and its output is prepended.
pub async fn claim_guards(
    ctx: &GuardContext<'_>,
    mut reply: String,
    fired: &mut Vec<String>,
) -> String {
    // Perplexity claim
    if SEARCH_CLAIM_RE.is_match(&reply) && !tool_ran(ctx, fired, "perplexity_search") {
        info!("[GUARD] reply claims a search that never ran");
        let output = ctx
            .registry
            .dispatch(
                "perplexity_search",
                json!({"query": ctx.user_text, "max_results": 5}),
            )
            .await;
        if !output.starts_with("Error") && !output.starts_with("Unknown tool") {
            fired.push("perplexity_search".to_string());
            reply = format!("{}\n\n{}", output, reply);
        }
    }

    // Social and scheduler claims coerce through the deterministic router,
    // so the side effect only fires when the user actually asked for it.
    let claims_social = SOCIAL_CLAIM_RE.is_match(&reply) && !tool_ran(ctx, fired, "social_");
    let claims_scheduler = SCHEDULER_CLAIM_RE.is_match(&reply)
        && !tool_ran(ctx, fired, "schedule_")
        && !tool_ran(ctx, fired, "set_heartbeat")
        && !tool_ran(ctx, fired, "list_reminders")
        && !tool_ran(ctx, fired, "cancel_reminder");

    if claims_social || claims_scheduler {
        if let Some(route) = router::route(ctx.user_text) {
            let social_route = route.tool.starts_with("social_");
            let scheduler_route = matches!(
                route.tool.as_str(),
                "schedule_reminder" | "cancel_reminder" | "list_reminders" | "set_heartbeat"
                    | "disable_heartbeat"
            );
            if (claims_social && social_route) || (claims_scheduler && scheduler_route) {
                info!("[GUARD] reply claims '{}' work that never ran", route.tool);
                let output = ctx.registry.dispatch(&route.tool, route.args).await;
                fired.push(route.tool);
                reply = format!("{}\n\n{}", output, reply);
            }
        }
    }

    reply
}

/// Guard 4 precondition: a tool-capable request got a promise instead of an
/// action. Runs after the coercing guards; anything they fired counts as
/// action, so only a genuinely unbacked promise triggers the retry.
pub fn promises_without_action(ctx: &GuardContext<'_>, fired: &[String], reply: &str) -> bool {
    if !ctx.tools_used.is_empty() || !fired.is_empty() {
        return false;
    }
    let tool_capable =
        router::route(ctx.user_text).is_some() || super::prompt::routing_hint(ctx.user_text).is_some();
    tool_capable && PROMISE_RE.is_match(reply)
}

pub const PROMISE_OVERRIDE: &str = "SYSTEM OVERRIDE: You answered with a promise instead of \
acting. Call the appropriate tool NOW, or reply exactly `BLOCKED: <reason>` if no tool can \
satisfy the request. Do not promise future action.";

/// Guard 5: append a per-step status footer when a plan exists. A step
/// counts as done when its wording overlaps what actually happened this turn.
pub fn plan_footer(plan: &Plan, reply: &str, activity: &str) -> String {
    let happened = format!("{}\n{}", reply, activity);
    let mut footer = String::from("\n\nPlan status:");
    for step in &plan.steps {
        let done = jaccard(step, &happened) >= 0.2;
        footer.push_str(&format!(
            "\n- [{}] {}",
            if done { "done" } else { "pending" },
            step
        ));
    }
    format!("{}{}", reply, footer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_promise_detection() {
        assert!(PROMISE_RE.is_match("I'll check the balance for you"));
        assert!(PROMISE_RE.is_match("Let me look into the latest news"));
        assert!(!PROMISE_RE.is_match("Your balance is 2 ETH"));
    }

    #[test]
    fn test_claim_patterns() {
        assert!(SEARCH_CLAIM_RE.is_match("I searched the web and found nothing"));
        assert!(SOCIAL_CLAIM_RE.is_match("I posted the update just now"));
        assert!(SCHEDULER_CLAIM_RE.is_match("I've set a reminder for tomorrow"));
    }

    #[test]
    fn test_plan_footer_marks_overlap() {
        let plan = Plan {
            goal: "ship".into(),
            steps: vec![
                "check the wallet balance".into(),
                "write the launch post".into(),
                "schedule the follow-up".into(),
            ],
            completion_criteria: vec![],
        };
        let reply = "Checked the wallet balance: 2 ETH.";
        let out = plan_footer(&plan, reply, "wallet_balance");
        assert!(out.contains("- [done] check the wallet balance"));
        assert!(out.contains("- [pending] write the launch post"));
    }
}
