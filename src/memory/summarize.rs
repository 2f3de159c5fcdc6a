// src/memory/summarize.rs
// Session summary generation for the compaction flush. LLM-backed with a
// deterministic fallback so compaction never fails.

use std::sync::Arc;
use tracing::warn;

use crate::llm::{ChatMessage, ChatRequest, LlmClient};
use crate::resilience::ResilientExecutor;

use super::goals::GoalsState;
use super::text::first_sentence;

const SUMMARY_PROMPT: &str = "Summarize this conversation for a context handoff. \
Respond in plain markdown with exactly these three sections:\n\
## Current Goal\n## Important Facts About User\n## Progress and Next Steps\n\
Be concrete and brief; omit pleasantries.";

/// (user, assistant) text pairs drawn from a history slice, oldest first.
pub fn turn_pairs(history: &[ChatMessage], limit: usize) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut pending_user: Option<String> = None;

    for msg in history {
        match msg.role {
            crate::llm::Role::User => pending_user = Some(msg.text()),
            crate::llm::Role::Assistant => {
                if let Some(user) = pending_user.take() {
                    let reply = msg.text();
                    if !reply.is_empty() {
                        pairs.push((user, reply));
                    }
                }
            }
            _ => {}
        }
    }

    if pairs.len() > limit {
        pairs.split_off(pairs.len() - limit)
    } else {
        pairs
    }
}

/// Generate the session summary, falling back to a deterministic digest when
/// the LLM call fails.
pub async fn build_session_summary(
    llm: &Arc<dyn LlmClient>,
    executor: &ResilientExecutor,
    model: &str,
    pairs: &[(String, String)],
    goals: &GoalsState,
) -> String {
    let transcript = pairs
        .iter()
        .map(|(u, a)| format!("User: {}\nAssistant: {}", u, a))
        .collect::<Vec<_>>()
        .join("\n\n");

    let request = ChatRequest::new(
        model,
        vec![
            ChatMessage::system(SUMMARY_PROMPT),
            ChatMessage::user(transcript),
        ],
    )
    .with_sampling(0.3, 1024);

    match executor
        .execute("memory:session_summary", || llm.chat(request.clone()))
        .await
    {
        Ok(completion) if !completion.content.trim().is_empty() => completion.content,
        Ok(_) => {
            warn!("[MEM] empty session summary from LLM, using fallback");
            fallback_summary(pairs, goals)
        }
        Err(e) => {
            warn!("[MEM] session summary failed ({}), using fallback", e);
            fallback_summary(pairs, goals)
        }
    }
}

pub fn fallback_summary(pairs: &[(String, String)], goals: &GoalsState) -> String {
    let mut out = String::from("## Current Goal\n");
    match goals.active().next() {
        Some(goal) => out.push_str(&format!("- {}\n", goal.title)),
        None => out.push_str("- (none recorded)\n"),
    }

    out.push_str("\n## Important Facts About User\n");
    out.push_str(&format!(
        "- {} exchanges in this session before compaction\n",
        pairs.len()
    ));

    out.push_str("\n## Progress and Next Steps\n");
    if let Some((user, reply)) = pairs.last() {
        out.push_str(&format!("- Last request: {}\n", first_sentence(user, 140)));
        out.push_str(&format!("- Last reply: {}\n", first_sentence(reply, 140)));
    } else {
        out.push_str("- (no turns recorded)\n");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Role;

    fn msg(role: Role, text: &str) -> ChatMessage {
        match role {
            Role::User => ChatMessage::user(text),
            Role::Assistant => ChatMessage::assistant(text),
            Role::System => ChatMessage::system(text),
            Role::Tool => ChatMessage::tool_result("id".into(), text.into()),
        }
    }

    #[test]
    fn test_turn_pairs_skips_tool_messages() {
        let history = vec![
            msg(Role::User, "check balance"),
            msg(Role::Tool, "1.25 ETH"),
            msg(Role::Assistant, "You hold 1.25 ETH"),
            msg(Role::User, "thanks"),
        ];
        let pairs = turn_pairs(&history, 40);
        assert_eq!(pairs.len(), 1);
        assert_eq!(pairs[0].0, "check balance");
        assert_eq!(pairs[0].1, "You hold 1.25 ETH");
    }

    #[test]
    fn test_turn_pairs_limit_keeps_latest() {
        let mut history = Vec::new();
        for i in 0..50 {
            history.push(msg(Role::User, &format!("q{}", i)));
            history.push(msg(Role::Assistant, &format!("a{}", i)));
        }
        let pairs = turn_pairs(&history, 40);
        assert_eq!(pairs.len(), 40);
        assert_eq!(pairs[0].0, "q10");
        assert_eq!(pairs.last().unwrap().0, "q49");
    }

    #[test]
    fn test_fallback_summary_mentions_goal() {
        let mut goals = GoalsState::default();
        goals.goals.push(super::super::goals::Goal::new("ship the dashboard"));

        let summary = fallback_summary(&[("do it".into(), "on it".into())], &goals);
        assert!(summary.contains("ship the dashboard"));
        assert!(summary.contains("## Progress and Next Steps"));
    }
}
