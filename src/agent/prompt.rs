// src/agent/prompt.rs
// System prompt assembly: persona, runtime clock, bootstrap memory, skill
// catalogue, active skill body, execution plan, tool-routing hint.

use super::planner::{Plan, render_plan};
use crate::skills::{Skill, SkillCatalogue};

pub struct PromptParts<'a> {
    pub persona: &'a str,
    pub memory_context: &'a str,
    pub skills: &'a SkillCatalogue,
    pub active_skill: Option<&'a Skill>,
    pub plan: Option<&'a Plan>,
    pub user_text: &'a str,
}

pub fn build_system_prompt(parts: &PromptParts<'_>) -> String {
    let mut prompt = String::from(parts.persona);

    let local = chrono::Local::now();
    let utc = chrono::Utc::now();
    prompt.push_str(&format!(
        "\n\nCurrent time: {} (local) / {}",
        local.format("%A %Y-%m-%d %H:%M:%S %Z"),
        utc.format("%Y-%m-%d %H:%M:%S UTC")
    ));

    if !parts.memory_context.trim().is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(parts.memory_context.trim());
    }

    if !parts.skills.is_empty() {
        prompt.push_str("\n\nAvailable skills:\n");
        prompt.push_str(&parts.skills.summary());
    }

    if let Some(skill) = parts.active_skill {
        prompt.push_str("\n\nActive Skill Instructions:\n");
        prompt.push_str(&skill.body);
    }

    if let Some(plan) = parts.plan {
        prompt.push_str("\n\nExecution plan:\n");
        prompt.push_str(&render_plan(plan));
    }

    if let Some(hint) = routing_hint(parts.user_text) {
        prompt.push_str("\n\n");
        prompt.push_str(&hint);
    }

    prompt
}

/// Nudge the model toward the right tool family for this request. Purely a
/// hint; the deterministic router already handled the unambiguous cases.
pub fn routing_hint(user_text: &str) -> Option<String> {
    let lower = user_text.to_lowercase();

    if lower.contains("wallet") || lower.contains("balance") || lower.contains("address") {
        return Some(
            "Tool hint: wallet questions must be answered with wallet_address or wallet_balance, never from memory.".to_string(),
        );
    }
    if lower.contains("price")
        || lower.contains("news")
        || lower.contains("weather")
        || lower.contains("latest")
        || lower.contains("current")
        || lower.contains("today")
    {
        return Some(
            "Tool hint: this looks time-sensitive; verify with perplexity_search before answering.".to_string(),
        );
    }
    if lower.contains("remind") || lower.contains("schedule") || lower.contains("heartbeat") {
        return Some(
            "Tool hint: scheduling requests go through schedule_reminder / set_heartbeat / list_reminders.".to_string(),
        );
    }
    if lower.contains("post") || lower.contains("tweet") || lower.contains("mention") {
        return Some(
            "Tool hint: social actions go through social_post and social_mentions.".to_string(),
        );
    }
    if lower.contains("remember") || lower.contains("don't forget") {
        return Some(
            "Tool hint: durable facts are saved with remember_this or write_memory_entry.".to_string(),
        );
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::SkillCatalogue;

    #[test]
    fn test_prompt_contains_blocks_in_order() {
        let skills = SkillCatalogue::empty();
        let prompt = build_system_prompt(&PromptParts {
            persona: "You are Vega.",
            memory_context: "=== SEMANTIC MEMORY (durable facts) ===\n- fact",
            skills: &skills,
            active_skill: None,
            plan: None,
            user_text: "what's the eth price today?",
        });

        let persona_at = prompt.find("You are Vega.").unwrap();
        let memory_at = prompt.find("SEMANTIC MEMORY").unwrap();
        let hint_at = prompt.find("Tool hint").unwrap();
        assert!(persona_at < memory_at && memory_at < hint_at);
        assert!(prompt.contains("Current time:"));
    }

    #[test]
    fn test_hint_families() {
        assert!(routing_hint("check the wallet balance").unwrap().contains("wallet"));
        assert!(routing_hint("any news today?").unwrap().contains("perplexity_search"));
        assert!(routing_hint("remind me later").unwrap().contains("schedule_reminder"));
        assert!(routing_hint("hello").is_none());
    }
}
