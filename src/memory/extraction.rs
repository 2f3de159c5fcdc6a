// src/memory/extraction.rs
// Deterministic per-turn extraction: goal candidates, preferences, and
// operating rules mined from the user/assistant exchange with fixed
// patterns. No LLM involved.

use regex::Regex;
use std::sync::LazyLock;

use super::goals::GoalStatus;
use super::text::sentences;

const MAX_RULES_PER_TURN: usize = 4;
const MIN_GOAL_CHARS: usize = 6;
const MAX_GOAL_CHARS: usize = 120;

static GOAL_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bwe need to\s+([^.!?\n]{3,160})",
        r"(?i)\bi want to\s+([^.!?\n]{3,160})",
        r"(?i)\blet'?s\s+([^.!?\n]{3,160})",
        r"(?i)\bgoal:\s*([^.!?\n]{3,160})",
        r"(?i)\bmission:\s*([^.!?\n]{3,160})",
        r"(?i)\bpriority:\s*([^.!?\n]{3,160})",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static pattern"))
    .collect()
});

static PREFERENCE_PATTERNS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"(?i)\bi prefer\s+([^.!?\n]{2,120})", "Prefers {}"),
        (r"(?i)\bi (?:like|love|enjoy)\s+([^.!?\n]{2,120})", "Prefers {}"),
        (
            r"(?i)\bi (?:hate|dislike|can't stand)\s+([^.!?\n]{2,120})",
            "Dislikes {}",
        ),
        (
            r"(?i)\bi(?:'m| am) (?:living|based) in\s+([^.!?\n]{2,80})",
            "Location: {}",
        ),
        (r"(?i)\bi live in\s+([^.!?\n]{2,80})", "Location: {}"),
        (
            r"(?i)\bmy time ?zone is\s+([^.!?\n]{2,60})",
            "Timezone: {}",
        ),
    ]
    .iter()
    .map(|(p, t)| (Regex::new(p).expect("static pattern"), *t))
    .collect()
});

static RULE_MARKERS: &[&str] = &["always", "never", "should", "must", "don't", "do not"];

static COMPLETION_WORDS: &[&str] = &["done", "completed", "finished", "shipped", "complete"];
static PAUSE_WORDS: &[&str] = &["pause", "paused", "on hold", "hold off"];
static CANCEL_WORDS: &[&str] = &["cancel", "cancelled", "canceled", "abandon", "scrap"];

#[derive(Debug, Default, Clone)]
pub struct TurnExtraction {
    pub goal_candidates: Vec<String>,
    /// Fully formatted "User Preferences" bullets
    pub preferences: Vec<String>,
    /// "Learned Behaviors" bullets, capped per turn
    pub rules: Vec<String>,
}

/// Run the fixed extraction patterns over a user message.
pub fn extract_turn(user_text: &str) -> TurnExtraction {
    TurnExtraction {
        goal_candidates: extract_goal_candidates(user_text),
        preferences: extract_preferences(user_text),
        rules: extract_rules(user_text),
    }
}

fn clean_goal_title(raw: &str) -> Option<String> {
    let title = raw
        .trim()
        .trim_end_matches(|c: char| c == ',' || c == ';' || c.is_whitespace())
        .to_string();
    if title.chars().count() < MIN_GOAL_CHARS || title.chars().count() > MAX_GOAL_CHARS {
        return None;
    }
    // At least two words; single verbs ("let's go") are noise
    if title.split_whitespace().count() < 2 {
        return None;
    }
    Some(title)
}

pub fn extract_goal_candidates(user_text: &str) -> Vec<String> {
    let mut candidates = Vec::new();

    for pattern in GOAL_PATTERNS.iter() {
        for caps in pattern.captures_iter(user_text) {
            if let Some(title) = caps.get(1).and_then(|m| clean_goal_title(m.as_str())) {
                candidates.push(title);
            }
        }
    }

    // Bulleted list under a "priorities" header line
    let mut in_priorities = false;
    for line in user_text.lines() {
        let trimmed = line.trim();
        if trimmed.to_lowercase().contains("priorit") && trimmed.ends_with(':') {
            in_priorities = true;
            continue;
        }
        if in_priorities {
            if let Some(item) = trimmed.strip_prefix('-').or_else(|| trimmed.strip_prefix('*')) {
                if let Some(title) = clean_goal_title(item) {
                    candidates.push(title);
                }
                continue;
            }
            if !trimmed.is_empty() {
                in_priorities = false;
            }
        }
    }

    // Collapse duplicates within the turn
    let mut unique: Vec<String> = Vec::new();
    for candidate in candidates {
        if !unique
            .iter()
            .any(|u| super::text::titles_equivalent(u, &candidate))
        {
            unique.push(candidate);
        }
    }
    unique
}

pub fn extract_preferences(user_text: &str) -> Vec<String> {
    let mut prefs = Vec::new();
    for (pattern, template) in PREFERENCE_PATTERNS.iter() {
        for caps in pattern.captures_iter(user_text) {
            if let Some(value) = caps.get(1) {
                let value = value.as_str().trim().trim_end_matches(',');
                if !value.is_empty() {
                    prefs.push(template.replace("{}", value));
                }
            }
        }
    }
    prefs
}

pub fn extract_rules(user_text: &str) -> Vec<String> {
    let mut rules = Vec::new();
    for sentence in sentences(user_text) {
        let lower = sentence.to_lowercase();
        if RULE_MARKERS.iter().any(|m| lower.contains(m)) {
            rules.push(sentence);
            if rules.len() >= MAX_RULES_PER_TURN {
                break;
            }
        }
    }
    rules
}

fn contains_word(lower: &str, word: &str) -> bool {
    if word.contains(' ') {
        return lower.contains(word);
    }
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

/// Completion/pause/cancel signal in the turn text, if any. Completion wins
/// over pause wins over cancel when several appear.
pub fn detect_status_change(text: &str) -> Option<GoalStatus> {
    let lower = text.to_lowercase();
    if COMPLETION_WORDS.iter().any(|w| contains_word(&lower, w)) {
        return Some(GoalStatus::Completed);
    }
    if PAUSE_WORDS.iter().any(|w| contains_word(&lower, w)) {
        return Some(GoalStatus::Paused);
    }
    if CANCEL_WORDS.iter().any(|w| contains_word(&lower, w)) {
        return Some(GoalStatus::Cancelled);
    }
    None
}
