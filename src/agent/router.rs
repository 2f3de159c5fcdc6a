// src/agent/router.rs
// Deterministic intent router. High-confidence patterns dispatch a tool
// directly and skip the LLM entirely, so well-specified tool intents can
// never be hallucinated.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::LazyLock;

/// A routed intent: which tool to call and with what arguments.
#[derive(Debug, Clone, PartialEq)]
pub struct RouteMatch {
    pub tool: String,
    pub args: Value,
}

static DATETIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(what time is it|what's the time|what day is (it|today)|today's date|what(?:'s| is) the date|current (date|time))\b",
    )
    .expect("static pattern")
});

static WALLET_ADDRESS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(wallet|deposit|your)\s+address\b|\baddress of your wallet\b")
        .expect("static pattern")
});

static WALLET_BALANCE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(wallet|eth|token)?\s*balance\b|\bhow much (?:eth|money|crypto)? ?(?:do you|does the wallet) (?:have|hold)\b",
    )
    .expect("static pattern")
});

static REMIND_IN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bremind me in\s+(\d+)\s*(?:minutes?|mins?|m)\b(?:\s+(?:to|about)\s+(.+))?")
        .expect("static pattern")
});

static LIST_REMINDERS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(list|show|what are)\b.*\breminders\b").expect("static pattern")
});

static CANCEL_REMINDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bcancel (?:the )?reminder\s+([0-9a-f-]{8,})").expect("static pattern")
});

static SET_HEARTBEAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:set|enable|turn on)\b.*\bheartbeat\b.*?(\d+)\s*(?:minutes?|mins?|m)\b")
        .expect("static pattern")
});

static DISABLE_HEARTBEAT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:disable|turn off|stop)\b.*\bheartbeat\b").expect("static pattern")
});

static MENTIONS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(check|any|show|read)\b.*\bmentions\b").expect("static pattern")
});

static POST_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\b(?:post|tweet)\s*[:"]\s*(.+)"#).expect("static pattern")
});

/// Try to match the user text against the high-confidence intent table.
pub fn route(user_text: &str) -> Option<RouteMatch> {
    let text = user_text.trim();

    if DATETIME_RE.is_match(text) {
        return Some(RouteMatch {
            tool: "get_current_datetime".to_string(),
            args: json!({}),
        });
    }

    if WALLET_ADDRESS_RE.is_match(text) {
        return Some(RouteMatch {
            tool: "wallet_address".to_string(),
            args: json!({}),
        });
    }

    if WALLET_BALANCE_RE.is_match(text) {
        return Some(RouteMatch {
            tool: "wallet_balance".to_string(),
            args: json!({}),
        });
    }

    if let Some(caps) = REMIND_IN_RE.captures(text) {
        let minutes: u64 = caps.get(1)?.as_str().parse().ok()?;
        let prompt = caps
            .get(2)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "Reminder".to_string());
        return Some(RouteMatch {
            tool: "schedule_reminder".to_string(),
            args: json!({"minutes": minutes, "prompt": prompt}),
        });
    }

    if let Some(caps) = CANCEL_REMINDER_RE.captures(text) {
        return Some(RouteMatch {
            tool: "cancel_reminder".to_string(),
            args: json!({"id": caps.get(1)?.as_str()}),
        });
    }

    if LIST_REMINDERS_RE.is_match(text) {
        return Some(RouteMatch {
            tool: "list_reminders".to_string(),
            args: json!({}),
        });
    }

    if let Some(caps) = SET_HEARTBEAT_RE.captures(text) {
        let minutes: u64 = caps.get(1)?.as_str().parse().ok()?;
        return Some(RouteMatch {
            tool: "set_heartbeat".to_string(),
            args: json!({"minutes": minutes}),
        });
    }

    if DISABLE_HEARTBEAT_RE.is_match(text) {
        return Some(RouteMatch {
            tool: "disable_heartbeat".to_string(),
            args: json!({}),
        });
    }

    if MENTIONS_RE.is_match(text) {
        return Some(RouteMatch {
            tool: "social_mentions".to_string(),
            args: json!({}),
        });
    }

    if let Some(caps) = POST_RE.captures(text) {
        let body = caps.get(1)?.as_str().trim().trim_matches('"');
        if !body.is_empty() {
            return Some(RouteMatch {
                tool: "social_post".to_string(),
                args: json!({"text": body}),
            });
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_intent() {
        let m = route("what time is it?").unwrap();
        assert_eq!(m.tool, "get_current_datetime");
    }

    #[test]
    fn test_wallet_intents() {
        assert_eq!(route("what is your wallet address").unwrap().tool, "wallet_address");
        assert_eq!(route("what's your balance?").unwrap().tool, "wallet_balance");
        assert_eq!(
            route("how much eth do you have").unwrap().tool,
            "wallet_balance"
        );
    }

    #[test]
    fn test_remind_in_minutes() {
        let m = route("remind me in 15 minutes to stretch").unwrap();
        assert_eq!(m.tool, "schedule_reminder");
        assert_eq!(m.args["minutes"], 15);
        assert_eq!(m.args["prompt"], "stretch");
    }

    #[test]
    fn test_heartbeat_verbs() {
        let m = route("set the heartbeat to 10 minutes").unwrap();
        assert_eq!(m.tool, "set_heartbeat");
        assert_eq!(m.args["minutes"], 10);
        assert_eq!(route("turn off the heartbeat").unwrap().tool, "disable_heartbeat");
    }

    #[test]
    fn test_social_verbs() {
        assert_eq!(route("check my mentions please").unwrap().tool, "social_mentions");
        let m = route("post: shipping day!").unwrap();
        assert_eq!(m.tool, "social_post");
        assert_eq!(m.args["text"], "shipping day!");
    }

    #[test]
    fn test_freeform_text_does_not_route() {
        assert!(route("tell me about the roman empire").is_none());
        assert!(route("how are you today?").is_none());
    }
}
