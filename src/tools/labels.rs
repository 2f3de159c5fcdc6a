// src/tools/labels.rs
// Human-readable labels for tool activity, shown in the front-end event feed.

use serde_json::Value;

/// Label for a tool invocation. Falls back to `Using <name>`.
pub fn label_for(tool: &str, args: &Value) -> String {
    let arg = |key: &str| args.get(key).and_then(|v| v.as_str()).unwrap_or("");

    match tool {
        "get_current_datetime" => "Checking the clock".to_string(),
        "wallet_address" => "Looking up wallet address".to_string(),
        "wallet_balance" => "Checking wallet balance".to_string(),
        "perplexity_search" => {
            let query = arg("query");
            if query.is_empty() {
                "Searching the web".to_string()
            } else {
                format!("Searching the web for \"{}\"", query)
            }
        }
        "browse_page" => {
            let url = arg("url");
            if url.is_empty() {
                "Opening a page".to_string()
            } else {
                format!("Reading {}", url)
            }
        }
        "social_post" => "Posting an update".to_string(),
        "social_mentions" => "Checking mentions".to_string(),
        "schedule_reminder" => "Setting a reminder".to_string(),
        "cancel_reminder" => "Cancelling a reminder".to_string(),
        "list_reminders" => "Listing reminders".to_string(),
        "set_heartbeat" => "Adjusting the heartbeat".to_string(),
        "disable_heartbeat" => "Disabling the heartbeat".to_string(),
        "write_memory_entry" => "Writing a memory note".to_string(),
        "write_goal_entry" => "Updating goals".to_string(),
        "remember_this" => "Remembering that".to_string(),
        _ => format!("Using {}", tool),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_search_label_includes_query() {
        let label = label_for("perplexity_search", &json!({"query": "eth gas price"}));
        assert_eq!(label, "Searching the web for \"eth gas price\"");
    }

    #[test]
    fn test_unknown_tool_fallback() {
        assert_eq!(label_for("mystery_tool", &json!({})), "Using mystery_tool");
    }
}
