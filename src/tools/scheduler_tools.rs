// src/tools/scheduler_tools.rs
// Tool façade over the scheduler: one-shot reminders and the heartbeat.

use serde_json::Value;
use std::sync::Arc;

use crate::queue::Lane;
use crate::scheduler::Scheduler;

use super::{ToolBuilder, ToolSpec, properties};

fn arg_lane(args: &Value) -> Lane {
    args.get("lane")
        .and_then(|l| l.as_str())
        .and_then(Lane::parse)
        .unwrap_or(Lane::Background)
}

pub fn scheduler_tools(scheduler: Arc<Scheduler>) -> Vec<ToolSpec> {
    let schedule_schema = ToolBuilder::new(
        "schedule_reminder",
        "Schedule a one-time reminder that fires after a number of minutes. Use when the user asks to be reminded or for a delayed action.",
    )
    .property(
        "minutes",
        properties::integer("Minutes from now (at least 1)", None),
        true,
    )
    .property("prompt", properties::description("What to do when it fires"), true)
    .property(
        "lane",
        properties::string_enum("Execution lane", &["fast", "slow", "background"]),
        false,
    )
    .build();

    let cancel_schema = ToolBuilder::new(
        "cancel_reminder",
        "Cancel a pending one-time reminder by id.",
    )
    .property("id", properties::description("Reminder id"), true)
    .build();

    let list_schema = ToolBuilder::new(
        "list_reminders",
        "List pending one-time reminders with their due times.",
    )
    .build();

    let heartbeat_schema = ToolBuilder::new(
        "set_heartbeat",
        "Enable or retune the periodic self-heartbeat that wakes the agent to review its goals.",
    )
    .property(
        "minutes",
        properties::integer("Heartbeat interval in minutes (at least 1)", None),
        true,
    )
    .property("prompt", properties::description("Optional custom heartbeat prompt"), false)
    .build();

    let disable_schema = ToolBuilder::new(
        "disable_heartbeat",
        "Turn the periodic self-heartbeat off.",
    )
    .build();

    let for_schedule = scheduler.clone();
    let for_cancel = scheduler.clone();
    let for_list = scheduler.clone();
    let for_heartbeat = scheduler.clone();
    let for_disable = scheduler;

    vec![
        ToolSpec::new(schedule_schema, move |args: Value| {
            let scheduler = for_schedule.clone();
            async move {
                let minutes = args
                    .get("minutes")
                    .and_then(|m| m.as_u64())
                    .ok_or_else(|| anyhow::anyhow!("missing 'minutes'"))?;
                let prompt = args
                    .get("prompt")
                    .and_then(|p| p.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'prompt'"))?;
                let id = scheduler
                    .schedule_one_time_in(minutes, prompt, arg_lane(&args))
                    .await?;
                Ok(format!("Reminder {} set for {} minute(s) from now", id, minutes))
            }
        }),
        ToolSpec::new(cancel_schema, move |args: Value| {
            let scheduler = for_cancel.clone();
            async move {
                let id = args
                    .get("id")
                    .and_then(|i| i.as_str())
                    .ok_or_else(|| anyhow::anyhow!("missing 'id'"))?;
                if scheduler.cancel_one_time(id).await {
                    Ok(format!("Cancelled reminder {}", id))
                } else {
                    Ok(format!("No pending reminder with id {}", id))
                }
            }
        }),
        ToolSpec::new(list_schema, move |_args: Value| {
            let scheduler = for_list.clone();
            async move {
                let reminders = scheduler.list_one_time().await;
                if reminders.is_empty() {
                    return Ok("No pending reminders.".to_string());
                }
                let lines: Vec<String> = reminders
                    .iter()
                    .map(|r| {
                        let due = chrono::DateTime::from_timestamp_millis(r.run_at_ms)
                            .map(|t| t.to_rfc3339())
                            .unwrap_or_else(|| format!("{}ms", r.run_at_ms));
                        format!("{} | due {} | {}", r.id, due, r.prompt)
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
        }),
        ToolSpec::new(heartbeat_schema, move |args: Value| {
            let scheduler = for_heartbeat.clone();
            async move {
                let minutes = args
                    .get("minutes")
                    .and_then(|m| m.as_u64())
                    .ok_or_else(|| anyhow::anyhow!("missing 'minutes'"))?
                    .max(1);
                let prompt = args
                    .get("prompt")
                    .and_then(|p| p.as_str())
                    .map(|s| s.to_string());
                scheduler.set_heartbeat(minutes, prompt).await;
                Ok(format!("Heartbeat enabled every {} minute(s)", minutes))
            }
        }),
        ToolSpec::new(disable_schema, move |_args: Value| {
            let scheduler = for_disable.clone();
            async move {
                scheduler.disable_heartbeat().await;
                Ok("Heartbeat disabled".to_string())
            }
        }),
    ]
}
