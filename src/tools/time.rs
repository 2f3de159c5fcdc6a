// src/tools/time.rs
// Clock tool: local-timezone date/time plus UTC.

use super::{ToolBuilder, ToolSpec};

pub fn current_datetime_string() -> String {
    let local = chrono::Local::now();
    let utc = chrono::Utc::now();
    format!(
        "Current date and time: {} ({})\nUTC: {}",
        local.format("%A, %B %-d, %Y %H:%M:%S"),
        local.format("%Z"),
        utc.format("%Y-%m-%d %H:%M:%S UTC")
    )
}

pub fn datetime_tool() -> ToolSpec {
    let schema = ToolBuilder::new(
        "get_current_datetime",
        "Get the current date and time in the local timezone and UTC. Use this for any question about today's date, the current time, or the day of the week.",
    )
    .build();

    ToolSpec::new(schema, |_args| async move { Ok(current_datetime_string()) })
}
