// src/config/scheduler.rs
// Scheduler configuration: tick cadence, configured reminders, heartbeat.

use serde::{Deserialize, Serialize};

use crate::queue::Lane;

use super::{env_parse, env_string};

/// A recurring reminder configured at startup. Identity is `id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReminderConfig {
    pub id: String,
    pub prompt: String,
    pub interval_minutes: u64,
    #[serde(default)]
    pub lane: Lane,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Singleton self-heartbeat reminder, synthesized into the recurring set
/// under id `self-heartbeat` when enabled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatConfig {
    pub enabled: bool,
    pub interval_minutes: u64,
    pub prompt: String,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: 30,
            prompt: "Heartbeat: review your goals and pending work, and act on anything due."
                .to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Tick cadence in seconds, floored to 1
    pub tick_seconds: u64,
    /// Reminders configured by the embedding front-end. Duplicate ids collapse
    /// (last wins).
    #[serde(default)]
    pub reminders: Vec<ReminderConfig>,
    pub heartbeat: HeartbeatConfig,
}

impl SchedulerConfig {
    pub fn from_env() -> Self {
        let heartbeat_enabled = env_parse("SCHEDULER_HEARTBEAT_ENABLED", false);
        let heartbeat_minutes: u64 = env_parse("SCHEDULER_HEARTBEAT_MINUTES", 30u64).max(1);

        Self {
            tick_seconds: env_parse("SCHEDULER_TICK_SECONDS", 15u64).max(1),
            reminders: Vec::new(),
            heartbeat: HeartbeatConfig {
                enabled: heartbeat_enabled,
                interval_minutes: heartbeat_minutes,
                prompt: env_string(
                    "SCHEDULER_HEARTBEAT_PROMPT",
                    &HeartbeatConfig::default().prompt,
                ),
            },
        }
    }
}
