// src/scheduler/state.rs
// Crash-safe persisted scheduler state. Atomic-replace on every mutation;
// unreadable or malformed files degrade to empty state at startup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::warn;

use crate::config::HeartbeatConfig;
use crate::queue::Lane;
use crate::utils::atomic_write;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeReminder {
    pub id: String,
    pub prompt: String,
    pub run_at_ms: i64,
    pub lane: Lane,
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulerState {
    /// reminder id -> next due time, epoch ms. Non-decreasing per id.
    pub next_run_by_id: HashMap<String, i64>,
    /// Ordered by run_at_ms whenever serialized
    pub one_time_reminders: Vec<OneTimeReminder>,
    pub heartbeat: HeartbeatConfig,
    pub updated_at: String,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            next_run_by_id: HashMap::new(),
            one_time_reminders: Vec::new(),
            heartbeat: HeartbeatConfig::default(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl SchedulerState {
    /// Lenient load from raw JSON: drop entries with non-string ids or
    /// non-finite timestamps, default unknown lanes to background, floor the
    /// heartbeat interval to whole minutes >= 1.
    pub fn from_value(value: &Value) -> Self {
        let mut state = SchedulerState::default();

        if let Some(map) = value.get("nextRunById").and_then(|v| v.as_object()) {
            for (id, ts) in map {
                let Some(ts) = finite_ms(ts) else {
                    warn!("[SCHED] dropping next-run entry '{}': bad timestamp", id);
                    continue;
                };
                state.next_run_by_id.insert(id.clone(), ts);
            }
        }

        if let Some(items) = value.get("oneTimeReminders").and_then(|v| v.as_array()) {
            for item in items {
                let Some(id) = item.get("id").and_then(|v| v.as_str()) else {
                    warn!("[SCHED] dropping one-time reminder without string id");
                    continue;
                };
                let Some(run_at_ms) = item.get("runAtMs").and_then(finite_ms) else {
                    warn!("[SCHED] dropping one-time reminder '{}': bad runAtMs", id);
                    continue;
                };
                let lane = item
                    .get("lane")
                    .and_then(|v| v.as_str())
                    .and_then(Lane::parse)
                    .unwrap_or(Lane::Background);

                state.one_time_reminders.push(OneTimeReminder {
                    id: id.to_string(),
                    prompt: item
                        .get("prompt")
                        .and_then(|v| v.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    run_at_ms,
                    lane,
                    enabled: item.get("enabled").and_then(|v| v.as_bool()).unwrap_or(true),
                });
            }
        }

        if let Some(hb) = value.get("heartbeat") {
            state.heartbeat = HeartbeatConfig {
                enabled: hb.get("enabled").and_then(|v| v.as_bool()).unwrap_or(false),
                interval_minutes: hb
                    .get("intervalMinutes")
                    .and_then(|v| v.as_f64())
                    .map(|m| (m.floor() as i64).max(1) as u64)
                    .unwrap_or(HeartbeatConfig::default().interval_minutes),
                prompt: hb
                    .get("prompt")
                    .and_then(|v| v.as_str())
                    .unwrap_or(&HeartbeatConfig::default().prompt)
                    .to_string(),
            };
        }

        if let Some(updated) = value.get("updatedAt").and_then(|v| v.as_str()) {
            state.updated_at = updated.to_string();
        }

        state
    }

    pub fn sort_one_time(&mut self) {
        self.one_time_reminders.sort_by_key(|r| r.run_at_ms);
    }
}

fn finite_ms(value: &Value) -> Option<i64> {
    let f = value.as_f64()?;
    if !f.is_finite() {
        return None;
    }
    Some(f as i64)
}

/// The on-disk state file.
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Load and validate. Missing or corrupt files are empty state.
    pub async fn load(&self) -> SchedulerState {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(_) => return SchedulerState::default(),
        };

        match serde_json::from_str::<Value>(&content) {
            Ok(value) => SchedulerState::from_value(&value),
            Err(e) => {
                warn!(
                    "[SCHED] state file {} unreadable ({}), starting empty",
                    self.path.display(),
                    e
                );
                SchedulerState::default()
            }
        }
    }

    /// Atomic-replace the full state. One-time reminders serialize ordered
    /// by due time.
    pub async fn save(&self, state: &mut SchedulerState) -> Result<()> {
        state.sort_one_time();
        state.updated_at = chrono::Utc::now().to_rfc3339();
        let json = serde_json::to_string_pretty(state)?;
        atomic_write(&self.path, &json).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validation_drops_bad_entries() {
        let raw = json!({
            "nextRunById": {
                "ping": 1000,
                "broken": "soon",
            },
            "oneTimeReminders": [
                {"id": "ok", "prompt": "p", "runAtMs": 5000, "lane": "fast", "enabled": true},
                {"id": "weird-lane", "prompt": "p", "runAtMs": 6000, "lane": "warp", "enabled": true},
                {"prompt": "no id", "runAtMs": 7000, "lane": "slow", "enabled": true},
            ],
            "heartbeat": {"enabled": true, "intervalMinutes": 2.9, "prompt": "hb"},
            "updatedAt": "2026-01-01T00:00:00Z",
        });

        let state = SchedulerState::from_value(&raw);
        assert_eq!(state.next_run_by_id.len(), 1);
        assert_eq!(state.next_run_by_id["ping"], 1000);
        assert_eq!(state.one_time_reminders.len(), 2);
        assert_eq!(state.one_time_reminders[1].lane, Lane::Background);
        assert!(state.heartbeat.enabled);
        assert_eq!(state.heartbeat.interval_minutes, 2);
    }

    #[tokio::test]
    async fn test_round_trip_sorts_one_time() {
        let dir = tempfile::tempdir().unwrap();
        let file = StateFile::new(dir.path().join("scheduler/state.json"));

        let mut state = SchedulerState::default();
        state.one_time_reminders.push(OneTimeReminder {
            id: "late".into(),
            prompt: "b".into(),
            run_at_ms: 9000,
            lane: Lane::Background,
            enabled: true,
        });
        state.one_time_reminders.push(OneTimeReminder {
            id: "early".into(),
            prompt: "a".into(),
            run_at_ms: 1000,
            lane: Lane::Background,
            enabled: true,
        });
        file.save(&mut state).await.unwrap();

        let loaded = file.load().await;
        assert_eq!(loaded.one_time_reminders[0].id, "early");
        assert_eq!(loaded.one_time_reminders[1].id, "late");
    }

    #[tokio::test]
    async fn test_corrupt_file_degrades_to_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let file = StateFile::new(path);
        let state = file.load().await;
        assert!(state.next_run_by_id.is_empty());
        assert!(state.one_time_reminders.is_empty());
    }
}
