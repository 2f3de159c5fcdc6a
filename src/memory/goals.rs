// src/memory/goals.rs
// Persistent mission state: goal records with lifecycle status and a bounded
// progress log, stored as round-trippable markdown.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::utils::atomic_write;

use super::text::titles_equivalent;

pub const MAX_TAGS: usize = 12;
pub const MAX_PROGRESS: usize = 24;
pub const PROGRESS_NOTE_MAX_CHARS: usize = 180;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Active,
    Completed,
    Paused,
    Cancelled,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Paused => "paused",
            GoalStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "active" => Some(GoalStatus::Active),
            "completed" => Some(GoalStatus::Completed),
            "paused" => Some(GoalStatus::Paused),
            "cancelled" => Some(GoalStatus::Cancelled),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressSource {
    User,
    Assistant,
    System,
}

impl ProgressSource {
    pub fn as_str(self) -> &'static str {
        match self {
            ProgressSource::User => "user",
            ProgressSource::Assistant => "assistant",
            ProgressSource::System => "system",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim() {
            "user" => Some(ProgressSource::User),
            "assistant" => Some(ProgressSource::Assistant),
            "system" => Some(ProgressSource::System),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEntry {
    pub at: DateTime<Utc>,
    pub source: ProgressSource,
    pub note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Goal {
    pub id: String,
    pub title: String,
    pub status: GoalStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub tags: Vec<String>,
    pub progress: Vec<ProgressEntry>,
}

impl Goal {
    pub fn new(title: &str) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            title: title.trim().to_string(),
            status: GoalStatus::Active,
            created_at: now,
            updated_at: now,
            tags: Vec::new(),
            progress: Vec::new(),
        }
    }

    pub fn push_progress(&mut self, source: ProgressSource, note: &str) {
        let note: String = note
            .trim()
            .replace('|', "/")
            .chars()
            .take(PROGRESS_NOTE_MAX_CHARS)
            .collect();
        if note.is_empty() {
            return;
        }
        self.progress.push(ProgressEntry {
            at: Utc::now(),
            source,
            note,
        });
        while self.progress.len() > MAX_PROGRESS {
            self.progress.remove(0);
        }
        self.updated_at = Utc::now();
    }

    pub fn add_tags(&mut self, tags: &[String]) {
        for tag in tags {
            let tag = tag.trim().to_lowercase();
            if tag.is_empty() || self.tags.iter().any(|t| t == &tag) {
                continue;
            }
            if self.tags.len() >= MAX_TAGS {
                break;
            }
            self.tags.push(tag);
        }
    }
}

/// In-memory goal set with markdown persistence. The serializer and parser
/// are inverses up to goal ordering by `updated_at`.
#[derive(Debug, Default, Clone)]
pub struct GoalsState {
    pub goals: Vec<Goal>,
}

impl GoalsState {
    /// Find a goal equivalent to `title` (normalized equality, containment,
    /// or token overlap).
    pub fn find_equivalent_mut(&mut self, title: &str) -> Option<&mut Goal> {
        self.goals
            .iter_mut()
            .find(|g| titles_equivalent(&g.title, title))
    }

    pub fn find_equivalent(&self, title: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| titles_equivalent(&g.title, title))
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Goal> {
        self.goals.iter_mut().find(|g| g.id == id)
    }

    pub fn counts_by_status(&self) -> HashMap<GoalStatus, usize> {
        let mut counts = HashMap::new();
        for goal in &self.goals {
            *counts.entry(goal.status).or_insert(0) += 1;
        }
        counts
    }

    pub fn active(&self) -> impl Iterator<Item = &Goal> {
        self.goals
            .iter()
            .filter(|g| g.status == GoalStatus::Active)
    }

    pub fn serialize(&self) -> String {
        let mut goals: Vec<&Goal> = self.goals.iter().collect();
        goals.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));

        let mut out = String::from("# Goals\n");
        for goal in goals {
            out.push_str(&format!("\n## {}\n", goal.title.replace('\n', " ")));
            out.push_str(&format!("- id: {}\n", goal.id));
            out.push_str(&format!("- status: {}\n", goal.status.as_str()));
            out.push_str(&format!("- created: {}\n", goal.created_at.to_rfc3339()));
            out.push_str(&format!("- updated: {}\n", goal.updated_at.to_rfc3339()));
            if !goal.tags.is_empty() {
                out.push_str(&format!("- tags: {}\n", goal.tags.join(", ")));
            }
            if !goal.progress.is_empty() {
                out.push_str("\n### Progress\n");
                for entry in &goal.progress {
                    out.push_str(&format!(
                        "- [{}] ({}) {}\n",
                        entry.at.to_rfc3339(),
                        entry.source.as_str(),
                        entry.note
                    ));
                }
            }
        }
        out
    }

    pub fn parse(content: &str) -> GoalsState {
        let mut state = GoalsState::default();
        let mut current: Option<Goal> = None;
        let mut in_progress = false;

        for line in content.lines() {
            if let Some(title) = line.strip_prefix("## ") {
                if let Some(goal) = current.take() {
                    state.goals.push(goal);
                }
                current = Some(Goal::new(title.trim()));
                in_progress = false;
                continue;
            }
            if line.trim() == "### Progress" {
                in_progress = true;
                continue;
            }
            let Some(goal) = current.as_mut() else {
                continue;
            };
            let Some(item) = line.trim().strip_prefix("- ") else {
                continue;
            };

            if in_progress {
                if let Some(entry) = parse_progress_line(item) {
                    goal.progress.push(entry);
                }
                continue;
            }

            if let Some((key, value)) = item.split_once(':') {
                let value = value.trim();
                match key.trim() {
                    "id" => goal.id = value.to_string(),
                    "status" => {
                        if let Some(status) = GoalStatus::parse(value) {
                            goal.status = status;
                        }
                    }
                    "created" => {
                        if let Ok(at) = DateTime::parse_from_rfc3339(value) {
                            goal.created_at = at.with_timezone(&Utc);
                        }
                    }
                    "updated" => {
                        if let Ok(at) = DateTime::parse_from_rfc3339(value) {
                            goal.updated_at = at.with_timezone(&Utc);
                        }
                    }
                    "tags" => {
                        goal.tags = value
                            .split(',')
                            .map(|t| t.trim().to_string())
                            .filter(|t| !t.is_empty())
                            .take(MAX_TAGS)
                            .collect();
                    }
                    _ => {}
                }
            }
        }
        if let Some(goal) = current {
            state.goals.push(goal);
        }
        state
    }
}

fn parse_progress_line(item: &str) -> Option<ProgressEntry> {
    // - [iso] (source) note
    let rest = item.strip_prefix('[')?;
    let (ts, rest) = rest.split_once(']')?;
    let rest = rest.trim().strip_prefix('(')?;
    let (source, note) = rest.split_once(')')?;

    Some(ProgressEntry {
        at: DateTime::parse_from_rfc3339(ts.trim())
            .ok()?
            .with_timezone(&Utc),
        source: ProgressSource::parse(source)?,
        note: note.trim().to_string(),
    })
}

/// Disk-backed goal store.
pub struct GoalStore {
    path: PathBuf,
}

impl GoalStore {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unreadable or missing file is an empty state.
    pub async fn load(&self) -> GoalsState {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => GoalsState::parse(&content),
            Err(_) => GoalsState::default(),
        }
    }

    pub async fn save(&self, state: &GoalsState) -> Result<()> {
        atomic_write(&self.path, &state.serialize())
            .await
            .with_context(|| format!("Failed to write {}", self.path.display()))?;
        debug!("[MEM] goals saved ({} goals)", state.goals.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_up_to_update_order() {
        let mut state = GoalsState::default();
        let mut goal = Goal::new("ship the dashboard by Friday");
        goal.add_tags(&["dashboard".to_string(), "launch".to_string()]);
        goal.push_progress(ProgressSource::User, "We need to ship the dashboard by Friday");
        state.goals.push(goal);

        let mut second = Goal::new("write weekly report");
        second.status = GoalStatus::Paused;
        state.goals.push(second);

        let parsed = GoalsState::parse(&state.serialize());
        assert_eq!(parsed.goals.len(), 2);

        let dashboard = parsed
            .find_equivalent("ship the dashboard by Friday")
            .unwrap();
        assert_eq!(dashboard.status, GoalStatus::Active);
        assert_eq!(dashboard.tags, vec!["dashboard", "launch"]);
        assert_eq!(dashboard.progress.len(), 1);
        assert_eq!(dashboard.progress[0].source, ProgressSource::User);

        let report = parsed.find_equivalent("write weekly report").unwrap();
        assert_eq!(report.status, GoalStatus::Paused);
    }

    #[test]
    fn test_progress_cap_drops_oldest() {
        let mut goal = Goal::new("long-running goal");
        for i in 0..30 {
            goal.push_progress(ProgressSource::System, &format!("step {}", i));
        }
        assert_eq!(goal.progress.len(), MAX_PROGRESS);
        assert_eq!(goal.progress[0].note, "step 6");
        assert_eq!(goal.progress.last().unwrap().note, "step 29");
    }

    #[test]
    fn test_progress_notes_replace_pipes() {
        let mut goal = Goal::new("g");
        goal.push_progress(ProgressSource::User, "a | b");
        assert_eq!(goal.progress[0].note, "a / b");
    }

    #[test]
    fn test_tag_cap() {
        let mut goal = Goal::new("g");
        let tags: Vec<String> = (0..20).map(|i| format!("tag{}", i)).collect();
        goal.add_tags(&tags);
        assert_eq!(goal.tags.len(), MAX_TAGS);
    }

    #[tokio::test]
    async fn test_store_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = GoalStore::new(dir.path().join("goals/goals.md"));
        assert!(store.load().await.goals.is_empty());
    }
}
