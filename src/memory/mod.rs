// src/memory/mod.rs
// Layered memory manager: semantic/procedural/episodic markdown stores,
// persistent goals, deterministic per-turn extraction, and the compaction
// flush. Writers are serialized per manager; readers feed prompts and may
// observe an earlier snapshot.

pub mod extraction;
pub mod goals;
pub mod store;
pub mod summarize;
pub mod text;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

use crate::config::MemoryConfig;
use crate::llm::{ChatMessage, LlmClient};
use crate::resilience::{ResiliencePolicy, ResilientExecutor};
use crate::utils::atomic_write;

use extraction::{detect_status_change, extract_turn};
use goals::{GoalStatus, GoalStore, GoalsState, ProgressSource};
use store::{AppendOutcome, EpisodicStore, SectionedStore};
use text::{bullets_equivalent, first_sentence, jaccard};

const COMPACTION_PAIR_LIMIT: usize = 40;
const PROGRESS_OVERLAP_THRESHOLD: f64 = 0.12;

pub const SEMANTIC_SECTIONS: [&str; 3] = ["User Preferences", "Known Facts", "Workflow Notes"];
pub const PROCEDURAL_SECTIONS: [&str; 2] = ["Operating Rules", "Learned Behaviors"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryHealth {
    pub writes: HashMap<String, u64>,
    pub duplicate_skips: u64,
    pub errors: u64,
    pub last_write_at: Option<DateTime<Utc>>,
    pub goals_by_status: HashMap<String, usize>,
}

#[derive(Default)]
struct WriteMetrics {
    writes: HashMap<String, u64>,
    last_write_at: Option<DateTime<Utc>>,
}

pub struct MemoryManager {
    config: MemoryConfig,
    semantic: SectionedStore,
    procedural: SectionedStore,
    episodic: EpisodicStore,
    goal_store: GoalStore,
    session_context_path: PathBuf,
    llm: Arc<dyn LlmClient>,
    summarizer: ResilientExecutor,

    /// Serializes all store writes; one lock for the whole manager keeps
    /// goal read-modify-write atomic too.
    write_lock: tokio::sync::Mutex<()>,

    metrics: Mutex<WriteMetrics>,
    duplicate_skips: AtomicU64,
    errors: AtomicU64,
    turn_counter: AtomicU64,
}

impl MemoryManager {
    pub fn new(
        config: MemoryConfig,
        llm: Arc<dyn LlmClient>,
        summarizer_policy: ResiliencePolicy,
    ) -> Self {
        let root = config.data_dir.clone();
        Self {
            semantic: SectionedStore::new(
                root.join("semantic/memory.md"),
                "Semantic Memory",
                &SEMANTIC_SECTIONS,
            ),
            procedural: SectionedStore::new(
                root.join("procedural/rules.md"),
                "Procedural Memory",
                &PROCEDURAL_SECTIONS,
            ),
            episodic: EpisodicStore::new(root.join("episodic")),
            goal_store: GoalStore::new(root.join("goals/goals.md")),
            session_context_path: root.join("semantic/session_context.md"),
            llm,
            summarizer: ResilientExecutor::new(summarizer_policy),
            write_lock: tokio::sync::Mutex::new(()),
            metrics: Mutex::new(WriteMetrics::default()),
            duplicate_skips: AtomicU64::new(0),
            errors: AtomicU64::new(0),
            turn_counter: AtomicU64::new(0),
            config,
        }
    }

    fn record_write(&self, store: &str) {
        let mut metrics = self.metrics.lock();
        *metrics.writes.entry(store.to_string()).or_insert(0) += 1;
        metrics.last_write_at = Some(Utc::now());
    }

    fn record_outcome(&self, store: &str, outcome: AppendOutcome) {
        match outcome {
            AppendOutcome::Appended => self.record_write(store),
            AppendOutcome::Duplicate => {
                self.duplicate_skips.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn record_error(&self, context: &str, e: &anyhow::Error) {
        warn!("[MEM] {} failed: {}", context, e);
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    // ---- Bootstrap context -------------------------------------------------

    /// Memory blocks injected at the top of every system prompt.
    pub async fn bootstrap_context(&self) -> String {
        let mut blocks = Vec::new();

        let semantic = self.semantic.read_all().await;
        if !semantic.trim().is_empty() {
            blocks.push(format!("=== SEMANTIC MEMORY (durable facts) ===\n{}", semantic.trim()));
        }

        let procedural = self.procedural.read_all().await;
        if !procedural.trim().is_empty() {
            blocks.push(format!(
                "=== PROCEDURAL MEMORY (operating rules) ===\n{}",
                procedural.trim()
            ));
        }

        let goals = self.goal_store.load().await;
        if !goals.goals.is_empty() {
            blocks.push(format!(
                "=== PERSISTENT GOALS ===\n{}",
                goals.serialize().trim()
            ));
        }

        let episodes = self.episodic.recent(self.config.max_recent_episodes).await;
        if !episodes.is_empty() {
            let joined = episodes
                .iter()
                .map(|(_, content)| content.trim())
                .collect::<Vec<_>>()
                .join("\n\n");
            blocks.push(format!("=== EPISODIC MEMORY (recent days) ===\n{}", joined));
        }

        let session = tokio::fs::read_to_string(&self.session_context_path)
            .await
            .unwrap_or_default();
        if !session.trim().is_empty() {
            blocks.push(format!("=== ACTIVE SESSION CONTEXT ===\n{}", session.trim()));
        }

        blocks.join("\n\n")
    }

    // ---- Per-turn extraction ----------------------------------------------

    /// Deterministic extraction for one (user, assistant) exchange. Failures
    /// are swallowed and counted; this is fired after the reply is returned.
    pub async fn process_turn(&self, user_text: &str, assistant_reply: &str, tools_used: &[String]) {
        let _guard = self.write_lock.lock().await;

        self.apply_extraction(user_text, assistant_reply).await;

        // Periodic episodic digest
        let turn = self.turn_counter.fetch_add(1, Ordering::SeqCst) + 1;
        if turn % self.config.extract_every_n_turns as u64 == 0 {
            let approach = if tools_used.is_empty() {
                "direct reply".to_string()
            } else {
                tools_used.join(", ")
            };
            let line = format!(
                "Task: {} | Approach: {} | Outcome: {}",
                first_sentence(user_text, 80).replace('|', "/"),
                approach,
                first_sentence(assistant_reply, 100).replace('|', "/")
            );
            match self.episodic.append_unique(&line).await {
                Ok(outcome) => self.record_outcome("episodic", outcome),
                Err(e) => self.record_error("episodic digest", &e),
            }
        }
    }

    /// Goal upsert + progress + preference and rule mining. Caller holds the
    /// write lock.
    async fn apply_extraction(&self, user_text: &str, assistant_reply: &str) {
        let extraction = extract_turn(user_text);
        let turn_text = format!("{}\n{}", user_text, assistant_reply);

        // Goals: load once, mutate, save once if anything changed.
        let mut goals = self.goal_store.load().await;
        let mut dirty = false;

        for candidate in &extraction.goal_candidates {
            let note = first_sentence(user_text, goals::PROGRESS_NOTE_MAX_CHARS);
            match goals.find_equivalent_mut(candidate) {
                Some(goal) => {
                    // Reaffirmation reactivates and refreshes the timestamp.
                    goal.status = GoalStatus::Active;
                    goal.updated_at = Utc::now();
                    if !goal.progress.iter().any(|p| bullets_equivalent(&p.note, &note)) {
                        goal.push_progress(ProgressSource::User, &note);
                    }
                    dirty = true;
                }
                None => {
                    let mut goal = goals::Goal::new(candidate);
                    goal.push_progress(ProgressSource::User, &note);
                    goals.goals.push(goal);
                    dirty = true;
                    debug!("[MEM] new goal: {}", candidate);
                }
            }
        }

        // Progress on active goals touched by this turn
        let status_change = detect_status_change(&turn_text);
        let assistant_note = first_sentence(assistant_reply, goals::PROGRESS_NOTE_MAX_CHARS);
        for goal in goals.goals.iter_mut() {
            if goal.status != GoalStatus::Active {
                continue;
            }
            if jaccard(&goal.title, &turn_text) < PROGRESS_OVERLAP_THRESHOLD {
                continue;
            }
            if !assistant_note.is_empty()
                && !goal
                    .progress
                    .iter()
                    .any(|p| bullets_equivalent(&p.note, &assistant_note))
            {
                goal.push_progress(ProgressSource::Assistant, &assistant_note);
                dirty = true;
            }
            if let Some(status) = status_change {
                goal.status = status;
                goal.updated_at = Utc::now();
                dirty = true;
            }
        }

        if dirty {
            match self.goal_store.save(&goals).await {
                Ok(()) => self.record_write("goals"),
                Err(e) => self.record_error("goal save", &e),
            }
        }

        // Preferences
        for bullet in &extraction.preferences {
            match self.semantic.append_unique("User Preferences", bullet).await {
                Ok(outcome) => self.record_outcome("semantic", outcome),
                Err(e) => self.record_error("preference write", &e),
            }
        }

        // Learned behaviors
        for rule in &extraction.rules {
            match self
                .procedural
                .append_unique("Learned Behaviors", rule)
                .await
            {
                Ok(outcome) => self.record_outcome("procedural", outcome),
                Err(e) => self.record_error("rule write", &e),
            }
        }
    }

    // ---- Compaction flush --------------------------------------------------

    /// Pre-compaction flush: re-run extraction over the trailing history,
    /// then replace the session-context carry-over.
    pub async fn flush_before_compaction(&self, history: &[ChatMessage]) {
        let pairs = summarize::turn_pairs(history, COMPACTION_PAIR_LIMIT);
        debug!("[MEM] compaction flush over {} pairs", pairs.len());

        {
            let _guard = self.write_lock.lock().await;
            for (user, assistant) in &pairs {
                self.apply_extraction(user, assistant).await;
            }
        }

        let goals = self.goal_store.load().await;
        let summary = summarize::build_session_summary(
            &self.llm,
            &self.summarizer,
            &self.config.summary_model,
            &pairs,
            &goals,
        )
        .await;

        let _guard = self.write_lock.lock().await;
        match atomic_write(&self.session_context_path, &summary).await {
            Ok(()) => self.record_write("session"),
            Err(e) => self.record_error("session context write", &e),
        }
    }

    // ---- Tool-callable operations ------------------------------------------

    /// `write_memory_entry` tool: append to the semantic or procedural store.
    pub async fn write_memory_entry(
        &self,
        store: &str,
        content: &str,
        section: Option<&str>,
    ) -> String {
        let target = match store {
            "semantic" => &self.semantic,
            "procedural" => &self.procedural,
            other => return format!("Error: unknown store '{}'", other),
        };
        let section = match section {
            Some(s) if target.has_section(s) => s.to_string(),
            Some(s) => return format!("Error: unknown section '{}' for {} store", s, store),
            None => target.default_section().to_string(),
        };

        let _guard = self.write_lock.lock().await;
        match target.append_unique(&section, content).await {
            Ok(AppendOutcome::Appended) => {
                self.record_write(store);
                format!("Saved to {} memory ({})", store, section)
            }
            Ok(AppendOutcome::Duplicate) => {
                self.duplicate_skips.fetch_add(1, Ordering::Relaxed);
                "Already noted".to_string()
            }
            Err(e) => {
                self.record_error("write_memory_entry", &e);
                format!("Error: {}", e)
            }
        }
    }

    /// `write_goal_entry` tool: upsert a goal with optional progress note,
    /// status, and tags.
    pub async fn write_goal_entry(
        &self,
        title: &str,
        progress: Option<&str>,
        status: Option<&str>,
        tags: &[String],
    ) -> String {
        if title.trim().is_empty() {
            return "Error: goal title is empty".to_string();
        }
        let status = match status {
            Some(s) => match GoalStatus::parse(s) {
                Some(parsed) => Some(parsed),
                None => return format!("Error: unknown status '{}'", s),
            },
            None => None,
        };

        let _guard = self.write_lock.lock().await;
        let mut goals = self.goal_store.load().await;

        let (id, created) = match goals.find_equivalent_mut(title) {
            Some(goal) => {
                goal.updated_at = Utc::now();
                if let Some(status) = status {
                    goal.status = status;
                }
                goal.add_tags(tags);
                if let Some(note) = progress {
                    goal.push_progress(ProgressSource::Assistant, note);
                }
                (goal.id.clone(), false)
            }
            None => {
                let mut goal = goals::Goal::new(title);
                if let Some(status) = status {
                    goal.status = status;
                }
                goal.add_tags(tags);
                if let Some(note) = progress {
                    goal.push_progress(ProgressSource::Assistant, note);
                }
                let id = goal.id.clone();
                goals.goals.push(goal);
                (id, true)
            }
        };

        match self.goal_store.save(&goals).await {
            Ok(()) => {
                self.record_write("goals");
                if created {
                    format!("Goal recorded ({})", id)
                } else {
                    format!("Goal updated ({})", id)
                }
            }
            Err(e) => {
                self.record_error("write_goal_entry", &e);
                format!("Error: {}", e)
            }
        }
    }

    /// `remember_this` tool: durable fact + goal upsert + episodic note.
    pub async fn remember_this(&self, content: &str) -> String {
        if content.trim().is_empty() {
            return "Error: nothing to remember".to_string();
        }

        let _guard = self.write_lock.lock().await;

        let outcome = match self.semantic.append_unique("Known Facts", content).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.record_error("remember_this", &e);
                return format!("Error: {}", e);
            }
        };

        if outcome == AppendOutcome::Duplicate {
            self.duplicate_skips.fetch_add(1, Ordering::Relaxed);
            return "Already remembered".to_string();
        }
        self.record_write("semantic");

        // A remembered statement that reads like a goal also lands there.
        let candidates = extraction::extract_goal_candidates(content);
        if !candidates.is_empty() {
            let mut goals = self.goal_store.load().await;
            for candidate in &candidates {
                if goals.find_equivalent(candidate).is_none() {
                    let mut goal = goals::Goal::new(candidate);
                    goal.push_progress(ProgressSource::User, content);
                    goals.goals.push(goal);
                }
            }
            if let Err(e) = self.goal_store.save(&goals).await {
                self.record_error("remember_this goals", &e);
            } else {
                self.record_write("goals");
            }
        }

        let line = format!("Remembered: {}", first_sentence(content, 120).replace('|', "/"));
        match self.episodic.append_unique(&line).await {
            Ok(outcome) => self.record_outcome("episodic", outcome),
            Err(e) => self.record_error("remember_this episodic", &e),
        }

        "Remembered".to_string()
    }

    /// Append a line to today's episodic log (turn epilogue).
    pub async fn log_episode(&self, line: &str) {
        let _guard = self.write_lock.lock().await;
        match self.episodic.append_unique(line).await {
            Ok(outcome) => self.record_outcome("episodic", outcome),
            Err(e) => self.record_error("log_episode", &e),
        }
    }

    pub async fn health(&self) -> MemoryHealth {
        let goals = self.goal_store.load().await;
        let metrics = self.metrics.lock();
        MemoryHealth {
            writes: metrics.writes.clone(),
            duplicate_skips: self.duplicate_skips.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            last_write_at: metrics.last_write_at,
            goals_by_status: goals
                .counts_by_status()
                .into_iter()
                .map(|(k, v)| (k.as_str().to_string(), v))
                .collect(),
        }
    }
}
