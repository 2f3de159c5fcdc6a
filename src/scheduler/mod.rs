// src/scheduler/mod.rs
// Tick-driven scheduler: recurring reminders with persisted next-run state,
// one-shot reminders with at-most-once dispatch, a synthetic self-heartbeat,
// and a re-entrancy guard keyed by reminder id.

pub mod state;

pub use state::{OneTimeReminder, SchedulerState, StateFile};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::{HeartbeatConfig, ReminderConfig, SchedulerConfig};
use crate::queue::{Lane, TaskReply};
use crate::resilience::{OpMetrics, ResiliencePolicy, ResilientExecutor};

pub const HEARTBEAT_ID: &str = "self-heartbeat";
const HISTORY_CAP: usize = 50;
const MIN_ONE_TIME_LEAD_MS: i64 = 2_000;

/// Wall clock seam so ticks can be driven deterministically in tests.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> i64;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Runs a reminder prompt through the agent path (lane queue + agent loop).
/// The scheduler only enqueues; it never executes a turn inline.
pub type ReminderRunner =
    Arc<dyn Fn(String, Lane) -> BoxFuture<'static, anyhow::Result<TaskReply>> + Send + Sync>;

#[derive(Debug, Clone, Serialize)]
pub struct SchedulerHealth {
    pub ticks: u64,
    pub runs_started: u64,
    pub runs_succeeded: u64,
    pub runs_failed: u64,
    pub last_tick_at: Option<DateTime<Utc>>,
    pub running: Vec<String>,
    pub one_time_pending: usize,
    pub heartbeat: HeartbeatConfig,
    pub ops: HashMap<String, OpMetrics>,
}

pub struct Scheduler {
    tick_seconds: u64,
    reminders: Vec<ReminderConfig>,
    state_file: StateFile,
    /// Serializes state mutation with its persistence write.
    state: tokio::sync::Mutex<SchedulerState>,
    /// Reminder ids with a run in flight; one concurrent run per id.
    running: Mutex<HashSet<String>>,
    executor: ResilientExecutor,
    runner: ReminderRunner,
    history: Mutex<VecDeque<String>>,
    tick_handle: Mutex<Option<JoinHandle<()>>>,
    clock: Arc<dyn Clock>,

    ticks: AtomicU64,
    runs_started: AtomicU64,
    runs_succeeded: AtomicU64,
    runs_failed: AtomicU64,
    last_tick_at: Mutex<Option<DateTime<Utc>>>,
}

impl Scheduler {
    pub async fn new(
        config: SchedulerConfig,
        state_path: std::path::PathBuf,
        policy: ResiliencePolicy,
        runner: ReminderRunner,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let state_file = StateFile::new(state_path);
        let mut state = state_file.load().await;

        // A fresh state file adopts the configured heartbeat.
        if state.next_run_by_id.is_empty() && state.one_time_reminders.is_empty() {
            state.heartbeat = config.heartbeat.clone();
        }

        // Duplicate configured reminder ids collapse, last wins.
        let mut reminders: Vec<ReminderConfig> = Vec::new();
        for reminder in config.reminders {
            reminders.retain(|r| r.id != reminder.id);
            reminders.push(reminder);
        }

        // Drop next-run entries for disabled or unknown reminders. A
        // reminder that comes back later reinitializes from its first tick
        // instead of firing off a stale timestamp.
        state.next_run_by_id.retain(|id, _| {
            id == HEARTBEAT_ID || reminders.iter().any(|r| r.id == *id && r.enabled)
        });

        Arc::new(Self {
            tick_seconds: config.tick_seconds.max(1),
            reminders,
            state_file,
            state: tokio::sync::Mutex::new(state),
            running: Mutex::new(HashSet::new()),
            executor: ResilientExecutor::new(policy),
            runner,
            history: Mutex::new(VecDeque::new()),
            tick_handle: Mutex::new(None),
            clock,
            ticks: AtomicU64::new(0),
            runs_started: AtomicU64::new(0),
            runs_succeeded: AtomicU64::new(0),
            runs_failed: AtomicU64::new(0),
            last_tick_at: Mutex::new(None),
        })
    }

    // ---- Lifecycle ---------------------------------------------------------

    pub fn start(self: &Arc<Self>) {
        let mut handle = self.tick_handle.lock();
        if handle.is_some() {
            warn!("[SCHED] start called twice, ignoring");
            return;
        }

        let scheduler = Arc::clone(self);
        *handle = Some(tokio::spawn(async move {
            info!(
                "[SCHED] started (tick every {}s, {} configured reminders)",
                scheduler.tick_seconds,
                scheduler.reminders.len()
            );
            let mut interval =
                tokio::time::interval(std::time::Duration::from_secs(scheduler.tick_seconds));
            // A late tick still processes everything due since the last one.
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                interval.tick().await;
                scheduler.tick().await;
            }
        }));
    }

    pub fn stop(&self) {
        if let Some(handle) = self.tick_handle.lock().take() {
            handle.abort();
            info!("[SCHED] stopped");
        }
    }

    // ---- Tick --------------------------------------------------------------

    /// One due-time evaluation pass. Driven by the tick loop; callable
    /// directly for deterministic tests.
    pub async fn tick(self: &Arc<Self>) {
        let now = self.clock.now_ms();
        self.ticks.fetch_add(1, Ordering::Relaxed);
        *self.last_tick_at.lock() = Some(Utc::now());

        if let Err(e) = self.tick_recurring(now).await {
            error!("[SCHED][ERROR] recurring pass: {}", e);
        }
        if let Err(e) = self.tick_one_time(now).await {
            error!("[SCHED][ERROR] one-time pass: {}", e);
        }
    }

    /// Effective recurring set: enabled configured reminders plus the
    /// synthetic heartbeat.
    async fn effective_reminders(&self) -> Vec<ReminderConfig> {
        let mut set: Vec<ReminderConfig> = self
            .reminders
            .iter()
            .filter(|r| r.enabled && r.interval_minutes >= 1)
            .cloned()
            .collect();

        let heartbeat = self.state.lock().await.heartbeat.clone();
        if heartbeat.enabled {
            set.push(ReminderConfig {
                id: HEARTBEAT_ID.to_string(),
                prompt: heartbeat.prompt,
                interval_minutes: heartbeat.interval_minutes.max(1),
                lane: Lane::Background,
                enabled: true,
            });
        }
        set
    }

    async fn tick_recurring(self: &Arc<Self>, now: i64) -> anyhow::Result<()> {
        for reminder in self.effective_reminders().await {
            let interval_ms = reminder.interval_minutes as i64 * 60_000;
            let due = {
                let mut state = self.state.lock().await;
                match state.next_run_by_id.get(&reminder.id).copied() {
                    None => {
                        // First sighting initializes the schedule without
                        // running.
                        state
                            .next_run_by_id
                            .insert(reminder.id.clone(), now + interval_ms);
                        self.state_file.save(&mut state).await?;
                        debug!(
                            "[SCHED] {}: initialized next run in {}m",
                            reminder.id, reminder.interval_minutes
                        );
                        false
                    }
                    Some(next_run) if now < next_run => false,
                    Some(_) => {
                        state
                            .next_run_by_id
                            .insert(reminder.id.clone(), now + interval_ms);
                        self.state_file.save(&mut state).await?;
                        true
                    }
                }
            };

            if due {
                self.spawn_run(reminder.id.clone(), reminder.prompt.clone(), reminder.lane);
            }
        }
        Ok(())
    }

    async fn tick_one_time(self: &Arc<Self>, now: i64) -> anyhow::Result<()> {
        loop {
            // Remove-then-dispatch, one at a time, persisting between: a
            // crash after the save drops the reminder (at-most-once).
            let next = {
                let mut state = self.state.lock().await;
                let position = state.one_time_reminders.iter().position(|r| {
                    r.enabled && now >= r.run_at_ms && !self.running.lock().contains(&r.id)
                });
                match position {
                    Some(i) => {
                        let reminder = state.one_time_reminders.remove(i);
                        self.state_file.save(&mut state).await?;
                        Some(reminder)
                    }
                    None => None,
                }
            };

            match next {
                Some(reminder) => {
                    self.spawn_run(reminder.id, reminder.prompt, reminder.lane);
                }
                None => return Ok(()),
            }
        }
    }

    /// Launch one reminder run unless that id is already in flight.
    fn spawn_run(self: &Arc<Self>, id: String, prompt: String, lane: Lane) {
        {
            let mut running = self.running.lock();
            if !running.insert(id.clone()) {
                debug!("[SCHED] {}: already running, skipped", id);
                return;
            }
        }
        self.runs_started.fetch_add(1, Ordering::Relaxed);

        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            let op = format!("scheduler:{}", id);
            let runner = scheduler.runner.clone();
            let run_prompt = prompt.clone();
            let result = scheduler
                .executor
                .execute(&op, move || runner(run_prompt.clone(), lane))
                .await;

            match result {
                Ok(reply) => {
                    scheduler.runs_succeeded.fetch_add(1, Ordering::Relaxed);
                    let mut history = scheduler.history.lock();
                    history.push_back(reply.reply);
                    while history.len() > HISTORY_CAP {
                        history.pop_front();
                    }
                }
                Err(e) => {
                    scheduler.runs_failed.fetch_add(1, Ordering::Relaxed);
                    error!("[SCHED][ERROR] {}: {}", id, e);
                }
            }

            scheduler.running.lock().remove(&id);
        });
    }

    // ---- Public operations -------------------------------------------------

    /// Enable the heartbeat. Clears its next-run entry so the next tick
    /// reinitializes the schedule from now.
    pub async fn set_heartbeat(&self, minutes: u64, prompt: Option<String>) {
        let minutes = minutes.max(1);
        let mut state = self.state.lock().await;
        state.heartbeat.enabled = true;
        state.heartbeat.interval_minutes = minutes;
        if let Some(prompt) = prompt {
            state.heartbeat.prompt = prompt;
        }
        state.next_run_by_id.remove(HEARTBEAT_ID);
        if let Err(e) = self.state_file.save(&mut state).await {
            error!("[SCHED][ERROR] heartbeat persist: {}", e);
        }
        info!("[SCHED] heartbeat enabled every {}m", minutes);
    }

    pub async fn disable_heartbeat(&self) {
        let mut state = self.state.lock().await;
        state.heartbeat.enabled = false;
        state.next_run_by_id.remove(HEARTBEAT_ID);
        if let Err(e) = self.state_file.save(&mut state).await {
            error!("[SCHED][ERROR] heartbeat persist: {}", e);
        }
        info!("[SCHED] heartbeat disabled");
    }

    pub async fn heartbeat(&self) -> HeartbeatConfig {
        self.state.lock().await.heartbeat.clone()
    }

    /// Schedule a one-shot reminder `minutes` from now.
    pub async fn schedule_one_time_in(
        &self,
        minutes: u64,
        prompt: &str,
        lane: Lane,
    ) -> anyhow::Result<String> {
        if minutes < 1 {
            anyhow::bail!("one-time reminders need at least one minute of lead time");
        }
        let run_at_ms = self.clock.now_ms() + minutes as i64 * 60_000;
        self.schedule_one_time_at(run_at_ms, prompt, lane).await
    }

    /// Schedule a one-shot reminder at an absolute epoch-ms time, which must
    /// be more than two seconds out.
    pub async fn schedule_one_time_at(
        &self,
        run_at_ms: i64,
        prompt: &str,
        lane: Lane,
    ) -> anyhow::Result<String> {
        let now = self.clock.now_ms();
        if run_at_ms <= now + MIN_ONE_TIME_LEAD_MS {
            anyhow::bail!("one-time reminder must be scheduled more than 2s out");
        }

        let id = uuid::Uuid::new_v4().to_string();
        let mut state = self.state.lock().await;
        state.one_time_reminders.push(OneTimeReminder {
            id: id.clone(),
            prompt: prompt.to_string(),
            run_at_ms,
            lane,
            enabled: true,
        });
        self.state_file.save(&mut state).await?;
        info!("[SCHED] one-time {} scheduled for +{}s", id, (run_at_ms - now) / 1000);
        Ok(id)
    }

    pub async fn cancel_one_time(&self, id: &str) -> bool {
        let mut state = self.state.lock().await;
        let before = state.one_time_reminders.len();
        state.one_time_reminders.retain(|r| r.id != id);
        let removed = state.one_time_reminders.len() < before;
        if removed {
            if let Err(e) = self.state_file.save(&mut state).await {
                error!("[SCHED][ERROR] cancel persist: {}", e);
            }
        }
        removed
    }

    pub async fn list_one_time(&self) -> Vec<OneTimeReminder> {
        let mut state = self.state.lock().await;
        state.sort_one_time();
        state.one_time_reminders.clone()
    }

    /// Rolling history of scheduler-run assistant replies (newest last).
    pub fn assistant_history(&self) -> Vec<String> {
        self.history.lock().iter().cloned().collect()
    }

    pub fn is_running(&self, id: &str) -> bool {
        self.running.lock().contains(id)
    }

    pub async fn health_metrics(&self) -> SchedulerHealth {
        let state = self.state.lock().await;
        SchedulerHealth {
            ticks: self.ticks.load(Ordering::Relaxed),
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: self.runs_succeeded.load(Ordering::Relaxed),
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            last_tick_at: *self.last_tick_at.lock(),
            running: self.running.lock().iter().cloned().collect(),
            one_time_pending: state.one_time_reminders.len(),
            heartbeat: state.heartbeat.clone(),
            ops: self.executor.snapshot(),
        }
    }

    /// Current persisted next-run map (read-only snapshot).
    pub async fn next_runs(&self) -> HashMap<String, i64> {
        self.state.lock().await.next_run_by_id.clone()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.tick_handle.lock().take() {
            handle.abort();
        }
    }
}
