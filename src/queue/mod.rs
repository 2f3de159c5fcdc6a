// src/queue/mod.rs
// Lane-based task queue: per-class FIFO with a fixed concurrency cap.
// Lanes never steal work from each other.

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{debug, error};

use crate::llm::ChatMessage;

/// Named concurrency class. Caps are configuration, not runtime-tunable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Lane {
    Fast,
    Slow,
    #[default]
    Background,
}

impl Lane {
    pub fn cap(self) -> usize {
        match self {
            Lane::Fast => 2,
            Lane::Slow => 1,
            Lane::Background => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Lane::Fast => "fast",
            Lane::Slow => "slow",
            Lane::Background => "background",
        }
    }

    pub fn all() -> [Lane; 3] {
        [Lane::Fast, Lane::Slow, Lane::Background]
    }

    pub fn parse(s: &str) -> Option<Lane> {
        match s {
            "fast" => Some(Lane::Fast),
            "slow" => Some(Lane::Slow),
            "background" => Some(Lane::Background),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Completed,
    Failed,
}

/// What a submitted job resolves to on success.
#[derive(Debug, Clone, Default)]
pub struct TaskReply {
    pub reply: String,
    pub history: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct TaskResult {
    pub id: String,
    pub lane: Lane,
    pub reply: String,
    pub history: Vec<ChatMessage>,
    pub status: TaskStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

/// Observable per-lane counters. Strictly consistent within a lane.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LaneCounters {
    /// Currently running
    pub pending: usize,
    /// Waiting in the FIFO
    pub queued: usize,
}

type Job = BoxFuture<'static, anyhow::Result<TaskReply>>;

struct QueuedTask {
    id: String,
    job: Job,
    reply_tx: oneshot::Sender<TaskResult>,
}

#[derive(Default)]
struct LaneState {
    running: usize,
    waiting: VecDeque<QueuedTask>,
}

/// Lane queue shared by every submitter (user turns and scheduler runs).
pub struct LaneQueue {
    lanes: HashMap<Lane, Mutex<LaneState>>,
}

impl LaneQueue {
    pub fn new() -> Arc<Self> {
        let lanes = Lane::all()
            .into_iter()
            .map(|lane| (lane, Mutex::new(LaneState::default())))
            .collect();
        Arc::new(Self { lanes })
    }

    /// Submit a job to a lane. The returned receiver resolves to the task's
    /// result; it never errors (job failures become `TaskStatus::Failed`).
    /// There is no cancellation.
    pub fn submit(
        self: &Arc<Self>,
        lane: Lane,
        job: impl std::future::Future<Output = anyhow::Result<TaskReply>> + Send + 'static,
    ) -> oneshot::Receiver<TaskResult> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let task = QueuedTask {
            id: uuid::Uuid::new_v4().to_string(),
            job: Box::pin(job),
            reply_tx,
        };

        {
            let mut state = self.lanes[&lane].lock();
            state.waiting.push_back(task);
            debug!(
                "[QUEUE] {}: queued task ({} running, {} waiting)",
                lane.as_str(),
                state.running,
                state.waiting.len()
            );
        }
        self.dispatch(lane);

        reply_rx
    }

    /// Start queued tasks while the lane is under its cap.
    fn dispatch(self: &Arc<Self>, lane: Lane) {
        loop {
            let task = {
                let mut state = self.lanes[&lane].lock();
                if state.running >= lane.cap() {
                    return;
                }
                match state.waiting.pop_front() {
                    Some(task) => {
                        state.running += 1;
                        task
                    }
                    None => return,
                }
            };

            let queue = Arc::clone(self);
            tokio::spawn(async move {
                queue.run_task(lane, task).await;
            });
        }
    }

    async fn run_task(self: Arc<Self>, lane: Lane, task: QueuedTask) {
        let started_at = Utc::now();
        let task_id = task.id.clone();

        // Run the job in its own task so a panic is contained and reported
        // as a failed result.
        let outcome = tokio::spawn(task.job).await;

        let result = match outcome {
            Ok(Ok(reply)) => TaskResult {
                id: task_id,
                lane,
                reply: reply.reply,
                history: reply.history,
                status: TaskStatus::Completed,
                error: None,
                started_at,
                completed_at: Utc::now(),
            },
            Ok(Err(e)) => {
                error!("[QUEUE] {}: task failed: {}", lane.as_str(), e);
                TaskResult {
                    id: task_id,
                    lane,
                    reply: String::new(),
                    history: Vec::new(),
                    status: TaskStatus::Failed,
                    error: Some(e.to_string()),
                    started_at,
                    completed_at: Utc::now(),
                }
            }
            Err(join_err) => {
                error!("[QUEUE] {}: task panicked: {}", lane.as_str(), join_err);
                TaskResult {
                    id: task_id,
                    lane,
                    reply: String::new(),
                    history: Vec::new(),
                    status: TaskStatus::Failed,
                    error: Some(format!("task panicked: {}", join_err)),
                    started_at,
                    completed_at: Utc::now(),
                }
            }
        };

        // Receiver may have been dropped; that is fine.
        let _ = task.reply_tx.send(result);

        {
            let mut state = self.lanes[&lane].lock();
            state.running = state.running.saturating_sub(1);
        }
        self.dispatch(lane);
    }

    pub fn counters(&self, lane: Lane) -> LaneCounters {
        let state = self.lanes[&lane].lock();
        LaneCounters {
            pending: state.running,
            queued: state.waiting.len(),
        }
    }

    pub fn all_counters(&self) -> HashMap<Lane, LaneCounters> {
        Lane::all()
            .into_iter()
            .map(|lane| (lane, self.counters(lane)))
            .collect()
    }
}
