// src/resilience/metrics.rs
// Per-operation execution metrics. Counters are monotonic; only
// consecutive_failures resets (on success or when the breaker opens).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OpMetrics {
    pub total: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
    pub circuit_open_events: u64,
    pub consecutive_failures: u32,
    pub last_error: Option<String>,
    pub last_started_at: Option<DateTime<Utc>>,
    pub last_succeeded_at: Option<DateTime<Utc>>,
    pub last_failed_at: Option<DateTime<Utc>>,
}

impl OpMetrics {
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        self.successes as f64 / self.total as f64
    }
}
