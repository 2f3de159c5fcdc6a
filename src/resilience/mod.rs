// src/resilience/mod.rs
// Resilient executor: per-operation retry with exponential backoff + jitter,
// circuit breaker, and health metrics.

mod metrics;
mod policy;

pub use metrics::OpMetrics;
pub use policy::{CircuitBreakerPolicy, ResiliencePolicy, RetryPolicy};

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Failure surfaced by [`ResilientExecutor::execute`].
#[derive(Debug, Error)]
pub enum ExecuteError {
    /// The breaker for this operation is open; the operation was not invoked.
    #[error("circuit open for operation '{op}', retry after {remaining_ms}ms")]
    CircuitOpen { op: String, remaining_ms: u64 },

    /// All attempts failed; carries the last underlying error.
    #[error("{source}")]
    Exhausted {
        #[source]
        source: anyhow::Error,
    },
}

impl ExecuteError {
    pub fn is_circuit_open(&self) -> bool {
        matches!(self, ExecuteError::CircuitOpen { .. })
    }
}

#[derive(Debug, Clone)]
struct CircuitState {
    open_until: Option<Instant>,
    consecutive_failures: u32,
}

impl CircuitState {
    fn new() -> Self {
        Self {
            open_until: None,
            consecutive_failures: 0,
        }
    }
}

#[derive(Debug)]
struct OpState {
    metrics: OpMetrics,
    circuit: CircuitState,
}

impl OpState {
    fn new() -> Self {
        Self {
            metrics: OpMetrics::default(),
            circuit: CircuitState::new(),
        }
    }
}

/// Runs operations under a retry + circuit-breaker policy, tracking
/// per-operation metrics. One instance per use site (agent, scheduler,
/// summarizer) with its own policy.
pub struct ResilientExecutor {
    policy: ResiliencePolicy,
    ops: Mutex<HashMap<String, OpState>>,
}

impl ResilientExecutor {
    pub fn new(policy: ResiliencePolicy) -> Self {
        Self {
            policy,
            ops: Mutex::new(HashMap::new()),
        }
    }

    pub fn policy(&self) -> &ResiliencePolicy {
        &self.policy
    }

    /// Execute `make_attempt` under the policy. Retries transient failures up
    /// to `max_attempts - 1` times with exponentially backed-off, jittered
    /// sleeps; fast-fails while the operation's breaker is open.
    pub async fn execute<T, F, Fut>(&self, op: &str, make_attempt: F) -> Result<T, ExecuteError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = anyhow::Result<T>>,
    {
        // Closed-circuit check + start bookkeeping under one lock hold.
        {
            let mut ops = self.ops.lock();
            let state = ops.entry(op.to_string()).or_insert_with(OpState::new);

            if let Some(open_until) = state.circuit.open_until {
                let now = Instant::now();
                if open_until > now {
                    let remaining_ms = (open_until - now).as_millis() as u64;
                    debug!("[EXEC] {}: circuit open, failing fast ({}ms left)", op, remaining_ms);
                    return Err(ExecuteError::CircuitOpen {
                        op: op.to_string(),
                        remaining_ms,
                    });
                }
                // Cooldown elapsed: allow a probing call through.
                state.circuit.open_until = None;
            }

            state.metrics.total += 1;
            state.metrics.last_started_at = Some(chrono::Utc::now());
        }

        let max_attempts = self.policy.retry.max_attempts.max(1);
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 1..=max_attempts {
            match make_attempt().await {
                Ok(value) => {
                    self.on_success(op);
                    return Ok(value);
                }
                Err(e) => {
                    warn!("[EXEC] {}: attempt {}/{} failed: {}", op, attempt, max_attempts, e);
                    last_error = Some(e);

                    if attempt < max_attempts {
                        {
                            let mut ops = self.ops.lock();
                            if let Some(state) = ops.get_mut(op) {
                                state.metrics.retries += 1;
                            }
                        }
                        tokio::time::sleep(self.backoff_delay(attempt)).await;
                    }
                }
            }
        }

        let error = last_error.unwrap_or_else(|| anyhow::anyhow!("operation failed"));
        self.on_final_failure(op, &error);
        Err(ExecuteError::Exhausted { source: error })
    }

    /// Sleep duration before the attempt following `attempt` (1-based):
    /// min(max_delay, base * 2^(attempt-1)), jittered within ±jitter_ratio.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let retry = &self.policy.retry;
        let exp = retry
            .base_delay_ms
            .saturating_mul(1u64 << (attempt - 1).min(32));
        let capped = exp.min(retry.max_delay_ms) as f64;

        let jitter = retry.jitter_ratio.clamp(0.0, 1.0);
        let delay_ms = if jitter > 0.0 {
            let factor = rand::rng().random_range(1.0 - jitter..=1.0 + jitter);
            capped * factor
        } else {
            capped
        };

        Duration::from_millis(delay_ms.round() as u64)
    }

    fn on_success(&self, op: &str) {
        let mut ops = self.ops.lock();
        if let Some(state) = ops.get_mut(op) {
            state.metrics.successes += 1;
            state.metrics.consecutive_failures = 0;
            state.metrics.last_succeeded_at = Some(chrono::Utc::now());
            state.circuit.consecutive_failures = 0;
            state.circuit.open_until = None;
        }
    }

    fn on_final_failure(&self, op: &str, error: &anyhow::Error) {
        let mut ops = self.ops.lock();
        let state = ops.entry(op.to_string()).or_insert_with(OpState::new);

        state.metrics.failures += 1;
        state.metrics.consecutive_failures += 1;
        state.metrics.last_error = Some(error.to_string());
        state.metrics.last_failed_at = Some(chrono::Utc::now());

        state.circuit.consecutive_failures += 1;
        if state.circuit.consecutive_failures >= self.policy.circuit_breaker.failure_threshold {
            let cooldown = Duration::from_millis(self.policy.circuit_breaker.cooldown_ms);
            state.circuit.open_until = Some(Instant::now() + cooldown);
            state.circuit.consecutive_failures = 0;
            state.metrics.circuit_open_events += 1;
            warn!(
                "[EXEC] {}: circuit opened for {}ms after repeated failures",
                op, self.policy.circuit_breaker.cooldown_ms
            );
        }
    }

    /// Read-only metrics snapshot for one operation.
    pub fn metrics(&self, op: &str) -> Option<OpMetrics> {
        self.ops.lock().get(op).map(|s| s.metrics.clone())
    }

    /// Read-only snapshot of every tracked operation.
    pub fn snapshot(&self) -> HashMap<String, OpMetrics> {
        self.ops
            .lock()
            .iter()
            .map(|(k, v)| (k.clone(), v.metrics.clone()))
            .collect()
    }

    /// Whether the breaker for `op` is currently open.
    pub fn is_circuit_open(&self, op: &str) -> bool {
        self.ops
            .lock()
            .get(op)
            .and_then(|s| s.circuit.open_until)
            .map(|until| until > Instant::now())
            .unwrap_or(false)
    }
}
