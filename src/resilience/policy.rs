// src/resilience/policy.rs
// Retry and circuit-breaker policy. Immutable per executor instance.

use serde::{Deserialize, Serialize};

use crate::config::env_parse;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Uniform jitter within ±ratio of the computed delay
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 15_000,
            jitter_ratio: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerPolicy {
    /// Consecutive final failures before the breaker opens
    pub failure_threshold: u32,
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerPolicy {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ResiliencePolicy {
    pub retry: RetryPolicy,
    pub circuit_breaker: CircuitBreakerPolicy,
}

impl ResiliencePolicy {
    /// Load a policy from `<PREFIX>_RETRY_*` / `<PREFIX>_CIRCUIT_*` env vars,
    /// falling back to defaults.
    pub fn from_env(prefix: &str) -> Self {
        let d = Self::default();
        Self {
            retry: RetryPolicy {
                max_attempts: env_parse(
                    &format!("{prefix}_RETRY_MAX_ATTEMPTS"),
                    d.retry.max_attempts,
                )
                .max(1),
                base_delay_ms: env_parse(
                    &format!("{prefix}_RETRY_BASE_DELAY_MS"),
                    d.retry.base_delay_ms,
                ),
                max_delay_ms: env_parse(
                    &format!("{prefix}_RETRY_MAX_DELAY_MS"),
                    d.retry.max_delay_ms,
                ),
                jitter_ratio: env_parse(
                    &format!("{prefix}_RETRY_JITTER_RATIO"),
                    d.retry.jitter_ratio,
                ),
            },
            circuit_breaker: CircuitBreakerPolicy {
                failure_threshold: env_parse(
                    &format!("{prefix}_CIRCUIT_FAILURE_THRESHOLD"),
                    d.circuit_breaker.failure_threshold,
                )
                .max(1),
                cooldown_ms: env_parse(
                    &format!("{prefix}_CIRCUIT_COOLDOWN_MS"),
                    d.circuit_breaker.cooldown_ms,
                ),
            },
        }
    }
}
