// tests/resilience_test.rs
// Retry boundary behavior and the circuit-breaker lifecycle.

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::time::Instant;

use vega_backend::resilience::{
    CircuitBreakerPolicy, ResiliencePolicy, ResilientExecutor, RetryPolicy,
};

fn scenario_policy() -> ResiliencePolicy {
    ResiliencePolicy {
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay_ms: 100,
            max_delay_ms: 1000,
            jitter_ratio: 0.0,
        },
        circuit_breaker: CircuitBreakerPolicy {
            failure_threshold: 2,
            cooldown_ms: 5000,
        },
    }
}

#[tokio::test(start_paused = true)]
async fn retry_attempts_and_exact_delays() {
    let executor = ResilientExecutor::new(scenario_policy());
    let attempts = Arc::new(AtomicU32::new(0));
    let attempt_times = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let started = Instant::now();
    let a = attempts.clone();
    let t = attempt_times.clone();
    let result: Result<(), _> = executor
        .execute("always-fails", move || {
            let a = a.clone();
            let t = t.clone();
            async move {
                a.fetch_add(1, Ordering::SeqCst);
                t.lock().push(started.elapsed());
                Err(anyhow::anyhow!("transient"))
            }
        })
        .await;

    assert!(result.is_err());
    assert_eq!(attempts.load(Ordering::SeqCst), 3);

    // Attempts at 0ms, 100ms, 300ms: sleeps of exactly 100 then 200 between.
    let times = attempt_times.lock();
    assert_eq!(times[0], Duration::from_millis(0));
    assert_eq!(times[1], Duration::from_millis(100));
    assert_eq!(times[2], Duration::from_millis(300));
}

#[tokio::test(start_paused = true)]
async fn circuit_opens_fast_fails_then_probes() {
    let executor = ResilientExecutor::new(scenario_policy());

    // Two consecutive full retry failures (3 attempts each) open the circuit.
    for _ in 0..2 {
        let err = executor
            .execute("flaky-op", || async { Err::<(), _>(anyhow::anyhow!("down")) })
            .await
            .unwrap_err();
        assert!(!err.is_circuit_open());
    }

    let metrics = executor.metrics("flaky-op").unwrap();
    assert_eq!(metrics.total, 2);
    assert_eq!(metrics.failures, 2);
    assert_eq!(metrics.retries, 4);
    assert_eq!(metrics.circuit_open_events, 1);

    // Within the cooldown: fast fail, closure untouched.
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let err = executor
        .execute("flaky-op", move || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>("should not run")
            }
        })
        .await
        .unwrap_err();
    assert!(err.is_circuit_open());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    // After the cooldown a probe goes through and closes the circuit.
    tokio::time::advance(Duration::from_millis(5001)).await;
    let value = executor
        .execute("flaky-op", || async { Ok::<_, anyhow::Error>("recovered") })
        .await
        .unwrap();
    assert_eq!(value, "recovered");
    assert!(!executor.is_circuit_open("flaky-op"));
    assert_eq!(executor.metrics("flaky-op").unwrap().consecutive_failures, 0);
}

#[tokio::test(start_paused = true)]
async fn final_error_message_is_preserved() {
    let executor = ResilientExecutor::new(scenario_policy());
    let err = executor
        .execute("op", || async {
            Err::<(), _>(anyhow::anyhow!("provider said 503: overloaded"))
        })
        .await
        .unwrap_err();
    assert_eq!(err.to_string(), "provider said 503: overloaded");
}

#[tokio::test(start_paused = true)]
async fn ops_are_isolated() {
    let executor = ResilientExecutor::new(scenario_policy());

    for _ in 0..2 {
        let _ = executor
            .execute("bad-op", || async { Err::<(), _>(anyhow::anyhow!("x")) })
            .await;
    }
    assert!(executor.is_circuit_open("bad-op"));

    // A different op under the same executor is unaffected.
    executor
        .execute("good-op", || async { Ok::<_, anyhow::Error>(()) })
        .await
        .unwrap();
    assert!(!executor.is_circuit_open("good-op"));
}
