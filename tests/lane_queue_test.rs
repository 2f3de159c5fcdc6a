// tests/lane_queue_test.rs
// Lane cap enforcement, FIFO ordering, and failure isolation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use vega_backend::queue::{Lane, LaneQueue, TaskReply, TaskStatus};

#[tokio::test]
async fn caps_are_per_lane() {
    assert_eq!(Lane::Fast.cap(), 2);
    assert_eq!(Lane::Slow.cap(), 1);
    assert_eq!(Lane::Background.cap(), 1);
}

#[tokio::test]
async fn concurrent_load_never_exceeds_cap() {
    let queue = LaneQueue::new();
    let live = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut receivers = Vec::new();
    for _ in 0..10 {
        let live = live.clone();
        let peak = peak.clone();
        receivers.push(queue.submit(Lane::Fast, async move {
            let now = live.fetch_add(1, Ordering::SeqCst) + 1;
            peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(15)).await;
            live.fetch_sub(1, Ordering::SeqCst);
            Ok(TaskReply::default())
        }));
    }
    for rx in receivers {
        assert_eq!(rx.await.unwrap().status, TaskStatus::Completed);
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn lanes_do_not_steal_work() {
    let queue = LaneQueue::new();
    let (gate_tx, gate_rx) = tokio::sync::oneshot::channel::<()>();

    // Slow lane is saturated by a blocked task...
    let blocked = queue.submit(Lane::Slow, async move {
        let _ = gate_rx.await;
        Ok(TaskReply::default())
    });

    // ...but fast lane keeps flowing.
    let fast = queue
        .submit(Lane::Fast, async { Ok(TaskReply::default()) })
        .await
        .unwrap();
    assert_eq!(fast.status, TaskStatus::Completed);

    let counters = queue.counters(Lane::Slow);
    assert_eq!(counters.pending, 1);

    let _ = gate_tx.send(());
    blocked.await.unwrap();
}

#[tokio::test]
async fn submission_order_is_start_order() {
    let queue = LaneQueue::new();
    let order = Arc::new(parking_lot::Mutex::new(Vec::new()));

    let mut receivers = Vec::new();
    for i in 0..5 {
        let order = order.clone();
        receivers.push(queue.submit(Lane::Background, async move {
            order.lock().push(i);
            tokio::time::sleep(Duration::from_millis(2)).await;
            Ok(TaskReply::default())
        }));
    }
    for rx in receivers {
        rx.await.unwrap();
    }
    assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
}

#[tokio::test]
async fn failed_task_reports_error_and_releases_slot() {
    let queue = LaneQueue::new();

    let failed = queue
        .submit(Lane::Slow, async { Err(anyhow::anyhow!("LLM unavailable: circuit open")) })
        .await
        .unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(
        failed.error.as_deref(),
        Some("LLM unavailable: circuit open")
    );

    // The lane is free again.
    let ok = queue
        .submit(Lane::Slow, async {
            Ok(TaskReply {
                reply: "fine".to_string(),
                history: Vec::new(),
            })
        })
        .await
        .unwrap();
    assert_eq!(ok.status, TaskStatus::Completed);
    assert_eq!(ok.reply, "fine");

    let counters = queue.counters(Lane::Slow);
    assert_eq!(counters.pending, 0);
    assert_eq!(counters.queued, 0);
}

#[tokio::test]
async fn panicking_task_becomes_failed_result() {
    let queue = LaneQueue::new();
    let result = queue
        .submit(Lane::Background, async {
            if 1 + 1 == 2 {
                panic!("handler bug");
            }
            Ok(TaskReply::default())
        })
        .await
        .unwrap();

    assert_eq!(result.status, TaskStatus::Failed);
    assert!(result.error.unwrap().contains("panicked"));
}
