//! Integration tests for sync retry module
//!
//! Walks a backoff schedule with a mock clock the way the queue processor
//! computes `next_attempt_at` for a failing operation.

#![cfg(feature = "runtime")]

use std::time::Duration;

use fieldsync_common::sync::retry::constants::MAX_BACKOFF_EXPONENT;
use fieldsync_common::sync::{BackoffPolicy, QueueMetrics};
use fieldsync_common::testing::{Clock, MockClock};

#[test]
fn test_schedule_for_consecutive_failures() {
    let policy = BackoffPolicy::default();
    let clock = MockClock::new();
    let start = clock.now();

    let mut due = Vec::new();
    for retry_count in 1..=5 {
        let next = clock.now() + chrono::Duration::from_std(policy.delay_for(retry_count)).unwrap();
        due.push((next - start).num_milliseconds());
        clock.advance(policy.delay_for(retry_count));
    }

    assert_eq!(due, vec![2_000, 6_000, 14_000, 30_000, 60_000]);
}

#[test]
fn test_custom_bounds_cap_every_delay() {
    let policy =
        BackoffPolicy::new(Duration::from_millis(250), Duration::from_secs(2)).unwrap();

    for retry_count in 0..=MAX_BACKOFF_EXPONENT + 5 {
        assert!(policy.delay_for(retry_count) <= Duration::from_secs(2));
    }
    assert_eq!(policy.delay_for(2), Duration::from_millis(1000));
}

#[test]
fn test_metrics_shared_across_threads() {
    let metrics = std::sync::Arc::new(QueueMetrics::new());

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let metrics = std::sync::Arc::clone(&metrics);
            std::thread::spawn(move || {
                for _ in 0..250 {
                    metrics.record_enqueue();
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(metrics.snapshot().total_enqueued, 1000);
}
