//! Execute-now-or-enqueue decisions made by `MutationGateway`.

mod support;

use fieldsync_common::error::ErrorClassification;
use fieldsync_core::{
    ExecuteOptions, ExecutionError, GatewayError, OperationEvent, Outcome,
};
use fieldsync_domain::{OperationFilter, Priority};
use support::harness::Harness;
use support::operations::{NoteSaved, SaveNote, ScriptedHandler, Unregistered};

#[tokio::test]
async fn test_online_success_returns_the_result_and_leaves_the_queue_alone() {
    let harness = Harness::new().await;

    let outcome =
        harness.gateway.execute(SaveNote::new("north field"), ExecuteOptions::default()).await;

    assert_eq!(outcome.unwrap(), Outcome::Completed(NoteSaved { text: "north field".into() }));
    assert!(harness.store.is_empty().await);
    assert_eq!(harness.durable.save_count(), 0);
    assert!(harness.notifier.queued().is_empty());
}

#[tokio::test]
async fn test_offline_execution_is_queued_and_announced_once() {
    let harness = Harness::new().await;
    harness.monitor.set_online(false);
    let mut events = harness.events.subscribe();

    let outcome = harness
        .gateway
        .execute(
            SaveNote::new("east field"),
            ExecuteOptions::default().with_priority(Priority::High).with_meta("user", "ana"),
        )
        .await
        .unwrap();

    let Outcome::Queued(receipt) = outcome else {
        panic!("expected a queued outcome");
    };
    assert_eq!(receipt.kind, "save_note");
    assert_eq!(receipt.priority, Priority::High);
    assert_eq!(harness.notifier.queued(), vec![receipt.id.clone()]);
    assert_eq!(harness.handler.call_count(), 0);

    let stored = harness.store.get(&receipt.id).await.unwrap();
    assert_eq!(stored.payload, serde_json::json!({ "text": "east field" }));
    assert_eq!(stored.max_retries, 3);
    assert_eq!(stored.meta.get("user").map(String::as_str), Some("ana"));
    assert_eq!(harness.durable.entries("offline_queue").len(), 1);

    match events.try_recv().unwrap() {
        OperationEvent::Queued { id, kind } => {
            assert_eq!(id, receipt.id);
            assert_eq!(kind, "save_note");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_offline_without_queueing_is_rejected() {
    let harness = Harness::new().await;
    harness.monitor.set_online(false);

    let err = harness
        .gateway
        .execute(SaveNote::new("west field"), ExecuteOptions::default().queue_when_offline(false))
        .await
        .unwrap_err();

    assert!(matches!(err, GatewayError::NetworkUnavailable { ref kind } if kind == "save_note"));
    assert!(err.is_retryable());
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_online_failure_is_returned_when_retry_is_off() {
    let handler = ScriptedHandler::new().then(Err(ExecutionError::transient("502")));
    let harness = Harness::with_handler(handler).await;

    let outcome = harness
        .gateway
        .execute(SaveNote::new("south field"), ExecuteOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Failed(ExecutionError::transient("502")));
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_transient_online_failure_is_queued_when_retry_is_on() {
    let handler = ScriptedHandler::new().then(Err(ExecutionError::transient("502")));
    let harness = Harness::with_handler(handler).await;

    let outcome = harness
        .gateway
        .execute(SaveNote::new("orchard"), ExecuteOptions::default().retry_on_failure(true))
        .await
        .unwrap();

    assert!(outcome.is_queued());
    let queued = harness.store.list(&OperationFilter::drain_candidates()).await;
    assert_eq!(queued.len(), 1);
    assert_eq!(queued[0].last_error.as_deref(), Some("502"));
    assert_eq!(harness.notifier.queued().len(), 1);

    let report = harness.processor.drain().await.unwrap();
    assert_eq!(report.completed, 1);
    assert_eq!(harness.handler.calls(), vec!["orchard", "orchard"]);
}

#[tokio::test]
async fn test_permanent_online_failure_is_never_queued() {
    let handler = ScriptedHandler::new().then(Err(ExecutionError::permanent("invalid crop")));
    let harness = Harness::with_handler(handler).await;

    let outcome = harness
        .gateway
        .execute(SaveNote::new("greenhouse"), ExecuteOptions::default().retry_on_failure(true))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Failed(ExecutionError::permanent("invalid crop")));
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_unregistered_kind_is_rejected_before_queueing() {
    let harness = Harness::new().await;
    harness.monitor.set_online(false);

    let err = harness.gateway.execute(Unregistered, ExecuteOptions::default()).await.unwrap_err();

    assert!(matches!(err, GatewayError::UnknownKind(ref kind) if kind == "unregistered"));
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_failed_write_is_surfaced_and_not_reported_as_queued() {
    let harness = Harness::new().await;
    harness.monitor.set_online(false);
    harness.durable.fail_saves(true);

    let err = harness
        .gateway
        .execute(SaveNote::new("barn"), ExecuteOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_persistence_failure());
    assert_eq!(harness.notifier.persistence_failures(), 1);
    assert!(harness.notifier.queued().is_empty());
    assert!(harness.store.is_empty().await);
}

#[tokio::test]
async fn test_cancel_removes_a_queued_operation() {
    let harness = Harness::new().await;
    harness.monitor.set_online(false);
    let Outcome::Queued(receipt) =
        harness.gateway.execute(SaveNote::new("pasture"), ExecuteOptions::default()).await.unwrap()
    else {
        panic!("expected a queued outcome");
    };
    let mut events = harness.events.subscribe();

    assert!(harness.gateway.cancel(&receipt.id).await.unwrap());
    assert!(!harness.gateway.cancel(&receipt.id).await.unwrap());

    assert!(harness.store.is_empty().await);
    assert_eq!(events.try_recv().unwrap(), OperationEvent::Cancelled { id: receipt.id });
    assert!(events.try_recv().is_err());
}

#[tokio::test]
async fn test_acknowledging_a_retryable_entry_is_refused() {
    let harness = Harness::new().await;
    harness.monitor.set_online(false);
    let Outcome::Queued(receipt) =
        harness.gateway.execute(SaveNote::new("silo"), ExecuteOptions::default()).await.unwrap()
    else {
        panic!("expected a queued outcome");
    };

    let err = harness.gateway.acknowledge(&receipt.id).await.unwrap_err();

    assert!(matches!(err, GatewayError::Queue(_)));
    assert_eq!(harness.store.len().await, 1);
}

#[tokio::test]
async fn test_network_state_reflects_the_monitor() {
    let harness = Harness::new().await;
    assert!(harness.gateway.network_state().is_online);

    harness.monitor.set_online(false);
    assert!(!harness.gateway.network_state().is_online);
}
