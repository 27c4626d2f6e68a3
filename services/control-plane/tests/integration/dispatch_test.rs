use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use tokio::sync::watch;

use keystone_control_plane::domain::types::OutboxStatus;
use keystone_control_plane::error::ControlPlaneError;
use keystone_control_plane::usecase::dispatch::TickReport;
use keystone_core::clock::Clock;
use keystone_testing::clock::ManualClock;

use crate::helpers::{
    Behavior, INSTANCE_ID, MockOutboxStore, StubPublisher, dispatcher, pending_event, settings,
};

#[tokio::test]
async fn should_send_event_and_clear_lease() {
    let clock = ManualClock::epoch();
    let event = pending_event(clock.now());
    let store = MockOutboxStore::with_events(vec![event.clone()]);
    let publisher = StubPublisher::always(Behavior::Deliver);
    let published = publisher.published_handle();
    let d = dispatcher(store.clone(), publisher, clock.clone(), settings(5));

    let report = d.tick().await.unwrap();

    assert_eq!(
        report,
        TickReport {
            candidates: 1,
            sent: 1,
            ..TickReport::default()
        }
    );
    let stored = store.get(event.id);
    assert_eq!(stored.status, OutboxStatus::Sent);
    assert_eq!(stored.sent_at, Some(clock.now()));
    assert!(stored.locked_at.is_none());
    assert!(stored.locked_by.is_none());

    let published = published.lock().unwrap();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].id, event.id);
    assert_eq!(published[0].payload, event.payload);
    assert_eq!(
        published[0].routing_key("saas"),
        "saas.Tenant.tenant.created"
    );
    assert_eq!(d.metrics.snapshot().sent, 1);
}

#[tokio::test]
async fn should_fail_after_retry_max_and_stop_attempting() {
    let clock = ManualClock::epoch();
    let event = pending_event(clock.now());
    let store = MockOutboxStore::with_events(vec![event.clone()]);
    let publisher = StubPublisher::always(Behavior::Reject);
    let published = publisher.published_handle();
    let d = dispatcher(store.clone(), publisher, clock, settings(3));

    for expected_retries in 1..=2 {
        let report = d.tick().await.unwrap();
        assert_eq!(report.requeued, 1);
        let stored = store.get(event.id);
        assert_eq!(stored.status, OutboxStatus::Pending);
        assert_eq!(stored.retries, expected_retries);
        assert!(stored.locked_by.is_none());
    }

    let report = d.tick().await.unwrap();
    assert_eq!(report.failed, 1);
    let stored = store.get(event.id);
    assert_eq!(stored.status, OutboxStatus::Failed);
    assert_eq!(stored.retries, 3);
    assert!(stored.sent_at.is_none());
    assert!(stored.locked_at.is_none());

    // FAILED is terminal: a further tick makes no delivery attempt.
    let report = d.tick().await.unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(published.lock().unwrap().len(), 3);
    assert_eq!(d.metrics.snapshot().failed, 1);
    assert_eq!(d.metrics.snapshot().requeued, 2);
}

#[tokio::test(start_paused = true)]
async fn should_requeue_when_publish_times_out() {
    let clock = ManualClock::epoch();
    let event = pending_event(clock.now());
    let store = MockOutboxStore::with_events(vec![event.clone()]);
    let publisher = StubPublisher::scripted(vec![Behavior::Hang], Behavior::Deliver);
    let d = dispatcher(store.clone(), publisher, clock, settings(5));

    let report = d.tick().await.unwrap();
    assert_eq!(report.requeued, 1);
    let stored = store.get(event.id);
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.retries, 1);
    assert!(stored.locked_by.is_none());

    let report = d.tick().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(store.get(event.id).status, OutboxStatus::Sent);
}

#[tokio::test]
async fn should_skip_event_when_claim_is_lost() {
    let clock = ManualClock::epoch();
    let event = pending_event(clock.now());
    let store = MockOutboxStore::with_events(vec![event.clone()]);
    store.contended.store(true, Ordering::SeqCst);
    let publisher = StubPublisher::always(Behavior::Deliver);
    let published = publisher.published_handle();
    let d = dispatcher(store.clone(), publisher, clock, settings(5));

    let report = d.tick().await.unwrap();

    assert_eq!(report.candidates, 1);
    assert_eq!(report.skipped, 1);
    assert!(published.lock().unwrap().is_empty());
    assert_eq!(store.get(event.id), event);
}

#[tokio::test]
async fn should_not_record_failure_after_lease_is_lost() {
    let clock = ManualClock::epoch();
    let event = pending_event(clock.now());
    let store = MockOutboxStore::with_events(vec![event.clone()]);
    let thief = store.clone();
    let at = clock.now();
    let publisher = StubPublisher::always(Behavior::Reject)
        .with_hook(move |envelope| thief.steal_lease(envelope.id, "dispatcher-b", at));
    let d = dispatcher(store.clone(), publisher, clock, settings(5));

    let report = d.tick().await.unwrap();

    assert_eq!(report.skipped, 1);
    let stored = store.get(event.id);
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.retries, 0);
    assert_eq!(stored.locked_by.as_deref(), Some("dispatcher-b"));
}

#[tokio::test]
async fn should_reclaim_only_after_lease_expires() {
    let clock = ManualClock::epoch();
    let t0 = clock.now();
    let mut event = pending_event(t0);
    event.locked_at = Some(t0);
    event.locked_by = Some("crashed-instance".to_owned());
    let store = MockOutboxStore::with_events(vec![event.clone()]);
    let d = dispatcher(
        store.clone(),
        StubPublisher::always(Behavior::Deliver),
        clock.clone(),
        settings(5),
    );

    clock.advance(chrono::Duration::seconds(30));
    let report = d.tick().await.unwrap();
    assert_eq!(report.candidates, 0);
    assert_eq!(
        store.get(event.id).locked_by.as_deref(),
        Some("crashed-instance")
    );

    clock.advance(chrono::Duration::seconds(31));
    let report = d.tick().await.unwrap();
    assert_eq!(report.sent, 1);
    assert_eq!(store.get(event.id).status, OutboxStatus::Sent);
}

#[tokio::test]
async fn should_dispatch_oldest_first_within_batch_size() {
    let clock = ManualClock::epoch();
    let t0 = clock.now();
    let newest = pending_event(t0 + chrono::Duration::seconds(2));
    let oldest = pending_event(t0);
    let middle = pending_event(t0 + chrono::Duration::seconds(1));
    let store =
        MockOutboxStore::with_events(vec![newest.clone(), oldest.clone(), middle.clone()]);
    let publisher = StubPublisher::always(Behavior::Deliver);
    let published = publisher.published_handle();
    let mut batch_of_two = settings(5);
    batch_of_two.batch_size = 2;
    let d = dispatcher(store.clone(), publisher, clock, batch_of_two);

    let report = d.tick().await.unwrap();

    assert_eq!(report.candidates, 2);
    let order: Vec<_> = published.lock().unwrap().iter().map(|e| e.id).collect();
    assert_eq!(order, vec![oldest.id, middle.id]);
    assert_eq!(store.get(newest.id).status, OutboxStatus::Pending);
}

#[tokio::test]
async fn should_count_row_errors_and_redeliver_after_lease_expiry() {
    let clock = ManualClock::epoch();
    let first = pending_event(clock.now());
    let second = pending_event(clock.now() + chrono::Duration::seconds(1));
    let store = MockOutboxStore::with_events(vec![first.clone(), second.clone()]);
    store.fail_mark_sent.store(true, Ordering::SeqCst);
    let publisher = StubPublisher::always(Behavior::Deliver);
    let published = publisher.published_handle();
    let d = dispatcher(store.clone(), publisher, clock.clone(), settings(5));

    let report = d.tick().await.unwrap();

    assert_eq!(report.errors, 2);
    assert_eq!(report.sent, 0);
    assert_eq!(published.lock().unwrap().len(), 2);
    let stored = store.get(first.id);
    assert_eq!(stored.status, OutboxStatus::Pending);
    assert_eq!(stored.locked_by.as_deref(), Some(INSTANCE_ID));

    // At-least-once: the unsettled rows are published again once their leases expire.
    store.fail_mark_sent.store(false, Ordering::SeqCst);
    clock.advance(chrono::Duration::seconds(61));
    let report = d.tick().await.unwrap();
    assert_eq!(report.sent, 2);
    assert_eq!(published.lock().unwrap().len(), 4);
}

#[tokio::test]
async fn should_fail_tick_when_candidates_cannot_be_listed() {
    let clock = ManualClock::epoch();
    let store = MockOutboxStore::with_events(vec![pending_event(clock.now())]);
    store.fail_listing.store(true, Ordering::SeqCst);
    let d = dispatcher(store, StubPublisher::always(Behavior::Deliver), clock, settings(5));

    let result = d.tick().await;

    assert!(matches!(result, Err(ControlPlaneError::Internal(_))));
    assert_eq!(d.metrics.snapshot().ticks, 0);
}

#[tokio::test(start_paused = true)]
async fn should_stop_run_loop_on_shutdown() {
    let clock = ManualClock::epoch();
    let event = pending_event(clock.now());
    let store = MockOutboxStore::with_events(vec![event.clone()]);
    let d = dispatcher(
        store.clone(),
        StubPublisher::always(Behavior::Deliver),
        clock,
        settings(5),
    );
    let metrics = Arc::clone(&d.metrics);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handle = tokio::spawn(d.run(shutdown_rx));
    tokio::time::sleep(Duration::from_secs(12)).await;
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();

    let snapshot = metrics.snapshot();
    assert!(snapshot.ticks >= 2);
    assert_eq!(snapshot.sent, 1);
    assert_eq!(store.get(event.id).status, OutboxStatus::Sent);
}

#[tokio::test(start_paused = true)]
async fn should_not_tick_when_shut_down_before_start() {
    let clock = ManualClock::epoch();
    let store = MockOutboxStore::with_events(vec![pending_event(clock.now())]);
    let d = dispatcher(store, StubPublisher::always(Behavior::Deliver), clock, settings(5));
    let metrics = Arc::clone(&d.metrics);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    shutdown_tx.send(true).unwrap();

    d.run(shutdown_rx).await;

    assert_eq!(metrics.snapshot().ticks, 0);
}
