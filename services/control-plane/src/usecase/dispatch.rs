//! Outbox dispatch loop: list candidates, claim, publish, settle.
//!
//! Every step against the store is its own unit of work; nothing is held
//! open across the publish call. Delivery is at-least-once: a crash between
//! a confirmed publish and `mark_sent` leaves the row pending, and it is
//! published again once the lease expires.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use keystone_core::clock::Clock;
use keystone_domain::id::OutboxEventId;

use crate::domain::repository::{EventPublisher, OutboxLeaseManager, OutboxRepository};
use crate::domain::retry::{FailureDecision, RetryPolicy};
use crate::domain::types::{Envelope, PublishOutcome};
use crate::error::ControlPlaneError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchSettings {
    pub batch_size: u64,
    pub tick_interval: Duration,
    pub lock_expiry: Duration,
    pub publish_timeout: Duration,
    pub retry: RetryPolicy,
}

/// How one candidate ended up after a dispatch attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent,
    Requeued,
    Failed,
    /// Lease held elsewhere, or the row was settled by someone else.
    Skipped,
}

/// Per-tick tally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub candidates: u64,
    pub sent: u64,
    pub requeued: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Store errors on individual rows.
    pub errors: u64,
}

impl TickReport {
    fn record(&mut self, outcome: DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent => self.sent += 1,
            DispatchOutcome::Requeued => self.requeued += 1,
            DispatchOutcome::Failed => self.failed += 1,
            DispatchOutcome::Skipped => self.skipped += 1,
        }
    }
}

/// Cumulative dispatcher counters, shared with the ops surface.
#[derive(Debug, Default)]
pub struct DispatchMetrics {
    ticks: AtomicU64,
    tick_errors: AtomicU64,
    candidates: AtomicU64,
    sent: AtomicU64,
    requeued: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DispatchMetricsSnapshot {
    pub ticks: u64,
    pub tick_errors: u64,
    pub candidates: u64,
    pub sent: u64,
    pub requeued: u64,
    pub failed: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl DispatchMetrics {
    pub fn record(&self, report: &TickReport) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.candidates.fetch_add(report.candidates, Ordering::Relaxed);
        self.sent.fetch_add(report.sent, Ordering::Relaxed);
        self.requeued.fetch_add(report.requeued, Ordering::Relaxed);
        self.failed.fetch_add(report.failed, Ordering::Relaxed);
        self.skipped.fetch_add(report.skipped, Ordering::Relaxed);
        self.errors.fetch_add(report.errors, Ordering::Relaxed);
    }

    /// A tick that could not even list its candidates.
    pub fn record_tick_error(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
        self.tick_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DispatchMetricsSnapshot {
        DispatchMetricsSnapshot {
            ticks: self.ticks.load(Ordering::Relaxed),
            tick_errors: self.tick_errors.load(Ordering::Relaxed),
            candidates: self.candidates.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
            requeued: self.requeued.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// One dispatcher instance. Several may run against the same store; the
/// lease on each row keeps them from publishing it concurrently.
pub struct OutboxDispatcher<S, P, C>
where
    S: OutboxRepository + OutboxLeaseManager,
    P: EventPublisher,
    C: Clock,
{
    pub store: S,
    pub publisher: P,
    pub clock: C,
    pub settings: DispatchSettings,
    /// Lease owner written to `locked_by`.
    pub instance_id: String,
    pub metrics: Arc<DispatchMetrics>,
}

impl<S, P, C> OutboxDispatcher<S, P, C>
where
    S: OutboxRepository + OutboxLeaseManager,
    P: EventPublisher,
    C: Clock,
{
    /// Process one batch of candidates, oldest first.
    ///
    /// Errors only when the candidate list itself cannot be read. Row-level
    /// store errors are logged, counted in `errors`, and the batch continues.
    pub async fn tick(&self) -> Result<TickReport, ControlPlaneError> {
        let candidates = self
            .store
            .list_dispatch_candidates(
                self.clock.now(),
                self.settings.lock_expiry,
                self.settings.batch_size,
            )
            .await?;

        let mut report = TickReport {
            candidates: candidates.len() as u64,
            ..TickReport::default()
        };
        for candidate in &candidates {
            match self.dispatch_one(candidate.id).await {
                Ok(outcome) => report.record(outcome),
                Err(e) => {
                    report.errors += 1;
                    tracing::warn!(
                        event_id = %candidate.id,
                        event_type = %candidate.event_type,
                        instance_id = %self.instance_id,
                        error = ?e,
                        "outbox dispatch step failed"
                    );
                }
            }
        }

        self.metrics.record(&report);
        Ok(report)
    }

    async fn dispatch_one(&self, id: OutboxEventId) -> Result<DispatchOutcome, ControlPlaneError> {
        let claimed = self
            .store
            .claim(
                id,
                &self.instance_id,
                self.clock.now(),
                self.settings.lock_expiry,
            )
            .await?;
        if !claimed {
            tracing::debug!(
                event_id = %id,
                instance_id = %self.instance_id,
                "lease held elsewhere"
            );
            return Ok(DispatchOutcome::Skipped);
        }

        let Some(event) = self.store.find_by_id(id).await? else {
            return Ok(DispatchOutcome::Skipped);
        };
        if event.status.is_terminal() {
            tracing::debug!(
                event_id = %id,
                status = %event.status,
                "outbox event settled before publish"
            );
            return Ok(DispatchOutcome::Skipped);
        }
        let envelope = Envelope::from(&event);

        let publish = self.publisher.publish(&envelope);
        let outcome = match tokio::time::timeout(self.settings.publish_timeout, publish).await {
            Ok(outcome) => outcome,
            Err(_) => PublishOutcome::NotDelivered(format!(
                "publish timed out after {}ms",
                self.settings.publish_timeout.as_millis()
            )),
        };

        match outcome {
            PublishOutcome::Delivered => {
                if self.store.mark_sent(id, self.clock.now()).await? {
                    tracing::info!(
                        event_id = %id,
                        event_type = %event.event_type,
                        aggregate_type = %event.aggregate_type,
                        instance_id = %self.instance_id,
                        "outbox event sent"
                    );
                    Ok(DispatchOutcome::Sent)
                } else {
                    tracing::debug!(event_id = %id, "outbox event already settled");
                    Ok(DispatchOutcome::Skipped)
                }
            }
            PublishOutcome::NotDelivered(reason) => {
                let decision = self
                    .store
                    .handle_failure(id, &self.instance_id, &self.settings.retry)
                    .await?;
                Ok(self.report_failure(&event.event_type, id, &reason, decision))
            }
        }
    }

    fn report_failure(
        &self,
        event_type: &str,
        id: OutboxEventId,
        reason: &str,
        decision: Option<FailureDecision>,
    ) -> DispatchOutcome {
        match decision {
            Some(FailureDecision::Requeue { retries }) => {
                tracing::warn!(
                    event_id = %id,
                    event_type,
                    retries,
                    reason,
                    instance_id = %self.instance_id,
                    "outbox publish failed, requeued"
                );
                DispatchOutcome::Requeued
            }
            Some(FailureDecision::Fail { retries }) => {
                tracing::error!(
                    event_id = %id,
                    event_type,
                    retries,
                    retry_max = self.settings.retry.retry_max,
                    reason,
                    instance_id = %self.instance_id,
                    "outbox event failed permanently"
                );
                DispatchOutcome::Failed
            }
            None => {
                tracing::warn!(
                    event_id = %id,
                    event_type,
                    reason,
                    instance_id = %self.instance_id,
                    "lease lost before failure was recorded"
                );
                DispatchOutcome::Skipped
            }
        }
    }

    /// Tick on a fixed delay until `shutdown` turns true (or its sender drops).
    ///
    /// Shutdown is only observed between ticks, so an in-flight batch always
    /// finishes.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.settings.tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(instance_id = %self.instance_id, "outbox dispatcher started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                _ = interval.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match self.tick().await {
                Ok(report) if report.candidates > 0 => {
                    tracing::debug!(
                        instance_id = %self.instance_id,
                        candidates = report.candidates,
                        sent = report.sent,
                        requeued = report.requeued,
                        failed = report.failed,
                        skipped = report.skipped,
                        errors = report.errors,
                        "outbox tick finished"
                    );
                }
                Ok(_) => {}
                Err(e) => {
                    self.metrics.record_tick_error();
                    tracing::error!(
                        instance_id = %self.instance_id,
                        error = ?e,
                        "outbox tick failed"
                    );
                }
            }
        }

        tracing::info!(instance_id = %self.instance_id, "outbox dispatcher stopped");
    }
}
