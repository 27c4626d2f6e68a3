#![allow(async_fn_in_trait)]

use std::time::Duration;

use chrono::{DateTime, Utc};

use keystone_domain::id::{OutboxEventId, TenantId};

use crate::domain::retry::{FailureDecision, RetryPolicy};
use crate::domain::types::{Envelope, NewOutboxEvent, OutboxEvent, PublishOutcome, Tenant};
use crate::error::ControlPlaneError;

/// Repository for tenants. Every mutation writes its outbox event in the same transaction.
pub trait TenantRepository: Send + Sync {
    async fn find_by_id(&self, id: TenantId) -> Result<Option<Tenant>, ControlPlaneError>;

    /// Insert a new tenant and an outbox event atomically (same transaction).
    async fn create_with_outbox(
        &self,
        tenant: &Tenant,
        event: &NewOutboxEvent,
    ) -> Result<(), ControlPlaneError>;

    /// Overwrite a tenant and insert an outbox event atomically.
    /// Returns `false` (and writes nothing) if the tenant does not exist.
    async fn update_with_outbox(
        &self,
        tenant: &Tenant,
        event: &NewOutboxEvent,
    ) -> Result<bool, ControlPlaneError>;
}

/// Read side of the outbox.
pub trait OutboxRepository: Send + Sync {
    /// Pending events that are unlocked or whose lease is older than `lock_expiry`,
    /// oldest first (`created_at`, then `id`), at most `batch_size`.
    async fn list_dispatch_candidates(
        &self,
        now: DateTime<Utc>,
        lock_expiry: Duration,
        batch_size: u64,
    ) -> Result<Vec<OutboxEvent>, ControlPlaneError>;

    async fn find_by_id(&self, id: OutboxEventId)
    -> Result<Option<OutboxEvent>, ControlPlaneError>;
}

/// Lease transitions on outbox rows. Each is a single conditional write.
pub trait OutboxLeaseManager: Send + Sync {
    /// Take the lease for `owner`. `true` iff this call acquired it.
    async fn claim(
        &self,
        id: OutboxEventId,
        owner: &str,
        now: DateTime<Utc>,
        lock_expiry: Duration,
    ) -> Result<bool, ControlPlaneError>;

    /// `PENDING -> SENT`. `false` when the row was no longer pending.
    async fn mark_sent(&self, id: OutboxEventId, now: DateTime<Utc>)
    -> Result<bool, ControlPlaneError>;

    /// Record one failed attempt while `owner` still holds the lease.
    /// `None` when the lease was lost or the row is gone or already terminal.
    async fn handle_failure(
        &self,
        id: OutboxEventId,
        owner: &str,
        policy: &RetryPolicy,
    ) -> Result<Option<FailureDecision>, ControlPlaneError>;
}

/// Port to the message bus.
pub trait EventPublisher: Send + Sync {
    /// Never errors: transport problems come back as `NotDelivered`.
    async fn publish(&self, envelope: &Envelope) -> PublishOutcome;
}
