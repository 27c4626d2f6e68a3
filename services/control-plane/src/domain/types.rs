use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use keystone_core::serde::to_rfc3339_ms;
use keystone_domain::context::RequestContext;
use keystone_domain::id::{OutboxEventId, TenantId};

/// Aggregate type stamped on every tenant event.
pub const TENANT_AGGREGATE: &str = "Tenant";

pub const TENANT_CREATED: &str = "tenant.created";
pub const TENANT_UPDATED: &str = "tenant.updated";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("unknown status: {0}")]
pub struct UnknownStatus(pub String);

// ── Tenant ───────────────────────────────────────────────────────────────────

/// A tenant of the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
    pub plan: String,
    pub region: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TenantStatus {
    Active,
    Suspended,
    Deleted,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Suspended => "SUSPENDED",
            Self::Deleted => "DELETED",
        }
    }
}

impl fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TenantStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(Self::Active),
            "SUSPENDED" => Ok(Self::Suspended),
            "DELETED" => Ok(Self::Deleted),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

// ── Outbox ───────────────────────────────────────────────────────────────────

/// Delivery state of an outbox row. `Sent` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutboxStatus {
    Pending,
    Sent,
    Failed,
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Sent => "SENT",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for OutboxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutboxStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SENT" => Ok(Self::Sent),
            "FAILED" => Ok(Self::Failed),
            other => Err(UnknownStatus(other.to_owned())),
        }
    }
}

/// Event to be written to the outbox alongside a business change.
#[derive(Debug, Clone, PartialEq)]
pub struct NewOutboxEvent {
    pub id: OutboxEventId,
    pub tenant_id: Option<TenantId>,
    pub region_origin: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
}

impl NewOutboxEvent {
    /// `tenant_id` is the tenant owning the event (`None` for platform-level events).
    pub fn new(
        ctx: &RequestContext,
        tenant_id: Option<TenantId>,
        aggregate_type: impl Into<String>,
        aggregate_id: impl Into<String>,
        event_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: OutboxEventId::generate(),
            tenant_id,
            region_origin: ctx.region.clone(),
            aggregate_type: aggregate_type.into(),
            aggregate_id: aggregate_id.into(),
            event_type: event_type.into(),
            payload,
        }
    }
}

/// A stored outbox row.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEvent {
    pub id: OutboxEventId,
    pub tenant_id: Option<TenantId>,
    pub region_origin: String,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    pub status: OutboxStatus,
    pub retries: u32,
    pub locked_at: Option<DateTime<Utc>>,
    pub locked_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub sent_at: Option<DateTime<Utc>>,
}

impl OutboxEvent {
    /// Whether a `claim` at `now` would succeed: still pending and either unlocked
    /// or holding a lease older than `lock_expiry`.
    pub fn is_claimable(&self, now: DateTime<Utc>, lock_expiry: Duration) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.locked_at {
            None => true,
            Some(locked_at) => locked_at < lease_cutoff(now, lock_expiry),
        }
    }
}

/// Leases taken strictly before this instant are expired.
pub fn lease_cutoff(now: DateTime<Utc>, lock_expiry: Duration) -> DateTime<Utc> {
    TimeDelta::from_std(lock_expiry)
        .ok()
        .and_then(|expiry| now.checked_sub_signed(expiry))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// Wire wrapper handed to the message bus.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub id: OutboxEventId,
    pub aggregate_type: String,
    pub aggregate_id: String,
    pub event_type: String,
    pub payload: serde_json::Value,
    #[serde(serialize_with = "to_rfc3339_ms")]
    pub created_at: DateTime<Utc>,
}

impl Envelope {
    /// `<prefix>.<aggregate_type>.<event_type>`, so consumers can bind by pattern.
    pub fn routing_key(&self, prefix: &str) -> String {
        format!("{}.{}.{}", prefix, self.aggregate_type, self.event_type)
    }
}

impl From<&OutboxEvent> for Envelope {
    fn from(event: &OutboxEvent) -> Self {
        Self {
            id: event.id,
            aggregate_type: event.aggregate_type.clone(),
            aggregate_id: event.aggregate_id.clone(),
            event_type: event.event_type.clone(),
            payload: event.payload.clone(),
            created_at: event.created_at,
        }
    }
}

/// Result of one publish attempt. Anything short of a confirmed delivery is
/// `NotDelivered`, including outcomes the transport cannot disambiguate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishOutcome {
    Delivered,
    NotDelivered(String),
}
